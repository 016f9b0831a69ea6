use std::{convert::Infallible, sync::Arc};

use dmwork::{
    filter::{self, Filter},
    ws::{message::PAYLOAD_TYPE_TEXT, NormalizedMessage},
    Bot, BotConfig, Context,
};

async fn echo(ctx: Context, msg: Arc<NormalizedMessage>) {
    let text = match msg.payload.content() {
        Some(text) => text.to_string(),
        None => return,
    };

    // send back word by word as a stream message
    let words: Vec<Result<String, Infallible>> = text
        .split_inclusive(' ')
        .map(|w| Ok(w.to_string()))
        .collect();

    if let Err(err) = ctx.reply_stream(futures_util::stream::iter(words)).await {
        log::warn!("Echo to {} failed: {}", ctx.channel_id(), err);
    }
}

#[tokio::main]
async fn main() {
    pretty_env_logger::init();

    let config = match BotConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            println!("Load config from DMWORK_* env vars failed: {}", err);
            std::process::exit(1);
        }
    };

    let bot = Bot::new(config)
        .unwrap()
        .with_filter(filter::payload_type(PAYLOAD_TYPE_TEXT).and(filter::group().not()))
        .subscribe(echo);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    bot.run_until(shutdown).await.unwrap();
}
