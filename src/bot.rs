use std::{fmt::Debug, future::Future, sync::Arc};

use snafu::prelude::*;
use tokio::{sync::mpsc, time::MissedTickBehavior};

use crate::{
    api::{
        self,
        types::{ReadReceiptRequest, RegisterRequest, SendMessageRequest, TypingRequest},
        BotApi,
    },
    config::BotConfig,
    error,
    filter::{self, Filter},
    stream::StreamManager,
    subscriber::{Context, Subscriber},
    ws::{
        self,
        message::{ChannelType, NormalizedMessage, Payload},
        ClientError, ConnectOptions, Handler, ReconnectConfig,
    },
    Result,
};

/// DMWork bot instance
pub struct Bot {
    config: BotConfig,
    api: Arc<dyn BotApi>,
    reconnect: ReconnectConfig,
    filter: Box<dyn Filter + Send + Sync>,
    subscribers: Vec<Box<dyn Subscriber>>,
}

impl Debug for Bot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bot")
            .field("api_url", &self.config.api_url)
            .field("reconnect", &self.reconnect)
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl Bot {
    /// Create new bot instance using config
    pub fn new(config: BotConfig) -> Result<Self> {
        config.validate().context(error::InvalidConfig)?;

        let api_client = api::Client::new(&config.api_url, &config.bot_token)
            .context(error::CreateAPIClientFailed)?;

        log::info!("Create api client success, server {}", config.api_url);

        Ok(Self::with_api(config, Arc::new(api_client)))
    }

    /// Create bot instance with custom api implement
    pub fn with_api(config: BotConfig, api: Arc<dyn BotApi>) -> Self {
        Self {
            config,
            api,
            reconnect: ReconnectConfig::default(),
            filter: Box::new(filter::all()),
            subscribers: Vec::new(),
        }
    }

    /// Only messages pass this filter are given to subscribers
    pub fn with_filter<F: Filter + Send + Sync + 'static>(mut self, filter: F) -> Self {
        self.filter = Box::new(filter);
        self
    }

    /// Websocket reconnect backoff
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Add a subscriber
    pub fn subscribe<S: Subscriber>(mut self, subscriber: S) -> Self {
        self.subscribers.push(Box::new(subscriber));
        self
    }

    /// Run until websocket client gave up
    pub async fn run(self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` completes or websocket client gave up
    pub async fn run_until<F: Future<Output = ()>>(self, shutdown: F) -> Result<()> {
        let Self {
            config,
            api,
            reconnect,
            filter,
            subscribers,
        } = self;

        if !config.enabled {
            log::info!("Bot is disabled, not running");
            return Ok(());
        }

        log::info!("Registering bot ...");

        let bot = api
            .register(&RegisterRequest {
                name: config.name.clone(),
            })
            .await
            .context(error::RegisterFailed)?;

        log::info!("Bot registered as {}", bot.robot_id);

        let gateway = match config.ws_url_override().context(error::InvalidConfig)? {
            Some(url) => url,
            None => bot
                .ws_url
                .parse()
                .with_context(|_| error::InvalidGatewayURL { url: &bot.ws_url })?,
        };

        let mut subscribers = subscribers;
        for subscriber in subscribers.iter_mut() {
            subscriber.on_loaded(&bot).await;
            log::debug!("Subscriber {} loaded", subscriber.name());
        }

        let (fatal, mut fatal_rx) = mpsc::unbounded_channel();

        let handler = BotHandler {
            api: api.clone(),
            streams: StreamManager::new(api.clone()),
            robot_id: Arc::from(bot.robot_id.as_str()),
            owner_uid: bot.owner_uid.clone(),
            greeting: config.greeting.clone(),
            filter,
            subscribers: subscribers.into_iter().map(Arc::from).collect(),
            fatal,
        };

        let mut options = ConnectOptions::new(gateway, &bot.robot_id, &bot.im_token);
        options.reconnect = reconnect;

        let mut client = ws::Client::new(options, handler);
        client.connect();

        let period = config.heartbeat_interval();
        let mut heartbeat = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    log::info!("Bot shutting down");
                    break Ok(());
                }

                Some(attempts) = fatal_rx.recv() => {
                    log::error!("Websocket client gave up after {} attempts", attempts);
                    break error::ReconnectExhausted { attempts }.fail();
                }

                _ = heartbeat.tick() => {
                    let api = api.clone();
                    tokio::spawn(async move {
                        match api.heartbeat().await {
                            Ok(()) => log::trace!("Heartbeat sent"),
                            Err(err) => log::error!("Heartbeat failed: {}", err),
                        }
                    });
                }
            }
        };

        client.disconnect().await;

        log::info!("Bot stopped");

        result
    }
}

struct BotHandler {
    api: Arc<dyn BotApi>,
    streams: StreamManager,
    robot_id: Arc<str>,
    owner_uid: String,
    greeting: Option<String>,
    filter: Box<dyn Filter + Send + Sync>,
    subscribers: Vec<Arc<dyn Subscriber>>,
    fatal: mpsc::UnboundedSender<u32>,
}

impl BotHandler {
    fn mark_read(&self, message: &NormalizedMessage) {
        let api = self.api.clone();
        let receipt = ReadReceiptRequest {
            channel_id: message.channel_id.clone(),
            channel_type: message.channel_type,
            message_ids: vec![message.message_id.to_string()],
        };
        let typing = TypingRequest {
            channel_id: message.channel_id.clone(),
            channel_type: message.channel_type,
        };

        tokio::spawn(async move {
            if let Err(err) = api.send_read_receipt(&receipt).await {
                log::debug!("Send read receipt failed: {}", err);
            }
            if let Err(err) = api.send_typing(&typing).await {
                log::debug!("Send typing failed: {}", err);
            }
        });
    }

    fn greet(&self) {
        let greeting = match self.greeting {
            Some(ref greeting) if !self.owner_uid.is_empty() => greeting.clone(),
            _ => return,
        };

        let api = self.api.clone();
        let req = SendMessageRequest {
            channel_id: self.owner_uid.clone(),
            channel_type: ChannelType::Direct,
            stream_no: None,
            payload: Payload::text(greeting),
        };

        tokio::spawn(async move {
            if let Err(err) = api.send_message(&req).await {
                log::warn!("Send greeting failed: {}", err);
            }
        });
    }
}

impl Handler for BotHandler {
    fn on_message(&self, message: NormalizedMessage) {
        if message.from_uid == *self.robot_id {
            log::trace!("Skip own message {}", message.message_id);
            return;
        }

        if message.from_uid.is_empty() {
            log::info!("Drop message {}: no sender", message.message_id);
            return;
        }

        if message.payload.body().map_or(true, str::is_empty) {
            log::info!(
                "Drop message {} in channel {}: empty content",
                message.message_id,
                message.channel_id
            );
            return;
        }

        if !self.filter.accept(&message) {
            log::debug!("Message {} filtered", message.message_id);
            return;
        }

        log::info!(
            "Received message {} from {} in {:?} channel {}",
            message.message_id,
            message.from_uid,
            message.channel_type,
            message.channel_id
        );

        self.mark_read(&message);

        let message = Arc::new(message);
        let ctx = Context::new(
            self.api.clone(),
            self.streams.clone(),
            self.robot_id.clone(),
            &message,
        );

        for subscriber in self.subscribers.iter() {
            log::trace!("Dispatch message to subscriber {}", subscriber.name());
            tokio::spawn(subscriber.clone().on_message(ctx.clone(), message.clone()));
        }
    }

    fn on_connected(&self) {
        log::info!("Websocket connected");
        self.greet();
    }

    fn on_disconnected(&self) {
        log::warn!("Websocket disconnected");
    }

    fn on_error(&self, error: &ClientError) {
        match error {
            ClientError::ReconnectExhausted { attempts } => {
                let _ = self.fatal.send(*attempts);
            }
            _ => log::warn!("Websocket error: {}", error),
        }
    }
}
