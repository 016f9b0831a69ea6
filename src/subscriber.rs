//! Message subscribers.

use std::{borrow::Cow, fmt::Debug, future::Future, sync::Arc};

use futures_util::Stream;

use crate::{
    api::{
        self,
        types::{RegisterData, SendMessageRequest, SendMessageResult},
        BotApi,
    },
    stream::{self, SourceError, StreamManager},
    ws::message::{ChannelType, NormalizedMessage, Payload},
};

/// What a subscriber gets along with a message: the api, the stream manager
/// and where to reply.
#[derive(Clone)]
pub struct Context {
    api: Arc<dyn BotApi>,
    streams: StreamManager,
    robot_id: Arc<str>,
    channel_id: String,
    channel_type: ChannelType,
}

impl Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("robot_id", &self.robot_id)
            .field("channel_id", &self.channel_id)
            .field("channel_type", &self.channel_type)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub(crate) fn new(
        api: Arc<dyn BotApi>,
        streams: StreamManager,
        robot_id: Arc<str>,
        message: &NormalizedMessage,
    ) -> Self {
        Self {
            api,
            streams,
            robot_id,
            channel_id: message.channel_id.clone(),
            channel_type: message.channel_type,
        }
    }

    /// bot api
    pub fn api(&self) -> &Arc<dyn BotApi> {
        &self.api
    }

    /// stream manager shared by all subscribers
    pub fn streams(&self) -> &StreamManager {
        &self.streams
    }

    /// uid of the bot itself
    pub fn robot_id(&self) -> &str {
        &self.robot_id
    }

    /// reply channel
    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    /// reply channel kind
    pub fn channel_type(&self) -> ChannelType {
        self.channel_type
    }

    /// Send a finished text message to the reply channel
    pub async fn reply<S: Into<String>>(&self, text: S) -> api::Result<SendMessageResult> {
        self.api
            .send_message(&SendMessageRequest {
                channel_id: self.channel_id.clone(),
                channel_type: self.channel_type,
                stream_no: None,
                payload: Payload::text(text),
            })
            .await
    }

    /// Stream text fragments to the reply channel, see [`StreamManager::stream_text`]
    pub async fn reply_stream<S, E>(&self, source: S) -> stream::Result<String>
    where
        S: Stream<Item = Result<String, E>>,
        E: Into<SourceError>,
    {
        self.streams
            .stream_text(&self.channel_id, self.channel_type, source)
            .await
    }
}

/// Subscriber can be register to bot and process messages.
#[async_trait::async_trait]
pub trait Subscriber: Send + Sync + 'static {
    /// subscriber name
    fn name(&self) -> Cow<'static, str>;

    /// callback will be execute when the bot registered, before connect
    async fn on_loaded(&mut self, _bot: &RegisterData) {}

    /// callback will be execute on its own task for every accepted message
    async fn on_message(self: Arc<Self>, ctx: Context, message: Arc<NormalizedMessage>);
}

#[async_trait::async_trait]
impl<F, Fut> Subscriber for F
where
    F: Fn(Context, Arc<NormalizedMessage>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    fn name(&self) -> Cow<'static, str> {
        "Anonymous Fn Subscriber".into()
    }

    async fn on_message(self: Arc<Self>, ctx: Context, message: Arc<NormalizedMessage>) {
        self(ctx, message).await
    }
}
