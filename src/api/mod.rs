//! DMWork bot api

mod client;
mod error;
pub mod types;

pub use client::Client;
pub use error::Error;

use types::*;

/// Result type for api module
pub type Result<T> = std::result::Result<T, Error>;

/// Bot REST operations used by the bot runtime and the stream manager.
///
/// [`Client`] is the HTTP implementation.
#[async_trait::async_trait]
pub trait BotApi: Send + Sync + 'static {
    /// register bot, get IM credentials
    async fn register(&self, req: &RegisterRequest) -> Result<RegisterData>;

    /// send a message, or a progressive update when `stream_no` is set
    async fn send_message(&self, req: &SendMessageRequest) -> Result<SendMessageResult>;

    /// show typing indicator
    async fn send_typing(&self, req: &TypingRequest) -> Result<()>;

    /// mark messages as read
    async fn send_read_receipt(&self, req: &ReadReceiptRequest) -> Result<()>;

    /// keep bot online
    async fn heartbeat(&self) -> Result<()>;

    /// open a stream message
    async fn stream_start(&self, req: &StreamStartRequest) -> Result<StreamStartData>;

    /// finalize a stream message
    async fn stream_end(&self, req: &StreamEndRequest) -> Result<()>;
}
