use super::ClientError;
use crate::ws::message::NormalizedMessage;

/// Receives client events.
///
/// All methods are called from the client's driver task, one at a time and in
/// arrival order, so they should return quickly. Spawn a task for slow work.
pub trait Handler: Send + Sync + 'static {
    /// a message was received and its ack was sent
    fn on_message(&self, message: NormalizedMessage);

    /// handshake succeeded
    fn on_connected(&self) {}

    /// an established connection ended
    fn on_disconnected(&self) {}

    /// connection attempt failed, connection lost, or reconnect gave up,
    /// see [`ClientError::is_fatal`]
    fn on_error(&self, _error: &ClientError) {}
}

impl<F> Handler for F
where
    F: Fn(NormalizedMessage) + Send + Sync + 'static,
{
    fn on_message(&self, message: NormalizedMessage) {
        self(message)
    }
}
