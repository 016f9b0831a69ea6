mod connected;
mod dispatch;
mod gateway;
mod handshake;
mod heartbeat;
mod init;
mod reconnect;

use std::time::Duration;

pub(super) use init::ClientStateInit;

pub use handshake::HandshakeError;
pub use init::ClientError;

/// max wait time for a graceful websocket close
const CLOSE_TIMEOUT: Duration = Duration::from_secs(3);

#[derive(Debug)]
pub(crate) struct ClientInner<S> {
    pub state: S,
}
