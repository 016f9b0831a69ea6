use std::sync::Arc;

use snafu::prelude::*;
use tokio::sync::{oneshot, watch};

use super::{
    connected::{ClientStateConnected, Disconnected},
    gateway::ClientStateGateway,
    handshake::HandshakeError,
    reconnect::ReconnectPolicy,
    ClientInner,
};
use crate::ws::{
    client::{ConnectGatewayError, ConnectOptions, ConnectionState, Connector, Handler},
    packet::PacketStreamError,
};

/// Error reported to [`Handler::on_error`]
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ClientError {
    /// open websocket to gateway failed
    #[snafu(display("connect ws gateway failed: {source}"))]
    ConnectFailed {
        /// source error
        source: ConnectGatewayError,
    },

    /// Connect/ConnAck exchange failed
    #[snafu(display("handshake failed: {source}"))]
    HandshakeFailed {
        /// source error
        source: HandshakeError,
    },

    /// established connection broken
    #[snafu(display("connection lost: {source}"))]
    ConnectionLost {
        /// source error
        source: PacketStreamError,
    },

    /// established connection ended by peer without error
    #[snafu(display("connection closed by gateway"))]
    ConnectionClosed,

    /// reconnect gave up
    #[snafu(display("max reconnect attempts reached ({attempts})"))]
    ReconnectExhausted {
        /// failed attempts
        attempts: u32,
    },
}

impl ClientError {
    /// true if the client stopped and will not reconnect
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ReconnectExhausted { .. })
    }
}

pub(crate) struct ClientStateInit<C> {
    pub options: Arc<ConnectOptions>,
    pub connector: Arc<C>,
    pub handler: Arc<dyn Handler>,
    pub state: Arc<watch::Sender<ConnectionState>>,
}

impl<C: Connector> ClientInner<ClientStateInit<C>> {
    fn set_state(&self, state: ConnectionState) {
        log::debug!("Move to {:?} state", state);
        self.state.state.send_replace(state);
    }

    async fn connect_once(
        &self,
    ) -> Result<ClientInner<ClientStateConnected<C::Transport>>, ClientError> {
        self.set_state(ConnectionState::Connecting);

        let handshake = ClientInner {
            state: ClientStateGateway {
                gateway: &self.state.options.gateway,
            },
        }
        .connect(self.state.connector.as_ref())
        .await
        .context(error::ConnectFailed)?;

        self.set_state(ConnectionState::AwaitingAck);

        handshake
            .handshake(&self.state.options)
            .await
            .context(error::HandshakeFailed)
    }

    /// Drive connection until owner shutdown or reconnect gave up
    pub async fn run(self, mut shutdown: oneshot::Receiver<()>) {
        let handler = self.state.handler.clone();
        let mut policy = ReconnectPolicy::new(self.state.options.reconnect.clone());

        loop {
            let result = tokio::select! {
                biased;

                _ = &mut shutdown => {
                    log::debug!("Shutdown when connecting, stop");
                    self.set_state(ConnectionState::Closing);
                    break;
                }

                result = self.connect_once() => result,
            };

            match result {
                Ok(connected) => {
                    policy.reset();
                    self.set_state(ConnectionState::Connected);

                    log::info!("Gateway connected");
                    handler.on_connected();

                    let reason = connected
                        .run(handler.as_ref(), &self.state.state, &mut shutdown)
                        .await;

                    self.set_state(ConnectionState::Disconnected);
                    handler.on_disconnected();

                    match reason {
                        Disconnected::ByOwner => break,
                        Disconnected::Lost(err) => {
                            log::warn!("Gateway connection broken: {}", err);
                            handler.on_error(&err);
                        }
                    }
                }
                Err(err) => {
                    log::warn!("Connect gateway failed: {}", err);
                    self.set_state(ConnectionState::Disconnected);
                    handler.on_error(&err);
                }
            }

            let delay = match policy.next_delay() {
                Some(delay) => delay,
                None => {
                    let err = ClientError::ReconnectExhausted {
                        attempts: policy.attempts(),
                    };
                    log::error!("{}, stop", err);
                    handler.on_error(&err);
                    break;
                }
            };

            log::info!("Reconnect attempt {} in {:?}", policy.attempts(), delay);

            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    log::debug!("Shutdown when waiting reconnect, stop");
                    self.set_state(ConnectionState::Closing);
                    break;
                }

                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.set_state(ConnectionState::Disconnected);
        log::debug!("Client driver stopped");
    }
}
