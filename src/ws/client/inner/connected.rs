use futures_util::{SinkExt, StreamExt};
use tokio::sync::{oneshot, watch};

use super::{dispatch::dispatch, heartbeat::Heartbeat, ClientError, ClientInner, CLOSE_TIMEOUT};
use crate::ws::{
    client::{ConnectOptions, ConnectionState, Handler, Transport},
    packet::Packet,
};

/// Why a connected session ended
#[derive(Debug)]
pub(crate) enum Disconnected {
    /// owner called disconnect, never reconnect
    ByOwner,
    /// transport failed or closed
    Lost(ClientError),
}

#[derive(Debug)]
pub(crate) struct ClientStateConnected<T> {
    pub transport: T,
    pub heartbeat: Heartbeat,
}

impl<T> ClientStateConnected<T> {
    pub fn new(transport: T, options: &ConnectOptions) -> Self {
        Self {
            transport,
            heartbeat: Heartbeat::new(options.ping_interval),
        }
    }
}

impl<T: Transport> ClientInner<ClientStateConnected<T>> {
    /// Serve the connection until it breaks or the owner shutdown.
    pub async fn run(
        mut self,
        handler: &dyn Handler,
        state: &watch::Sender<ConnectionState>,
        shutdown: &mut oneshot::Receiver<()>,
    ) -> Disconnected {
        log::debug!("Connected loop start");

        let ClientStateConnected {
            mut transport,
            mut heartbeat,
        } = self.state;

        heartbeat.start();

        let reason = loop {
            tokio::select! {
                biased;

                _ = &mut *shutdown => {
                    log::debug!("Move to closing state");
                    state.send_replace(ConnectionState::Closing);

                    heartbeat.stop();

                    log::debug!("Closing transport");
                    match tokio::time::timeout(CLOSE_TIMEOUT, transport.close()).await {
                        Ok(Ok(())) => log::debug!("Transport closed"),
                        Ok(Err(err)) => log::debug!("Close transport failed: {}", err),
                        Err(_) => log::debug!("Close transport timeout, drop it"),
                    }

                    break Disconnected::ByOwner;
                }

                _ = heartbeat.tick() => {
                    log::trace!("Send ping packet");
                    match transport.send(Packet::Ping).await {
                        Ok(()) => {}
                        Err(err) if !err.is_fatal() => {
                            log::warn!("Send ping failed but ignored: {}", err);
                        }
                        Err(err) => {
                            log::debug!("Find packet stream broken when send ping: {}", err);
                            break Disconnected::Lost(ClientError::ConnectionLost { source: err });
                        }
                    }
                }

                result = transport.next() => {
                    match result {
                        None => {
                            log::debug!("Packet stream ended");
                            break Disconnected::Lost(ClientError::ConnectionClosed);
                        }
                        Some(Err(err)) if !err.is_fatal() => {
                            log::warn!("Packet stream error happened but ignored: {}", err);
                        }
                        Some(Err(err)) => {
                            log::warn!("Find packet stream broken when receive packet: {}", err);
                            break Disconnected::Lost(ClientError::ConnectionLost { source: err });
                        }
                        Some(Ok(Packet::Receive(receive))) => {
                            if let Err(err) = dispatch(&mut transport, handler, receive).await {
                                if err.is_fatal() {
                                    break Disconnected::Lost(ClientError::ConnectionLost { source: err });
                                }
                            }
                        }
                        Some(Ok(Packet::Pong)) => {
                            log::trace!("Received pong");
                        }
                        Some(Ok(packet)) => {
                            log::debug!("Ignore unexpected {} packet", packet.type_name());
                        }
                    }
                }
            }
        };

        heartbeat.stop();

        log::debug!("Connected loop stop");

        reason
    }
}
