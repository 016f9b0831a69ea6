use futures_util::{SinkExt, StreamExt};
use snafu::prelude::*;
use tokio::time::Instant;

use super::{connected::ClientStateConnected, ClientInner, CLOSE_TIMEOUT};
use crate::ws::{
    client::{ConnectOptions, Transport},
    packet::{ConnAck, Packet, PacketStreamError},
};

/// Error when exchange Connect/ConnAck packet
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum HandshakeError {
    /// send connect packet failed
    #[snafu(display("send connect packet failed: {source}"))]
    SendConnect {
        /// source error
        source: PacketStreamError,
    },

    /// No ConnAck received in time
    #[snafu(display("timeout when wait server connack packet"))]
    Timeout,

    /// underlying packet stream broken
    #[snafu(display("underlying packet stream broken: {source}"))]
    PacketStream {
        /// source error
        source: PacketStreamError,
    },

    /// connection closed before ConnAck
    #[snafu(display("connection closed before connack"))]
    Closed,

    /// server rejected the connection
    #[snafu(display("connack reason code {reason_code} is not zero"))]
    Rejected {
        /// reason code
        reason_code: i64,
    },
}

#[derive(Debug)]
pub(crate) struct ClientStateHandshake<T> {
    pub transport: T,
}

impl<T: Transport> ClientInner<ClientStateHandshake<T>> {
    async fn real_handshake(
        transport: &mut T,
        options: &ConnectOptions,
    ) -> Result<ConnAck, HandshakeError> {
        let connect = options.connect_packet();

        log::debug!("Send connect packet with key {}", connect.client_key);

        transport
            .send(Packet::Connect(connect))
            .await
            .context(error::SendConnect)?;

        let deadline = Instant::now() + options.handshake_timeout;

        log::debug!("Waiting connack packet, timeout tick: {:?}", deadline);

        loop {
            let result = tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    log::warn!("Wait connack timeout");
                    return error::Timeout.fail();
                }
                result = transport.next() => result,
            };

            match result {
                None => return error::Closed.fail(),
                Some(Err(e)) if !e.is_fatal() => {
                    log::warn!("Packet stream error happened but ignored: {}", e);
                }
                Some(Err(e)) => return Err(e).context(error::PacketStream),
                Some(Ok(Packet::ConnAck(ack))) => return Ok(ack),
                Some(Ok(packet)) => {
                    log::debug!("Ignore {} packet before connack", packet.type_name());
                }
            }
        }
    }

    pub async fn handshake(
        mut self,
        options: &ConnectOptions,
    ) -> Result<ClientInner<ClientStateConnected<T>>, HandshakeError> {
        let result = Self::real_handshake(&mut self.state.transport, options)
            .await
            .and_then(|ack| {
                log::debug!("ConnAck packet data: {:?}", ack);
                ensure!(
                    ack.reason_code == 0,
                    error::Rejected {
                        reason_code: ack.reason_code
                    }
                );
                Ok(ack)
            });

        if let Err(err) = result {
            log::debug!("Handshake failed, close transport");
            let _ = tokio::time::timeout(CLOSE_TIMEOUT, self.state.transport.close()).await;
            return Err(err);
        }

        log::debug!("Move to connected state");

        Ok(ClientInner {
            state: ClientStateConnected::new(self.state.transport, options),
        })
    }
}
