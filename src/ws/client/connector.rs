use futures_util::{Sink, Stream};
use snafu::prelude::*;
use tokio_tungstenite as websocket;

use super::GatewayUrl;
use crate::ws::packet::{Packet, PacketStreamError, PacketStreamSink};

/// Error when connect to websocket gateway
#[derive(Debug, Snafu)]
#[snafu(
    display("connect ws gateway {url} failed: {source}"),
    visibility(pub(crate)),
    module(error),
    context(suffix(false))
)]
pub struct ConnectGatewayError {
    /// connected url
    pub url: String,
    /// source error
    pub source: websocket::tungstenite::Error,
}

/// A bidirectional packet channel to the gateway
pub trait Transport:
    Stream<Item = Result<Packet, PacketStreamError>>
    + Sink<Packet, Error = PacketStreamError>
    + Send
    + Unpin
    + 'static
{
}

impl<T> Transport for T where
    T: Stream<Item = Result<Packet, PacketStreamError>>
        + Sink<Packet, Error = PacketStreamError>
        + Send
        + Unpin
        + 'static
{
}

/// Opens transports to the gateway
#[async_trait::async_trait]
pub trait Connector: Send + Sync + 'static {
    /// opened transport type
    type Transport: Transport;

    /// open one transport
    async fn connect(&self, gateway: &GatewayUrl) -> Result<Self::Transport, ConnectGatewayError>;
}

/// Connector over a real websocket connection
#[derive(Debug, Default, Clone, Copy)]
pub struct WebsocketConnector;

#[async_trait::async_trait]
impl Connector for WebsocketConnector {
    type Transport = PacketStreamSink;

    async fn connect(&self, gateway: &GatewayUrl) -> Result<Self::Transport, ConnectGatewayError> {
        let u = gateway.url();

        log::debug!("Connecting gateway: {}", u);

        let (ws, _) = websocket::connect_async(u)
            .await
            .with_context(|_| error::ConnectGateway { url: u.as_str() })?;

        Ok(PacketStreamSink::new(ws))
    }
}
