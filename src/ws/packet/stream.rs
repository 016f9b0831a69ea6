use std::task::Poll;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use snafu::prelude::*;
use tokio_tungstenite::tungstenite as websocket;

use super::{Packet, ParsePacketError};
use crate::ws::client::WebsocketClient;

/// Error when read/write packet stream/sink
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum PacketStreamError {
    /// underlying websocket stream broken
    #[snafu(display("underlying websocket stream broken: {source}"))]
    Websocket {
        /// source error
        source: websocket::Error,
    },

    /// peer sent a close frame
    #[snafu(display("peer closed the connection: {reason}"))]
    PeerClosed {
        /// close reason given by peer
        reason: String,
    },

    /// received a frame that carries no packet
    #[snafu(display("received a non-data frame"))]
    NotDataFrame,

    /// parse frame data failed
    #[snafu(display("parse frame to packet failed: {source}"))]
    ParsePacketFailed {
        /// source error
        source: ParsePacketError,
    },

    /// encode outgoing packet failed
    #[snafu(display("encode {type_name} packet failed: {source}"))]
    EncodePacketFailed {
        /// packet type name
        type_name: String,
        /// source error
        source: serde_json::Error,
    },
}

impl PacketStreamError {
    /// Check if this error will make the stream/sink stop
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::Websocket { .. } | Self::PeerClosed { .. } => true,
            Self::NotDataFrame | Self::ParsePacketFailed { .. } => false,
            Self::EncodePacketFailed { .. } => false,
        }
    }
}

/// WuKongIM packet stream/sink over a websocket connection
#[derive(Debug)]
pub struct PacketStreamSink<W = WebsocketClient> {
    ws: W,
}

impl<W> PacketStreamSink<W> {
    /// Construct a new stream with underlying websocket connection.
    pub fn new(ws: W) -> Self {
        Self { ws }
    }

    /// get back the underlying websocket connection
    pub fn into_inner(self) -> W {
        self.ws
    }
}

impl<W> Stream for PacketStreamSink<W>
where
    W: Stream<Item = Result<websocket::Message, websocket::Error>> + Unpin,
{
    type Item = Result<Packet, PacketStreamError>;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        let frame = match self.ws.poll_next_unpin(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(None) => return Poll::Ready(None),
            Poll::Ready(Some(Err(e))) => {
                return Poll::Ready(Some(Err(PacketStreamError::Websocket { source: e })))
            }
            Poll::Ready(Some(Ok(frame))) => frame,
        };

        let data = match frame {
            websocket::Message::Text(text) => text.into_bytes(),
            websocket::Message::Binary(data) => data,
            websocket::Message::Close(frame) => {
                let reason = frame
                    .map(|f| format!("{} {}", f.code, f.reason))
                    .unwrap_or_default();
                return Poll::Ready(Some(Err(PacketStreamError::PeerClosed { reason })));
            }
            _ => return Poll::Ready(Some(Err(PacketStreamError::NotDataFrame))),
        };

        let result = Packet::decode(&data).map_err(|e| {
            log::trace!(
                "Parse failed frame data: {}",
                std::str::from_utf8(&data).unwrap_or("<not-utf8-binary>")
            );
            PacketStreamError::ParsePacketFailed { source: e }
        });

        Poll::Ready(Some(result))
    }
}

impl<W> Sink<Packet> for PacketStreamSink<W>
where
    W: Sink<websocket::Message, Error = websocket::Error> + Unpin,
{
    type Error = PacketStreamError;

    fn poll_ready(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_ready_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn start_send(mut self: std::pin::Pin<&mut Self>, item: Packet) -> Result<(), Self::Error> {
        let text = item.encode().with_context(|_| error::EncodePacketFailed {
            type_name: item.type_name(),
        })?;

        self.ws
            .start_send_unpin(websocket::Message::Text(text))
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_flush_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }

    fn poll_close(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> Poll<Result<(), Self::Error>> {
        self.ws
            .poll_close_unpin(cx)
            .map_err(|e| Self::Error::Websocket { source: e })
    }
}
