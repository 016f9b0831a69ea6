//! WuKongIM websocket protocol client implement

mod client;
pub mod message;
pub mod packet;

pub use client::{
    Client, ClientError, ConnectGatewayError, ConnectOptions, ConnectionState, Connector,
    GatewayUrl, HandshakeError, Handler, ParseGatewayURLError, ReconnectConfig, Transport,
    WebsocketConnector, DEFAULT_HANDSHAKE_TIMEOUT, DEFAULT_PING_INTERVAL,
    DEFAULT_RECONNECT_BASE_DELAY, DEFAULT_RECONNECT_MAX_ATTEMPTS, DEFAULT_RECONNECT_MAX_DELAY,
};
pub use message::{ChannelType, DecodePayloadError, MessageId, NormalizedMessage, Payload};
pub use packet::{Packet, PacketStreamError, ParsePacketError};
