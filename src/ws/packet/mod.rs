//! WuKongIM json packet types.

mod stream;
mod types;

pub use stream::{PacketStreamError, PacketStreamSink};
pub use types::{ConnAck, Connect, Receive, ReceiveAck};

use enum_as_inner::EnumAsInner;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

/// Protocol version sent in connect packet
pub const PROTOCOL_VERSION: u8 = 1;

/// Error when parse frame data as packet
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(super)), module(error), context(suffix(false)))]
pub enum ParsePacketError {
    /// data is invalid json
    #[snafu(display("parse json failed: {source}"))]
    ParseJSONFailed {
        /// source error
        source: serde_json::Error,
    },

    /// data json is not an object
    #[snafu(display("parsed packet is not object: {json}"))]
    PacketNotObject {
        /// json string
        json: String,
    },

    /// data json has no type field
    #[snafu(display("packet has no type field: {json}"))]
    NoPacketType {
        /// json string
        json: String,
    },

    /// data json type field is not number type
    #[snafu(display("packet has non-number type field: {json}"))]
    PacketTypeNotNumber {
        /// json string
        json: String,
    },

    /// data json has an unknown type
    #[snafu(display("packet has unknown type {t}"))]
    UnknownPacketType {
        /// type number
        t: i64,
    },

    /// data json is not valid typed packet
    #[snafu(display("parse to {type_name} packet failed: {source}"))]
    ParseJSONToTypedPacketFailed {
        /// type name
        type_name: String,
        /// source error
        source: serde_json::Error,
    },
}

static PACKET_INTERNAL_TYPE_TAG: &str = "__internal_type_tag__";

/// WuKongIM websocket packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, EnumAsInner)]
// serde does not support number tag for now, see: https://github.com/serde-rs/serde/issues/745
#[serde(tag = "__internal_type_tag__")]
pub enum Packet {
    /// Connect, client -> server
    Connect(Connect),
    /// ConnAck, server -> client
    ConnAck(ConnAck),
    /// Ping, client -> server
    Ping,
    /// Pong, server -> client
    Pong,
    /// Receive, server -> client
    Receive(Receive),
    /// ReceiveAck, client -> server
    ReceiveAck(ReceiveAck),
}

impl Packet {
    /// Decode frame data to a packet
    pub fn decode(buff: &[u8]) -> Result<Self, ParsePacketError> {
        let mut value: serde_json::Value =
            serde_json::from_slice(buff).context(error::ParseJSONFailed)?;

        let obj = value
            .as_object_mut()
            .with_context(|| error::PacketNotObject {
                json: String::from_utf8_lossy(buff),
            })?;

        let t = obj
            .get("type")
            .with_context(|| error::NoPacketType {
                json: String::from_utf8_lossy(buff),
            })?
            .as_i64()
            .with_context(|| error::PacketTypeNotNumber {
                json: String::from_utf8_lossy(buff),
            })?;

        let type_name =
            Self::type_number_to_type_name(t).with_context(|| error::UnknownPacketType { t })?;

        obj.insert(
            PACKET_INTERNAL_TYPE_TAG.to_string(),
            serde_json::Value::String(type_name.to_string()),
        );

        serde_json::from_value(value).with_context(|_| error::ParseJSONToTypedPacketFailed {
            type_name: type_name.to_string(),
        })
    }

    /// Encode to json text
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let mut value = serde_json::to_value(self)?;
        if let Some(obj) = value.as_object_mut() {
            obj.remove(PACKET_INTERNAL_TYPE_TAG);
            obj.insert(
                "type".to_string(),
                serde_json::Value::Number(self.type_number().into()),
            );
        }
        serde_json::to_string(&value)
    }

    fn type_number_to_type_name(t: i64) -> Option<&'static str> {
        match t {
            1 => Some("Connect"),
            2 => Some("ConnAck"),
            3 => Some("Ping"),
            4 => Some("Pong"),
            5 => Some("Receive"),
            6 => Some("ReceiveAck"),
            _ => None,
        }
    }

    /// get type number
    pub fn type_number(&self) -> i64 {
        match self {
            Self::Connect(_) => 1,
            Self::ConnAck(_) => 2,
            Self::Ping => 3,
            Self::Pong => 4,
            Self::Receive(_) => 5,
            Self::ReceiveAck(_) => 6,
        }
    }

    /// get type name
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Connect(_) => "Connect",
            Self::ConnAck(_) => "ConnAck",
            Self::Ping => "Ping",
            Self::Pong => "Pong",
            Self::Receive(_) => "Receive",
            Self::ReceiveAck(_) => "ReceiveAck",
        }
    }
}

#[cfg(test)]
mod test {
    mod decode {
        use super::super::*;
        use crate::ws::message::MessageId;
        use serde_json::json;

        fn bytes(v: serde_json::Value) -> Vec<u8> {
            serde_json::to_vec(&v).unwrap()
        }

        #[test]
        fn test_packet_decode_connack() {
            let packet =
                Packet::decode(&bytes(json!({"type": 2, "time_diff": 3, "reason_code": 0})))
                    .unwrap();

            let ack = packet.into_conn_ack().unwrap();
            assert_eq!(ack.reason_code, 0);
            assert_eq!(ack.time_diff, 3);
        }

        #[test]
        fn test_packet_decode_pong() {
            let packet = Packet::decode(&bytes(json!({"type": 4}))).unwrap();
            assert_eq!(packet, Packet::Pong);
        }

        #[test]
        fn test_packet_decode_receive() {
            let packet = Packet::decode(&bytes(json!({
                "type": 5,
                "setting": 0,
                "msg_key": "k",
                "from_uid": "u1",
                "channel_id": "g1",
                "channel_type": 2,
                "message_id": 42,
                "message_seq": 1,
                "timestamp": 1700000000,
                "payload": "eyJ0eXBlIjoxfQ==",
            })))
            .unwrap();

            let receive = packet.into_receive().unwrap();
            assert_eq!(receive.message_id, MessageId::Number(42));
            assert_eq!(receive.message_seq, 1);
            assert_eq!(receive.channel_id.as_deref(), Some("g1"));
            assert_eq!(receive.channel_type, Some(2));
        }

        #[test]
        fn test_packet_decode_receive_minimal() {
            let packet = Packet::decode(&bytes(json!({
                "type": 5,
                "from_uid": "u1",
                "message_id": "m-1",
                "message_seq": 9,
                "payload": "",
            })))
            .unwrap();

            let receive = packet.into_receive().unwrap();
            assert_eq!(receive.message_id, MessageId::Text("m-1".to_string()));
            assert_eq!(receive.channel_id, None);
            assert_eq!(receive.channel_type, None);
        }

        #[test]
        fn test_packet_decode_receive_null_or_missing_fields() {
            for frame in [
                json!({"type": 5, "message_id": 42, "message_seq": 1, "from_uid": "u1", "payload": null}),
                json!({"type": 5, "message_id": 42, "message_seq": 1, "from_uid": "u1"}),
                json!({"type": 5, "message_id": 42, "message_seq": 1, "payload": "eyJ0eXBlIjoxfQ=="}),
                json!({"type": 5, "message_id": 42, "message_seq": 1, "from_uid": null, "msg_key": null, "timestamp": null}),
            ] {
                let receive = Packet::decode(&bytes(frame.clone()))
                    .unwrap_or_else(|e| panic!("{} should decode: {}", frame, e))
                    .into_receive()
                    .unwrap();
                assert_eq!(receive.message_id, MessageId::Number(42));
                assert_eq!(receive.message_seq, 1);
            }

            assert!(matches!(
                Packet::decode(&bytes(json!({"type": 5, "message_seq": 1, "payload": ""}))),
                Err(ParsePacketError::ParseJSONToTypedPacketFailed { .. })
            ));
        }

        #[test]
        fn test_packet_decode_errors() {
            assert!(matches!(
                Packet::decode(b"not json"),
                Err(ParsePacketError::ParseJSONFailed { .. })
            ));
            assert!(matches!(
                Packet::decode(b"[1]"),
                Err(ParsePacketError::PacketNotObject { .. })
            ));
            assert!(matches!(
                Packet::decode(&bytes(json!({"reason_code": 0}))),
                Err(ParsePacketError::NoPacketType { .. })
            ));
            assert!(matches!(
                Packet::decode(&bytes(json!({"type": "2"}))),
                Err(ParsePacketError::PacketTypeNotNumber { .. })
            ));
            assert!(matches!(
                Packet::decode(&bytes(json!({"type": 99}))),
                Err(ParsePacketError::UnknownPacketType { t: 99 })
            ));
            assert!(matches!(
                Packet::decode(&bytes(json!({"type": 2}))),
                Err(ParsePacketError::ParseJSONToTypedPacketFailed { .. })
            ));
        }
    }

    mod encode {
        use super::super::*;
        use crate::ws::message::MessageId;
        use serde_json::json;

        fn encoded(packet: &Packet) -> serde_json::Value {
            serde_json::from_str(&packet.encode().unwrap()).unwrap()
        }

        #[test]
        fn test_packet_encode_ping() {
            assert_eq!(encoded(&Packet::Ping), json!({"type": 3}));
        }

        #[test]
        fn test_packet_encode_connect() {
            let packet = Packet::Connect(Connect {
                version: PROTOCOL_VERSION,
                client_key: "bot_1".to_string(),
                client_timestamp: "1700000000".to_string(),
                uid: "robot".to_string(),
                token: "secret".to_string(),
            });

            assert_eq!(
                encoded(&packet),
                json!({
                    "type": 1,
                    "version": 1,
                    "client_key": "bot_1",
                    "client_timestamp": "1700000000",
                    "uid": "robot",
                    "token": "secret",
                })
            );
        }

        #[test]
        fn test_packet_encode_receive_ack() {
            let packet = Packet::ReceiveAck(ReceiveAck {
                message_id: MessageId::Number(42),
                message_seq: 1,
            });

            assert_eq!(
                encoded(&packet),
                json!({"type": 6, "message_id": 42, "message_seq": 1})
            );
        }
    }
}
