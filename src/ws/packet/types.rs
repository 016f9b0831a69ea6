use serde::{Deserialize, Deserializer, Serialize};

use crate::ws::message::MessageId;

/// Connect packet data, client -> server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connect {
    /// protocol version
    pub version: u8,
    /// client generated session key
    pub client_key: String,
    /// client unix timestamp in seconds, as string
    pub client_timestamp: String,
    /// login uid
    pub uid: String,
    /// login token
    pub token: String,
}

/// ConnAck packet data, server -> client
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnAck {
    /// server time minus client time
    #[serde(default)]
    pub time_diff: i64,
    /// zero for success, other value only meaningful for diagnostics
    pub reason_code: i64,
}

/// Receive packet data, server -> client
///
/// Only `message_id` and `message_seq` are required, they are all an ack needs.
/// Other fields fall back to empty when absent or null, the payload check is
/// left to [`NormalizedMessage`](crate::ws::NormalizedMessage).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receive {
    /// message setting flags
    #[serde(default, deserialize_with = "null_as_default")]
    pub setting: u8,
    /// message key
    #[serde(default, deserialize_with = "null_as_default")]
    pub msg_key: String,
    /// sender uid
    #[serde(default, deserialize_with = "null_as_default")]
    pub from_uid: String,
    /// channel id, absent for direct message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// channel type, 1 for direct and 2 for group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<u8>,
    /// message id
    pub message_id: MessageId,
    /// message sequence number
    pub message_seq: u64,
    /// delivery timestamp in seconds
    #[serde(default, deserialize_with = "null_as_default")]
    pub timestamp: i64,
    /// base64 encoded json payload
    #[serde(default, deserialize_with = "null_as_default")]
    pub payload: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl Receive {
    /// the ack for this packet
    pub fn ack(&self) -> ReceiveAck {
        ReceiveAck {
            message_id: self.message_id.clone(),
            message_seq: self.message_seq,
        }
    }
}

/// ReceiveAck packet data, client -> server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiveAck {
    /// message id of acked receive packet
    pub message_id: MessageId,
    /// message sequence number of acked receive packet
    pub message_seq: u64,
}
