//! Messages delivered by the gateway, after envelope decoding.

use std::fmt::Display;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use super::packet::Receive;

/// Conversation kind of a channel
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ChannelType {
    /// one-to-one conversation, wire value 1
    Direct,
    /// group conversation, wire value 2
    Group,
}

impl TryFrom<u8> for ChannelType {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Direct),
            2 => Ok(Self::Group),
            v => Err(format!("unknown channel type {}", v)),
        }
    }
}

impl From<ChannelType> for u8 {
    fn from(t: ChannelType) -> Self {
        match t {
            ChannelType::Direct => 1,
            ChannelType::Group => 2,
        }
    }
}

/// Server assigned message id, the gateway sends both numbers and strings
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageId {
    /// numeric id
    Number(i64),
    /// string id
    Text(String),
}

impl Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => n.fmt(f),
            Self::Text(s) => s.fmt(f),
        }
    }
}

impl From<i64> for MessageId {
    fn from(n: i64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

/// Content type tag for text payload
pub const PAYLOAD_TYPE_TEXT: i64 = 1;

/// Message payload: a content type tag and type dependent fields kept verbatim
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// 1: text, 2: image, 3: gif, 4: voice, 5: video, 6: location, 7: card, 8: file
    #[serde(rename = "type", default)]
    pub r#type: i64,

    /// other fields, `content` for text and `url` for media
    #[serde(flatten)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Error when decode the payload of a receive packet
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(decode_error), context(suffix(false)))]
pub enum DecodePayloadError {
    /// receive packet carries no payload
    #[snafu(display("payload is empty"))]
    Empty,

    /// payload string is not base64
    #[snafu(display("payload is not valid base64: {source}"))]
    Base64 {
        /// source error
        source: base64::DecodeError,
    },

    /// decoded payload is not a json object
    #[snafu(display("payload is not a json object: {source}"))]
    Json {
        /// source error
        source: serde_json::Error,
    },
}

impl Payload {
    /// Create a text payload
    pub fn text<S: Into<String>>(content: S) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert(
            "content".to_string(),
            serde_json::Value::String(content.into()),
        );
        Self {
            r#type: PAYLOAD_TYPE_TEXT,
            fields,
        }
    }

    /// Decode from base64 encoded json
    pub fn decode(raw: &str) -> Result<Self, DecodePayloadError> {
        let raw = raw.trim();
        ensure!(!raw.is_empty(), decode_error::Empty);

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(raw)
            .context(decode_error::Base64)?;
        serde_json::from_slice(&bytes).context(decode_error::Json)
    }

    /// Encode to base64 of json
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        let json = serde_json::to_vec(self)?;
        Ok(base64::engine::general_purpose::STANDARD.encode(json))
    }

    /// `content` field if it is a string
    pub fn content(&self) -> Option<&str> {
        self.fields.get("content").and_then(|v| v.as_str())
    }

    /// `url` field if it is a string
    pub fn url(&self) -> Option<&str> {
        self.fields.get("url").and_then(|v| v.as_str())
    }

    /// Best-effort readable body: content, then url
    pub fn body(&self) -> Option<&str> {
        self.content().or_else(|| self.url())
    }
}

/// A received message with channel resolved and payload decoded
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedMessage {
    /// message id
    pub message_id: MessageId,
    /// sequence number in channel
    pub message_seq: u64,
    /// sender uid
    pub from_uid: String,
    /// group id for group messages, sender uid for direct messages
    pub channel_id: String,
    /// resolved channel kind
    pub channel_type: ChannelType,
    /// delivery time, seconds
    pub timestamp: i64,
    /// decoded payload
    pub payload: Payload,
}

impl NormalizedMessage {
    /// Build from a receive packet, fails when the payload can't be decoded.
    ///
    /// A message is only a group message when it carries a non-empty channel id
    /// and the group channel type, everything else is a direct message from
    /// the sender.
    pub fn from_receive(packet: &Receive) -> Result<Self, DecodePayloadError> {
        let payload = Payload::decode(&packet.payload)?;

        let group_type = packet
            .channel_type
            .and_then(|t| ChannelType::try_from(t).ok())
            == Some(ChannelType::Group);

        let group = match packet.channel_id.as_deref() {
            Some(id) if !id.is_empty() && group_type => Some(id),
            _ => None,
        };

        let (channel_id, channel_type) = match group {
            Some(id) => (id.to_string(), ChannelType::Group),
            None => (packet.from_uid.clone(), ChannelType::Direct),
        };

        Ok(Self {
            message_id: packet.message_id.clone(),
            message_seq: packet.message_seq,
            from_uid: packet.from_uid.clone(),
            channel_id,
            channel_type,
            timestamp: packet.timestamp,
            payload,
        })
    }

    /// true if it's a group message
    pub fn is_group(&self) -> bool {
        self.channel_type == ChannelType::Group
    }
}
