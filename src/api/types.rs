//! DMWork bot HTTP API request and response types

use serde::{Deserialize, Serialize};

use crate::ws::message::{ChannelType, MessageId, Payload};

/// request body of /v1/bot/register
#[derive(Debug, Clone, Default, Serialize)]
pub struct RegisterRequest {
    /// display name of bot
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// credentials returned by /v1/bot/register
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterData {
    /// bot uid in IM system
    pub robot_id: String,
    /// token for ws gateway connect
    pub im_token: String,
    /// ws gateway url
    pub ws_url: String,
    /// api base url suggested by server
    #[serde(default)]
    pub api_url: String,
    /// uid of bot owner
    pub owner_uid: String,
    /// DM channel with bot owner
    #[serde(default)]
    pub owner_channel_id: String,
}

/// request body of /v1/bot/sendMessage
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageRequest {
    /// target channel
    pub channel_id: String,
    /// target channel kind
    pub channel_type: ChannelType,
    /// set when this message is a progressive update of a stream
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_no: Option<String>,
    /// message payload
    pub payload: Payload,
}

/// result of /v1/bot/sendMessage
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SendMessageResult {
    /// id of sent message, missing for some stream updates
    #[serde(default)]
    pub message_id: Option<MessageId>,
    /// seq of sent message
    #[serde(default)]
    pub message_seq: u64,
}

/// request body of /v1/bot/typing
#[derive(Debug, Clone, Serialize)]
pub struct TypingRequest {
    /// target channel
    pub channel_id: String,
    /// target channel kind
    pub channel_type: ChannelType,
}

/// request body of /v1/bot/readReceipt
#[derive(Debug, Clone, Serialize)]
pub struct ReadReceiptRequest {
    /// target channel
    pub channel_id: String,
    /// target channel kind
    pub channel_type: ChannelType,
    /// read messages, empty for whole channel
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub message_ids: Vec<String>,
}

/// request body of /v1/bot/stream/start
#[derive(Debug, Clone, Serialize)]
pub struct StreamStartRequest {
    /// target channel
    pub channel_id: String,
    /// target channel kind
    pub channel_type: ChannelType,
    /// base64 of initial payload json
    pub payload: String,
}

/// result of /v1/bot/stream/start
#[derive(Debug, Clone, Deserialize)]
pub struct StreamStartData {
    /// server issued stream id
    pub stream_no: String,
}

/// request body of /v1/bot/stream/end
#[derive(Debug, Clone, Serialize)]
pub struct StreamEndRequest {
    /// stream to finalize
    pub stream_no: String,
    /// target channel
    pub channel_id: String,
    /// target channel kind
    pub channel_type: ChannelType,
}
