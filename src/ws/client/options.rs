use std::{
    fmt::Display,
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use snafu::prelude::*;

use crate::ws::packet::{Connect, PROTOCOL_VERSION};

/// Default interval between two ping packets
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(30);
/// Default time to wait ConnAck after Connect sent
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
/// Default first reconnect delay
pub const DEFAULT_RECONNECT_BASE_DELAY: Duration = Duration::from_secs(1);
/// Default reconnect delay ceiling
pub const DEFAULT_RECONNECT_MAX_DELAY: Duration = Duration::from_secs(30);
/// Default reconnect attempts before giving up
pub const DEFAULT_RECONNECT_MAX_ATTEMPTS: u32 = 20;

/// Parse string as gateway url error
#[derive(Debug, Snafu)]
#[snafu(
    visibility(pub(crate)),
    module(parse_gateway_url_error_variant),
    context(suffix(false))
)]
pub enum ParseGatewayURLError {
    #[snafu(display("{s} is an invalid url: {source}"))]
    /// the str is not a valid url
    InvalidURL {
        /// string be parsed
        s: String,
        /// source error
        source: url::ParseError,
    },

    /// the parsed url schema is not websocket
    #[snafu(display("the url {s} has invalid schema {schema}, only ws or wss is ok"))]
    InvalidSchema {
        /// the url
        s: String,
        /// invalid schema
        schema: String,
    },

    /// the parsed url has no host
    #[snafu(display("the gateway url {s} has no host"))]
    NoHost {
        /// the url
        s: String,
    },
}

/// A validated websocket gateway address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayUrl(url::Url);

impl GatewayUrl {
    /// the url
    pub fn url(&self) -> &url::Url {
        &self.0
    }
}

impl FromStr for GatewayUrl {
    type Err = ParseGatewayURLError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let url = url::Url::parse(s)
            .with_context(|_| parse_gateway_url_error_variant::InvalidURL { s })?;

        ensure!(
            url.scheme() == "wss" || url.scheme() == "ws",
            parse_gateway_url_error_variant::InvalidSchema {
                s,
                schema: url.scheme(),
            }
        );

        ensure!(
            url.host().is_some(),
            parse_gateway_url_error_variant::NoHost { s }
        );

        Ok(Self(url))
    }
}

impl Display for GatewayUrl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Reconnect backoff settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    /// delay before first reconnect attempt
    pub base_delay: Duration,
    /// delay ceiling
    pub max_delay: Duration,
    /// attempts before giving up
    pub max_attempts: u32,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay: DEFAULT_RECONNECT_BASE_DELAY,
            max_delay: DEFAULT_RECONNECT_MAX_DELAY,
            max_attempts: DEFAULT_RECONNECT_MAX_ATTEMPTS,
        }
    }
}

impl ReconnectConfig {
    /// `min(base_delay * 2^n, max_delay)` for 0-indexed attempt `n`
    pub fn delay_for_attempt(&self, n: u32) -> Duration {
        let factor = 2u32.checked_pow(n).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Websocket client connect options
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// gateway address
    pub gateway: GatewayUrl,
    /// login uid
    pub uid: String,
    /// login token
    pub token: String,
    /// ping interval when connected
    pub ping_interval: Duration,
    /// max wait time for ConnAck
    pub handshake_timeout: Duration,
    /// reconnect backoff
    pub reconnect: ReconnectConfig,
}

impl ConnectOptions {
    /// Options with default timing
    pub fn new<U: Into<String>, T: Into<String>>(gateway: GatewayUrl, uid: U, token: T) -> Self {
        Self {
            gateway,
            uid: uid.into(),
            token: token.into(),
            ping_interval: DEFAULT_PING_INTERVAL,
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            reconnect: ReconnectConfig::default(),
        }
    }

    pub(crate) fn connect_packet(&self) -> Connect {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();

        Connect {
            version: PROTOCOL_VERSION,
            client_key: format!("bot_{}", now.as_millis()),
            client_timestamp: now.as_secs().to_string(),
            uid: self.uid.clone(),
            token: self.token.clone(),
        }
    }
}
