//! Bot configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};
use snafu::prelude::*;

use crate::ws::{GatewayUrl, ParseGatewayURLError};

/// default server api url
pub const DEFAULT_API_URL: &str = "http://localhost:8090";
/// default REST heartbeat interval
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;
/// minimal REST heartbeat interval
pub const MIN_HEARTBEAT_INTERVAL_MS: u64 = 5_000;
/// default greeting sent to owner
pub const DEFAULT_GREETING: &str = "I'm online and ready!";

/// env var prefix used by [`BotConfig::from_env`]
pub const ENV_PREFIX: &str = "DMWORK_";

/// Config load and validate error
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum ConfigError {
    /// config json is invalid
    #[snafu(display("parse config json failed: {source}"))]
    ParseJSON {
        /// source error
        source: serde_json::Error,
    },

    /// env var has invalid value
    #[snafu(display("env var {name} has invalid value {value:?}"))]
    InvalidEnvValue {
        /// var name
        name: String,
        /// var value
        value: String,
    },

    /// bot token is not set or blank
    #[snafu(display("bot token is not configured"))]
    MissingBotToken,

    /// an interval is lower than its minimum
    #[snafu(display("{name} is {value}ms, minimal value is {min}ms"))]
    IntervalTooShort {
        /// option name
        name: &'static str,
        /// configured value
        value: u64,
        /// minimal value
        min: u64,
    },

    /// api url is not a valid url
    #[snafu(display("invalid api url {url}: {source}"))]
    InvalidApiUrl {
        /// configured url
        url: String,
        /// source error
        source: url::ParseError,
    },

    /// ws url override is not a valid gateway url
    #[snafu(display("invalid ws url: {source}"))]
    InvalidWsUrl {
        /// source error
        source: ParseGatewayURLError,
    },
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_heartbeat_interval_ms() -> u64 {
    DEFAULT_HEARTBEAT_INTERVAL_MS
}

fn default_enabled() -> bool {
    true
}

fn default_greeting() -> Option<String> {
    Some(DEFAULT_GREETING.to_string())
}

/// Bot runtime config, json keys are camelCase
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotConfig {
    /// bot token issued by server
    #[serde(default)]
    pub bot_token: String,
    /// server api base url
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// ws gateway url, overrides the one returned by register
    #[serde(default)]
    pub ws_url: Option<String>,
    /// REST heartbeat interval in ms
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    /// bot display name, sent on register
    #[serde(default)]
    pub name: Option<String>,
    /// disabled bot does not run
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// message sent to owner when connected, null to disable
    #[serde(default = "default_greeting")]
    pub greeting: Option<String>,
}

impl BotConfig {
    /// Config with bot token and defaults
    pub fn new<S: Into<String>>(bot_token: S) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_url: default_api_url(),
            ws_url: None,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            name: None,
            enabled: true,
            greeting: default_greeting(),
        }
    }

    /// Parse from json text and validate
    pub fn from_json(s: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(s).context(error::ParseJSON)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `DMWORK_*` env vars and validate
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(std::env::vars())
    }

    /// Load from `DMWORK_*` pairs, other keys are ignored.
    ///
    /// An empty `DMWORK_GREETING` disables the greeting.
    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut config = Self::new("");

        for (key, value) in vars {
            let name = match key.as_ref().strip_prefix(ENV_PREFIX) {
                Some(name) => name,
                None => continue,
            };
            let value = value.into();

            match name {
                "BOT_TOKEN" => config.bot_token = value,
                "API_URL" => config.api_url = value,
                "WS_URL" => config.ws_url = Some(value).filter(|s| !s.is_empty()),
                "NAME" => config.name = Some(value).filter(|s| !s.is_empty()),
                "GREETING" => config.greeting = Some(value).filter(|s| !s.is_empty()),
                "HEARTBEAT_INTERVAL_MS" => {
                    config.heartbeat_interval_ms = parse_env(key.as_ref(), &value)?
                }
                "ENABLED" => config.enabled = parse_env(key.as_ref(), &value)?,
                _ => log::debug!("Ignore unknown config env var {}", key.as_ref()),
            }
        }

        config.validate()?;

        Ok(config)
    }

    /// Check required fields and minimal values
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(!self.bot_token.trim().is_empty(), error::MissingBotToken);

        ensure!(
            self.heartbeat_interval_ms >= MIN_HEARTBEAT_INTERVAL_MS,
            error::IntervalTooShort {
                name: "heartbeatIntervalMs",
                value: self.heartbeat_interval_ms,
                min: MIN_HEARTBEAT_INTERVAL_MS,
            }
        );

        url::Url::parse(&self.api_url).with_context(|_| error::InvalidApiUrl {
            url: &self.api_url,
        })?;

        self.ws_url_override()?;

        Ok(())
    }

    /// parsed ws url override
    pub fn ws_url_override(&self) -> Result<Option<GatewayUrl>, ConfigError> {
        self.ws_url
            .as_deref()
            .map(|s| s.parse::<GatewayUrl>().context(error::InvalidWsUrl))
            .transpose()
    }

    /// REST heartbeat interval
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .ok()
        .with_context(|| error::InvalidEnvValue { name, value })
}
