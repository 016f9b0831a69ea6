//! framework error types

use snafu::prelude::*;

use super::api::Error as APIError;
use super::config::ConfigError;
use super::ws::ParseGatewayURLError;

/// framework result type
pub type Result<T> = std::result::Result<T, Error>;

/// framework error type
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), context(suffix(false)))]
pub enum Error {
    /// Bot config is invalid
    #[snafu(display("invalid bot config: {source}"))]
    InvalidConfig {
        /// source error
        source: ConfigError,
    },

    /// Create api client failed
    #[snafu(display("create api client failed: {source}"))]
    CreateAPIClientFailed {
        /// source error
        source: APIError,
    },

    /// Register bot failed
    #[snafu(display("register bot failed: {source}"))]
    RegisterFailed {
        /// source error
        source: APIError,
    },

    /// Received invalid websocket gateway url address
    #[snafu(display("invalid gateway url {url}: {source}"))]
    InvalidGatewayURL {
        /// received url
        url: String,
        /// source error
        source: ParseGatewayURLError,
    },

    /// Websocket client gave up reconnecting
    #[snafu(display("websocket client stopped after {attempts} reconnect attempts"))]
    ReconnectExhausted {
        /// failed attempts
        attempts: u32,
    },
}
