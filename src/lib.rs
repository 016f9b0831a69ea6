//! # DMWork
//!
//! A DMWork bot framework over the WuKongIM websocket protocol.
//!
//! The [`ws`] module is the protocol client: connect handshake, heartbeat,
//! message acks and reconnect with backoff. The [`stream`] module sends
//! progressive output through the bot api. [`Bot`] puts them together.

#![deny(missing_debug_implementations, missing_docs)]
#![forbid(unsafe_code)]

pub mod api;
pub mod config;
pub mod filter;
pub mod stream;
pub mod subscriber;
pub mod ws;

mod bot;
mod error;

pub use bot::Bot;
pub use config::BotConfig;
pub use error::{Error, Result};
pub use stream::StreamManager;
pub use subscriber::{Context, Subscriber};
