//! Progressive output through stream messages.
//!
//! A stream is opened on the server with [`StreamManager::start_stream`], then
//! updated with the full text produced so far and finally closed with
//! [`StreamManager::end_stream`].

use std::{collections::HashMap, fmt::Debug, sync::Arc};

use futures_util::{Stream, StreamExt};
use snafu::prelude::*;
use tokio::sync::Mutex;

use crate::{
    api::{
        self,
        types::{SendMessageRequest, StreamEndRequest, StreamStartRequest},
        BotApi,
    },
    ws::message::{ChannelType, Payload},
};

/// Boxed error of a text source
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Stream manager errors
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)), module(error), context(suffix(false)))]
pub enum StreamError {
    /// encode initial payload failed
    #[snafu(display("encode stream payload failed: {source}"))]
    EncodePayload {
        /// source error
        source: serde_json::Error,
    },

    /// server refused to open the stream, nothing registered
    #[snafu(display("create stream in channel {channel_id} failed: {source}"))]
    StreamCreate {
        /// target channel
        channel_id: String,
        /// source error
        source: api::Error,
    },

    /// stream id is not open
    #[snafu(display("stream {stream_no} is not active"))]
    UnknownStream {
        /// stream id
        stream_no: String,
    },

    /// send progressive update failed, stream still open
    #[snafu(display("send chunk to stream {stream_no} failed: {source}"))]
    ChunkFailed {
        /// stream id
        stream_no: String,
        /// source error
        source: api::Error,
    },

    /// finalize failed, stream already removed
    #[snafu(display("end stream {stream_no} failed: {source}"))]
    EndFailed {
        /// stream id
        stream_no: String,
        /// source error
        source: api::Error,
    },

    /// text source yield an error, stream already ended
    #[snafu(display("text source of stream {stream_no} failed: {source}"))]
    SourceFailed {
        /// stream id
        stream_no: String,
        /// source error
        source: SourceError,
    },
}

/// Result type of stream operations
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// State of an open stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSession {
    /// target channel
    pub channel_id: String,
    /// target channel kind
    pub channel_type: ChannelType,
    /// full text of the last successful update
    pub text: String,
}

type Sessions = HashMap<String, Arc<Mutex<StreamSession>>>;

/// Tracks open streams by server issued stream id.
///
/// Calls for different streams run independently, calls for the same stream
/// are ordered by a per stream lock.
pub struct StreamManager<A: ?Sized = dyn BotApi> {
    api: Arc<A>,
    sessions: Arc<Mutex<Sessions>>,
}

impl<A: ?Sized> Clone for StreamManager<A> {
    fn clone(&self) -> Self {
        Self {
            api: self.api.clone(),
            sessions: self.sessions.clone(),
        }
    }
}

impl<A: ?Sized> Debug for StreamManager<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamManager").finish_non_exhaustive()
    }
}

impl<A: BotApi + ?Sized> StreamManager<A> {
    /// Create a manager over the api
    pub fn new(api: Arc<A>) -> Self {
        Self {
            api,
            sessions: Arc::default(),
        }
    }

    /// Open a stream with initial text, returns the stream id
    pub async fn start_stream(
        &self,
        channel_id: &str,
        channel_type: ChannelType,
        initial: &str,
    ) -> Result<String> {
        let payload = Payload::text(initial).encode().context(error::EncodePayload)?;

        let data = self
            .api
            .stream_start(&StreamStartRequest {
                channel_id: channel_id.to_string(),
                channel_type,
                payload,
            })
            .await
            .context(error::StreamCreate { channel_id })?;

        log::debug!("Stream {} started in channel {}", data.stream_no, channel_id);

        let session = StreamSession {
            channel_id: channel_id.to_string(),
            channel_type,
            text: initial.to_string(),
        };

        self.sessions
            .lock()
            .await
            .insert(data.stream_no.clone(), Arc::new(Mutex::new(session)));

        Ok(data.stream_no)
    }

    /// Send the full text so far to an open stream
    pub async fn send_chunk(&self, stream_no: &str, content: &str) -> Result<()> {
        let session = self
            .sessions
            .lock()
            .await
            .get(stream_no)
            .cloned()
            .context(error::UnknownStream { stream_no })?;

        let mut session = session.lock().await;

        self.api
            .send_message(&SendMessageRequest {
                channel_id: session.channel_id.clone(),
                channel_type: session.channel_type,
                stream_no: Some(stream_no.to_string()),
                payload: Payload::text(content),
            })
            .await
            .context(error::ChunkFailed { stream_no })?;

        log::trace!("Stream {} updated, {} bytes", stream_no, content.len());

        session.text = content.to_string();

        Ok(())
    }

    /// Finalize a stream, no-op if it is not open.
    ///
    /// The stream is forgotten even if the server call fails.
    pub async fn end_stream(&self, stream_no: &str) -> Result<()> {
        let session = match self.sessions.lock().await.remove(stream_no) {
            Some(session) => session,
            None => {
                log::debug!("Stream {} not active, ignore end", stream_no);
                return Ok(());
            }
        };

        // wait in-flight chunk of this stream
        let session = session.lock().await;

        self.api
            .stream_end(&StreamEndRequest {
                stream_no: stream_no.to_string(),
                channel_id: session.channel_id.clone(),
                channel_type: session.channel_type,
            })
            .await
            .context(error::EndFailed { stream_no })?;

        log::debug!("Stream {} ended", stream_no);

        Ok(())
    }

    /// Stream text fragments to a channel, returns the full text.
    ///
    /// Each fragment is appended and the running total is sent. The stream is
    /// always ended, the first error is returned.
    pub async fn stream_text<S, E>(
        &self,
        channel_id: &str,
        channel_type: ChannelType,
        source: S,
    ) -> Result<String>
    where
        S: Stream<Item = Result<String, E>>,
        E: Into<SourceError>,
    {
        let stream_no = self.start_stream(channel_id, channel_type, "").await?;

        let result = self.accumulate(&stream_no, source).await;
        let ended = self.end_stream(&stream_no).await;

        match (result, ended) {
            (Err(err), ended) => {
                if let Err(end_err) = ended {
                    log::warn!("{}", end_err);
                }
                Err(err)
            }
            (Ok(_), Err(err)) => Err(err),
            (Ok(text), Ok(())) => Ok(text),
        }
    }

    async fn accumulate<S, E>(&self, stream_no: &str, source: S) -> Result<String>
    where
        S: Stream<Item = Result<String, E>>,
        E: Into<SourceError>,
    {
        futures_util::pin_mut!(source);

        let mut text = String::new();

        while let Some(fragment) = source.next().await {
            let fragment = fragment
                .map_err(Into::<SourceError>::into)
                .context(error::SourceFailed { stream_no })?;

            text.push_str(&fragment);
            self.send_chunk(stream_no, &text).await?;
        }

        Ok(text)
    }

    /// Ids of open streams
    pub async fn active(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.sessions.lock().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Snapshot of an open stream
    pub async fn session(&self, stream_no: &str) -> Option<StreamSession> {
        let session = self.sessions.lock().await.get(stream_no).cloned()?;
        let session = session.lock().await;
        Some(session.clone())
    }
}
