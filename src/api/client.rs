use std::time::Duration;

use reqwest::Method;
use serde::{de::DeserializeOwned, de::IgnoredAny, Serialize};
use snafu::prelude::*;

use super::error::variant::*;
use super::types::*;
use super::{BotApi, Result};

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// DMWork HTTP API Client
#[derive(Debug, Clone)]
pub struct Client {
    client: reqwest::Client,
    base_url: String,
}

impl Client {
    /// create a new api client using server base url and bot token
    pub fn new<U, S>(api_url: &U, token: &S) -> Result<Self>
    where
        U: AsRef<str> + ?Sized,
        S: AsRef<str> + ?Sized,
    {
        let token = token.as_ref();
        let auth_header_value = format!("Bearer {}", token).parse().map_err(|_| {
            TokenInvalid {
                token: token.to_string(),
            }
            .build()
        })?;

        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::AUTHORIZATION, auth_header_value);

        let client = reqwest::Client::builder()
            .gzip(true)
            .deflate(true)
            .timeout(REQUEST_TIMEOUT)
            .user_agent(APP_USER_AGENT)
            .default_headers(headers)
            .build()
            .context(ClientCreateFailed)?;

        Ok(Self {
            client,
            base_url: api_url.as_ref().trim_end_matches('/').to_string(),
        })
    }

    /// server base url, without trailing slash
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);

        let json = serde_json::to_vec(body).context(SerializeBodyFailed { path })?;

        let req = self
            .client
            .post(&url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(json)
            .build()
            .context(BuildRequestFailed)?;

        log::trace!("POST {}", url);

        let resp = self
            .client
            .execute(req)
            .await
            .with_context(|_| RequestFailed {
                method: Method::POST,
                url: &url,
            })?;

        let status = resp.status();

        let body = resp.bytes().await.with_context(|_| RequestFailed {
            method: Method::POST,
            url: &url,
        })?;

        ensure!(
            status.is_success(),
            HTTPStatusNotOK {
                method: Method::POST,
                url: &url,
                status_code: status,
                body: String::from_utf8_lossy(&body),
            }
        );

        // endpoints without result may reply nothing
        let body = if body.iter().all(u8::is_ascii_whitespace) {
            bytes::Bytes::from_static(b"{}")
        } else {
            body
        };

        serde_json::from_slice(&body).with_context(|_| ParseBodyFailed { body })
    }

    async fn call<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        self.request::<B, IgnoredAny>(path, body).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BotApi for Client {
    async fn register(&self, req: &RegisterRequest) -> Result<RegisterData> {
        self.request("/v1/bot/register", req).await
    }

    async fn send_message(&self, req: &SendMessageRequest) -> Result<SendMessageResult> {
        self.request("/v1/bot/sendMessage", req).await
    }

    async fn send_typing(&self, req: &TypingRequest) -> Result<()> {
        self.call("/v1/bot/typing", req).await
    }

    async fn send_read_receipt(&self, req: &ReadReceiptRequest) -> Result<()> {
        self.call("/v1/bot/readReceipt", req).await
    }

    async fn heartbeat(&self) -> Result<()> {
        self.call("/v1/bot/heartbeat", &serde_json::json!({})).await
    }

    async fn stream_start(&self, req: &StreamStartRequest) -> Result<StreamStartData> {
        self.request("/v1/bot/stream/start", req).await
    }

    async fn stream_end(&self, req: &StreamEndRequest) -> Result<()> {
        self.call("/v1/bot/stream/end", req).await
    }
}
