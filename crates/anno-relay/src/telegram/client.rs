//! Bot API HTTP client.

use std::time::Duration;

use anno_store::backend::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::types::{ApiResponse, Message, Update, User};
use crate::error::TransportError;
use crate::transport::{ChatTarget, ChatTransport, ParseMode};

/// Public Bot API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Timeout for calls that do not long-poll.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Slack added on top of the long-poll timeout before the HTTP request
/// itself is abandoned.
const POLL_SLACK: Duration = Duration::from_secs(10);

#[derive(Serialize)]
struct GetUpdates {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message_thread_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'static str>,
}

#[derive(Serialize)]
struct NoParams {}

/// A source of bot updates.
pub trait UpdateFeed: Send + Sync + std::fmt::Debug {
    /// Long-polls for updates with id at least `offset`, waiting up to
    /// `timeout` for one to arrive.
    ///
    /// # Errors
    ///
    /// Returns an error if the poll fails.
    fn poll(&self, offset: i64, timeout: Duration) -> BoxFuture<'_, Result<Vec<Update>, TransportError>>;
}

/// Talks to the Telegram Bot API.
#[derive(Debug, Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base: Url,
}

impl TelegramClient {
    /// Creates a client for the public Bot API.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Config` if the token is empty or the HTTP
    /// client cannot be built.
    pub fn new(token: &str) -> Result<Self, TransportError> {
        let api = Url::parse(DEFAULT_API_URL)
            .map_err(|e| TransportError::Config(format!("invalid api url: {e}")))?;
        Self::with_api_url(api, token)
    }

    /// Creates a client for a self-hosted Bot API server.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Config` if the token is empty or the HTTP
    /// client cannot be built.
    pub fn with_api_url(api: Url, token: &str) -> Result<Self, TransportError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(TransportError::Config("telegram token must not be empty".to_string()));
        }
        if token.contains('/') {
            return Err(TransportError::Config(
                "telegram token must not contain '/'".to_string(),
            ));
        }

        let mut base = api;
        base.path_segments_mut()
            .map_err(|()| TransportError::Config("api url cannot be a base url".to_string()))?
            .pop_if_empty()
            .push(&format!("bot{token}"))
            .push("");

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Config(format!("could not build http client: {e}")))?;

        Ok(Self { http, base })
    }

    async fn call<B, T>(&self, method: &str, body: &B, timeout: Duration) -> Result<T, TransportError>
    where
        B: Serialize + Sync,
        T: DeserializeOwned,
    {
        let url = self
            .base
            .join(method)
            .map_err(|e| TransportError::Config(format!("invalid method '{method}': {e}")))?;

        let response = self
            .http
            .post(url)
            .json(body)
            .timeout(timeout)
            .send()
            .await
            .map_err(reqwest::Error::without_url)?;
        let bytes = response.bytes().await.map_err(reqwest::Error::without_url)?;

        let envelope: ApiResponse<T> = serde_json::from_slice(&bytes)?;
        match envelope {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                ok: true, result: None, ..
            } => Err(TransportError::Decode(format!("{method} returned no result"))),
            ApiResponse {
                error_code,
                description,
                ..
            } => Err(TransportError::Api {
                code: error_code.unwrap_or_default(),
                description: description.unwrap_or_default(),
            }),
        }
    }

    /// Returns the bot's own user. Doubles as a token check.
    ///
    /// # Errors
    ///
    /// Returns an error if the API is unreachable or rejects the token.
    pub async fn get_me(&self) -> Result<User, TransportError> {
        self.call("getMe", &NoParams {}, REQUEST_TIMEOUT).await
    }

    /// Long-polls for message updates.
    ///
    /// # Errors
    ///
    /// Returns an error if the poll fails.
    pub async fn get_updates(&self, offset: i64, timeout: Duration) -> Result<Vec<Update>, TransportError> {
        let body = GetUpdates {
            offset,
            timeout: timeout.as_secs(),
            allowed_updates: ["message"],
        };
        self.call("getUpdates", &body, timeout + POLL_SLACK).await
    }

    /// Sends a text message.
    ///
    /// # Errors
    ///
    /// Returns an error if the API is unreachable or refuses the message.
    pub async fn send_message(
        &self,
        target: ChatTarget,
        text: &str,
        mode: ParseMode,
    ) -> Result<Message, TransportError> {
        let body = SendMessage {
            chat_id: target.chat_id,
            text,
            message_thread_id: target.thread_id,
            parse_mode: mode.as_api_str(),
        };
        let sent: Message = self.call("sendMessage", &body, REQUEST_TIMEOUT).await?;
        debug!(chat = %target, message_id = sent.message_id, "message sent");
        Ok(sent)
    }
}

impl ChatTransport for TelegramClient {
    fn name(&self) -> &'static str {
        "telegram"
    }

    fn send<'a>(
        &'a self,
        target: ChatTarget,
        text: &'a str,
        mode: ParseMode,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move { self.send_message(target, text, mode).await.map(|_| ()) })
    }
}

impl UpdateFeed for TelegramClient {
    fn poll(&self, offset: i64, timeout: Duration) -> BoxFuture<'_, Result<Vec<Update>, TransportError>> {
        Box::pin(self.get_updates(offset, timeout))
    }
}
