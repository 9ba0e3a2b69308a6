//! Outbound chat delivery.

use std::collections::HashSet;
use std::fmt;

use anno_store::backend::BoxFuture;
use anno_store::{Subscription, SubscriptionKey};
use parking_lot::Mutex;

use crate::error::TransportError;

/// Where a message goes: a chat, optionally narrowed to a forum thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatTarget {
    /// Chat id.
    pub chat_id: i64,
    /// Forum thread id, if any.
    pub thread_id: Option<i64>,
}

impl ChatTarget {
    /// Creates a target.
    #[must_use]
    pub const fn new(chat_id: i64, thread_id: Option<i64>) -> Self {
        Self { chat_id, thread_id }
    }
}

impl From<SubscriptionKey> for ChatTarget {
    fn from(key: SubscriptionKey) -> Self {
        Self::new(key.chat_id(), key.thread_id())
    }
}

impl From<&Subscription> for ChatTarget {
    fn from(sub: &Subscription) -> Self {
        sub.key().into()
    }
}

impl fmt::Display for ChatTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.thread_id {
            Some(thread) => write!(f, "{}#{thread}", self.chat_id),
            None => write!(f, "{}", self.chat_id),
        }
    }
}

/// How the receiving client should interpret message markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    /// No markup.
    Plain,
    /// HTML subset.
    Html,
    /// Legacy Markdown.
    Markdown,
}

impl ParseMode {
    /// Returns the wire name, or `None` for plain text.
    #[must_use]
    pub const fn as_api_str(self) -> Option<&'static str> {
        match self {
            Self::Plain => None,
            Self::Html => Some("HTML"),
            Self::Markdown => Some("Markdown"),
        }
    }
}

/// Delivers rendered messages to chats.
pub trait ChatTransport: Send + Sync + fmt::Debug {
    /// Returns the transport name, for logs.
    fn name(&self) -> &'static str;

    /// Sends `text` to `target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the message could not be delivered.
    fn send<'a>(
        &'a self,
        target: ChatTarget,
        text: &'a str,
        mode: ParseMode,
    ) -> BoxFuture<'a, Result<(), TransportError>>;
}

/// A message captured by [`RecordingTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    /// Recipient.
    pub target: ChatTarget,
    /// Message text.
    pub text: String,
    /// Markup mode.
    pub mode: ParseMode,
}

/// A [`ChatTransport`] that records messages instead of sending them.
///
/// Chats marked with [`RecordingTransport::fail_for`] reject every message.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<SentMessage>>,
    failing: Mutex<HashSet<i64>>,
}

impl RecordingTransport {
    /// Creates a transport that accepts everything.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every delivery to `chat_id` fail.
    pub fn fail_for(&self, chat_id: i64) {
        self.failing.lock().insert(chat_id);
    }

    /// Returns every delivered message, oldest first.
    #[must_use]
    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    /// Returns messages delivered to `chat_id`.
    #[must_use]
    pub fn sent_to(&self, chat_id: i64) -> Vec<SentMessage> {
        self.sent
            .lock()
            .iter()
            .filter(|m| m.target.chat_id == chat_id)
            .cloned()
            .collect()
    }
}

impl ChatTransport for RecordingTransport {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn send<'a>(
        &'a self,
        target: ChatTarget,
        text: &'a str,
        mode: ParseMode,
    ) -> BoxFuture<'a, Result<(), TransportError>> {
        Box::pin(async move {
            if self.failing.lock().contains(&target.chat_id) {
                return Err(TransportError::Rejected {
                    chat_id: target.chat_id,
                    reason: "chat marked as failing".to_string(),
                });
            }
            self.sent.lock().push(SentMessage {
                target,
                text: text.to_string(),
                mode,
            });
            Ok(())
        })
    }
}
