//! Recipient keys and their storage paths.

use std::fmt;

/// Default prefix under which subscriptions are stored.
pub const DEFAULT_KEY_PREFIX: &str = "annotationsbot/chats";

/// Identifies a subscription recipient: a chat and an optional thread.
///
/// Thread `0` means "no thread", so `SubscriptionKey::new(c, Some(0))` and
/// `SubscriptionKey::new(c, None)` are the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    chat_id: i64,
    thread_id: i64,
}

impl SubscriptionKey {
    /// Creates a key for a chat and an optional thread.
    #[must_use]
    pub const fn new(chat_id: i64, thread_id: Option<i64>) -> Self {
        let thread_id = match thread_id {
            Some(id) => id,
            None => 0,
        };
        Self { chat_id, thread_id }
    }

    /// Creates a chat-level key.
    #[must_use]
    pub const fn chat(chat_id: i64) -> Self {
        Self::new(chat_id, None)
    }

    /// Returns the chat identifier.
    #[must_use]
    pub const fn chat_id(&self) -> i64 {
        self.chat_id
    }

    /// Returns the thread identifier, if any.
    #[must_use]
    pub const fn thread_id(&self) -> Option<i64> {
        if self.thread_id == 0 {
            None
        } else {
            Some(self.thread_id)
        }
    }

    /// Returns the full storage path of this key under `prefix`.
    #[must_use]
    pub fn to_path(&self, prefix: &str) -> String {
        format!("{}/{self}", prefix.trim_end_matches('/'))
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.thread_id() {
            Some(thread) => write!(f, "{}-{thread}", self.chat_id),
            None => write!(f, "{}", self.chat_id),
        }
    }
}

/// Returns the prefix used to list every key stored under `prefix`.
#[must_use]
pub fn list_prefix(prefix: &str) -> String {
    format!("{}/", prefix.trim_end_matches('/'))
}
