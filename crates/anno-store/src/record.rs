//! The stored subscription record and its encoding.
//!
//! Records are JSON objects with the field names `ChatID`, `Tags`,
//! `ThreadID` and `Chat`. Every field is optional on decode and unknown
//! fields are ignored, so records written by older or newer versions of
//! the bot decode cleanly whichever backend holds them.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{Result, StoreError};
use crate::key::SubscriptionKey;

/// A recipient's tag subscription.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Subscription {
    /// Chat the subscription delivers to.
    #[serde(rename = "ChatID", default)]
    pub chat_id: i64,
    /// Tags an event must carry to be delivered. Empty means "everything".
    #[serde(rename = "Tags", default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    /// Forum thread the subscription delivers to, `0` for none.
    #[serde(rename = "ThreadID", default)]
    pub thread_id: i64,
    /// Opaque recipient metadata (the chat object as the transport saw it).
    #[serde(rename = "Chat", default)]
    pub chat: serde_json::Value,
}

impl Subscription {
    /// Creates a subscription for `key` with the given tags.
    #[must_use]
    pub fn new(key: SubscriptionKey, tags: Vec<String>) -> Self {
        Self {
            chat_id: key.chat_id(),
            tags,
            thread_id: key.thread_id().unwrap_or(0),
            chat: serde_json::Value::Null,
        }
    }

    /// Attaches recipient metadata.
    #[must_use]
    pub fn with_chat_meta(mut self, chat: serde_json::Value) -> Self {
        self.chat = chat;
        self
    }

    /// Returns the key this subscription is stored under.
    #[must_use]
    pub const fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(self.chat_id, Some(self.thread_id))
    }

    /// Returns the thread to deliver to, if any.
    #[must_use]
    pub const fn thread(&self) -> Option<i64> {
        self.key().thread_id()
    }

    /// Returns true if this subscription receives every event.
    #[must_use]
    pub fn is_catch_all(&self) -> bool {
        self.tags.is_empty()
    }

    /// Encodes the record for storage.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the metadata cannot be encoded.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| StoreError::Serialization {
            key: self.key().to_string(),
            reason: e.to_string(),
        })
    }

    /// Decodes a record stored under `key`.
    ///
    /// Records without a `ChatID` take the chat id from the `id` field of
    /// the chat metadata.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Serialization` if the bytes are not a valid record.
    pub fn decode(key: &str, bytes: &[u8]) -> Result<Self> {
        let mut record: Self =
            serde_json::from_slice(bytes).map_err(|e| StoreError::Serialization {
                key: key.to_string(),
                reason: e.to_string(),
            })?;

        if record.chat_id == 0 {
            record.chat_id = record
                .chat
                .get("id")
                .and_then(serde_json::Value::as_i64)
                .unwrap_or(0);
        }

        if record.chat_id == 0 {
            return Err(StoreError::Serialization {
                key: key.to_string(),
                reason: "record has no chat id".to_string(),
            });
        }

        Ok(record)
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}
