//! Bot API wire types. Only the fields the relay reads are typed.

use serde::{Deserialize, Serialize};

/// Envelope around every Bot API result.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiResponse<T> {
    /// Whether the call succeeded.
    pub ok: bool,
    /// The result, present when `ok` is true.
    pub result: Option<T>,
    /// Error code, present when `ok` is false.
    pub error_code: Option<i64>,
    /// Error description, present when `ok` is false.
    pub description: Option<String>,
}

/// An incoming update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Update {
    /// Monotonic update id.
    pub update_id: i64,
    /// New incoming message, if this update carries one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

/// A chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Message id within the chat.
    pub message_id: i64,
    /// Forum topic the message belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_thread_id: Option<i64>,
    /// True if the message was sent to a forum topic.
    #[serde(default)]
    pub is_topic_message: bool,
    /// Sender, absent for channel posts.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<User>,
    /// Chat the message belongs to.
    pub chat: Chat,
    /// Message text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Message {
    /// Returns the forum topic to reply into, if the message came from one.
    #[must_use]
    pub fn topic(&self) -> Option<i64> {
        if self.is_topic_message {
            self.message_thread_id
        } else {
            None
        }
    }

    /// Returns the sender id, if known.
    #[must_use]
    pub fn sender_id(&self) -> Option<i64> {
        self.from.as_ref().map(|u| u.id)
    }
}

/// A chat. Fields the relay does not read are kept so the chat can be stored
/// as recipient metadata unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    /// Chat id.
    pub id: i64,
    /// `private`, `group`, `supergroup` or `channel`.
    #[serde(rename = "type", default)]
    pub kind: String,
    /// Title, for groups and channels.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Remaining fields.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// A user or bot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// User id.
    pub id: i64,
    /// True for bots.
    #[serde(default)]
    pub is_bot: bool,
    /// First name.
    #[serde(default)]
    pub first_name: String,
    /// Username, without the leading `@`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_topic_message() {
        let raw = json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "message_thread_id": 77,
                "is_topic_message": true,
                "from": {"id": 42, "is_bot": false, "first_name": "Ada"},
                "chat": {"id": -1001, "type": "supergroup", "title": "ops", "is_forum": true},
                "date": 1700000000,
                "text": "/start db,prod"
            }
        });

        let update: Update = serde_json::from_value(raw).unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.topic(), Some(77));
        assert_eq!(message.sender_id(), Some(42));
        assert_eq!(message.chat.kind, "supergroup");
        assert_eq!(message.chat.extra["is_forum"], json!(true));
    }

    #[test]
    fn reply_thread_outside_forum_is_not_a_topic() {
        let raw = json!({
            "message_id": 5,
            "message_thread_id": 3,
            "chat": {"id": -1001, "type": "supergroup"},
            "text": "/stop"
        });

        let message: Message = serde_json::from_value(raw).unwrap();
        assert_eq!(message.topic(), None);
        assert_eq!(message.sender_id(), None);
    }

    #[test]
    fn chat_round_trips_unknown_fields() {
        let raw = json!({"id": 1, "type": "private", "username": "ada", "first_name": "Ada"});
        let chat: Chat = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(serde_json::to_value(&chat).unwrap(), raw);
    }

    #[test]
    fn error_envelope() {
        let raw = r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#;
        let resp: ApiResponse<User> = serde_json::from_str(raw).unwrap();
        assert!(!resp.ok);
        assert!(resp.result.is_none());
        assert_eq!(resp.error_code, Some(401));
    }
}
