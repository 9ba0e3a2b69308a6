//! Bot commands: parsing and handling.

use std::collections::HashSet;
use std::sync::Arc;

use anno_store::{StoreError, Subscription, SubscriptionKey, SubscriptionStore};
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use super::types::Message;
use crate::source::AnnotationSource;
use crate::template::rfc1123;
use crate::transport::{ChatTarget, ParseMode};

/// Reply to a sender outside the admin list.
pub const PERMISSION_DENIED: &str = "Permission denied";

const HELP_PROVIDE_TAGS: &str =
    "*You're not provide any tag*\nPlease, provide tags.\n\n*Example:*\n/start tagName,anotherOneTag";
const NOT_SUBSCRIBED: &str = "You're not subscribed for any tags yet";
const STORE_FAILURE: &str = "Something went wrong...";

/// A parsed bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `/start` or `/subscribe` with the requested tags.
    Subscribe {
        /// Requested tags, trimmed, without empty entries.
        tags: Vec<String>,
    },
    /// `/stop` or `/unsubscribe`.
    Unsubscribe,
    /// `/status`.
    Status,
}

impl Command {
    /// Parses message text. Returns `None` for anything that is not a known
    /// command. A `@botname` suffix on the command is ignored.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim_start();
        let rest = text.strip_prefix('/')?;
        let (word, payload) = rest
            .split_once(char::is_whitespace)
            .unwrap_or((rest, ""));
        let name = word.split('@').next().unwrap_or(word);

        match name.to_ascii_lowercase().as_str() {
            "start" | "subscribe" => Some(Self::Subscribe {
                tags: parse_tags(payload),
            }),
            "stop" | "unsubscribe" => Some(Self::Unsubscribe),
            "status" => Some(Self::Status),
            _ => None,
        }
    }
}

/// Splits a comma-separated tag list, trimming entries and dropping empty ones.
#[must_use]
pub fn parse_tags(payload: &str) -> Vec<String> {
    payload
        .split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// A message the bot should send in answer to a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Where to send it.
    pub target: ChatTarget,
    /// Text.
    pub text: String,
    /// Markup mode.
    pub mode: ParseMode,
}

impl Reply {
    fn plain(target: ChatTarget, text: impl Into<String>) -> Self {
        Self {
            target,
            text: text.into(),
            mode: ParseMode::Plain,
        }
    }

    fn markdown(target: ChatTarget, text: impl Into<String>) -> Self {
        Self {
            target,
            text: text.into(),
            mode: ParseMode::Markdown,
        }
    }
}

/// Executes commands against the subscription store.
#[derive(Debug, Clone)]
pub struct CommandHandler {
    store: SubscriptionStore,
    source: Arc<dyn AnnotationSource>,
    admins: HashSet<i64>,
    started_at: DateTime<Utc>,
}

impl CommandHandler {
    /// Creates a handler. Only senders in `admins` may run commands.
    #[must_use]
    pub fn new(
        store: SubscriptionStore,
        source: Arc<dyn AnnotationSource>,
        admins: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            store,
            source,
            admins: admins.into_iter().collect(),
            started_at: Utc::now(),
        }
    }

    /// Overrides the start time reported by `/status`.
    #[must_use]
    pub const fn with_started_at(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Returns true if `user_id` may run commands.
    #[must_use]
    pub fn is_admin(&self, user_id: i64) -> bool {
        self.admins.contains(&user_id)
    }

    /// Handles one incoming message. Returns the reply to send, or `None`
    /// if the message is not a command.
    pub async fn handle(&self, message: &Message) -> Option<Reply> {
        let command = Command::parse(message.text.as_deref()?)?;
        let target = ChatTarget::new(message.chat.id, message.topic());

        let sender = message.sender_id();
        if !sender.is_some_and(|id| self.is_admin(id)) {
            warn!(chat_id = message.chat.id, sender = ?sender, command = ?command, "command from non-admin");
            return Some(Reply::plain(target, PERMISSION_DENIED));
        }

        let reply = match command {
            Command::Subscribe { tags } => self.subscribe(message, target, tags).await,
            Command::Unsubscribe => self.unsubscribe(target).await,
            Command::Status => self.status(target).await,
        };
        Some(reply)
    }

    async fn subscribe(&self, message: &Message, target: ChatTarget, tags: Vec<String>) -> Reply {
        if tags.is_empty() {
            warn!(chat_id = target.chat_id, "subscribe without tags");
            return Reply::markdown(target, HELP_PROVIDE_TAGS);
        }

        let key = SubscriptionKey::new(target.chat_id, target.thread_id);

        match self.store.get(&key).await {
            Ok(Some(existing)) => {
                warn!(chat_id = target.chat_id, "already subscribed");
                return Reply::plain(
                    target,
                    format!(
                        "You're already subscribed for tags:\n{}\n\nUnsubscribe first",
                        existing.tags.join("\n")
                    ),
                );
            }
            Ok(None) => {}
            Err(e @ StoreError::Serialization { .. }) => {
                warn!(chat_id = target.chat_id, error = %e, "already subscribed with an unreadable record");
                return Reply::plain(target, "You're already subscribed\n\nUnsubscribe first");
            }
            Err(e) => {
                error!(chat_id = target.chat_id, error = %e, "could not check subscription");
                return Reply::plain(target, STORE_FAILURE);
            }
        }

        let chat_meta = match serde_json::to_value(&message.chat) {
            Ok(meta) => meta,
            Err(e) => {
                warn!(chat_id = target.chat_id, error = %e, "could not encode chat metadata, storing none");
                serde_json::Value::Null
            }
        };
        let record = Subscription::new(key, tags).with_chat_meta(chat_meta);

        if let Err(e) = self.store.put(&key, &record).await {
            error!(chat_id = target.chat_id, error = %e, "could not store subscription");
            return Reply::plain(target, STORE_FAILURE);
        }

        info!(chat_id = target.chat_id, thread_id = ?target.thread_id, tags = ?record.tags, "subscribed");
        Reply::plain(
            target,
            format!("You're successfully subscribed for tags:\n{}", record.tags.join("\n")),
        )
    }

    async fn unsubscribe(&self, target: ChatTarget) -> Reply {
        let key = SubscriptionKey::new(target.chat_id, target.thread_id);

        let tags = match self.store.get(&key).await {
            Ok(Some(existing)) => existing.tags,
            Ok(None) => {
                warn!(chat_id = target.chat_id, "unsubscribe without subscription");
                return Reply::plain(target, NOT_SUBSCRIBED);
            }
            Err(e @ StoreError::Serialization { .. }) => {
                warn!(chat_id = target.chat_id, error = %e, "removing unreadable subscription");
                Vec::new()
            }
            Err(e) => {
                error!(chat_id = target.chat_id, error = %e, "could not read subscription");
                return Reply::plain(target, STORE_FAILURE);
            }
        };

        if let Err(e) = self.store.delete(&key).await {
            error!(chat_id = target.chat_id, error = %e, "could not remove subscription");
            return Reply::plain(target, STORE_FAILURE);
        }

        info!(chat_id = target.chat_id, thread_id = ?target.thread_id, "unsubscribed");
        if tags.is_empty() {
            Reply::plain(target, "You're successfully unsubscribe")
        } else {
            Reply::plain(
                target,
                format!("You're successfully unsubscribe for tags:\n{}", tags.join("\n")),
            )
        }
    }

    async fn status(&self, target: ChatTarget) -> Reply {
        match self.source.health().await {
            Ok(health) => Reply::markdown(
                target,
                format!(
                    "*Grafana*\nVersion: {}\nDatabase: {}\n\n*Telegram Bot*\nVersion: {}\nUptime: {}",
                    health.version,
                    health.database,
                    env!("CARGO_PKG_VERSION"),
                    rfc1123(self.started_at),
                ),
            ),
            Err(e) => {
                warn!(error = %e, "failed to get grafana status");
                Reply::plain(target, format!("failed to get status... {e}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FakeAnnotationSource;
    use crate::telegram::types::{Chat, User};
    use anno_store::{KvBackend, MemoryBackend};
    use chrono::TimeZone;
    use test_case::test_case;

    const ADMIN: i64 = 42;

    fn handler() -> (CommandHandler, SubscriptionStore, Arc<FakeAnnotationSource>) {
        let store = SubscriptionStore::new(Arc::new(MemoryBackend::new()));
        let source = Arc::new(FakeAnnotationSource::new());
        let handler = CommandHandler::new(store.clone(), source.clone(), [ADMIN])
            .with_started_at(Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap());
        (handler, store, source)
    }

    fn message(from: i64, text: &str, topic: Option<i64>) -> Message {
        Message {
            message_id: 1,
            message_thread_id: topic,
            is_topic_message: topic.is_some(),
            from: Some(User {
                id: from,
                is_bot: false,
                first_name: "Ada".to_string(),
                username: None,
            }),
            chat: Chat {
                id: -100,
                kind: "supergroup".to_string(),
                title: Some("ops".to_string()),
                extra: serde_json::Map::new(),
            },
            text: Some(text.to_string()),
        }
    }

    mod parse_tests {
        use super::*;
        use test_case::test_case;

        #[test_case("/start db,prod", Some(Command::Subscribe { tags: vec!["db".into(), "prod".into()] }) ; "start with tags")]
        #[test_case("/subscribe  db , prod ,, ", Some(Command::Subscribe { tags: vec!["db".into(), "prod".into()] }) ; "trims and drops empty")]
        #[test_case("/start@anno_bot db", Some(Command::Subscribe { tags: vec!["db".into()] }) ; "bot suffix")]
        #[test_case("/start", Some(Command::Subscribe { tags: vec![] }) ; "no payload")]
        #[test_case("/stop", Some(Command::Unsubscribe) ; "stop")]
        #[test_case("/unsubscribe@anno_bot", Some(Command::Unsubscribe) ; "unsubscribe with suffix")]
        #[test_case("/status", Some(Command::Status) ; "status")]
        #[test_case("/help", None ; "unknown command")]
        #[test_case("hello /start", None ; "not a command")]
        #[test_case("", None ; "empty")]
        fn parse(text: &str, expected: Option<Command>) {
            assert_eq!(Command::parse(text), expected);
        }

        #[test]
        fn tags_keep_inner_spaces() {
            assert_eq!(parse_tags("team a, b"), vec!["team a", "b"]);
        }
    }

    #[tokio::test]
    async fn non_admin_is_denied_without_touching_store() {
        let (handler, store, _) = handler();

        let reply = handler.handle(&message(7, "/start db", None)).await.unwrap();
        assert_eq!(reply.text, PERMISSION_DENIED);
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn message_without_sender_is_denied() {
        let (handler, _, _) = handler();
        let mut msg = message(ADMIN, "/status", None);
        msg.from = None;

        let reply = handler.handle(&msg).await.unwrap();
        assert_eq!(reply.text, PERMISSION_DENIED);
    }

    #[tokio::test]
    async fn plain_text_gets_no_reply() {
        let (handler, _, _) = handler();
        assert!(handler.handle(&message(ADMIN, "hello", None)).await.is_none());

        let mut no_text = message(ADMIN, "", None);
        no_text.text = None;
        assert!(handler.handle(&no_text).await.is_none());
    }

    #[tokio::test]
    async fn subscribe_stores_record_with_chat_meta() {
        let (handler, store, _) = handler();

        let reply = handler
            .handle(&message(ADMIN, "/start db,prod", Some(9)))
            .await
            .unwrap();
        assert_eq!(reply.target, ChatTarget::new(-100, Some(9)));
        assert_eq!(reply.text, "You're successfully subscribed for tags:\ndb\nprod");

        let record = store.get(&SubscriptionKey::new(-100, Some(9))).await.unwrap().unwrap();
        assert_eq!(record.tags, vec!["db", "prod"]);
        assert_eq!(record.chat["title"], serde_json::json!("ops"));
    }

    #[tokio::test]
    async fn subscribe_without_tags_gets_help() {
        let (handler, store, _) = handler();

        let reply = handler.handle(&message(ADMIN, "/start , ,", None)).await.unwrap();
        assert_eq!(reply.mode, ParseMode::Markdown);
        assert!(reply.text.contains("/start tagName,anotherOneTag"));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn second_subscribe_asks_to_unsubscribe_first() {
        let (handler, store, _) = handler();
        handler.handle(&message(ADMIN, "/start db", None)).await.unwrap();

        let reply = handler.handle(&message(ADMIN, "/start cache", None)).await.unwrap();
        assert_eq!(reply.text, "You're already subscribed for tags:\ndb\n\nUnsubscribe first");

        let record = store.get(&SubscriptionKey::chat(-100)).await.unwrap().unwrap();
        assert_eq!(record.tags, vec!["db"]);
    }

    #[tokio::test]
    async fn thread_and_chat_subscriptions_are_independent() {
        let (handler, store, _) = handler();
        handler.handle(&message(ADMIN, "/start db", None)).await.unwrap();

        let reply = handler.handle(&message(ADMIN, "/start cache", Some(3))).await.unwrap();
        assert!(reply.text.starts_with("You're successfully subscribed"));
        assert_eq!(store.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn unsubscribe_removes_record() {
        let (handler, store, _) = handler();
        handler.handle(&message(ADMIN, "/start db,prod", None)).await.unwrap();

        let reply = handler.handle(&message(ADMIN, "/stop", None)).await.unwrap();
        assert_eq!(reply.text, "You're successfully unsubscribe for tags:\ndb\nprod");
        assert!(!store.exists(&SubscriptionKey::chat(-100)).await.unwrap());

        let reply = handler.handle(&message(ADMIN, "/stop", None)).await.unwrap();
        assert_eq!(reply.text, NOT_SUBSCRIBED);
    }

    async fn seed_unreadable_record(store: &SubscriptionStore, backend: &MemoryBackend) {
        let path = store.key_path(&SubscriptionKey::chat(-100));
        backend.put(&path, b"{broken".to_vec()).await.unwrap();
    }

    #[tokio::test]
    async fn unreadable_record_can_still_be_removed() {
        let backend = Arc::new(MemoryBackend::new());
        let store = SubscriptionStore::new(backend.clone());
        let handler = CommandHandler::new(store.clone(), Arc::new(FakeAnnotationSource::new()), [ADMIN]);
        seed_unreadable_record(&store, &backend).await;

        let reply = handler.handle(&message(ADMIN, "/start db", None)).await.unwrap();
        assert_eq!(reply.text, "You're already subscribed\n\nUnsubscribe first");
        assert!(store.exists(&SubscriptionKey::chat(-100)).await.unwrap());

        let reply = handler.handle(&message(ADMIN, "/stop", None)).await.unwrap();
        assert_eq!(reply.text, "You're successfully unsubscribe");
        assert!(!store.exists(&SubscriptionKey::chat(-100)).await.unwrap());

        let reply = handler.handle(&message(ADMIN, "/start db", None)).await.unwrap();
        assert_eq!(reply.text, "You're successfully subscribed for tags:\ndb");
        assert_eq!(store.list().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn status_reports_source_and_start_time() {
        let (handler, _, source) = handler();

        let reply = handler.handle(&message(ADMIN, "/status", None)).await.unwrap();
        assert_eq!(reply.mode, ParseMode::Markdown);
        assert!(reply.text.contains("Version: 0.0.0-fake"));
        assert!(reply.text.contains("Database: ok"));
        assert!(reply.text.contains("Uptime: Tue, 02 Jan 2024 03:04:05 UTC"));

        source.set_unhealthy();
        let reply = handler.handle(&message(ADMIN, "/status", None)).await.unwrap();
        assert!(reply.text.starts_with("failed to get status..."));
    }
}
