//! Grafana annotations to Telegram relay.
//!
//! The relay is three long-running tasks joined by one bounded queue:
//!
//! ```text
//!  Grafana ──► Scraper ──► queue (32) ──► Fanout ──► Telegram chats
//!                                           ▲
//!                         TelegramBot ──► SubscriptionStore
//! ```
//!
//! - [`Scraper`] polls [`AnnotationSource`] for `[cursor, now)` every
//!   interval and queues new annotations oldest first
//! - [`Fanout`] renders each annotation with a [`MessageTemplate`] and sends
//!   it to every subscription whose tags it carries
//! - [`TelegramBot`](telegram::TelegramBot) answers `/start`, `/stop` and
//!   `/status` and edits the store
//! - [`Supervisor`] runs them under one cancellation token and stops
//!   everything when any of them returns
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use anno_relay::{event_queue, Annotation, Fanout, MessageTemplate, RecordingTransport};
//! use anno_store::{MemoryBackend, Subscription, SubscriptionKey, SubscriptionStore};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = SubscriptionStore::new(Arc::new(MemoryBackend::new()));
//! let key = SubscriptionKey::chat(42);
//! store
//!     .put(&key, &Subscription::new(key, vec!["db".to_string()]))
//!     .await
//!     .unwrap();
//!
//! let transport = Arc::new(RecordingTransport::new());
//! let template = MessageTemplate::parse("<b>{{ title }}</b>").unwrap();
//! let fanout = Fanout::new(store, transport.clone(), template);
//!
//! let (tx, mut rx) = event_queue();
//! tx.send(Annotation::new("Disk full", vec!["db".to_string(), "prod".to_string()], 0))
//!     .await
//!     .unwrap();
//!
//! let annotation = rx.recv().await.unwrap();
//! fanout.dispatch(&annotation).await.unwrap();
//! assert_eq!(transport.sent_to(42)[0].text, "<b>Disk full</b>");
//! # }
//! ```

pub mod error;
pub mod event;
pub mod fanout;
pub mod grafana;
pub mod matcher;
pub mod scraper;
pub mod shutdown;
pub mod source;
pub mod supervisor;
pub mod telegram;
pub mod template;
pub mod transport;

#[cfg(test)]
mod test_http;

use tokio::sync::mpsc;

pub use error::{RelayError, Result, SourceError, TemplateError, TransportError};
pub use event::{Annotation, HealthStatus};
pub use fanout::{DeliveryReport, Fanout};
pub use grafana::{GrafanaClient, GrafanaConfig, GrafanaTlsConfig, DEFAULT_REQUEST_TIMEOUT};
pub use matcher::matches;
pub use scraper::{oldest_first, PollReport, Scraper, DEFAULT_SCRAPE_INTERVAL};
pub use shutdown::wait_for_shutdown_signal;
pub use source::{AnnotationSource, FakeAnnotationSource, ScrapeWindow};
pub use supervisor::{Supervisor, SHUTDOWN_SIGNAL_TASK};
pub use template::{rfc1123, MessageTemplate};
pub use transport::{ChatTarget, ChatTransport, ParseMode, RecordingTransport, SentMessage};

/// Capacity of the queue between the scraper and the fanout.
pub const EVENT_QUEUE_CAPACITY: usize = 32;

/// Creates the scraper to fanout queue.
#[must_use]
pub fn event_queue() -> (mpsc::Sender<Annotation>, mpsc::Receiver<Annotation>) {
    mpsc::channel(EVENT_QUEUE_CAPACITY)
}
