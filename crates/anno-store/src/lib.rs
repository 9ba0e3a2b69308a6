//! Subscription storage for the Grafana annotations relay.
//!
//! `anno-store` keeps one tag subscription per recipient (a chat, optionally
//! narrowed to a forum thread) behind a pluggable key-value backend.
//!
//! # Features
//!
//! - **One contract, many backends**: SQLite file, etcd v3 cluster, or an
//!   in-memory map, all behind [`KvBackend`]
//! - **Stable key scheme**: `{prefix}/{chat}` or `{prefix}/{chat}-{thread}`
//! - **Portable records**: JSON with field names shared by every backend
//! - **Bounded operations**: every call is cut off by the operation timeout
//!
//! # Example
//!
//! ```rust
//! use anno_store::{BackendConfig, StoreConfig, Subscription, SubscriptionKey};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let store = StoreConfig::new(BackendConfig::Memory).open().await.unwrap();
//!
//! let key = SubscriptionKey::new(-100_123, Some(7));
//! store
//!     .put(&key, &Subscription::new(key, vec!["db".to_string()]))
//!     .await
//!     .unwrap();
//!
//! assert!(store.exists(&key).await.unwrap());
//! assert_eq!(store.key_path(&key), "annotationsbot/chats/-100123-7");
//! # }
//! ```

pub mod backend;
pub mod config;
pub mod error;
pub mod key;
pub mod record;
pub mod store;

pub use backend::{EtcdBackend, EtcdConfig, EtcdTlsConfig, KvBackend, KvPair, MemoryBackend, SqliteBackend};
pub use config::{BackendConfig, StoreConfig, DEFAULT_SQLITE_PATH};
pub use error::{Result, StoreError};
pub use key::{SubscriptionKey, DEFAULT_KEY_PREFIX};
pub use record::Subscription;
pub use store::{SubscriptionStore, DEFAULT_OP_TIMEOUT};
