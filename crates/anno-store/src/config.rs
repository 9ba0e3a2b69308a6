//! Store selection and construction.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::backend::{EtcdBackend, EtcdConfig, KvBackend, MemoryBackend, SqliteBackend};
use crate::error::{Result, StoreError};
use crate::key::DEFAULT_KEY_PREFIX;
use crate::store::{SubscriptionStore, DEFAULT_OP_TIMEOUT};

/// Default path of the embedded database file.
pub const DEFAULT_SQLITE_PATH: &str = "/tmp/bot.db";

/// Which backend to open.
#[derive(Debug, Clone)]
pub enum BackendConfig {
    /// Embedded single-file database.
    Sqlite {
        /// Database file path.
        path: PathBuf,
    },
    /// etcd v3 cluster.
    Etcd(EtcdConfig),
    /// Process-local map.
    Memory,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: PathBuf::from(DEFAULT_SQLITE_PATH),
        }
    }
}

/// Everything needed to open a [`SubscriptionStore`].
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Backend selection.
    pub backend: BackendConfig,
    /// Key prefix for subscription records.
    pub key_prefix: String,
    /// Bound on each store operation.
    pub op_timeout: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            op_timeout: DEFAULT_OP_TIMEOUT,
        }
    }
}

impl StoreConfig {
    /// Creates a config for `backend` with default prefix and timeout.
    #[must_use]
    pub fn new(backend: BackendConfig) -> Self {
        Self {
            backend,
            ..Self::default()
        }
    }

    /// Sets the key prefix.
    #[must_use]
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Checks the config for values no backend can work with.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.key_prefix.trim_matches('/').is_empty() {
            return Err(StoreError::Config("key prefix must not be empty".to_string()));
        }
        if self.op_timeout.is_zero() {
            return Err(StoreError::Config(
                "operation timeout must be greater than zero".to_string(),
            ));
        }
        if let BackendConfig::Sqlite { path } = &self.backend {
            if path.as_os_str().is_empty() {
                return Err(StoreError::Config("sqlite path must not be empty".to_string()));
            }
        }
        Ok(())
    }

    /// Opens the configured backend and wraps it in a store.
    ///
    /// A networked backend is probed with one listing so an unreachable
    /// cluster fails here rather than on first use.
    ///
    /// # Errors
    ///
    /// Returns an error if the config is invalid or the backend cannot be
    /// opened or reached.
    pub async fn open(&self) -> Result<SubscriptionStore> {
        self.validate()?;

        let backend: Arc<dyn KvBackend> = match &self.backend {
            BackendConfig::Sqlite { path } => {
                let path = path.clone();
                let backend = tokio::task::spawn_blocking(move || SqliteBackend::open(path))
                    .await
                    .map_err(|e| StoreError::Backend(format!("sqlite open failed: {e}")))??;
                Arc::new(backend)
            }
            BackendConfig::Etcd(etcd) => Arc::new(EtcdBackend::new(etcd)?),
            BackendConfig::Memory => Arc::new(MemoryBackend::new()),
        };

        let store = SubscriptionStore::new(backend)
            .with_prefix(self.key_prefix.clone())
            .with_op_timeout(self.op_timeout);

        if matches!(self.backend, BackendConfig::Etcd(_)) {
            store.list().await?;
        }

        info!(
            backend = store.backend_name(),
            prefix = %store.prefix(),
            "subscription store ready"
        );

        Ok(store)
    }
}
