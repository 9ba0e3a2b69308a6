//! Command-line arguments.
//!
//! Every flag can also be set through the environment variable named next
//! to it, so the bot runs unchanged inside a container.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tracing::level_filters::LevelFilter;
use url::Url;

use crate::config::parse_duration;

/// Relays Grafana annotations to subscribed Telegram chats.
#[derive(Parser, Debug, Clone)]
#[command(name = "annotations-bot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Grafana base URL.
    #[arg(long, env = "GRAFANA_URL")]
    pub grafana_url: Url,

    /// Grafana API token.
    #[arg(long, env = "GRAFANA_TOKEN", hide_env_values = true)]
    pub grafana_token: String,

    /// Time between annotation polls (`500ms`, `10s`, `5m`, `1h`).
    #[arg(long, env = "GRAFANA_SCRAPE_INTERVAL", default_value = "10s", value_parser = parse_duration)]
    pub grafana_scrape_interval: Duration,

    /// Talk to Grafana without loading TLS material.
    #[arg(long, env = "GRAFANA_TLS_INSECURE")]
    pub grafana_tls_insecure: bool,

    /// Accept any certificate from Grafana.
    #[arg(long, env = "GRAFANA_TLS_INSECURE_SKIP_VERIFY")]
    pub grafana_tls_insecure_skip_verify: bool,

    /// Client certificate for Grafana (PEM).
    #[arg(long, env = "GRAFANA_TLS_CERT")]
    pub grafana_tls_cert: Option<PathBuf>,

    /// Client key for Grafana (PKCS#8 PEM).
    #[arg(long, env = "GRAFANA_TLS_KEY_FILE")]
    pub grafana_tls_key: Option<PathBuf>,

    /// Subscription store backend.
    #[arg(long, env = "STORE_TYPE", value_enum, ignore_case = true, default_value_t = StoreType::Sqlite)]
    pub store_type: StoreType,

    /// Key prefix for subscription records.
    #[arg(long, env = "STORE_KEY_PREFIX", default_value = anno_store::DEFAULT_KEY_PREFIX)]
    pub store_key_prefix: String,

    /// Database file for the sqlite backend.
    #[arg(long, env = "BOLT_PATH", default_value = anno_store::DEFAULT_SQLITE_PATH)]
    pub store_path: PathBuf,

    /// etcd endpoints, comma separated.
    #[arg(long, env = "ETCD_URL", value_delimiter = ',', default_value = "http://localhost:2379")]
    pub etcd_endpoints: Vec<String>,

    /// Talk to etcd without loading TLS material.
    #[arg(long, env = "ETCD_TLS_INSECURE")]
    pub etcd_tls_insecure: bool,

    /// Accept any certificate from etcd.
    #[arg(long, env = "ETCD_TLS_INSECURE_SKIP_VERIFY")]
    pub etcd_tls_insecure_skip_verify: bool,

    /// Client certificate for etcd (PEM).
    #[arg(long, env = "ETCD_TLS_CERT")]
    pub etcd_tls_cert: Option<PathBuf>,

    /// Client key for etcd (PKCS#8 PEM).
    #[arg(long, env = "ETCD_TLS_KEY")]
    pub etcd_tls_key: Option<PathBuf>,

    /// CA bundle for etcd (PEM).
    #[arg(long, env = "ETCD_TLS_CA")]
    pub etcd_tls_ca: Option<PathBuf>,

    /// Log verbosity. `RUST_LOG` overrides it.
    #[arg(long, env = "LOG_LEVEL", value_enum, ignore_case = true, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_JSON")]
    pub log_json: bool,

    /// Telegram bot token.
    #[arg(long, env = "TELEGRAM_TOKEN", hide_env_values = true)]
    pub telegram_token: String,

    /// Telegram user ids allowed to run commands, comma separated.
    #[arg(long, env = "TELEGRAM_ADMIN", value_delimiter = ',', required = true)]
    pub telegram_admin: Vec<i64>,

    /// Message template file.
    #[arg(long, env = "TEMPLATE_PATH")]
    pub template_path: PathBuf,
}

/// Subscription store backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StoreType {
    /// Embedded single-file database.
    #[value(alias = "bolt")]
    Sqlite,
    /// etcd v3 cluster.
    Etcd,
    /// Process memory; subscriptions are lost on exit.
    Memory,
}

/// Log verbosity levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// Errors only.
    Error,
    /// Warnings and errors.
    Warn,
    /// Normal operation.
    Info,
    /// Everything, including per-message delivery.
    Debug,
}

impl LogLevel {
    /// Returns the matching tracing filter.
    #[must_use]
    pub const fn filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::ERROR,
            Self::Warn => LevelFilter::WARN,
            Self::Info => LevelFilter::INFO,
            Self::Debug => LevelFilter::DEBUG,
        }
    }
}
