//! Validated runtime settings.

use std::path::PathBuf;
use std::time::Duration;

use anno_relay::{GrafanaConfig, GrafanaTlsConfig};
use anno_store::{BackendConfig, EtcdConfig, EtcdTlsConfig, StoreConfig};
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::cli::{Cli, LogLevel, StoreType};

/// Longest accepted scrape interval.
pub const MAX_SCRAPE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\d+(?:\.\d+)?(?:ms|s|m|h))+$").unwrap_or_else(|_| unreachable!())
});

static DURATION_PART: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)(ms|s|m|h)").unwrap_or_else(|_| unreachable!())
});

/// Errors in the bot's settings.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A duration string could not be parsed.
    #[error("invalid duration '{0}': expected e.g. 500ms, 10s, 5m, 1h30m")]
    InvalidDuration(String),

    /// A setting is out of range or inconsistent with another.
    #[error("invalid setting {name}: {reason}")]
    Invalid {
        /// Flag name.
        name: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name,
            reason: reason.into(),
        }
    }
}

/// Parses a duration such as `500ms`, `10s`, `5m`, `1h30m` or `1.5h`.
/// A bare `0` is zero.
///
/// # Errors
///
/// Returns `ConfigError::InvalidDuration` for anything else.
pub fn parse_duration(input: &str) -> Result<Duration, ConfigError> {
    let trimmed = input.trim();
    if trimmed == "0" {
        return Ok(Duration::ZERO);
    }
    if !DURATION.is_match(trimmed) {
        return Err(ConfigError::InvalidDuration(input.to_string()));
    }

    let mut total = Duration::ZERO;
    for part in DURATION_PART.captures_iter(trimmed) {
        let value: f64 = part[1]
            .parse()
            .map_err(|_| ConfigError::InvalidDuration(input.to_string()))?;
        let seconds = match &part[2] {
            "ms" => value / 1000.0,
            "s" => value,
            "m" => value * 60.0,
            _ => value * 3600.0,
        };
        total = Duration::try_from_secs_f64(seconds)
            .ok()
            .and_then(|part| total.checked_add(part))
            .ok_or_else(|| ConfigError::InvalidDuration(input.to_string()))?;
    }
    Ok(total)
}

/// Everything the bot needs to start, checked for consistency.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Grafana connection.
    pub grafana: GrafanaConfig,
    /// Time between polls.
    pub scrape_interval: Duration,
    /// Subscription store.
    pub store: StoreConfig,
    /// Telegram bot token.
    pub telegram_token: String,
    /// User ids allowed to run commands.
    pub admins: Vec<i64>,
    /// Message template file.
    pub template_path: PathBuf,
    /// Log verbosity.
    pub log_level: LogLevel,
    /// Emit JSON logs.
    pub log_json: bool,
}

fn pair(
    name: &'static str,
    cert: Option<PathBuf>,
    key: Option<PathBuf>,
) -> Result<(Option<PathBuf>, Option<PathBuf>), ConfigError> {
    if cert.is_some() != key.is_some() {
        return Err(ConfigError::invalid(name, "certificate and key must be given together"));
    }
    Ok((cert, key))
}

fn not_blank(name: &'static str, value: String) -> Result<String, ConfigError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ConfigError::invalid(name, "must not be empty"));
    }
    Ok(trimmed.to_string())
}

impl TryFrom<Cli> for Settings {
    type Error = ConfigError;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        if !matches!(cli.grafana_url.scheme(), "http" | "https") {
            return Err(ConfigError::invalid(
                "--grafana-url",
                format!("scheme must be http or https, got '{}'", cli.grafana_url.scheme()),
            ));
        }
        if cli.grafana_scrape_interval.is_zero() {
            return Err(ConfigError::invalid(
                "--grafana-scrape-interval",
                "must be greater than zero",
            ));
        }
        if cli.grafana_scrape_interval > MAX_SCRAPE_INTERVAL {
            return Err(ConfigError::invalid(
                "--grafana-scrape-interval",
                format!("must be at most {}h", MAX_SCRAPE_INTERVAL.as_secs() / 3600),
            ));
        }
        if cli.store_key_prefix.trim_matches('/').is_empty() {
            return Err(ConfigError::invalid("--store-key-prefix", "must not be empty"));
        }
        if cli.telegram_admin.is_empty() {
            return Err(ConfigError::invalid("--telegram-admin", "at least one admin is required"));
        }

        let (cert, key) = pair("--grafana-tls-cert", cli.grafana_tls_cert, cli.grafana_tls_key)?;
        let grafana = GrafanaConfig::new(cli.grafana_url, not_blank("--grafana-token", cli.grafana_token)?)
            .with_tls(GrafanaTlsConfig {
                insecure: cli.grafana_tls_insecure,
                insecure_skip_verify: cli.grafana_tls_insecure_skip_verify,
                cert,
                key,
            });

        let backend = match cli.store_type {
            StoreType::Sqlite => BackendConfig::Sqlite { path: cli.store_path },
            StoreType::Memory => BackendConfig::Memory,
            StoreType::Etcd => {
                let endpoints: Vec<String> = cli
                    .etcd_endpoints
                    .iter()
                    .map(|e| e.trim().to_string())
                    .filter(|e| !e.is_empty())
                    .collect();
                if endpoints.is_empty() {
                    return Err(ConfigError::invalid("--etcd-endpoints", "at least one endpoint is required"));
                }
                let (cert, key) = pair("--etcd-tls-cert", cli.etcd_tls_cert, cli.etcd_tls_key)?;
                BackendConfig::Etcd(EtcdConfig::new(endpoints).with_tls(EtcdTlsConfig {
                    insecure: cli.etcd_tls_insecure,
                    insecure_skip_verify: cli.etcd_tls_insecure_skip_verify,
                    cert,
                    key,
                    ca: cli.etcd_tls_ca,
                }))
            }
        };

        Ok(Self {
            grafana,
            scrape_interval: cli.grafana_scrape_interval,
            store: StoreConfig::new(backend).with_key_prefix(cli.store_key_prefix),
            telegram_token: not_blank("--telegram-token", cli.telegram_token)?,
            admins: cli.telegram_admin,
            template_path: cli.template_path,
            log_level: cli.log_level,
            log_json: cli.log_json,
        })
    }
}
