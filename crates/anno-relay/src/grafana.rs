//! Grafana HTTP API client.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anno_store::backend::BoxFuture;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use url::Url;

use crate::error::SourceError;
use crate::event::{Annotation, HealthStatus};
use crate::source::{AnnotationSource, ScrapeWindow};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest error body kept in a [`SourceError::Status`].
const MAX_ERROR_BODY: usize = 512;

/// TLS options for reaching Grafana.
#[derive(Debug, Clone, Default)]
pub struct GrafanaTlsConfig {
    /// Skip loading any TLS material.
    pub insecure: bool,
    /// Accept any server certificate.
    pub insecure_skip_verify: bool,
    /// Client certificate (PEM).
    pub cert: Option<PathBuf>,
    /// Client private key (PKCS#8 PEM).
    pub key: Option<PathBuf>,
}

/// Connection settings for [`GrafanaClient`].
#[derive(Debug, Clone)]
pub struct GrafanaConfig {
    /// Base URL, possibly with a sub-path (`https://ops.example/grafana`).
    pub url: Url,
    /// API token sent as a bearer token.
    pub token: String,
    /// TLS options.
    pub tls: GrafanaTlsConfig,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl GrafanaConfig {
    /// Creates a config with default TLS options and timeout.
    #[must_use]
    pub fn new(url: Url, token: impl Into<String>) -> Self {
        Self {
            url,
            token: token.into(),
            tls: GrafanaTlsConfig::default(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Sets the TLS options.
    #[must_use]
    pub fn with_tls(mut self, tls: GrafanaTlsConfig) -> Self {
        self.tls = tls;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Reads health and annotations from a Grafana instance.
#[derive(Debug, Clone)]
pub struct GrafanaClient {
    http: reqwest::Client,
    base: Url,
}

impl GrafanaClient {
    /// Builds a client. No request is made.
    ///
    /// # Errors
    ///
    /// Returns `SourceError::Config` for a non-HTTP URL, an unusable token,
    /// or TLS material that cannot be loaded.
    pub fn new(config: &GrafanaConfig) -> Result<Self, SourceError> {
        if !matches!(config.url.scheme(), "http" | "https") {
            return Err(SourceError::Config(format!(
                "grafana url must be http or https, got '{}'",
                config.url
            )));
        }
        if config.url.cannot_be_a_base() {
            return Err(SourceError::Config(format!(
                "grafana url '{}' cannot be a base url",
                config.url
            )));
        }

        let mut auth = HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|_| SourceError::Config("grafana token contains invalid characters".to_string()))?;
        auth.set_sensitive(true);
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        let mut builder = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .danger_accept_invalid_certs(!config.tls.insecure && config.tls.insecure_skip_verify);

        match (&config.tls.cert, &config.tls.key) {
            _ if config.tls.insecure => {}
            (Some(cert), Some(key)) => {
                let cert_pem = read_pem(cert)?;
                let key_pem = read_pem(key)?;
                let identity = reqwest::Identity::from_pkcs8_pem(&cert_pem, &key_pem).map_err(|e| {
                    SourceError::Config(format!("could not load grafana client certificate: {e}"))
                })?;
                builder = builder.identity(identity);
            }
            (None, None) => {}
            _ => {
                return Err(SourceError::Config(
                    "grafana client certificate and key must be given together".to_string(),
                ));
            }
        }

        let http = builder
            .build()
            .map_err(|e| SourceError::Config(format!("could not build grafana client: {e}")))?;

        Ok(Self {
            http,
            base: config.url.clone(),
        })
    }

    /// Returns the URL for an API path below the base URL.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn annotations_url(&self, window: ScrapeWindow) -> Url {
        let mut url = self.endpoint(&["api", "annotations"]);
        url.query_pairs_mut()
            .append_pair("from", &window.from_ms().to_string())
            .append_pair("to", &window.to_ms().to_string());
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, SourceError> {
        debug!(url = %url, "grafana request");
        let response = self.http.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| body.is_char_boundary(*i))
                    .unwrap_or(0);
                body.truncate(cut);
            }
            warn!(status = status.as_u16(), "grafana request failed");
            return Err(SourceError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, SourceError> {
    std::fs::read(path)
        .map_err(|e| SourceError::Config(format!("cannot read {}: {e}", path.display())))
}

impl AnnotationSource for GrafanaClient {
    fn health(&self) -> BoxFuture<'_, Result<HealthStatus, SourceError>> {
        Box::pin(async move { self.get_json(self.endpoint(&["api", "health"])).await })
    }

    fn annotations(&self, window: ScrapeWindow) -> BoxFuture<'_, Result<Vec<Annotation>, SourceError>> {
        Box::pin(async move { self.get_json(self.annotations_url(window)).await })
    }
}
