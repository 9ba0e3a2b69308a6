//! etcd v3 backend over the JSON gRPC gateway.
//!
//! Keys and values travel base64-encoded in JSON bodies posted to
//! `/v3/kv/put`, `/v3/kv/range` and `/v3/kv/deleterange`. Endpoints are
//! tried in order; the first one that answers serves the request.

use std::path::PathBuf;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{BoxFuture, KvBackend, KvPair};
use crate::error::{Result, StoreError};

/// TLS settings for talking to etcd.
#[derive(Debug, Clone, Default)]
pub struct EtcdTlsConfig {
    /// Skip loading any TLS material.
    pub insecure: bool,
    /// Accept any server certificate.
    pub insecure_skip_verify: bool,
    /// Client certificate (PEM).
    pub cert: Option<PathBuf>,
    /// Client private key (PKCS#8 PEM).
    pub key: Option<PathBuf>,
    /// CA bundle used to verify the server (PEM).
    pub ca: Option<PathBuf>,
}

/// Configuration for an etcd backend.
#[derive(Debug, Clone)]
pub struct EtcdConfig {
    /// Cluster endpoints, e.g. `https://etcd-0:2379`. A missing scheme means `http://`.
    pub endpoints: Vec<String>,
    /// TLS settings.
    pub tls: EtcdTlsConfig,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl EtcdConfig {
    /// Creates a configuration for the given endpoints.
    #[must_use]
    pub fn new(endpoints: Vec<String>) -> Self {
        Self {
            endpoints,
            tls: EtcdTlsConfig::default(),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Sets the TLS settings.
    #[must_use]
    pub fn with_tls(mut self, tls: EtcdTlsConfig) -> Self {
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

/// A backend storing pairs in an etcd v3 cluster.
#[derive(Debug, Clone)]
pub struct EtcdBackend {
    http: reqwest::Client,
    endpoints: Vec<String>,
}

impl EtcdBackend {
    /// Builds a backend from `config`. No request is made.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Config` if no endpoint is given or TLS material
    /// cannot be loaded.
    pub fn new(config: &EtcdConfig) -> Result<Self> {
        let endpoints: Vec<String> = config
            .endpoints
            .iter()
            .map(|e| normalize_endpoint(e))
            .filter(|e| !e.is_empty())
            .collect();

        if endpoints.is_empty() {
            return Err(StoreError::Config(
                "at least one etcd endpoint is required".to_string(),
            ));
        }

        let mut builder = reqwest::Client::builder().timeout(config.request_timeout);

        if !config.tls.insecure {
            builder = builder.danger_accept_invalid_certs(config.tls.insecure_skip_verify);

            match (&config.tls.cert, &config.tls.key) {
                (Some(cert), Some(key)) => {
                    let cert_pem = std::fs::read(cert)?;
                    let key_pem = std::fs::read(key)?;
                    let identity = reqwest::Identity::from_pkcs8_pem(&cert_pem, &key_pem)
                        .map_err(|e| {
                            StoreError::Config(format!("could not load etcd client certificate: {e}"))
                        })?;
                    builder = builder.identity(identity);
                }
                (None, None) => {}
                _ => {
                    return Err(StoreError::Config(
                        "etcd client certificate and key must be given together".to_string(),
                    ));
                }
            }

            if let Some(ca) = &config.tls.ca {
                let ca_pem = std::fs::read(ca)?;
                let ca_cert = reqwest::Certificate::from_pem(&ca_pem).map_err(|e| {
                    StoreError::Config(format!("could not load etcd CA certificate: {e}"))
                })?;
                builder = builder.add_root_certificate(ca_cert);
            }
        }

        let http = builder
            .build()
            .map_err(|e| StoreError::Config(format!("could not build etcd client: {e}")))?;

        Ok(Self { http, endpoints })
    }

    /// Returns the normalized endpoints.
    #[must_use]
    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    async fn call<B, R>(&self, path: &str, body: &B) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut last_err = None;

        for endpoint in &self.endpoints {
            let url = format!("{endpoint}{path}");
            let response = match self.http.post(&url).json(body).send().await {
                Ok(response) => response,
                Err(e) => {
                    warn!(endpoint = %endpoint, error = %e, "etcd endpoint unreachable");
                    last_err = Some(StoreError::Http(e));
                    continue;
                }
            };

            let status = response.status();
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(StoreError::Backend(format!(
                    "etcd {path} returned {status}: {text}"
                )));
            }

            debug!(endpoint = %endpoint, path = %path, "etcd request served");
            return response.json::<R>().await.map_err(StoreError::from);
        }

        Err(last_err.unwrap_or_else(|| StoreError::Backend("no etcd endpoint available".to_string())))
    }

    async fn range(&self, request: RangeRequest) -> Result<Vec<KvPair>> {
        let response: RangeResponse = self.call("/v3/kv/range", &request).await?;
        response
            .kvs
            .into_iter()
            .map(|kv| {
                Ok(KvPair {
                    key: decode_text(&kv.key)?,
                    value: decode_bytes(&kv.value)?,
                })
            })
            .collect()
    }
}

impl KvBackend for EtcdBackend {
    fn name(&self) -> &'static str {
        "etcd"
    }

    fn put<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let request = PutRequest {
                key: BASE64.encode(key),
                value: BASE64.encode(value),
            };
            let _: serde_json::Value = self.call("/v3/kv/put", &request).await?;
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        Box::pin(async move {
            let pairs = self.range(RangeRequest::single(key, false)).await?;
            Ok(pairs.into_iter().next().map(|kv| kv.value))
        })
    }

    fn exists<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let pairs = self.range(RangeRequest::single(key, true)).await?;
            Ok(!pairs.is_empty())
        })
    }

    fn delete<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let request = DeleteRangeRequest {
                key: BASE64.encode(key),
            };
            let _: serde_json::Value = self.call("/v3/kv/deleterange", &request).await?;
            Ok(())
        })
    }

    fn list<'a>(&'a self, prefix: &'a str) -> BoxFuture<'a, Result<Vec<KvPair>>> {
        Box::pin(async move {
            let mut pairs = self.range(RangeRequest::prefix(prefix)).await?;
            pairs.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(pairs)
        })
    }
}

#[derive(Debug, Serialize)]
struct PutRequest {
    key: String,
    value: String,
}

#[derive(Debug, Serialize)]
struct DeleteRangeRequest {
    key: String,
}

#[derive(Debug, Serialize)]
struct RangeRequest {
    key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    range_end: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    keys_only: bool,
}

impl RangeRequest {
    fn single(key: &str, keys_only: bool) -> Self {
        Self {
            key: BASE64.encode(key),
            range_end: None,
            keys_only,
        }
    }

    fn prefix(prefix: &str) -> Self {
        Self {
            key: BASE64.encode(prefix),
            range_end: Some(BASE64.encode(prefix_range_end(prefix.as_bytes()))),
            keys_only: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RangeResponse {
    #[serde(default)]
    kvs: Vec<EtcdKv>,
}

#[derive(Debug, Deserialize)]
struct EtcdKv {
    key: String,
    #[serde(default)]
    value: String,
}

/// Returns the smallest key greater than every key starting with `prefix`.
fn prefix_range_end(prefix: &[u8]) -> Vec<u8> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < 0xff {
            end.push(last + 1);
            return end;
        }
    }
    // Every byte was 0xff: range to the end of the keyspace.
    vec![0]
}

fn normalize_endpoint(endpoint: &str) -> String {
    let endpoint = endpoint.trim().trim_end_matches('/');
    if endpoint.is_empty() || endpoint.contains("://") {
        endpoint.to_string()
    } else {
        format!("http://{endpoint}")
    }
}

fn decode_bytes(encoded: &str) -> Result<Vec<u8>> {
    BASE64
        .decode(encoded)
        .map_err(|e| StoreError::Backend(format!("etcd returned invalid base64: {e}")))
}

fn decode_text(encoded: &str) -> Result<String> {
    String::from_utf8(decode_bytes(encoded)?)
        .map_err(|e| StoreError::Backend(format!("etcd returned a non-utf8 key: {e}")))
}
