use flate2::write::ZlibEncoder;
use flate2::Compression;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::future::Future;
use std::io::Write;
use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{Result, SdError};

/// Header carrying the shared API secret.
pub const SECRET_HEADER: &str = "X-API-SECRET";

/// Request/response channel to the task backend.
///
/// One call posts `payload` to `{service}/{method}` and yields the `data`
/// object of a successful response envelope. [`HttpTransport`] is the real
/// implementation; tests substitute scripted ones.
pub trait Transport: Send + Sync {
    fn call(
        &self,
        service: &str,
        method: &str,
        payload: &Value,
        timeout: Duration,
    ) -> impl Future<Output = Result<Value>> + Send;
}

/// A request body ready to send.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBody {
    pub bytes: Vec<u8>,
    /// Whether `bytes` is zlib/deflate compressed.
    pub compressed: bool,
}

/// Compress `raw` when it is longer than `threshold` bytes.
pub fn encode_body(raw: Vec<u8>, threshold: usize) -> Result<EncodedBody> {
    if raw.len() <= threshold {
        return Ok(EncodedBody {
            bytes: raw,
            compressed: false,
        });
    }
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    Ok(EncodedBody {
        bytes: encoder.finish()?,
        compressed: true,
    })
}

/// The `{code, msg, data}` wrapper around every backend response.
#[derive(Debug, Deserialize)]
pub struct Envelope {
    pub code: i64,
    #[serde(default)]
    pub msg: Option<String>,
    #[serde(default)]
    pub data: Option<Value>,
}

impl Envelope {
    /// Unwrap the payload, turning a non-zero code into [`SdError::Api`].
    pub fn into_data(self) -> Result<Value> {
        if self.code != 0 {
            return Err(SdError::Api {
                code: self.code,
                message: self.msg.unwrap_or_default(),
            });
        }
        Ok(self.data.unwrap_or(Value::Null))
    }
}

fn normalize(endpoint: &str) -> String {
    endpoint.trim_end_matches('/').to_string()
}

/// [`Transport`] over HTTP with `reqwest`.
///
/// Cloning is cheap and clones share one connection pool.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    base_url: String,
    prefix: String,
    secret: String,
    compress_threshold: usize,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            http: Client::new(),
            base_url: normalize(&config.api_base_url),
            prefix: normalize(&config.api_prefix),
            secret: config.api_secret.clone(),
            compress_threshold: config.poll.compress_threshold,
        }
    }

    /// Use a custom `reqwest::Client` (for proxies, TLS, pool tuning).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Full URL for a service method.
    pub fn url(&self, service: &str, method: &str) -> String {
        format!("{}{}/{}/{}", self.base_url, self.prefix, service, method)
    }
}

impl Transport for HttpTransport {
    async fn call(
        &self,
        service: &str,
        method: &str,
        payload: &Value,
        timeout: Duration,
    ) -> Result<Value> {
        let url = self.url(service, method);
        let body = encode_body(serde_json::to_vec(payload)?, self.compress_threshold)?;
        tracing::trace!(
            url = %url,
            bytes = body.bytes.len(),
            compressed = body.compressed,
            "sending request"
        );

        let mut request = self
            .http
            .post(&url)
            .timeout(timeout)
            .header(CONTENT_TYPE, "application/json")
            .header(SECRET_HEADER, &self.secret);
        if body.compressed {
            request = request.header(CONTENT_ENCODING, "deflate");
        }

        let resp = request
            .body(body.bytes)
            .send()
            .await
            .map_err(|e| SdError::from_reqwest(format!("POST {}", url), e))?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = match resp.text().await {
                Ok(text) => text,
                Err(e) => {
                    tracing::debug!(url = %url, status, error = %e, "failed to read error body");
                    String::new()
                }
            };
            return Err(SdError::Http { status, body });
        }

        let bytes = resp
            .bytes()
            .await
            .map_err(|e| SdError::from_reqwest(format!("Reading response of {}", url), e))?;

        let envelope: Envelope = serde_json::from_slice(&bytes)?;
        envelope.into_data()
    }
}
