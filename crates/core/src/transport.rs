//! HTTP transport seam.
//!
//! Every component talks to the decision-support service through [`CdsTransport`], which speaks
//! JSON in and JSON out. [`HttpTransport`] is the `reqwest` implementation used in production;
//! tests substitute a scripted transport.
//!
//! Response bodies are decoded as follows:
//! - non-2xx status: [`TransportError::Status`] with the raw body text
//! - empty body: JSON `null`
//! - body that is not JSON: a JSON string holding the text, so callers decide whether that shape
//!   is acceptable (an opaque acknowledgement is; a card list is not)

use crate::config::CdsConfig;
use crate::{CdsError, CdsResult};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, HeaderValue};
use reqwest::Url;
use serde_json::Value;

/// Failure below the protocol layer.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("server responded with status {status}")]
    Status { status: u16, body: String },
}

/// JSON-over-HTTP operations used by the CDS client.
#[async_trait]
pub trait CdsTransport: Send + Sync {
    /// `GET url`, returning the decoded body.
    async fn get_json(&self, url: &Url) -> Result<Value, TransportError>;

    /// `POST url` with a JSON body, returning the decoded response body.
    async fn post_json(&self, url: &Url, body: &Value) -> Result<Value, TransportError>;
}

/// `reqwest`-backed transport.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client honouring the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`CdsError::InvalidConfig`] if the TLS backend or client cannot be initialised.
    pub fn new(cfg: &CdsConfig) -> CdsResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.request_timeout())
            .build()
            .map_err(|e| CdsError::InvalidConfig(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CdsTransport for HttpTransport {
    async fn get_json(&self, url: &Url) -> Result<Value, TransportError> {
        let response = self
            .client
            .get(url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .send()
            .await
            .map_err(classify)?;
        read_body(response).await
    }

    async fn post_json(&self, url: &Url, body: &Value) -> Result<Value, TransportError> {
        let response = self
            .client
            .post(url.clone())
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .json(body)
            .send()
            .await
            .map_err(classify)?;
        read_body(response).await
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

async fn read_body(response: reqwest::Response) -> Result<Value, TransportError> {
    let status = response.status();
    let text = response.text().await.map_err(classify)?;

    if !status.is_success() {
        return Err(TransportError::Status {
            status: status.as_u16(),
            body: text,
        });
    }

    Ok(decode_body(&text))
}

pub(crate) fn decode_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_owned()))
}
