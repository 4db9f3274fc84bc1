//! Service catalog discovery.
//!
//! `GET {base}/cds-services` lists the decision-support services available to this client. Two
//! response shapes exist in the wild:
//!
//! ```text
//! { "services": [ { "id": ..., "hook": ..., ... } ] }   // current
//! [ { "id": ..., "hook": ..., ... } ]                   // earliest generation
//! ```
//!
//! Both decode to the same `Vec<ServiceDescriptor>`. The fetcher never retries; failures are
//! returned to the caller, which decides how to display them.

use crate::config::CdsConfig;
use crate::transport::CdsTransport;
use crate::{CdsError, CdsResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

/// One decision-support service advertised by the catalog.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    pub id: String,

    /// Trigger type the service registered for (for example `patient-view`).
    pub hook: String,

    #[serde(default)]
    pub title: String,

    #[serde(default)]
    pub description: String,

    /// Prefetch template keyed by prefetch slot. Non-string template values are dropped.
    #[serde(rename = "prefetch", default, deserialize_with = "string_map")]
    pub prefetch_template: BTreeMap<String, String>,
}

/// The two catalog envelopes, classified before any field-level decoding.
#[derive(Debug)]
enum CatalogEnvelope {
    Enveloped(Value),
    Bare(Value),
}

impl CatalogEnvelope {
    fn classify(body: Value) -> CdsResult<Self> {
        match body {
            Value::Array(_) => Ok(CatalogEnvelope::Bare(body)),
            Value::Object(mut map) => match map.remove("services") {
                Some(services @ Value::Array(_)) => Ok(CatalogEnvelope::Enveloped(services)),
                Some(other) => Err(CdsError::CatalogShape(format!(
                    "'services' must be an array, got {}",
                    json_kind(&other)
                ))),
                None => Err(CdsError::CatalogShape(
                    "object response has no 'services' field".into(),
                )),
            },
            other => Err(CdsError::CatalogShape(format!(
                "expected an object or array, got {}",
                json_kind(&other)
            ))),
        }
    }

    fn into_services(self) -> CdsResult<Vec<ServiceDescriptor>> {
        let items = match self {
            CatalogEnvelope::Enveloped(items) | CatalogEnvelope::Bare(items) => items,
        };

        serde_path_to_error::deserialize::<_, Vec<ServiceDescriptor>>(items).map_err(|err| {
            let path = err.path().to_string();
            let source = err.into_inner();
            CdsError::CatalogShape(format!("service entry mismatch at {path}: {source}"))
        })
    }
}

/// Decode a catalog response body of either generation.
pub fn decode_catalog(body: Value) -> CdsResult<Vec<ServiceDescriptor>> {
    CatalogEnvelope::classify(body)?.into_services()
}

/// Fetches the service catalog from the configured base URL.
#[derive(Clone)]
pub struct CatalogFetcher {
    cfg: Arc<CdsConfig>,
    transport: Arc<dyn CdsTransport>,
}

impl CatalogFetcher {
    pub fn new(cfg: Arc<CdsConfig>, transport: Arc<dyn CdsTransport>) -> Self {
        Self { cfg, transport }
    }

    /// Fetch and decode the catalog.
    ///
    /// An empty catalog is a success.
    ///
    /// # Errors
    ///
    /// - [`CdsError::CatalogFetch`] for network and HTTP status failures
    /// - [`CdsError::CatalogShape`] when the body matches neither envelope
    pub async fn fetch_catalog(&self) -> CdsResult<Vec<ServiceDescriptor>> {
        let url = self.cfg.services_url();
        let body = self
            .transport
            .get_json(&url)
            .await
            .map_err(CdsError::CatalogFetch)?;

        let services = decode_catalog(body)?;
        tracing::info!(count = services.len(), "loaded CDS service catalog");
        Ok(services)
    }
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn string_map<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let map = match value {
        Some(Value::Object(map)) => map
            .into_iter()
            .filter_map(|(k, v)| match v {
                Value::String(s) => Some((k, s)),
                _ => None,
            })
            .collect(),
        _ => BTreeMap::new(),
    };
    Ok(map)
}
