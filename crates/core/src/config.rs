//! Core runtime configuration.
//!
//! This module defines configuration that should be resolved once at process startup and then
//! passed into the CDS services. Nothing in the request path reads environment variables; the
//! binaries read them and hand the values to the `*_from_env_value` helpers below.

use crate::constants::{CDS_SERVICES_SEGMENT, DEFAULT_REQUEST_TIMEOUT_SECS, HIDE_ASSESSMENT_CARD_SEGMENT};
use crate::{CdsError, CdsResult};
use reqwest::Url;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CdsConfig {
    base_url: Url,
    request_timeout: Duration,
    app_registry_file: Option<PathBuf>,
}

impl CdsConfig {
    /// Create a new `CdsConfig`.
    ///
    /// `base_url` must be an absolute `http` or `https` URL. Trailing slashes are dropped so
    /// `http://cds.local/` and `http://cds.local` build identical endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`CdsError::InvalidConfig`] if the URL does not parse, uses another scheme, or
    /// `request_timeout` is zero.
    pub fn new(base_url: &str, request_timeout: Duration) -> CdsResult<Self> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            return Err(CdsError::InvalidConfig("CDS base URL cannot be empty".into()));
        }

        let mut url = Url::parse(trimmed)
            .map_err(|e| CdsError::InvalidConfig(format!("invalid CDS base URL '{trimmed}': {e}")))?;

        if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
            return Err(CdsError::InvalidConfig(format!(
                "CDS base URL must be an http(s) URL, got '{trimmed}'"
            )));
        }
        if url.query().is_some() || url.fragment().is_some() {
            return Err(CdsError::InvalidConfig(
                "CDS base URL must not carry a query or fragment".into(),
            ));
        }

        let path = url.path().trim_end_matches('/').to_owned();
        url.set_path(&path);

        if request_timeout.is_zero() {
            return Err(CdsError::InvalidConfig(
                "request timeout must be greater than zero".into(),
            ));
        }

        Ok(Self {
            base_url: url,
            request_timeout,
            app_registry_file: None,
        })
    }

    /// Attach a YAML app registry file (see [`crate::StaticAppRegistry::load`]).
    pub fn with_app_registry_file(mut self, path: Option<PathBuf>) -> Self {
        self.app_registry_file = path;
        self
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    pub fn app_registry_file(&self) -> Option<&Path> {
        self.app_registry_file.as_deref()
    }

    /// `GET` endpoint for the service catalog: `{base}/cds-services`.
    pub fn services_url(&self) -> Url {
        self.endpoint(&[CDS_SERVICES_SEGMENT])
    }

    /// `POST` endpoint for one service: `{base}/cds-services/{id}`.
    ///
    /// The id is percent-encoded as a single path segment.
    pub fn service_url(&self, service_id: &str) -> Url {
        self.endpoint(&[CDS_SERVICES_SEGMENT, service_id])
    }

    /// `POST` endpoint for hiding an assessment card.
    pub fn hide_card_url(&self) -> Url {
        self.endpoint(&[CDS_SERVICES_SEGMENT, HIDE_ASSESSMENT_CARD_SEGMENT])
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // `new` rejects cannot-be-a-base URLs, so segments are always available.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// Resolve the base URL from an optional environment value.
///
/// Required; there is no default endpoint.
pub fn base_url_from_env_value(value: Option<String>) -> CdsResult<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| CdsError::InvalidConfig("CDS_BASE_URL is not set".into()))
}

/// Parse the request timeout (whole seconds) from an optional environment value.
///
/// If `value` is `None` or empty/whitespace, returns the default of 30 seconds.
pub fn request_timeout_from_env_value(value: Option<String>) -> CdsResult<Duration> {
    let value = value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty());

    let secs = match value {
        Some(v) => v.parse::<u64>().map_err(|e| {
            CdsError::InvalidConfig(format!("CDS_REQUEST_TIMEOUT_SECS '{v}' is not a number: {e}"))
        })?,
        None => DEFAULT_REQUEST_TIMEOUT_SECS,
    };

    Ok(Duration::from_secs(secs))
}

/// Optional registry file path; blank means none.
pub fn app_registry_file_from_env_value(value: Option<String>) -> Option<PathBuf> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}

/// Build a [`CdsConfig`] from the raw `CDS_*` environment values.
///
/// # Errors
///
/// Returns [`CdsError::InvalidConfig`] if the base URL is missing or invalid, or the timeout does
/// not parse.
pub fn config_from_env_values(
    base_url: Option<String>,
    request_timeout: Option<String>,
    app_registry_file: Option<String>,
) -> CdsResult<CdsConfig> {
    let base_url = base_url_from_env_value(base_url)?;
    let timeout = request_timeout_from_env_value(request_timeout)?;
    Ok(CdsConfig::new(&base_url, timeout)?
        .with_app_registry_file(app_registry_file_from_env_value(app_registry_file)))
}
