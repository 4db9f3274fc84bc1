use crate::transport::TransportError;
use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
pub enum CdsError {
    #[error("failed to fetch CDS service catalog: {0}")]
    CatalogFetch(#[source] TransportError),
    #[error("CDS service catalog has an unexpected shape: {0}")]
    CatalogShape(String),

    #[error("invocation of CDS service '{service_id}' failed: {source}")]
    Invocation {
        service_id: String,
        #[source]
        source: TransportError,
    },
    #[error("CDS service '{service_id}' returned an unexpected response: {message}")]
    InvocationShape { service_id: String, message: String },
    #[error("unknown CDS service '{0}'")]
    UnknownService(String),

    #[error("failed to resolve launchable app for '{url}': {message}")]
    LinkResolution { url: String, message: String },
    #[error("app registry error: {0}")]
    Registry(String),

    #[error("failed to hide assessment card: {0}")]
    Dismissal(#[source] TransportError),
    #[error("card has no encounter context; dismissal is unavailable")]
    DismissalUnavailable,

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("patient view fetch was cancelled")]
    Cancelled,

    #[error("FHIR error: {0}")]
    Fhir(#[from] fhir::FhirError),
}

pub type CdsResult<T> = std::result::Result<T, CdsError>;

impl CdsError {
    /// Stable machine-readable name of the failure class.
    pub fn kind(&self) -> &'static str {
        match self {
            CdsError::CatalogFetch(_) => "catalog_fetch",
            CdsError::CatalogShape(_) => "catalog_shape",
            CdsError::Invocation { .. } => "invocation",
            CdsError::InvocationShape { .. } => "invocation_shape",
            CdsError::UnknownService(_) => "unknown_service",
            CdsError::LinkResolution { .. } => "link_resolution",
            CdsError::Registry(_) => "registry",
            CdsError::Dismissal(_) => "dismissal",
            CdsError::DismissalUnavailable => "dismissal_unavailable",
            CdsError::InvalidConfig(_) => "invalid_config",
            CdsError::Cancelled => "cancelled",
            CdsError::Fhir(_) => "fhir",
        }
    }

    /// The transport failure underneath this error, if any.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            CdsError::CatalogFetch(source)
            | CdsError::Invocation { source, .. }
            | CdsError::Dismissal(source) => Some(source),
            _ => None,
        }
    }

    /// Structured payload the presentation layer shows in place of a failed service's cards.
    ///
    /// Always carries `kind` and `message`. HTTP status failures add `status` and the response
    /// `body` (as JSON when the body parses, otherwise as text).
    pub fn diagnostic(&self) -> Value {
        let mut diagnostic = json!({
            "kind": self.kind(),
            "message": self.to_string(),
        });

        if let Some(TransportError::Status { status, body }) = self.transport_error() {
            diagnostic["status"] = json!(status);
            if !body.trim().is_empty() {
                diagnostic["body"] = serde_json::from_str::<Value>(body)
                    .unwrap_or_else(|_| Value::String(body.clone()));
            }
        }

        diagnostic
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_carries_status_and_json_body() {
        let err = CdsError::Invocation {
            service_id: "fall-risk".into(),
            source: TransportError::Status {
                status: 500,
                body: r#"{"error":"boom"}"#.into(),
            },
        };

        let diagnostic = err.diagnostic();
        assert_eq!(diagnostic["kind"], "invocation");
        assert_eq!(diagnostic["status"], 500);
        assert_eq!(diagnostic["body"]["error"], "boom");
        assert!(diagnostic["message"]
            .as_str()
            .unwrap()
            .contains("fall-risk"));
    }

    #[test]
    fn test_diagnostic_keeps_text_body() {
        let err = CdsError::Dismissal(TransportError::Status {
            status: 404,
            body: "not found".into(),
        });
        assert_eq!(err.diagnostic()["body"], "not found");
    }

    #[test]
    fn test_diagnostic_without_transport_error_has_no_status() {
        let diagnostic = CdsError::DismissalUnavailable.diagnostic();
        assert_eq!(diagnostic["kind"], "dismissal_unavailable");
        assert!(diagnostic.get("status").is_none());
    }
}
