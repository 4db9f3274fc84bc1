//! Shared resource plumbing: id validation and header checks.

use crate::{FhirError, FhirResult};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Maximum length of a FHIR logical id.
const MAX_ID_LEN: usize = 64;

/// A FHIR logical id (`[A-Za-z0-9\-\.]{1,64}`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FhirId(String);

impl FhirId {
    /// Validates a logical id.
    ///
    /// # Errors
    ///
    /// Returns [`FhirError::InvalidId`] if `input` is empty, longer than 64 characters, or contains
    /// characters outside the FHIR id alphabet.
    pub fn parse(input: &str) -> FhirResult<Self> {
        let valid = !input.is_empty()
            && input.len() <= MAX_ID_LEN
            && input
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.');
        if !valid {
            return Err(FhirError::InvalidId(format!(
                "expected 1-{MAX_ID_LEN} characters of [A-Za-z0-9-.], got '{input}'"
            )));
        }
        Ok(Self(input.to_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FhirId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The two fields every consumed resource must carry.
///
/// Unknown keys are allowed: the rest of the resource is opaque to this crate.
#[derive(Deserialize)]
struct ResourceHeader {
    #[serde(rename = "resourceType")]
    resource_type: String,
    id: String,
}

/// Validate `value` as a resource of `expected_type` and return its id.
///
/// Schema mismatches report the failing path (for example `id`) via `serde_path_to_error`.
pub(crate) fn validate(expected_type: &str, value: &Value) -> FhirResult<FhirId> {
    if !value.is_object() {
        return Err(FhirError::InvalidInput(format!(
            "{expected_type} resource must be a JSON object"
        )));
    }

    let header = match serde_path_to_error::deserialize::<_, ResourceHeader>(value) {
        Ok(header) => header,
        Err(err) => {
            let path = err.path().to_string();
            let source = err.into_inner();
            let path = if path.is_empty() || path == "." {
                "<root>"
            } else {
                path.as_str()
            };
            return Err(FhirError::Translation(format!(
                "{expected_type} schema mismatch at {path}: {source}"
            )));
        }
    };

    if header.resource_type != expected_type {
        return Err(FhirError::InvalidInput(format!(
            "Expected resourceType '{expected_type}', got '{}'",
            header.resource_type
        )));
    }

    FhirId::parse(&header.id)
}

/// Best-effort display name from the first `HumanName` entry.
///
/// Prefers `text`, otherwise joins `given` names and `family`.
pub(crate) fn display_name(value: &Value) -> Option<String> {
    let name = value.get("name")?.as_array()?.first()?;

    if let Some(text) = name.get("text").and_then(Value::as_str) {
        let text = text.trim();
        if !text.is_empty() {
            return Some(text.to_owned());
        }
    }

    let mut parts: Vec<&str> = name
        .get("given")
        .and_then(Value::as_array)
        .map(|given| given.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    if let Some(family) = name.get("family").and_then(Value::as_str) {
        parts.push(family);
    }

    let joined = parts.join(" ");
    if joined.trim().is_empty() {
        None
    } else {
        Some(joined)
    }
}
