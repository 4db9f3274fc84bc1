//! The patient in view.
//!
//! Responsibilities:
//! - Validate that the supplied JSON is a `Patient` resource with a usable id
//! - Produce the `Patient/{id}` reference used as the hook's `patient` context
//! - Carry the resource verbatim into the prefetch bundle

use crate::resource::{display_name, validate};
use crate::{FhirId, FhirResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A validated FHIR `Patient` resource.
#[derive(Clone, Debug, PartialEq)]
pub struct PatientResource {
    id: FhirId,
    json: Value,
}

impl PatientResource {
    pub const RESOURCE_TYPE: &'static str = "Patient";

    /// Wrap a JSON value after checking `resourceType` and `id`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::FhirError`] if the value is not an object, `resourceType` is not
    /// `"Patient"`, or `id` is missing or malformed.
    pub fn from_json(json: Value) -> FhirResult<Self> {
        let id = validate(Self::RESOURCE_TYPE, &json)?;
        Ok(Self { id, json })
    }

    /// Parse JSON text and wrap it.
    pub fn from_json_str(text: &str) -> FhirResult<Self> {
        Self::from_json(serde_json::from_str(text)?)
    }

    pub fn id(&self) -> &FhirId {
        &self.id
    }

    /// Relative reference, e.g. `Patient/123`.
    pub fn reference(&self) -> String {
        format!("{}/{}", Self::RESOURCE_TYPE, self.id)
    }

    /// The resource exactly as supplied.
    pub fn as_json(&self) -> &Value {
        &self.json
    }

    pub fn display_name(&self) -> Option<String> {
        display_name(&self.json)
    }
}

impl Serialize for PatientResource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.json.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PatientResource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let json = Value::deserialize(deserializer)?;
        PatientResource::from_json(json).map_err(serde::de::Error::custom)
    }
}
