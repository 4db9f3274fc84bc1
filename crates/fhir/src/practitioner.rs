//! The practitioner in context.
//!
//! An authorised practitioner is not always available (service accounts, kiosk sessions). Callers
//! pass `Option<&PractitionerResource>` explicitly; there is no process-wide practitioner state.

use crate::resource::{display_name, validate};
use crate::{FhirId, FhirResult};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// A validated FHIR `Practitioner` resource.
#[derive(Clone, Debug, PartialEq)]
pub struct PractitionerResource {
    id: FhirId,
    json: Value,
}

impl PractitionerResource {
    pub const RESOURCE_TYPE: &'static str = "Practitioner";

    /// Wrap a JSON value after checking `resourceType` and `id`.
    pub fn from_json(json: Value) -> FhirResult<Self> {
        let id = validate(Self::RESOURCE_TYPE, &json)?;
        Ok(Self { id, json })
    }

    pub fn from_json_str(text: &str) -> FhirResult<Self> {
        Self::from_json(serde_json::from_str(text)?)
    }

    pub fn id(&self) -> &FhirId {
        &self.id
    }

    /// Relative reference, e.g. `Practitioner/abc`.
    pub fn reference(&self) -> String {
        format!("{}/{}", Self::RESOURCE_TYPE, self.id)
    }

    pub fn as_json(&self) -> &Value {
        &self.json
    }

    pub fn display_name(&self) -> Option<String> {
        display_name(&self.json)
    }
}

impl Serialize for PractitionerResource {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.json.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for PractitionerResource {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let json = Value::deserialize(deserializer)?;
        PractitionerResource::from_json(json).map_err(serde::de::Error::custom)
    }
}
