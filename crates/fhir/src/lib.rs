//! FHIR boundary support for the CDS Hooks client.
//!
//! The decision-support pipeline does not own any FHIR data. It *consumes* the patient in view and
//! the practitioner in context, and forwards them verbatim in the hook prefetch bundle. This crate
//! provides thin, validated wrappers for those resources:
//! - `resourceType` is checked against the expected type
//! - `id` is checked against the FHIR id grammar
//! - the original JSON is preserved untouched for the prefetch
//!
//! FHIR search, CRUD and REST transport are out of scope.

pub mod patient;
pub mod practitioner;
mod resource;

pub use patient::PatientResource;
pub use practitioner::PractitionerResource;
pub use resource::FhirId;

/// Errors returned by the `fhir` boundary crate.
#[derive(Debug, thiserror::Error)]
pub enum FhirError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("translation error: {0}")]
    Translation(String),

    #[error("invalid FHIR id: {0}")]
    InvalidId(String),
}

/// Type alias for Results that can fail with a [`FhirError`].
pub type FhirResult<T> = Result<T, FhirError>;
