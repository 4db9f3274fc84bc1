//! Constants used throughout the CDS core crate.
//!
//! Endpoint path segments, protocol literals and configuration defaults live here so the wire
//! contract is spelled out in one place.

/// Path segment under the base URL that hosts the service catalog and every service endpoint.
pub const CDS_SERVICES_SEGMENT: &str = "cds-services";

/// Path segment (under [`CDS_SERVICES_SEGMENT`]) that accepts card-hide requests.
pub const HIDE_ASSESSMENT_CARD_SEGMENT: &str = "hide-assessment-card";

/// Hook sent with every invocation: the patient chart has been opened.
pub const PATIENT_VIEW_HOOK: &str = "patient-view";

/// Card link type eligible for app-launch resolution.
pub const SMART_LINK_TYPE: &str = "smart";

/// Default HTTP timeout when `CDS_REQUEST_TIMEOUT_SECS` is unset.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Colour used for indicators outside the known vocabulary.
pub const NEUTRAL_COLOUR: &str = "default";
