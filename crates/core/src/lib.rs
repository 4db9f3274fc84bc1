//! # CDS Core
//!
//! Client side of the CDS Hooks `patient-view` flow.
//!
//! This crate contains the orchestration and the wire handling:
//! - Service discovery (`GET {base}/cds-services`) and catalog decoding
//! - Hook invocation with prefetched Patient/Practitioner resources
//! - Card normalization, indicator colours and encounter context extraction
//! - SMART link resolution against an app registry
//! - Card dismissal with a follow-up refresh of the owning service
//! - [`PatientView`], which ties the above together for one patient
//!
//! **No API concerns**: HTTP servers and command-line handling belong in `api-rest` and `cds-cli`.
//!
//! All HTTP goes through the [`transport::CdsTransport`] trait; [`transport::HttpTransport`] is the
//! reqwest-backed implementation. Configuration is resolved once into a [`CdsConfig`] and passed
//! in; nothing here reads environment variables on the request path.

pub mod cards;
pub mod catalog;
pub mod client;
pub mod config;
pub mod constants;
pub mod dismissal;
pub mod error;
pub mod invoker;
pub mod links;
pub mod transport;
pub mod view;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use cards::{CardLink, DecisionCard, EncounterContext, Indicator};
pub use catalog::ServiceDescriptor;
pub use client::CdsClient;
pub use config::CdsConfig;
pub use dismissal::{RefreshRequest, RefreshSignal};
pub use error::{CdsError, CdsResult};
pub use links::{AppRegistry, LaunchableApp, LinkAction, StaticAppRegistry};
pub use view::{PanelOutcome, PatientCards, PatientView, RenderedCard, ServicePanel};

pub use reqwest::Url;
