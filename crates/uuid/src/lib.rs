//! Hook-instance identifiers.
//!
//! Every CDS Hooks invocation carries a `hookInstance`: a UUID that identifies that single call.
//! The protocol requires a new value per call, so a decision-support service can never mistake two
//! invocations for the same session.
//!
//! This crate provides:
//! - A small wrapper type ([`HookInstance`]) that *guarantees* the canonical wire format once
//!   constructed.
//! - The [`IdGenerator`] seam used by the hook invoker to mint identifiers. Production code uses
//!   [`RandomIdGenerator`]; tests inject [`SequentialIdGenerator`] to get deterministic values.
//!
//! ## Canonical form
//! - Length: 36
//! - Lowercase hex in the `8-4-4-4-12` hyphenated layout
//! - Example: `550e8400-e29b-41d4-a716-446655440000`
//!
//! This is the same value you would get from `Uuid::new_v4().hyphenated().to_string()`.
//! Externally supplied identifiers must already be canonical; use [`HookInstance::parse`].

mod service;

pub use service::{HookInstance, IdGenerator, RandomIdGenerator, SequentialIdGenerator, Uuid};

/// Error type for hook-instance operations.
#[derive(Debug, thiserror::Error)]
pub enum UuidError {
    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for hook-instance operations.
pub type UuidResult<T> = Result<T, UuidError>;
