//! Internal implementation of hook-instance identifiers and generators.

use crate::{UuidError, UuidResult};
use std::sync::atomic::{AtomicU64, Ordering};
use std::{fmt, str::FromStr};

/// Re-exported for convenience.
pub use ::uuid::Uuid;

/// Canonical hook-instance identifier (hyphenated, lowercase).
///
/// Once constructed, the contained UUID always renders in the canonical wire form, so request
/// bodies never depend on how the identifier was produced.
///
/// # Construction
/// - [`HookInstance::new`] generates a fresh random identifier.
/// - [`HookInstance::parse`] validates an externally supplied identifier.
/// - [`IdGenerator::next_id`] is the route used by the hook invoker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HookInstance(Uuid);

impl Default for HookInstance {
    fn default() -> Self {
        Self::new()
    }
}

impl HookInstance {
    /// Generates a new random (RFC 4122 version 4) hook instance.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Validates and parses a hook instance that must already be in canonical form.
    ///
    /// Uppercase, braced, URN and simple (unhyphenated) forms are rejected rather than normalised.
    ///
    /// # Errors
    ///
    /// Returns [`UuidError::InvalidInput`] if `input` is not canonical.
    pub fn parse(input: &str) -> UuidResult<Self> {
        if !Self::is_canonical(input) {
            return Err(UuidError::InvalidInput(format!(
                "hook instance must be a lowercase hyphenated UUID, got: '{}'",
                input
            )));
        }
        Uuid::parse_str(input)
            .map(Self)
            .map_err(|e| UuidError::InvalidInput(format!("invalid hook instance '{input}': {e}")))
    }

    /// Returns the underlying UUID.
    pub fn uuid(&self) -> Uuid {
        self.0
    }

    /// Returns true if `input` is in canonical form.
    ///
    /// Purely syntactic: 36 bytes, hyphens at positions 8, 13, 18 and 23, lowercase hex elsewhere.
    pub fn is_canonical(input: &str) -> bool {
        input.len() == 36
            && input.bytes().enumerate().all(|(i, b)| match i {
                8 | 13 | 18 | 23 => b == b'-',
                _ => matches!(b, b'0'..=b'9' | b'a'..=b'f'),
            })
    }
}

impl fmt::Display for HookInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for HookInstance {
    type Err = UuidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        HookInstance::parse(s)
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for HookInstance {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

#[cfg(feature = "serde")]
impl<'de> serde::Deserialize<'de> for HookInstance {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        HookInstance::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Source of hook-instance identifiers.
///
/// The hook invoker asks for one identifier per invocation and never caches the result.
pub trait IdGenerator: Send + Sync {
    /// Mints the identifier for the next invocation.
    fn next_id(&self) -> HookInstance;
}

/// Production generator: random version 4 UUIDs.
#[derive(Clone, Copy, Debug, Default)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn next_id(&self) -> HookInstance {
        HookInstance::new()
    }
}

/// Deterministic generator for tests and reproducible runs.
///
/// Identifiers are `prefix` in the high 64 bits and an incrementing counter (starting at 1) in the
/// low 64 bits, so two generators with different prefixes never collide.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    prefix: u64,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: u64) -> Self {
        Self {
            prefix,
            counter: AtomicU64::new(0),
        }
    }

    /// Number of identifiers handed out so far.
    pub fn issued(&self) -> u64 {
        self.counter.load(Ordering::SeqCst)
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> HookInstance {
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let value = (u128::from(self.prefix) << 64) | u128::from(n);
        HookInstance(Uuid::from_u128(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_new_generates_canonical_instance() {
        let instance = HookInstance::new();
        let text = instance.to_string();

        assert_eq!(text.len(), 36);
        assert!(HookInstance::is_canonical(&text));
    }

    #[test]
    fn test_parse_valid_canonical_instance() {
        let canonical = "550e8400-e29b-41d4-a716-446655440000";
        let parsed = HookInstance::parse(canonical).expect("canonical should parse");

        assert_eq!(parsed.to_string(), canonical);
    }

    #[test]
    fn test_parse_rejects_simple_form() {
        let result = HookInstance::parse("550e8400e29b41d4a716446655440000");

        match result {
            Err(UuidError::InvalidInput(msg)) => {
                assert!(msg.contains("lowercase hyphenated"));
            }
            _ => panic!("Expected InvalidInput error"),
        }
    }

    #[test]
    fn test_parse_rejects_uppercase() {
        assert!(HookInstance::parse("550E8400-E29B-41D4-A716-446655440000").is_err());
    }

    #[test]
    fn test_is_canonical_invalid() {
        // Hyphen in the wrong place
        assert!(!HookInstance::is_canonical(
            "550e8400e-29b-41d4-a716-446655440000"
        ));
        // Too short
        assert!(!HookInstance::is_canonical(
            "550e8400-e29b-41d4-a716-44665544000"
        ));
        // Invalid characters
        assert!(!HookInstance::is_canonical(
            "550e8400-e29b-41d4-a716-44665544zzzz"
        ));
        assert!(!HookInstance::is_canonical(""));
    }

    #[test]
    fn test_random_generator_never_repeats() {
        let generator = RandomIdGenerator;
        let ids: HashSet<_> = (0..1_000).map(|_| generator.next_id()).collect();

        assert_eq!(ids.len(), 1_000);
    }

    #[test]
    fn test_sequential_generator_is_deterministic() {
        let a = SequentialIdGenerator::new(7);
        let b = SequentialIdGenerator::new(7);

        let from_a: Vec<_> = (0..3).map(|_| a.next_id()).collect();
        let from_b: Vec<_> = (0..3).map(|_| b.next_id()).collect();

        assert_eq!(from_a, from_b);
        assert_eq!(a.issued(), 3);
        assert_eq!(
            from_a[0].to_string(),
            "00000000-0000-0007-0000-000000000001"
        );
    }

    #[test]
    fn test_sequential_generator_unique_over_many_calls() {
        let generator = SequentialIdGenerator::new(1);
        let ids: HashSet<_> = (0..500).map(|_| generator.next_id()).collect();

        assert_eq!(ids.len(), 500);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_uses_canonical_string() {
        let instance = HookInstance::parse("550e8400-e29b-41d4-a716-446655440000").unwrap();
        let json = serde_json::to_string(&instance).expect("serialise");
        assert_eq!(json, "\"550e8400-e29b-41d4-a716-446655440000\"");

        let back: HookInstance = serde_json::from_str(&json).expect("deserialise");
        assert_eq!(back, instance);

        assert!(serde_json::from_str::<HookInstance>("\"not-a-uuid\"").is_err());
    }
}
