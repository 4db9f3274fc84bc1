//! Decision cards: wire decoding and normalisation.
//!
//! Services from four protocol generations answer a hook invocation. Their cards differ:
//! - the envelope is `{ "cards": [...] }`, a bare array, or empty
//! - `links` is absent in the oldest generation
//! - `source` and `assessmentType` only exist where cards can be dismissed
//!
//! [`decode_cards`] reconciles the envelope and [`normalize`] turns every card into one
//! canonical [`DecisionCard`]. Normalisation is total: unknown or wrong-typed optional fields
//! fall back to defaults and never fail the service.

use crate::catalog::json_kind;
use crate::constants::{NEUTRAL_COLOUR, SMART_LINK_TYPE};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

// ============================================================================
// Canonical types
// ============================================================================

/// Severity/category tag on a card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Indicator {
    Info,
    Warning,
    Critical,
    Success,
    Unknown,
}

impl Indicator {
    /// Case-insensitive mapping from the wire value; anything unrecognised is `Unknown`.
    pub fn from_wire(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "info" => Indicator::Info,
            "warning" => Indicator::Warning,
            "critical" => Indicator::Critical,
            "success" => Indicator::Success,
            _ => Indicator::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Indicator::Info => "info",
            Indicator::Warning => "warning",
            Indicator::Critical => "critical",
            Indicator::Success => "success",
            Indicator::Unknown => "unknown",
        }
    }

    /// Display colour from the fixed presentation vocabulary.
    pub fn colour(self) -> &'static str {
        match self {
            Indicator::Info => "blue",
            Indicator::Warning => "orange",
            Indicator::Critical => "red",
            Indicator::Success => "green",
            Indicator::Unknown => NEUTRAL_COLOUR,
        }
    }
}

/// An action link attached to a card.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardLink {
    pub label: String,
    pub url: String,
    #[serde(rename = "type")]
    pub link_type: String,
}

impl CardLink {
    /// Only `smart` links are candidates for app-launch resolution.
    pub fn is_smart(&self) -> bool {
        self.link_type == SMART_LINK_TYPE
    }
}

/// Encounter/assessment pair a card can be hidden against.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncounterContext {
    encounter_id: String,
    assessment_type: String,
}

impl EncounterContext {
    /// Build a context from explicit ids.
    ///
    /// Returns `None` when `encounter_id` is blank, so a hide request can never be issued with an
    /// empty encounter. `assessment_type` may be empty.
    pub fn new(encounter_id: impl Into<String>, assessment_type: impl Into<String>) -> Option<Self> {
        let encounter_id = encounter_id.into();
        if encounter_id.trim().is_empty() {
            return None;
        }
        Some(Self {
            encounter_id,
            assessment_type: assessment_type.into(),
        })
    }

    /// Derive the context from a `source.url` of the form `<prefix>/<encounterId>[/...]`.
    pub fn from_source_url(url: &str, assessment_type: impl Into<String>) -> Option<Self> {
        let mut segments = url.split('/');
        segments.next()?;
        let encounter_id = segments.next()?;
        Self::new(encounter_id, assessment_type)
    }

    pub fn encounter_id(&self) -> &str {
        &self.encounter_id
    }

    pub fn assessment_type(&self) -> &str {
        &self.assessment_type
    }
}

/// Canonical, post-normalisation card.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionCard {
    pub id: String,
    pub summary: String,
    pub detail: String,
    pub indicator: Indicator,
    pub links: Vec<CardLink>,
    pub encounter_context: Option<EncounterContext>,
}

impl DecisionCard {
    /// Dismissal is offered only for cards tied to an encounter.
    pub fn is_dismissible(&self) -> bool {
        self.encounter_context.is_some()
    }

    pub fn smart_links(&self) -> impl Iterator<Item = &CardLink> {
        self.links.iter().filter(|link| link.is_smart())
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// A card exactly as a service sent it, decoded leniently.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawCard {
    #[serde(deserialize_with = "lenient_string")]
    pub uuid: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub summary: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub detail: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub indicator: Option<String>,
    #[serde(deserialize_with = "lenient_links")]
    pub links: Option<Vec<RawLink>>,
    #[serde(deserialize_with = "lenient_source")]
    pub source: Option<RawSource>,
    #[serde(rename = "assessmentType", deserialize_with = "lenient_string")]
    pub assessment_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawLink {
    #[serde(deserialize_with = "lenient_string")]
    pub label: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(rename = "type", deserialize_with = "lenient_string")]
    pub link_type: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawSource {
    #[serde(deserialize_with = "lenient_string")]
    pub label: Option<String>,
    #[serde(deserialize_with = "lenient_string")]
    pub url: Option<String>,
    #[serde(rename = "assessmentType", deserialize_with = "lenient_string")]
    pub assessment_type: Option<String>,
}

/// The card-response envelopes across protocol generations.
#[derive(Debug)]
enum CardsEnvelope {
    Enveloped(Vec<Value>),
    Bare(Vec<Value>),
    Empty,
}

impl CardsEnvelope {
    fn classify(body: Value) -> Result<Self, String> {
        match body {
            Value::Null => Ok(CardsEnvelope::Empty),
            Value::Array(items) => Ok(CardsEnvelope::Bare(items)),
            Value::Object(mut map) => match map.remove("cards") {
                Some(Value::Null) => Ok(CardsEnvelope::Empty),
                None if map.is_empty() => Ok(CardsEnvelope::Empty),
                None => {
                    let keys: Vec<&str> = map.keys().map(String::as_str).collect();
                    Err(format!("object without 'cards' (keys: {})", keys.join(", ")))
                }
                Some(Value::Array(items)) => Ok(CardsEnvelope::Enveloped(items)),
                Some(other) => Err(format!("'cards' must be an array, got {}", json_kind(&other))),
            },
            other => Err(format!(
                "expected an object or array, got {}",
                json_kind(&other)
            )),
        }
    }

    fn into_items(self) -> Vec<Value> {
        match self {
            CardsEnvelope::Enveloped(items) | CardsEnvelope::Bare(items) => items,
            CardsEnvelope::Empty => Vec::new(),
        }
    }
}

/// Flatten a hook response of any generation into raw cards.
///
/// Entries that are not JSON objects are skipped with a warning; every object decodes.
///
/// # Errors
///
/// Returns a description of the envelope when it matches none of the known shapes.
pub fn decode_cards(body: Value) -> Result<Vec<RawCard>, String> {
    let items = CardsEnvelope::classify(body)?.into_items();

    Ok(items
        .into_iter()
        .enumerate()
        .filter_map(|(index, item)| {
            if !item.is_object() {
                tracing::warn!(index, "skipping card that is {}", json_kind(&item));
                return None;
            }
            match serde_json::from_value::<RawCard>(item) {
                Ok(card) => Some(card),
                Err(e) => {
                    tracing::warn!(index, "skipping undecodable card: {e}");
                    None
                }
            }
        })
        .collect())
}

/// Normalise one raw card. Never fails.
pub fn normalize(raw: RawCard) -> DecisionCard {
    let assessment_type = raw
        .assessment_type
        .or_else(|| raw.source.as_ref().and_then(|s| s.assessment_type.clone()))
        .unwrap_or_default();

    let encounter_context = raw
        .source
        .as_ref()
        .and_then(|source| source.url.as_deref())
        .and_then(|url| EncounterContext::from_source_url(url, assessment_type));

    let links = raw
        .links
        .unwrap_or_default()
        .into_iter()
        .map(|link| CardLink {
            label: link.label.unwrap_or_default(),
            url: link.url.unwrap_or_default(),
            link_type: link.link_type.unwrap_or_default(),
        })
        .collect();

    DecisionCard {
        id: raw.uuid.unwrap_or_default(),
        summary: raw.summary.unwrap_or_default(),
        detail: raw.detail.unwrap_or_default(),
        indicator: raw
            .indicator
            .as_deref()
            .map(Indicator::from_wire)
            .unwrap_or(Indicator::Unknown),
        links,
        encounter_context,
    }
}

// ============================================================================
// Lenient field decoders
// ============================================================================

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    })
}

fn lenient_links<'de, D>(deserializer: D) -> Result<Option<Vec<RawLink>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(items) => Some(
            items
                .into_iter()
                .filter(Value::is_object)
                .filter_map(|item| serde_json::from_value(item).ok())
                .collect(),
        ),
        _ => None,
    })
}

fn lenient_source<'de, D>(deserializer: D) -> Result<Option<RawSource>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        item @ Value::Object(_) => serde_json::from_value(item).ok(),
        _ => None,
    })
}
