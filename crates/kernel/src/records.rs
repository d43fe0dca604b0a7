//! Canonical record shapes.
//!
//! Event rows reach the export path from several producers. UTM data may be
//! flattened (`utm_source`, ...) or nested under `utm_data` / `utm`. An
//! [`EventRecord`] accepts all of them and resolves one set of UTM values:
//! a non-blank flattened field wins over `utm_data`, which wins over `utm`.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::listing::Resource;

/// UTM parameters, in either `source` or `utm_source` spelling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utm {
    #[serde(default, alias = "utm_source", deserialize_with = "lenient_string")]
    pub source: Option<String>,
    #[serde(default, alias = "utm_medium", deserialize_with = "lenient_string")]
    pub medium: Option<String>,
    #[serde(default, alias = "utm_campaign", deserialize_with = "lenient_string")]
    pub campaign: Option<String>,
    #[serde(default, alias = "utm_content", deserialize_with = "lenient_string")]
    pub content: Option<String>,
    #[serde(default, alias = "utm_term", deserialize_with = "lenient_string")]
    pub term: Option<String>,
}

impl Utm {
    /// Field-wise merge; values in `self` win over `fallback`.
    fn or(self, fallback: Utm) -> Utm {
        Utm {
            source: self.source.or(fallback.source),
            medium: self.medium.or(fallback.medium),
            campaign: self.campaign.or(fallback.campaign),
            content: self.content.or(fallback.content),
            term: self.term.or(fallback.term),
        }
    }
}

/// One analytics event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub event_time: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub event_source: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub profession_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub funnel_id: Option<String>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub utm_source: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub utm_medium: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub utm_campaign: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub utm_content: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub utm_term: Option<String>,

    /// Nested UTM object as stored by the tracking pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm_data: Option<Utm>,

    /// Nested UTM object as sent by older clients.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub utm: Option<Utm>,

    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, deserialize_with = "lenient_string", skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,

    /// Columns this record type does not model.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl EventRecord {
    /// Effective UTM values after precedence.
    pub fn utm(&self) -> Utm {
        let flattened = Utm {
            source: self.utm_source.clone(),
            medium: self.utm_medium.clone(),
            campaign: self.utm_campaign.clone(),
            content: self.utm_content.clone(),
            term: self.utm_term.clone(),
        };
        flattened
            .or(self.utm_data.clone().unwrap_or_default())
            .or(self.utm.clone().unwrap_or_default())
    }

    /// Collapse nested UTM objects into the flattened fields.
    pub fn canonical(mut self) -> Self {
        let utm = self.utm();
        self.utm_source = utm.source;
        self.utm_medium = utm.medium;
        self.utm_campaign = utm.campaign;
        self.utm_content = utm.content;
        self.utm_term = utm.term;
        self.utm_data = None;
        self.utm = None;
        self
    }
}

/// Normalize a row into its resource's canonical shape.
///
/// Rows that do not match the canonical shape are returned unchanged.
pub fn normalize(resource: Resource, row: &Value) -> Value {
    match resource {
        Resource::Events => serde_json::from_value::<EventRecord>(row.clone())
            .ok()
            .and_then(|record| serde_json::to_value(record.canonical()).ok())
            .unwrap_or_else(|| row.clone()),
        _ => row.clone(),
    }
}

/// Accept strings, numbers and booleans; blank strings and null become `None`.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Some(Value::Number(n)) => Some(n.to_string()),
        Some(Value::Bool(b)) => Some(b.to_string()),
        _ => None,
    })
}
