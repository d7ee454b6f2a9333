//! Audit event model.
//!
//! Every registration, insertion, update, and disclosure attempt produces
//! exactly one [`AuditEvent`], success or failure alike, so the audit
//! trail is complete by construction. Events are write-only from the
//! core's perspective: they are serialized as one JSON object per line
//! into a per-category sink and never read back.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// The per-category audit sinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCategory {
    /// Identity registration attempts.
    Registration,
    /// Health record insertion attempts.
    Insert,
    /// Health record update attempts.
    Update,
    /// Attribute disclosure attempts.
    Query,
}

impl AuditCategory {
    /// File stem of the category's log sink.
    #[must_use]
    pub const fn file_stem(self) -> &'static str {
        match self {
            Self::Registration => "registration",
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Query => "query",
        }
    }
}

/// One durable record of an operation attempt and its outcome.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// Which sink this event belongs to.
    pub category: AuditCategory,

    /// Who attempted the operation: a registrant name, an identifier, or
    /// a requesting department.
    pub actor: String,

    /// Operation payload (opaque to the sink).
    pub payload: serde_json::Value,

    /// Whether the attempt succeeded.
    pub successful: bool,

    /// Time of the attempt.
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(
        category: AuditCategory,
        actor: impl Into<String>,
        payload: serde_json::Value,
        successful: bool,
    ) -> Self {
        Self {
            category,
            actor: actor.into(),
            payload,
            successful,
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_file_stems_are_distinct() {
        let stems = [
            AuditCategory::Registration.file_stem(),
            AuditCategory::Insert.file_stem(),
            AuditCategory::Update.file_stem(),
            AuditCategory::Query.file_stem(),
        ];
        for (i, a) in stems.iter().enumerate() {
            for b in &stems[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_event_serializes_required_fields() {
        let event = AuditEvent::new(
            AuditCategory::Query,
            "welfare_dept",
            serde_json::json!({"id": 7459, "attribute": "has_asthma"}),
            true,
        );

        let line = serde_json::to_string(&event).expect("serialize event");
        let value: serde_json::Value = serde_json::from_str(&line).expect("parse line");
        assert_eq!(value["category"], "query");
        assert_eq!(value["actor"], "welfare_dept");
        assert_eq!(value["successful"], true);
        assert!(value["timestamp"].is_string());
        assert_eq!(value["payload"]["id"], 7459);
    }
}
