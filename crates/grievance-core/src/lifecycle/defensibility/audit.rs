use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::super::domain::{ActorId, CaseStatus, Role};
use super::super::timeline::{EventId, EventMetadata, EventType, TimelineEvent, VisibilityScope};

const REDACTED: &str = "[redacted]";

/// Metadata keys containing any of these fragments are personal data.
const SENSITIVE_KEY_FRAGMENTS: &[&str] = &[
    "email",
    "phone",
    "address",
    "birth",
    "ssn",
    "sin_number",
    "medical",
    "health",
    "salary",
    "bank",
];

/// One actor-action-resource line of the audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub occurred_at: DateTime<Utc>,
    pub actor: ActorId,
    pub actor_role: Role,
    pub action: String,
    pub resource: String,
    pub scope: VisibilityScope,
    pub metadata: EventMetadata,
}

/// A lifecycle transition recovered from a `status_change` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub event_id: EventId,
    pub occurred_at: DateTime<Utc>,
    pub from: Option<CaseStatus>,
    pub to: CaseStatus,
    pub actor: ActorId,
    pub actor_role: Role,
    pub validation_passed: bool,
}

pub fn is_sensitive_key(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    SENSITIVE_KEY_FRAGMENTS
        .iter()
        .any(|fragment| key.contains(fragment))
}

/// Replaces sensitive values with a fixed marker, recursing into nested objects.
pub fn sanitize_metadata(metadata: &EventMetadata) -> EventMetadata {
    metadata
        .iter()
        .map(|(key, value)| (key.clone(), sanitize_value(key, value)))
        .collect()
}

fn sanitize_value(key: &str, value: &Value) -> Value {
    if is_sensitive_key(key) {
        return Value::String(REDACTED.to_string());
    }
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, value)| (key.clone(), sanitize_value(key, value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|item| sanitize_value("", item))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Derives the audit trail in timeline order.
pub fn derive_audit_trail(
    timeline: &[TimelineEvent],
    include_sensitive: bool,
) -> Vec<AuditEntry> {
    timeline
        .iter()
        .map(|event| AuditEntry {
            occurred_at: event.occurred_at,
            actor: event.author.clone(),
            actor_role: event.author_role,
            action: event.event_type.to_string(),
            resource: format!("cases/{}/events/{}", event.case_id, event.id),
            scope: event.scope,
            metadata: if include_sensitive {
                event.metadata.clone()
            } else {
                sanitize_metadata(&event.metadata)
            },
        })
        .collect()
}

/// Status changes recorded on the timeline, in order. Events without a readable target
/// status are skipped.
pub fn derive_transitions(timeline: &[TimelineEvent]) -> Vec<TransitionRecord> {
    timeline
        .iter()
        .filter(|event| event.event_type.is(EventType::STATUS_CHANGE))
        .filter_map(|event| {
            let to = event.metadata_status("to_status")?;
            let actor_role = event
                .metadata_str("actor_role")
                .and_then(parse_role)
                .unwrap_or(event.author_role);
            let validation_passed = event
                .metadata
                .get("validation_passed")
                .and_then(Value::as_bool)
                .unwrap_or(false);

            Some(TransitionRecord {
                event_id: event.id.clone(),
                occurred_at: event.occurred_at,
                from: event.metadata_status("from_status"),
                to,
                actor: event.author.clone(),
                actor_role,
                validation_passed,
            })
        })
        .collect()
}

fn parse_role(raw: &str) -> Option<Role> {
    serde_json::from_value(Value::String(raw.to_string())).ok()
}
