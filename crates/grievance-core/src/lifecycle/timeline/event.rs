use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::super::domain::{Actor, ActorId, CaseId, CaseStatus, Role};
use super::scope::VisibilityScope;

pub type EventMetadata = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(pub String);

impl EventId {
    pub fn generate() -> Self {
        Self(format!("evt-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether the event records ordinary case activity or a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Update,
    Transition,
}

/// Open-ended event type label. Well-known types are exposed as constants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventType(String);

impl EventType {
    pub const CASE_SUBMITTED: &'static str = "case_submitted";
    pub const STATUS_CHANGE: &'static str = "status_change";
    pub const MEMBER_COMMUNICATION: &'static str = "member_communication";
    pub const STAFF_RESPONSE: &'static str = "staff_response";
    pub const DOCUMENT_ADDED: &'static str = "document_added";
    pub const INTERNAL_NOTE: &'static str = "internal_note";
    pub const ASSIGNMENT: &'static str = "assignment";

    const ADMIN_PREFIX: &'static str = "admin_";

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is(&self, name: &str) -> bool {
        self.0 == name
    }

    pub fn is_status_change(&self) -> bool {
        self.is(Self::STATUS_CHANGE)
    }

    pub fn is_admin_only(&self) -> bool {
        self.0.starts_with(Self::ADMIN_PREFIX)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Append-only record of something that happened on a case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub id: EventId,
    pub case_id: CaseId,
    pub kind: EventKind,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub message: String,
    pub author: ActorId,
    pub author_role: Role,
    pub scope: VisibilityScope,
    #[serde(default)]
    pub metadata: EventMetadata,
}

impl TimelineEvent {
    /// Reads a status recorded in the metadata of a `status_change` event.
    pub fn metadata_status(&self, key: &str) -> Option<CaseStatus> {
        self.metadata
            .get(key)
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok())
    }

    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(Value::as_str)
    }
}

/// Inbound payload for [`super::TimelineService::add_event`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTimelineEvent {
    pub case_id: CaseId,
    pub event_type: EventType,
    pub message: String,
    pub author: Actor,
    #[serde(default)]
    pub scope: Option<VisibilityScope>,
    #[serde(default)]
    pub internal: bool,
    #[serde(default)]
    pub metadata: EventMetadata,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl NewTimelineEvent {
    pub fn new(
        case_id: CaseId,
        event_type: &str,
        message: impl Into<String>,
        author: Actor,
    ) -> Self {
        Self {
            case_id,
            event_type: EventType::new(event_type),
            message: message.into(),
            author,
            scope: None,
            internal: false,
            metadata: EventMetadata::new(),
            occurred_at: None,
        }
    }

    pub fn with_scope(mut self, scope: VisibilityScope) -> Self {
        self.scope = Some(scope);
        self
    }

    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    pub(crate) fn into_event(self, now: DateTime<Utc>) -> TimelineEvent {
        let scope = super::scope::resolve_scope(self.scope, self.internal, &self.event_type);
        let kind = if self.event_type.is_status_change() {
            EventKind::Transition
        } else {
            EventKind::Update
        };

        TimelineEvent {
            id: EventId::generate(),
            case_id: self.case_id,
            kind,
            event_type: self.event_type,
            occurred_at: self.occurred_at.unwrap_or(now),
            message: self.message,
            author: self.author.id,
            author_role: self.author.role,
            scope,
            metadata: self.metadata,
        }
    }
}
