use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier wrapper for grievance cases.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CaseId(pub String);

impl CaseId {
    pub fn generate() -> Self {
        Self(format!("case-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// User id of whoever performed an action (staff, member, or the system itself).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub String);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrganizationId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemberId(pub String);

/// Every status a case may carry.
///
/// The first eight variants form the validated lifecycle graph. The remaining four are
/// grievance-pipeline statuses recognised by the signal detector; the transition validator
/// treats them as unknown input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Submitted,
    UnderReview,
    Assigned,
    Investigation,
    PendingDocumentation,
    Resolved,
    Rejected,
    Closed,
    PendingResponse,
    Investigating,
    Escalated,
    Withdrawn,
}

impl CaseStatus {
    pub const fn lifecycle_stages() -> [Self; 8] {
        [
            Self::Submitted,
            Self::UnderReview,
            Self::Assigned,
            Self::Investigation,
            Self::PendingDocumentation,
            Self::Resolved,
            Self::Rejected,
            Self::Closed,
        ]
    }

    pub const fn all() -> [Self; 12] {
        [
            Self::Submitted,
            Self::UnderReview,
            Self::Assigned,
            Self::Investigation,
            Self::PendingDocumentation,
            Self::Resolved,
            Self::Rejected,
            Self::Closed,
            Self::PendingResponse,
            Self::Investigating,
            Self::Escalated,
            Self::Withdrawn,
        ]
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Submitted => "submitted",
            Self::UnderReview => "under_review",
            Self::Assigned => "assigned",
            Self::Investigation => "investigation",
            Self::PendingDocumentation => "pending_documentation",
            Self::Resolved => "resolved",
            Self::Rejected => "rejected",
            Self::Closed => "closed",
            Self::PendingResponse => "pending_response",
            Self::Investigating => "investigating",
            Self::Escalated => "escalated",
            Self::Withdrawn => "withdrawn",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Submitted => "Submitted",
            Self::UnderReview => "Under Review",
            Self::Assigned => "Assigned",
            Self::Investigation => "Investigation",
            Self::PendingDocumentation => "Pending Documentation",
            Self::Resolved => "Resolved",
            Self::Rejected => "Rejected",
            Self::Closed => "Closed",
            Self::PendingResponse => "Pending Response",
            Self::Investigating => "Investigating",
            Self::Escalated => "Escalated",
            Self::Withdrawn => "Withdrawn",
        }
    }

    pub const fn is_lifecycle_stage(self) -> bool {
        matches!(
            self,
            Self::Submitted
                | Self::UnderReview
                | Self::Assigned
                | Self::Investigation
                | Self::PendingDocumentation
                | Self::Resolved
                | Self::Rejected
                | Self::Closed
        )
    }

    /// Landing on one of these statuses produces a defensibility pack.
    pub const fn triggers_export(self) -> bool {
        matches!(self, Self::Resolved | Self::Closed)
    }
}

impl fmt::Display for CaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown case status '{0}'")]
pub struct UnknownStatus(pub String);

impl FromStr for CaseStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        Self::all()
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| UnknownStatus(value.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Critical,
    High,
    Medium,
    Low,
}

impl Priority {
    /// Most to least severe.
    pub const fn ordered() -> [Self; 4] {
        [Self::Critical, Self::High, Self::Medium, Self::Low]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

/// Closed set of roles an actor may hold. Unknown roles cannot be represented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Member,
    Steward,
    Officer,
    Staff,
    Admin,
    System,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Steward => "steward",
            Self::Officer => "officer",
            Self::Staff => "staff",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }

    pub const fn is_member(self) -> bool {
        matches!(self, Self::Member)
    }
}

/// The acting user behind a mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: ActorId,
    pub role: Role,
}

impl Actor {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: ActorId(id.into()),
            role,
        }
    }

    pub fn system() -> Self {
        Self::new("system", Role::System)
    }
}

/// A grievance case as stored by the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Case {
    pub id: CaseId,
    pub title: String,
    pub status: CaseStatus,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    pub status_changed_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub assigned_to: Option<ActorId>,
    pub organization_id: OrganizationId,
    pub member_id: MemberId,
}

/// Intake payload for a new case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewCase {
    pub title: String,
    pub priority: Priority,
    pub organization_id: OrganizationId,
    pub member_id: MemberId,
    #[serde(default)]
    pub assigned_to: Option<ActorId>,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewCase {
    pub(crate) fn into_case(self, id: CaseId, now: DateTime<Utc>) -> Case {
        Case {
            id,
            title: self.title,
            status: CaseStatus::Submitted,
            priority: self.priority,
            created_at: now,
            status_changed_at: now,
            updated_at: now,
            assigned_to: self.assigned_to,
            organization_id: self.organization_id,
            member_id: self.member_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_parses_case_insensitively() {
        assert_eq!(
            "Pending_Documentation".parse::<CaseStatus>(),
            Ok(CaseStatus::PendingDocumentation)
        );
        assert_eq!(" closed ".parse::<CaseStatus>(), Ok(CaseStatus::Closed));
    }

    #[test]
    fn unknown_status_is_an_error() {
        let err = "archived".parse::<CaseStatus>().unwrap_err();
        assert_eq!(err, UnknownStatus("archived".to_string()));
    }

    #[test]
    fn lifecycle_stages_exclude_pipeline_statuses() {
        assert!(CaseStatus::lifecycle_stages()
            .iter()
            .all(|status| status.is_lifecycle_stage()));
        assert!(!CaseStatus::Investigating.is_lifecycle_stage());
        assert!(!CaseStatus::Withdrawn.is_lifecycle_stage());
    }
}
