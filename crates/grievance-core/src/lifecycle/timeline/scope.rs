use serde::{Deserialize, Serialize};

use super::super::domain::Role;
use super::event::EventType;

/// Access tier of a timeline event. Visibility is monotonic: admin sees everything staff
/// sees, staff sees everything a member sees. `System` is only visible to the system role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisibilityScope {
    Member,
    Staff,
    Admin,
    System,
}

impl VisibilityScope {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Staff => "staff",
            Self::Admin => "admin",
            Self::System => "system",
        }
    }
}

const MEMBER_SCOPES: &[VisibilityScope] = &[VisibilityScope::Member];
const STAFF_SCOPES: &[VisibilityScope] = &[VisibilityScope::Member, VisibilityScope::Staff];
const ADMIN_SCOPES: &[VisibilityScope] = &[
    VisibilityScope::Member,
    VisibilityScope::Staff,
    VisibilityScope::Admin,
];
const SYSTEM_SCOPES: &[VisibilityScope] = &[
    VisibilityScope::Member,
    VisibilityScope::Staff,
    VisibilityScope::Admin,
    VisibilityScope::System,
];

/// Scopes a role is allowed to read.
pub fn visible_scopes(role: Role) -> &'static [VisibilityScope] {
    match role {
        Role::Member => MEMBER_SCOPES,
        Role::Steward | Role::Officer | Role::Staff => STAFF_SCOPES,
        Role::Admin => ADMIN_SCOPES,
        Role::System => SYSTEM_SCOPES,
    }
}

pub fn can_view(role: Role, scope: VisibilityScope) -> bool {
    visible_scopes(role).contains(&scope)
}

/// Scopes served by the staff/LRO projection.
pub(crate) fn staff_projection_scopes() -> &'static [VisibilityScope] {
    ADMIN_SCOPES
}

/// Uses the explicit scope when supplied, otherwise infers one from the payload.
pub fn resolve_scope(
    explicit: Option<VisibilityScope>,
    internal: bool,
    event_type: &EventType,
) -> VisibilityScope {
    if let Some(scope) = explicit {
        return scope;
    }

    if internal {
        return VisibilityScope::Staff;
    }

    if event_type.is_status_change() || event_type.is(EventType::MEMBER_COMMUNICATION) {
        return VisibilityScope::Member;
    }

    if event_type.is_admin_only() {
        return VisibilityScope::Admin;
    }

    // unclassified events stay off the member view
    VisibilityScope::Staff
}
