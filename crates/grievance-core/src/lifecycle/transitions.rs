use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::deadlines::DeadlineCalculator;
use super::domain::{Actor, CaseStatus, Priority};
use super::policy::LifecyclePolicy;

/// Malformed input to the validator. Rule violations are never reported through this type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("status {0} is not part of the validated case lifecycle")]
    UnknownStatus(CaseStatus),
}

/// Everything the validator needs to rule on a single transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionRequest {
    pub current: CaseStatus,
    pub target: CaseStatus,
    pub actor: Actor,
    pub priority: Priority,
    pub status_entered_at: DateTime<Utc>,
    pub has_unresolved_critical_signals: bool,
    pub has_adequate_documentation: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Business-rule reasons for denying a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RejectionKind {
    TransitionNotAllowed,
    InsufficientRole,
    DocumentationRequired,
    UnresolvedSignalBlock,
}

impl RejectionKind {
    pub const fn code(self) -> &'static str {
        match self {
            Self::TransitionNotAllowed => "TransitionNotAllowed",
            Self::InsufficientRole => "InsufficientRole",
            Self::DocumentationRequired => "DocumentationRequired",
            Self::UnresolvedSignalBlock => "UnresolvedSignalBlock",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionMetadata {
    pub sla_compliant: bool,
    pub days_in_state: i64,
    /// Deadline the case would carry in the target status; only set when allowed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionDecision {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection: Option<RejectionKind>,
    pub warnings: Vec<String>,
    pub metadata: DecisionMetadata,
}

impl TransitionDecision {
    fn denied(kind: RejectionKind, reason: String, metadata: DecisionMetadata) -> Self {
        Self {
            allowed: false,
            reason: Some(format!("{}: {}", kind.code(), reason)),
            rejection: Some(kind),
            warnings: Vec::new(),
            metadata,
        }
    }
}

/// Pure finite-state validator over an injected [`LifecyclePolicy`].
///
/// Holds no mutable state, so a single instance can be shared across threads.
#[derive(Debug, Clone)]
pub struct TransitionValidator {
    policy: Arc<LifecyclePolicy>,
    deadlines: DeadlineCalculator,
}

impl TransitionValidator {
    pub fn new(policy: Arc<LifecyclePolicy>) -> Self {
        let deadlines = DeadlineCalculator::new(policy.sla.clone());
        Self { policy, deadlines }
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    pub fn deadlines(&self) -> &DeadlineCalculator {
        &self.deadlines
    }

    pub fn validate(
        &self,
        request: &TransitionRequest,
        now: DateTime<Utc>,
    ) -> Result<TransitionDecision, TransitionError> {
        for status in [request.current, request.target] {
            if !status.is_lifecycle_stage() || !self.policy.knows(status) {
                return Err(TransitionError::UnknownStatus(status));
            }
        }

        let sla = self.deadlines.assess(
            request.current,
            request.priority,
            request.status_entered_at,
            now,
        );
        let mut metadata = DecisionMetadata {
            sla_compliant: !sla.is_overdue,
            days_in_state: (now - request.status_entered_at).num_days().max(0),
            next_deadline: None,
        };

        if !self.policy.permits(request.current, request.target) {
            return Ok(TransitionDecision::denied(
                RejectionKind::TransitionNotAllowed,
                format!(
                    "cannot move a case from {} to {}",
                    request.current, request.target
                ),
                metadata,
            ));
        }

        let rule = self.policy.rule_for(request.current, request.target);

        if let Some(rule) = rule {
            if !rule.permits_role(request.actor.role) {
                return Ok(TransitionDecision::denied(
                    RejectionKind::InsufficientRole,
                    format!(
                        "role {} may not move a case from {} to {}",
                        request.actor.role.label(),
                        request.current,
                        request.target
                    ),
                    metadata,
                ));
            }

            if rule.requires_documentation && !request.has_adequate_documentation {
                return Ok(TransitionDecision::denied(
                    RejectionKind::DocumentationRequired,
                    format!(
                        "moving to {} requires supporting documentation on file",
                        request.target
                    ),
                    metadata,
                ));
            }

            if rule.blocks_on_critical_signals && request.has_unresolved_critical_signals {
                return Ok(TransitionDecision::denied(
                    RejectionKind::UnresolvedSignalBlock,
                    format!(
                        "unresolved critical signals must be addressed before moving to {}",
                        request.target
                    ),
                    metadata,
                ));
            }
        }

        let mut warnings = Vec::new();
        if sla.is_overdue {
            warnings.push(format!(
                "transition is late: {} SLA deadline {} has passed",
                request.current.label(),
                sla.deadline.format("%Y-%m-%d %H:%M UTC")
            ));
        }

        let blocks = rule
            .map(|rule| rule.blocks_on_critical_signals)
            .unwrap_or(false);
        if request.has_unresolved_critical_signals && !blocks {
            warnings.push("case still has unresolved critical signals".to_string());
        }

        let notes_missing = request
            .notes
            .as_deref()
            .map(|notes| notes.trim().is_empty())
            .unwrap_or(true);
        if notes_missing && matches!(request.target, CaseStatus::Resolved | CaseStatus::Rejected)
        {
            warnings.push(format!(
                "no notes recorded for a {} outcome",
                request.target.label().to_ascii_lowercase()
            ));
        }

        metadata.next_deadline =
            Some(self.deadlines.deadline(request.target, request.priority, now));

        Ok(TransitionDecision {
            allowed: true,
            reason: None,
            rejection: None,
            warnings,
            metadata,
        })
    }
}
