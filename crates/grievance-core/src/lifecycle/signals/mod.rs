//! Severity-ranked signals derived from a case snapshot and its timeline.
//!
//! Signals are recomputed from scratch on every timeline write and replace the previous
//! set for the case. All day counts here use the business-day clock.

pub mod business_days;
mod digest;
mod rules;
pub mod sla;

pub use digest::{
    dashboard, filter_by_severity, filter_by_type, group_by_case, highest_per_case,
    webhook_payload, SignalDashboard, SignalWebhookPayload,
};
pub use sla::{assess_slas, SlaHealth, SlaStatusAssessment, TrackedSla};

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::domain::{Case, CaseId};
use super::policy::{LifecyclePolicy, SignalSlaTargets};
use super::timeline::TimelineEvent;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalId(pub String);

impl SignalId {
    pub fn generate() -> Self {
        Self(format!("sig-{}", Uuid::new_v4()))
    }
}

impl fmt::Display for SignalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered most to least severe, so sorting ascending puts critical signals first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSeverity {
    Critical,
    Urgent,
    Warning,
    Info,
}

impl SignalSeverity {
    pub const fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::Urgent => 1,
            Self::Warning => 2,
            Self::Info => 3,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Urgent => "urgent",
            Self::Warning => "warning",
            Self::Info => "info",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    SlaBreached,
    SlaAtRisk,
    AcknowledgmentOverdue,
    MemberWaiting,
    CaseStale,
    EscalationNeeded,
    UrgentState,
}

impl SignalType {
    pub const fn severity(self) -> SignalSeverity {
        match self {
            Self::SlaBreached | Self::AcknowledgmentOverdue => SignalSeverity::Critical,
            Self::SlaAtRisk | Self::MemberWaiting | Self::EscalationNeeded => {
                SignalSeverity::Urgent
            }
            Self::CaseStale => SignalSeverity::Warning,
            Self::UrgentState => SignalSeverity::Info,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SlaBreached => "sla_breached",
            Self::SlaAtRisk => "sla_at_risk",
            Self::AcknowledgmentOverdue => "acknowledgment_overdue",
            Self::MemberWaiting => "member_waiting",
            Self::CaseStale => "case_stale",
            Self::EscalationNeeded => "escalation_needed",
            Self::UrgentState => "urgent_state",
        }
    }

    pub const fn actionable(self) -> bool {
        !matches!(self, Self::UrgentState)
    }
}

/// Derived alert that a case needs attention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub id: SignalId,
    pub case_id: CaseId,
    pub signal_type: SignalType,
    pub severity: SignalSeverity,
    pub title: String,
    pub description: String,
    pub actionable: bool,
    pub context: BTreeMap<String, Value>,
    pub generated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

impl Signal {
    pub fn is_blocking(&self) -> bool {
        self.actionable && self.severity == SignalSeverity::Critical
    }
}

/// Stateless detector configured with the business-day SLA targets.
#[derive(Debug, Clone, Default)]
pub struct SignalDetector {
    targets: SignalSlaTargets,
}

impl SignalDetector {
    pub fn new(targets: SignalSlaTargets) -> Self {
        Self { targets }
    }

    pub fn from_policy(policy: &LifecyclePolicy) -> Self {
        Self::new(policy.signal_slas.clone())
    }

    pub fn detect(
        &self,
        case: &Case,
        timeline: &[TimelineEvent],
        now: DateTime<Utc>,
    ) -> Vec<Signal> {
        rules::evaluate(case, timeline, &self.targets, now)
    }

    /// Detects across many cases and orders the result most severe first.
    pub fn detect_all<'a, I>(&self, cases: I, now: DateTime<Utc>) -> Vec<Signal>
    where
        I: IntoIterator<Item = (&'a Case, &'a [TimelineEvent])>,
    {
        let mut signals: Vec<Signal> = cases
            .into_iter()
            .flat_map(|(case, timeline)| self.detect(case, timeline, now))
            .collect();
        signals.sort_by_key(|signal| signal.severity.rank());
        signals
    }
}
