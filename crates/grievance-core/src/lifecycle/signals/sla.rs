use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::super::domain::{Case, CaseStatus, Role};
use super::super::policy::SignalSlaTargets;
use super::super::timeline::{EventType, TimelineEvent, VisibilityScope};
use super::business_days::{add_business_days, business_days_between};

/// SLAs tracked on the business-day clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedSla {
    Acknowledgment,
    FirstResponse,
    Investigation,
}

impl TrackedSla {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Acknowledgment => "acknowledgment",
            Self::FirstResponse => "first_response",
            Self::Investigation => "investigation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaHealth {
    OnTrack,
    AtRisk,
    Breached,
    /// Completed within target.
    Met,
    /// Completed after the target elapsed.
    Missed,
}

impl SlaHealth {
    pub const fn is_open(self) -> bool {
        matches!(self, Self::OnTrack | Self::AtRisk | Self::Breached)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlaStatusAssessment {
    pub sla: TrackedSla,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub due_at: DateTime<Utc>,
    pub target_business_days: u32,
    pub elapsed_business_days: i64,
    pub elapsed_ratio: f64,
    pub health: SlaHealth,
}

/// Assesses every tracked SLA that has started for the case.
pub fn assess_slas(
    case: &Case,
    timeline: &[TimelineEvent],
    targets: &SignalSlaTargets,
    now: DateTime<Utc>,
) -> Vec<SlaStatusAssessment> {
    let mut assessments = Vec::with_capacity(3);

    let acknowledged_at = first_at(timeline, case.created_at, |event| {
        leaves_intake(event) || is_member_facing_response(event) || records_decision(event)
    });
    assessments.push(assess(
        TrackedSla::Acknowledgment,
        case.created_at,
        acknowledged_at,
        targets.acknowledgment_days,
        targets.at_risk_ratio,
        now,
    ));

    let responded_at = first_at(timeline, case.created_at, |event| {
        is_member_facing_response(event) || records_decision(event)
    });
    assessments.push(assess(
        TrackedSla::FirstResponse,
        case.created_at,
        responded_at,
        targets.first_response_days,
        targets.at_risk_ratio,
        now,
    ));

    if let Some(started_at) = investigation_started_at(case, timeline) {
        let concluded_at = first_at(timeline, started_at, |event| {
            transition_target(event)
                .map(concludes_investigation)
                .unwrap_or(false)
        });
        assessments.push(assess(
            TrackedSla::Investigation,
            started_at,
            concluded_at,
            targets.investigation_days,
            targets.at_risk_ratio,
            now,
        ));
    }

    assessments
}

fn assess(
    sla: TrackedSla,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    target: u32,
    at_risk_ratio: f64,
    now: DateTime<Utc>,
) -> SlaStatusAssessment {
    let elapsed = business_days_between(started_at, completed_at.unwrap_or(now));
    let elapsed_ratio = if target == 0 {
        if elapsed > 0 {
            f64::INFINITY
        } else {
            1.0
        }
    } else {
        elapsed as f64 / target as f64
    };

    let over_target = elapsed > i64::from(target);
    let health = match completed_at {
        Some(_) if over_target => SlaHealth::Missed,
        Some(_) => SlaHealth::Met,
        None if over_target => SlaHealth::Breached,
        None if elapsed_ratio >= at_risk_ratio => SlaHealth::AtRisk,
        None => SlaHealth::OnTrack,
    };

    SlaStatusAssessment {
        sla,
        started_at,
        completed_at,
        due_at: add_business_days(started_at, target),
        target_business_days: target,
        elapsed_business_days: elapsed,
        elapsed_ratio,
        health,
    }
}

fn first_at<F>(
    timeline: &[TimelineEvent],
    after: DateTime<Utc>,
    predicate: F,
) -> Option<DateTime<Utc>>
where
    F: Fn(&TimelineEvent) -> bool,
{
    timeline
        .iter()
        .filter(|event| event.occurred_at >= after && predicate(event))
        .map(|event| event.occurred_at)
        .min()
}

fn is_staff_authored(event: &TimelineEvent) -> bool {
    !matches!(event.author_role, Role::Member | Role::System)
}

pub(crate) fn is_member_facing_response(event: &TimelineEvent) -> bool {
    is_staff_authored(event)
        && event.scope == VisibilityScope::Member
        && (event.event_type.is(EventType::STAFF_RESPONSE)
            || event.event_type.is(EventType::MEMBER_COMMUNICATION))
}

fn transition_target(event: &TimelineEvent) -> Option<CaseStatus> {
    if event.event_type.is_status_change() {
        event.metadata_status("to_status")
    } else {
        None
    }
}

/// A status change whose source is `submitted`.
fn leaves_intake(event: &TimelineEvent) -> bool {
    event.event_type.is_status_change()
        && event.metadata_status("from_status") == Some(CaseStatus::Submitted)
}

/// Resolving, rejecting or closing a case answers the member.
fn records_decision(event: &TimelineEvent) -> bool {
    matches!(
        transition_target(event),
        Some(CaseStatus::Resolved | CaseStatus::Rejected | CaseStatus::Closed)
    )
}

fn concludes_investigation(status: CaseStatus) -> bool {
    matches!(
        status,
        CaseStatus::Resolved | CaseStatus::Rejected | CaseStatus::Closed | CaseStatus::Withdrawn
    )
}

fn investigation_started_at(case: &Case, timeline: &[TimelineEvent]) -> Option<DateTime<Utc>> {
    let from_timeline = timeline
        .iter()
        .filter(|event| {
            matches!(
                transition_target(event),
                Some(CaseStatus::Investigation | CaseStatus::Investigating)
            )
        })
        .map(|event| event.occurred_at)
        .min();

    from_timeline.or(match case.status {
        CaseStatus::Investigation | CaseStatus::Investigating => Some(case.status_changed_at),
        _ => None,
    })
}
