use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::super::domain::{Case, CaseStatus};
use super::super::policy::SignalSlaTargets;
use super::super::timeline::TimelineEvent;
use super::business_days::business_days_between;
use super::sla::{assess_slas, is_member_facing_response, SlaHealth, SlaStatusAssessment};
use super::{Signal, SignalId, SignalType};

const ACKNOWLEDGMENT_OVERDUE_DAYS: i64 = 2;
const MEMBER_WAITING_DAYS: i64 = 3;
const STALE_CASE_DAYS: i64 = 7;
const ESCALATION_DAYS: i64 = 10;

fn is_signal_terminal(status: CaseStatus) -> bool {
    matches!(
        status,
        CaseStatus::Closed | CaseStatus::Resolved | CaseStatus::Withdrawn | CaseStatus::Escalated
    )
}

pub(crate) fn evaluate(
    case: &Case,
    timeline: &[TimelineEvent],
    targets: &SignalSlaTargets,
    now: DateTime<Utc>,
) -> Vec<Signal> {
    if is_signal_terminal(case.status) {
        return Vec::new();
    }

    let mut signals = Vec::new();
    let assessments = assess_slas(case, timeline, targets, now);

    let breached: Vec<&SlaStatusAssessment> = assessments
        .iter()
        .filter(|assessment| assessment.health == SlaHealth::Breached)
        .collect();
    let at_risk: Vec<&SlaStatusAssessment> = assessments
        .iter()
        .filter(|assessment| assessment.health == SlaHealth::AtRisk)
        .collect();

    if !breached.is_empty() {
        signals.push(build(
            case,
            SignalType::SlaBreached,
            "SLA breached".to_string(),
            format!(
                "{} SLA exceeded its business-day target",
                sla_names(&breached)
            ),
            sla_context(case, &breached),
            now,
            None,
        ));
    } else if !at_risk.is_empty() {
        let expires_at = at_risk.iter().map(|assessment| assessment.due_at).min();
        signals.push(build(
            case,
            SignalType::SlaAtRisk,
            "SLA at risk".to_string(),
            format!(
                "{} SLA has used at least {:.0}% of its business-day target",
                sla_names(&at_risk),
                targets.at_risk_ratio * 100.0
            ),
            sla_context(case, &at_risk),
            now,
            expires_at,
        ));
    }

    if case.status == CaseStatus::Submitted {
        let waited = business_days_between(case.created_at, now);
        if waited >= ACKNOWLEDGMENT_OVERDUE_DAYS {
            signals.push(build(
                case,
                SignalType::AcknowledgmentOverdue,
                "Acknowledgment overdue".to_string(),
                format!("case has waited {waited} business day(s) without leaving intake"),
                day_context(case, waited, ACKNOWLEDGMENT_OVERDUE_DAYS),
                now,
                None,
            ));
        }
    }

    if case.status == CaseStatus::PendingResponse {
        let last_response = timeline
            .iter()
            .filter(|event| is_member_facing_response(event))
            .map(|event| event.occurred_at)
            .max()
            .unwrap_or(case.status_changed_at);
        let waited = business_days_between(last_response, now);
        if waited >= MEMBER_WAITING_DAYS {
            let mut context = day_context(case, waited, MEMBER_WAITING_DAYS);
            context.insert("last_response_at".to_string(), json!(last_response));
            signals.push(build(
                case,
                SignalType::MemberWaiting,
                "Member waiting on a response".to_string(),
                format!("no response sent to the member for {waited} business day(s)"),
                context,
                now,
                None,
            ));
        }
    }

    let idle = business_days_between(case.updated_at, now);
    if idle >= STALE_CASE_DAYS {
        signals.push(build(
            case,
            SignalType::CaseStale,
            "Case is stale".to_string(),
            format!("no activity recorded for {idle} business day(s)"),
            day_context(case, idle, STALE_CASE_DAYS),
            now,
            None,
        ));
    }

    if case.status == CaseStatus::Investigating {
        let investigating = business_days_between(case.status_changed_at, now);
        if investigating >= ESCALATION_DAYS {
            signals.push(build(
                case,
                SignalType::EscalationNeeded,
                "Escalation needed".to_string(),
                format!("investigation open for {investigating} business day(s)"),
                day_context(case, investigating, ESCALATION_DAYS),
                now,
                None,
            ));
        }
    }

    let urgent_status = matches!(
        case.status,
        CaseStatus::Submitted | CaseStatus::PendingResponse | CaseStatus::Escalated
    );
    if urgent_status && signals.is_empty() {
        signals.push(build(
            case,
            SignalType::UrgentState,
            format!("Case is {}", case.status.label().to_ascii_lowercase()),
            "case sits in a status that needs prompt handling".to_string(),
            base_context(case),
            now,
            None,
        ));
    }

    signals
}

fn build(
    case: &Case,
    signal_type: SignalType,
    title: String,
    description: String,
    context: BTreeMap<String, Value>,
    now: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
) -> Signal {
    Signal {
        id: SignalId::generate(),
        case_id: case.id.clone(),
        signal_type,
        severity: signal_type.severity(),
        title,
        description,
        actionable: signal_type.actionable(),
        context,
        generated_at: now,
        expires_at,
    }
}

fn base_context(case: &Case) -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("status".to_string(), json!(case.status)),
        ("priority".to_string(), json!(case.priority)),
        ("assigned_to".to_string(), json!(case.assigned_to)),
    ])
}

fn day_context(case: &Case, elapsed: i64, threshold: i64) -> BTreeMap<String, Value> {
    let mut context = base_context(case);
    context.insert("business_days_elapsed".to_string(), json!(elapsed));
    context.insert("threshold_business_days".to_string(), json!(threshold));
    context
}

fn sla_context(case: &Case, assessments: &[&SlaStatusAssessment]) -> BTreeMap<String, Value> {
    let mut context = base_context(case);
    let slas: Vec<Value> = assessments
        .iter()
        .map(|assessment| {
            json!({
                "sla": assessment.sla,
                "started_at": assessment.started_at,
                "due_at": assessment.due_at,
                "elapsed_business_days": assessment.elapsed_business_days,
                "target_business_days": assessment.target_business_days,
            })
        })
        .collect();
    context.insert("slas".to_string(), Value::Array(slas));
    context
}

fn sla_names(assessments: &[&SlaStatusAssessment]) -> String {
    assessments
        .iter()
        .map(|assessment| assessment.sla.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
