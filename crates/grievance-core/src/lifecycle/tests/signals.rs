use super::common::{at, case_in, event, officer, staff_reply, status_change, steward};
use crate::lifecycle::domain::{CaseId, CaseStatus, Priority};
use crate::lifecycle::policy::SignalSlaTargets;
use crate::lifecycle::signals::{
    assess_slas, dashboard, highest_per_case, webhook_payload, Signal, SignalDetector,
    SignalSeverity, SignalType, SlaHealth, SlaStatusAssessment, TrackedSla,
};
use crate::lifecycle::timeline::{EventType, TimelineEvent, VisibilityScope};

fn detector() -> SignalDetector {
    SignalDetector::new(SignalSlaTargets::default())
}

fn types(signals: &[Signal]) -> Vec<SignalType> {
    signals.iter().map(|signal| signal.signal_type).collect()
}

#[test]
fn terminal_statuses_produce_no_signals() {
    let detector = detector();
    for status in [
        CaseStatus::Closed,
        CaseStatus::Resolved,
        CaseStatus::Withdrawn,
        CaseStatus::Escalated,
    ] {
        // untouched for a month, which would otherwise trip every rule
        let case = case_in(status, Priority::Critical, at(2, 9));
        let signals = detector.detect(&case, &[], at(31, 9));
        assert!(signals.is_empty(), "{status} produced {:?}", types(&signals));
    }
}

#[test]
fn high_priority_intake_waiting_three_business_days_is_overdue() {
    let case = case_in(CaseStatus::Submitted, Priority::High, at(2, 9));

    let signals = detector().detect(&case, &[], at(5, 9));

    let overdue = signals
        .iter()
        .find(|signal| signal.signal_type == SignalType::AcknowledgmentOverdue)
        .expect("acknowledgment overdue fires");
    assert_eq!(overdue.severity, SignalSeverity::Critical);
    assert!(overdue.actionable);
    assert_eq!(overdue.context["business_days_elapsed"], 3);
    assert_eq!(overdue.context["priority"], "high");
}

#[test]
fn at_risk_acknowledgment_carries_its_due_date() {
    let case = case_in(CaseStatus::Submitted, Priority::Medium, at(2, 9));

    let signals = detector().detect(&case, &[], at(4, 9));

    assert_eq!(
        types(&signals),
        vec![SignalType::SlaAtRisk, SignalType::AcknowledgmentOverdue]
    );
    let at_risk = &signals[0];
    assert_eq!(at_risk.severity, SignalSeverity::Urgent);
    assert_eq!(at_risk.expires_at, Some(at(4, 9)));
}

#[test]
fn breach_suppresses_at_risk() {
    // acknowledgment is five business days late while first response sits exactly at risk
    let case = case_in(CaseStatus::UnderReview, Priority::Medium, at(2, 9));

    let signals = detector().detect(&case, &[], at(9, 9));
    let found = types(&signals);

    assert!(found.contains(&SignalType::SlaBreached));
    assert!(!found.contains(&SignalType::SlaAtRisk));
    let breached = &signals[0];
    let slas = breached.context["slas"].as_array().expect("sla list");
    assert!(slas.iter().any(|sla| sla["sla"] == "acknowledgment"));
}

#[test]
fn answered_cases_have_no_sla_signals() {
    let case = case_in(CaseStatus::UnderReview, Priority::Medium, at(2, 9));
    let timeline = vec![staff_reply(&case, at(2, 15))];

    let signals = detector().detect(&case, &timeline, at(5, 9));
    assert!(signals.is_empty(), "{:?}", types(&signals));
}

#[test]
fn member_waiting_counts_from_the_last_reply() {
    let mut case = case_in(CaseStatus::PendingResponse, Priority::Medium, at(2, 8));
    case.updated_at = at(4, 8);
    let timeline = vec![staff_reply(&case, at(2, 10))];

    let signals = detector().detect(&case, &timeline, at(5, 10));

    assert_eq!(types(&signals), vec![SignalType::MemberWaiting]);
    assert_eq!(signals[0].severity, SignalSeverity::Urgent);
}

#[test]
fn idle_cases_go_stale_after_seven_business_days() {
    let case = case_in(CaseStatus::UnderReview, Priority::Low, at(2, 9));
    let timeline = vec![staff_reply(&case, at(2, 11))];

    let signals = detector().detect(&case, &timeline, at(11, 9));

    assert_eq!(types(&signals), vec![SignalType::CaseStale]);
    assert_eq!(signals[0].severity, SignalSeverity::Warning);
    assert_eq!(signals[0].context["business_days_elapsed"], 7);
}

#[test]
fn long_investigations_need_escalation() {
    let mut case = case_in(CaseStatus::Investigating, Priority::Medium, at(2, 9));
    case.updated_at = at(13, 9);
    let timeline = vec![staff_reply(&case, at(2, 11))];

    let signals = detector().detect(&case, &timeline, at(16, 9));

    assert_eq!(types(&signals), vec![SignalType::EscalationNeeded]);
}

#[test]
fn investigation_sla_starts_at_the_transition_event() {
    let mut case = case_in(CaseStatus::Investigation, Priority::Medium, at(2, 9));
    case.updated_at = at(27, 9);
    let timeline = vec![
        staff_reply(&case, at(2, 10)),
        status_change(
            &case,
            CaseStatus::UnderReview,
            CaseStatus::Investigation,
            &steward(),
            at(3, 9),
        ),
    ];

    // 19 business days into a 30 day target is still on track
    assert!(detector().detect(&case, &timeline, at(30, 9)).is_empty());
}

fn health_of(assessments: &[SlaStatusAssessment], sla: TrackedSla) -> SlaHealth {
    assessments
        .iter()
        .find(|assessment| assessment.sla == sla)
        .map(|assessment| assessment.health)
        .unwrap_or_else(|| panic!("{} was not assessed", sla.as_str()))
}

#[test]
fn steward_intake_and_internal_notes_do_not_acknowledge() {
    let case = case_in(CaseStatus::Submitted, Priority::Medium, at(2, 9));
    let timeline = vec![
        event(
            &case,
            EventType::CASE_SUBMITTED,
            &steward(),
            VisibilityScope::Member,
            at(2, 9),
        ),
        event(
            &case,
            EventType::INTERNAL_NOTE,
            &steward(),
            VisibilityScope::Staff,
            at(3, 9),
        ),
    ];

    let assessments = assess_slas(&case, &timeline, &SignalSlaTargets::default(), at(6, 9));
    assert_eq!(
        health_of(&assessments, TrackedSla::Acknowledgment),
        SlaHealth::Breached
    );

    let found = types(&detector().detect(&case, &timeline, at(6, 9)));
    assert!(found.contains(&SignalType::SlaBreached), "{found:?}");
    assert!(found.contains(&SignalType::AcknowledgmentOverdue), "{found:?}");
}

#[test]
fn leaving_intake_acknowledges_the_case() {
    let mut case = case_in(CaseStatus::UnderReview, Priority::Medium, at(2, 9));
    case.status_changed_at = at(3, 9);
    let timeline = vec![status_change(
        &case,
        CaseStatus::Submitted,
        CaseStatus::UnderReview,
        &steward(),
        at(3, 9),
    )];

    let assessments = assess_slas(&case, &timeline, &SignalSlaTargets::default(), at(4, 9));
    let acknowledgment = assessments
        .iter()
        .find(|assessment| assessment.sla == TrackedSla::Acknowledgment)
        .expect("acknowledgment assessed");
    assert_eq!(acknowledgment.health, SlaHealth::Met);
    assert_eq!(acknowledgment.completed_at, Some(at(3, 9)));
    assert!(health_of(&assessments, TrackedSla::FirstResponse).is_open());
}

#[test]
fn rejection_completes_member_facing_slas() {
    let mut case = case_in(CaseStatus::Rejected, Priority::Medium, at(2, 9));
    case.status_changed_at = at(2, 10);
    case.updated_at = at(11, 9);
    let timeline = vec![
        status_change(
            &case,
            CaseStatus::Submitted,
            CaseStatus::Rejected,
            &officer(),
            at(2, 10),
        ),
        event(
            &case,
            EventType::INTERNAL_NOTE,
            &steward(),
            VisibilityScope::Staff,
            at(11, 9),
        ),
    ];

    let assessments = assess_slas(&case, &timeline, &SignalSlaTargets::default(), at(11, 10));
    assert_eq!(
        health_of(&assessments, TrackedSla::Acknowledgment),
        SlaHealth::Met
    );
    assert_eq!(
        health_of(&assessments, TrackedSla::FirstResponse),
        SlaHealth::Met
    );

    let signals = detector().detect(&case, &timeline, at(11, 10));
    assert!(signals.iter().all(|signal| !signal.is_blocking()), "{:?}", types(&signals));
}

#[test]
fn fresh_intake_reports_urgent_state_only() {
    let case = case_in(CaseStatus::Submitted, Priority::Medium, at(2, 9));

    let signals = detector().detect(&case, &[], at(2, 10));

    assert_eq!(types(&signals), vec![SignalType::UrgentState]);
    assert_eq!(signals[0].severity, SignalSeverity::Info);
    assert!(!signals[0].actionable);
    assert!(!signals[0].is_blocking());
}

#[test]
fn detect_all_orders_by_severity() {
    let detector = detector();
    let fresh = case_in(CaseStatus::Submitted, Priority::Low, at(9, 9));
    let mut overdue = case_in(CaseStatus::Submitted, Priority::High, at(2, 9));
    overdue.id = CaseId("case-overdue".to_string());

    let empty: Vec<TimelineEvent> = Vec::new();
    let signals = detector.detect_all(
        [(&fresh, empty.as_slice()), (&overdue, empty.as_slice())],
        at(9, 10),
    );

    let ranks: Vec<u8> = signals.iter().map(|signal| signal.severity.rank()).collect();
    let mut sorted = ranks.clone();
    sorted.sort_unstable();
    assert_eq!(ranks, sorted);
    assert_eq!(signals[0].severity, SignalSeverity::Critical);
    assert_eq!(signals.last().map(|signal| signal.severity), Some(SignalSeverity::Info));
}

#[test]
fn dashboard_summarises_signal_counts() {
    let detector = detector();
    let fresh = case_in(CaseStatus::Submitted, Priority::Low, at(9, 9));
    let mut overdue = case_in(CaseStatus::Submitted, Priority::High, at(2, 9));
    overdue.id = CaseId("case-overdue".to_string());
    let empty: Vec<TimelineEvent> = Vec::new();
    let signals = detector.detect_all(
        [(&fresh, empty.as_slice()), (&overdue, empty.as_slice())],
        at(9, 10),
    );

    let summary = dashboard(&signals);
    assert_eq!(summary.total, signals.len());
    assert_eq!(summary.cases_affected, 2);
    assert_eq!(summary.info, 1);
    assert!(summary.critical >= 2);
    assert_eq!(summary.actionable, summary.total - 1);
    assert_eq!(summary.by_type.get(&SignalType::UrgentState), Some(&1));

    let highest = highest_per_case(&signals);
    assert_eq!(
        highest[&CaseId("case-overdue".to_string())].severity,
        SignalSeverity::Critical
    );
    assert_eq!(
        highest[&CaseId("case-fixture".to_string())].signal_type,
        SignalType::UrgentState
    );
}

#[test]
fn webhook_payload_uses_integration_field_names() {
    let case = case_in(CaseStatus::Submitted, Priority::High, at(2, 9));
    let signals = detector().detect(&case, &[], at(5, 9));

    let payload = webhook_payload(&signals[0], at(5, 9));
    let json = serde_json::to_value(&payload).expect("payload serializes");

    assert_eq!(json["event"], "signal.detected");
    assert_eq!(json["caseRef"], "case-fixture");
    assert!(json["signal"]["signal_type"].is_string());
    assert!(json.get("timestamp").is_some());
}
