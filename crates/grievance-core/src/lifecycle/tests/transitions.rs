use super::common::{at, member, officer, policy, steward};
use crate::lifecycle::domain::{Actor, CaseStatus, Priority, Role};
use crate::lifecycle::transitions::{
    RejectionKind, TransitionError, TransitionRequest, TransitionValidator,
};

fn request(current: CaseStatus, target: CaseStatus, actor: Actor) -> TransitionRequest {
    TransitionRequest {
        current,
        target,
        actor,
        priority: Priority::Medium,
        status_entered_at: at(2, 9),
        has_unresolved_critical_signals: false,
        has_adequate_documentation: true,
        notes: Some("reviewed with the member".to_string()),
    }
}

fn validator() -> TransitionValidator {
    TransitionValidator::new(policy())
}

#[test]
fn allowed_exactly_when_the_policy_has_an_edge() {
    let validator = validator();
    let admin = Actor::new("admin-root", Role::Admin);

    for from in CaseStatus::lifecycle_stages() {
        for to in CaseStatus::lifecycle_stages() {
            let decision = validator
                .validate(&request(from, to, admin.clone()), at(3, 9))
                .expect("lifecycle statuses are known");
            let permitted = validator.policy().permits(from, to);
            if permitted {
                assert!(decision.allowed, "{from} -> {to} should be allowed");
            } else {
                assert!(!decision.allowed, "{from} -> {to} should be denied");
                assert_eq!(
                    decision.rejection,
                    Some(RejectionKind::TransitionNotAllowed)
                );
            }
        }
    }
}

#[test]
fn closed_cases_cannot_move() {
    let validator = validator();
    for target in CaseStatus::lifecycle_stages() {
        let decision = validator
            .validate(&request(CaseStatus::Closed, target, officer()), at(3, 9))
            .expect("known statuses");
        assert!(!decision.allowed);
        assert_eq!(decision.rejection, Some(RejectionKind::TransitionNotAllowed));
    }
}

#[test]
fn submitted_cannot_jump_to_resolved() {
    let decision = validator()
        .validate(
            &request(CaseStatus::Submitted, CaseStatus::Resolved, officer()),
            at(3, 9),
        )
        .expect("known statuses");

    assert!(!decision.allowed);
    assert_eq!(decision.rejection, Some(RejectionKind::TransitionNotAllowed));
    let reason = decision.reason.expect("denials carry a reason");
    assert!(reason.starts_with("TransitionNotAllowed:"), "{reason}");
    assert!(decision.metadata.next_deadline.is_none());
}

#[test]
fn members_cannot_resolve_their_own_case() {
    let decision = validator()
        .validate(
            &request(CaseStatus::UnderReview, CaseStatus::Resolved, member()),
            at(3, 9),
        )
        .expect("known statuses");

    assert!(!decision.allowed);
    assert_eq!(decision.rejection, Some(RejectionKind::InsufficientRole));
}

#[test]
fn members_may_return_documentation_for_review() {
    let decision = validator()
        .validate(
            &request(
                CaseStatus::PendingDocumentation,
                CaseStatus::UnderReview,
                member(),
            ),
            at(3, 9),
        )
        .expect("known statuses");

    assert!(decision.allowed, "{:?}", decision.reason);
}

#[test]
fn resolution_requires_documentation() {
    let mut req = request(CaseStatus::Investigation, CaseStatus::Resolved, officer());
    req.has_adequate_documentation = false;

    let decision = validator().validate(&req, at(3, 9)).expect("known statuses");
    assert!(!decision.allowed);
    assert_eq!(decision.rejection, Some(RejectionKind::DocumentationRequired));
}

#[test]
fn critical_signals_block_rejection_and_closure() {
    let validator = validator();
    for (from, to) in [
        (CaseStatus::UnderReview, CaseStatus::Rejected),
        (CaseStatus::Resolved, CaseStatus::Closed),
    ] {
        let mut req = request(from, to, officer());
        req.has_unresolved_critical_signals = true;
        let decision = validator.validate(&req, at(3, 9)).expect("known statuses");
        assert!(!decision.allowed, "{from} -> {to}");
        assert_eq!(decision.rejection, Some(RejectionKind::UnresolvedSignalBlock));
    }
}

#[test]
fn non_blocking_edges_warn_about_critical_signals() {
    let mut req = request(CaseStatus::Submitted, CaseStatus::UnderReview, steward());
    req.has_unresolved_critical_signals = true;

    let decision = validator().validate(&req, at(3, 9)).expect("known statuses");
    assert!(decision.allowed);
    assert!(decision
        .warnings
        .iter()
        .any(|warning| warning.contains("unresolved critical signals")));
}

#[test]
fn late_transitions_are_allowed_with_a_warning() {
    // medium submitted cases get two calendar days
    let decision = validator()
        .validate(
            &request(CaseStatus::Submitted, CaseStatus::UnderReview, steward()),
            at(9, 9),
        )
        .expect("known statuses");

    assert!(decision.allowed);
    assert!(!decision.metadata.sla_compliant);
    assert_eq!(decision.metadata.days_in_state, 7);
    assert!(decision.warnings.iter().any(|warning| warning.contains("late")));
}

#[test]
fn allowed_decision_reports_the_next_deadline() {
    let decision = validator()
        .validate(
            &request(CaseStatus::Submitted, CaseStatus::UnderReview, steward()),
            at(3, 9),
        )
        .expect("known statuses");

    assert!(decision.allowed);
    assert!(decision.metadata.sla_compliant);
    let next = decision.metadata.next_deadline.expect("deadline for target");
    assert!(next > at(3, 9));
}

#[test]
fn outcomes_without_notes_are_flagged() {
    let mut req = request(CaseStatus::Submitted, CaseStatus::Rejected, officer());
    req.notes = Some("   ".to_string());

    let decision = validator().validate(&req, at(3, 9)).expect("known statuses");
    assert!(decision.allowed);
    assert!(decision
        .warnings
        .iter()
        .any(|warning| warning.contains("no notes")));
}

#[test]
fn pipeline_statuses_are_reported_as_unknown() {
    let result = validator().validate(
        &request(CaseStatus::Investigating, CaseStatus::Resolved, officer()),
        at(3, 9),
    );
    match result {
        Err(TransitionError::UnknownStatus(CaseStatus::Investigating)) => {}
        other => panic!("expected unknown status error, got {other:?}"),
    }
}

#[test]
fn validation_is_pure() {
    let validator = validator();
    let req = request(CaseStatus::UnderReview, CaseStatus::Investigation, steward());

    let first = validator.validate(&req, at(4, 12)).expect("known statuses");
    let second = validator.validate(&req, at(4, 12)).expect("known statuses");
    assert_eq!(first, second);
}
