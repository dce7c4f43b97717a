use serde_json::Value;

use super::common::{at, case_in, event, member, officer, status_change, steward};
use crate::lifecycle::defensibility::{
    derive_audit_trail, derive_transitions, ExportFormat, PackGenerator, PackOptions,
    VerificationStatus,
};
use crate::lifecycle::domain::{ActorId, Case, CaseStatus, Priority};
use crate::lifecycle::timeline::{EventType, TimelineEvent, VisibilityScope};

fn resolved_case() -> (Case, Vec<TimelineEvent>) {
    let mut case = case_in(CaseStatus::Resolved, Priority::High, at(2, 9));
    case.status_changed_at = at(12, 15);

    let mut submitted = event(
        &case,
        EventType::CASE_SUBMITTED,
        &member(),
        VisibilityScope::Member,
        at(2, 9),
    );
    submitted
        .metadata
        .insert("member_email".to_string(), Value::from("ana@example.org"));
    submitted
        .metadata
        .insert("shift".to_string(), Value::from("night"));

    let timeline = vec![
        status_change(
            &case,
            CaseStatus::UnderReview,
            CaseStatus::Resolved,
            &officer(),
            at(12, 15),
        ),
        submitted,
        status_change(
            &case,
            CaseStatus::Submitted,
            CaseStatus::UnderReview,
            &steward(),
            at(3, 10),
        ),
        event(
            &case,
            EventType::DOCUMENT_ADDED,
            &steward(),
            VisibilityScope::Staff,
            at(6, 16),
        ),
    ];
    (case, timeline)
}

fn options() -> PackOptions {
    PackOptions::new("arbitration filing", ActorId("officer-okafor".to_string()))
}

#[test]
fn identical_inputs_hash_identically() {
    let (case, timeline) = resolved_case();
    let generator = PackGenerator::new();

    let first = generator
        .generate_from_timeline(&case, &timeline, 1, &options(), at(13, 9))
        .expect("pack builds");
    let second = generator
        .generate_from_timeline(&case, &timeline, 1, &options(), at(13, 9))
        .expect("pack builds");

    assert_eq!(first.hashes, second.hashes);
    assert_ne!(first.id, second.id);
    assert_eq!(first.hashes.combined.len(), 64);
}

#[test]
fn pack_orders_timeline_and_lists_transitions() {
    let (case, timeline) = resolved_case();

    let pack = PackGenerator::new()
        .generate_from_timeline(&case, &timeline, 3, &options(), at(13, 9))
        .expect("pack builds");

    assert_eq!(pack.export_version, 3);
    assert_eq!(pack.verification, VerificationStatus::Verified);
    assert!(pack
        .contents
        .timeline
        .windows(2)
        .all(|pair| pair[0].occurred_at <= pair[1].occurred_at));
    assert_eq!(pack.contents.summary.event_count, 4);
    assert_eq!(pack.contents.summary.transition_count, 2);

    let targets: Vec<CaseStatus> = pack
        .contents
        .transitions
        .iter()
        .map(|record| record.to)
        .collect();
    assert_eq!(targets, vec![CaseStatus::UnderReview, CaseStatus::Resolved]);
    assert!(pack
        .contents
        .transitions
        .iter()
        .all(|record| record.validation_passed));
    assert_eq!(pack.size_bytes, pack.body.len());
}

#[test]
fn sensitive_metadata_is_redacted_unless_requested() {
    let (case, timeline) = resolved_case();
    let generator = PackGenerator::new();

    let redacted = generator
        .generate_from_timeline(&case, &timeline, 1, &options(), at(13, 9))
        .expect("pack builds");
    let submitted = &redacted.contents.timeline[0];
    assert_eq!(submitted.metadata["member_email"], "[redacted]");
    assert_eq!(submitted.metadata["shift"], "night");
    assert!(!redacted.body.contains("ana@example.org"));
    assert!(redacted
        .contents
        .audit
        .iter()
        .all(|entry| entry.metadata.get("member_email") != Some(&Value::from("ana@example.org"))));

    let mut full_options = options();
    full_options.include_sensitive_data = true;
    let full = generator
        .generate_from_timeline(&case, &timeline, 2, &full_options, at(13, 9))
        .expect("pack builds");
    assert_eq!(full.contents.timeline[0].metadata["member_email"], "ana@example.org");
    assert_ne!(full.hashes.timeline, redacted.hashes.timeline);
}

#[test]
fn tampering_is_detected_per_slice() {
    let (case, timeline) = resolved_case();
    let mut pack = PackGenerator::new()
        .generate_from_timeline(&case, &timeline, 1, &options(), at(13, 9))
        .expect("pack builds");
    assert!(pack.verify().expect("verifies").is_verified());

    pack.contents.timeline[1].message = "Status quietly rewritten".to_string();
    let verification = pack.verify().expect("verifies");

    assert!(!verification.timeline);
    assert!(verification.audit);
    assert!(verification.transitions);
    assert!(!verification.combined);
    assert!(!verification.is_verified());
}

#[test]
fn csv_export_shares_hashes_with_json() {
    let (case, timeline) = resolved_case();
    let generator = PackGenerator::new();

    let json = generator
        .generate_from_timeline(&case, &timeline, 1, &options(), at(13, 9))
        .expect("json pack");
    let mut csv_options = options();
    csv_options.format = ExportFormat::Csv;
    let csv = generator
        .generate_from_timeline(&case, &timeline, 1, &csv_options, at(13, 9))
        .expect("csv pack");

    assert_eq!(json.hashes, csv.hashes);
    assert!(csv.body.starts_with("occurred_at,event_id,event_type"));
    assert_eq!(csv.body.lines().count(), 5);
    let parsed: Value = serde_json::from_str(&json.body).expect("json body parses");
    assert_eq!(parsed["summary"]["status"], "resolved");
}

#[test]
fn audit_trail_uses_event_resources() {
    let (_, timeline) = resolved_case();

    let audit = derive_audit_trail(&timeline, false);
    assert_eq!(audit.len(), timeline.len());
    assert!(audit[0].resource.starts_with("cases/case-fixture/events/"));

    let transitions = derive_transitions(&timeline);
    assert_eq!(transitions.len(), 2);
    assert_eq!(transitions[0].from, Some(CaseStatus::UnderReview));
}

#[test]
fn rendered_json_body_is_checked_against_the_hashes() {
    let (case, timeline) = resolved_case();
    let mut pack = PackGenerator::new()
        .generate_from_timeline(&case, &timeline, 1, &options(), at(13, 9))
        .expect("pack builds");
    assert_eq!(pack.verification, VerificationStatus::Verified);
    assert!(pack.verify_body().expect("body checks"));

    // the stored contents still verify, only the exported document was edited
    pack.body = pack.body.replace("\"night\"", "\"day\"");
    assert!(pack.verify().expect("verifies").is_verified());
    assert!(!pack.verify_body().expect("body checks"));

    pack.body = "{ not json".to_string();
    assert!(!pack.verify_body().expect("body checks"));
}

#[test]
fn rendered_csv_body_must_match_verified_contents() {
    let (case, timeline) = resolved_case();
    let mut csv_options = options();
    csv_options.format = ExportFormat::Csv;
    let mut pack = PackGenerator::new()
        .generate_from_timeline(&case, &timeline, 1, &csv_options, at(13, 9))
        .expect("pack builds");
    assert_eq!(pack.verification, VerificationStatus::Verified);
    assert!(pack.verify_body().expect("body checks"));

    pack.body = pack.body.replace("officer-okafor", "officer-someone-else");
    assert!(!pack.verify_body().expect("body checks"));
}
