use crate::infra::{InMemoryIdentityDirectory, LoggingIntegrationHook, LoggingOutbox};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::Args;
use grievance_core::error::AppError;
use grievance_core::lifecycle::signals::SignalDashboard;
use grievance_core::lifecycle::{
    verify_pack, Actor, ActorId, CaseId, CaseService, CaseStatus, EventType, ExportFormat,
    LifecyclePolicy, MemberId, MemoryStore, NewCase, NewTimelineEvent, OrganizationId,
    PackOptions, Priority, Role, Signal, StatusUpdateOutcome, VisibilityScope,
};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

const ORGANIZATION: &str = "org-local-12";

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Intake date (YYYY-MM-DD). Defaults to the Monday of the current week.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) start: Option<NaiveDate>,
    /// Print a JSON summary instead of the narrated walkthrough.
    #[arg(long)]
    pub(crate) json: bool,
    /// Also produce a CSV hearing export for the closed case.
    #[arg(long)]
    pub(crate) csv: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct PolicyArgs {
    /// Policy JSON file. The standard policy is shown when omitted.
    #[arg(long)]
    pub(crate) path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct DemoSummary {
    case_id: CaseId,
    final_status: CaseStatus,
    steps: Vec<StepSummary>,
    member_events: usize,
    staff_events: usize,
    total_events: usize,
    packs: Vec<PackSummary>,
    unattended_case_signals: Vec<Signal>,
    dashboard: SignalDashboard,
    notifications_sent: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_notification: Option<String>,
    webhooks_prepared: usize,
}

#[derive(Debug, Serialize)]
struct StepSummary {
    actor: String,
    target: CaseStatus,
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    warnings: Vec<String>,
}

#[derive(Debug, Serialize)]
struct PackSummary {
    version: u32,
    purpose: String,
    format: ExportFormat,
    combined_hash: String,
    verified: bool,
}

/// Midnight UTC on `start`, shifted by whole days and hours.
fn at(start: NaiveDate, days: i64, hours: i64) -> DateTime<Utc> {
    let midnight = Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN));
    midnight + Duration::days(days) + Duration::hours(hours)
}

fn monday_of(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

fn intake(title: &str, member: &str, priority: Priority) -> NewCase {
    NewCase {
        title: title.to_string(),
        priority,
        organization_id: OrganizationId(ORGANIZATION.to_string()),
        member_id: MemberId(member.to_string()),
        assigned_to: Some(ActorId("steward-lee".to_string())),
        description: None,
    }
}

fn step_summary(actor: &Actor, target: CaseStatus, outcome: &StatusUpdateOutcome) -> StepSummary {
    StepSummary {
        actor: actor.id.0.clone(),
        target,
        success: outcome.success,
        error: outcome.error.clone(),
        warnings: outcome
            .decision
            .as_ref()
            .map(|decision| decision.warnings.clone())
            .unwrap_or_default(),
    }
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs { start, json, csv } = args;
    let start = start.unwrap_or_else(|| monday_of(Local::now().date_naive()));

    let directory = InMemoryIdentityDirectory::with_fallback_domain("local12.example.org");
    directory
        .register("member-ana", "Ana Ruiz", "ana.ruiz@example.org")
        .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
    let outbox = Arc::new(LoggingOutbox::default());
    let integration = Arc::new(LoggingIntegrationHook::new(Some(
        "https://hooks.local12.example.org/signals".to_string(),
    )));
    let service = CaseService::inline(
        Arc::new(MemoryStore::new()),
        Arc::new(LifecyclePolicy::standard()),
        Arc::new(directory),
        outbox.clone(),
        integration.clone(),
    );

    let member = Actor::new("member-ana", Role::Member);
    let steward = Actor::new("steward-lee", Role::Steward);
    let officer = Actor::new("officer-okafor", Role::Officer);

    if !json {
        println!("Grievance lifecycle demo (intake {start})");
    }

    let case = service.open_case_at(
        intake("Suspended without a hearing", "member-ana", Priority::High),
        &member,
        at(start, 0, 9),
    )?;
    if !json {
        println!("- Opened {} for {} ({})", case.id, case.member_id.0, case.priority.label());
    }

    let mut steps = Vec::new();
    let mut apply = |target: CaseStatus,
                     actor: &Actor,
                     notes: Option<&str>,
                     when: DateTime<Utc>|
     -> Result<(), AppError> {
        let outcome = service.update_status_at(&case.id, target, actor, notes, when)?;
        let step = step_summary(actor, target, &outcome);
        if !json {
            if step.success {
                println!("- {} moved the case to {}", step.actor, target.label());
            } else {
                println!(
                    "- {} could not move the case to {}: {}",
                    step.actor,
                    target.label(),
                    step.error.as_deref().unwrap_or("rejected")
                );
            }
            for warning in &step.warnings {
                println!("    warning: {warning}");
            }
            if let Some(version) = outcome.export_version {
                println!("    defensibility pack v{version} sealed");
            }
        }
        steps.push(step);
        Ok(())
    };

    apply(
        CaseStatus::UnderReview,
        &steward,
        Some("Intake reviewed with the member"),
        at(start, 1, 9),
    )?;
    service.add_event_at(
        NewTimelineEvent::new(
            case.id.clone(),
            EventType::STAFF_RESPONSE,
            "We have requested the suspension letter from management",
            steward.clone(),
        )
        .with_scope(VisibilityScope::Member),
        at(start, 1, 10),
    )?;
    apply(
        CaseStatus::Investigation,
        &steward,
        Some("Interviewing the shift supervisor"),
        at(start, 2, 9),
    )?;
    service.add_event_at(
        NewTimelineEvent::new(
            case.id.clone(),
            EventType::INTERNAL_NOTE,
            "Supervisor admits no hearing was scheduled",
            steward.clone(),
        )
        .internal(),
        at(start, 2, 15),
    )?;
    apply(CaseStatus::PendingDocumentation, &steward, None, at(start, 3, 9))?;
    service.add_event_at(
        NewTimelineEvent::new(
            case.id.clone(),
            EventType::DOCUMENT_ADDED,
            "Suspension letter and shift roster",
            member.clone(),
        )
        .with_metadata("uploader_email", "ana.ruiz@example.org"),
        at(start, 4, 9),
    )?;
    apply(CaseStatus::Closed, &officer, None, at(start, 4, 10))?;
    apply(
        CaseStatus::Resolved,
        &officer,
        Some("Suspension rescinded with back pay"),
        at(start, 7, 9),
    )?;
    apply(CaseStatus::Closed, &officer, None, at(start, 8, 9))?;

    if csv {
        let mut options = PackOptions::new("grievance hearing", officer.id.clone());
        options.format = ExportFormat::Csv;
        let pack = service.generate_pack_at(&case.id, &options, at(start, 8, 10))?;
        if !json {
            let header = pack.body.lines().next().unwrap_or_default();
            println!("- CSV hearing export v{} ({header})", pack.export_version);
        }
    }

    let unattended = service.open_case_at(
        intake("Unsafe lockout procedure", "member-ben", Priority::Critical),
        &Actor::new("member-ben", Role::Member),
        at(start, 0, 11),
    )?;
    let unattended_signals = service.detect_signals(&unattended.id, at(start, 3, 12))?;

    let final_case = service.case(&case.id)?;
    let final_status = final_case
        .as_ref()
        .map(|case| case.status)
        .unwrap_or(CaseStatus::Submitted);

    let timeline = service.timeline();
    let member_events = timeline
        .member_timeline(&case.id, &case.member_id)
        .map(|events| events.len())
        .unwrap_or_default();
    let staff_events = timeline
        .staff_timeline(&case.id, &case.organization_id)
        .map(|events| events.len())
        .unwrap_or_default();
    let total_events = timeline
        .full_timeline(&case.id)
        .map(|events| events.len())
        .unwrap_or_default();

    let mut packs = Vec::new();
    for pack in service.packs(&case.id)? {
        let verified = verify_pack(&pack.hashes, &pack.contents)
            .map(|verification| verification.is_verified())
            .unwrap_or(false);
        packs.push(PackSummary {
            version: pack.export_version,
            purpose: pack.purpose,
            format: pack.format,
            combined_hash: pack.hashes.combined,
            verified,
        });
    }

    let notifications = outbox.messages();
    let summary = DemoSummary {
        case_id: case.id.clone(),
        final_status,
        steps,
        member_events,
        staff_events,
        total_events,
        packs,
        unattended_case_signals: unattended_signals,
        dashboard: service.signal_dashboard()?,
        notifications_sent: notifications.len(),
        last_notification: notifications.last().map(|message| message.subject.clone()),
        webhooks_prepared: integration.published().len(),
    };

    if json {
        let rendered = serde_json::to_string_pretty(&summary).map_err(std::io::Error::from)?;
        println!("{rendered}");
        return Ok(());
    }

    render_summary(&summary, &unattended.id);
    Ok(())
}

fn render_summary(summary: &DemoSummary, unattended: &CaseId) {
    println!("\nTimeline visibility for {}", summary.case_id);
    println!("- member view: {} events", summary.member_events);
    println!("- staff view: {} events", summary.staff_events);
    println!("- full record: {} events", summary.total_events);

    println!("\nDefensibility packs");
    for pack in &summary.packs {
        println!(
            "- v{} [{:?}] {} | combined {} | {}",
            pack.version,
            pack.format,
            pack.purpose,
            pack.combined_hash,
            if pack.verified { "verified" } else { "FAILED" }
        );
    }

    println!("\nSignals for unattended case {unattended} after three days");
    if summary.unattended_case_signals.is_empty() {
        println!("- none");
    }
    for signal in &summary.unattended_case_signals {
        println!(
            "- [{}] {}: {}",
            signal.severity.label(),
            signal.title,
            signal.description
        );
    }

    let dashboard = &summary.dashboard;
    println!(
        "\nDashboard: {} signals across {} cases ({} critical, {} urgent, {} actionable)",
        dashboard.total,
        dashboard.cases_affected,
        dashboard.critical,
        dashboard.urgent,
        dashboard.actionable
    );
    println!(
        "Notifications sent: {} | signal webhooks prepared: {}",
        summary.notifications_sent, summary.webhooks_prepared
    );
    if let Some(subject) = &summary.last_notification {
        println!("Last notification: {subject}");
    }
    println!("Final status: {}", summary.final_status.label());
}

pub(crate) fn run_policy_report(args: PolicyArgs) -> Result<(), AppError> {
    let policy = match args.path {
        Some(path) => {
            let raw = fs::read_to_string(&path)?;
            println!("Lifecycle policy from {}", path.display());
            LifecyclePolicy::from_json(&raw)?
        }
        None => {
            println!("Standard lifecycle policy");
            LifecyclePolicy::standard()
        }
    };

    println!("\nTransitions");
    for (from, targets) in &policy.edges {
        if targets.is_empty() {
            println!("- {from}: terminal");
            continue;
        }
        let targets: Vec<&str> = targets.iter().map(|status| status.as_str()).collect();
        println!("- {from} -> {}", targets.join(", "));
    }

    if !policy.edge_rules.is_empty() {
        println!("\nEdge rules");
    }
    for rule in &policy.edge_rules {
        let roles = rule
            .allowed_roles
            .as_ref()
            .map(|roles| {
                roles
                    .iter()
                    .map(|role| role.label())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_else(|| "any role".to_string());
        println!(
            "- {} -> {}: {roles}{}{}",
            rule.from,
            rule.to,
            if rule.requires_documentation {
                ", documentation required"
            } else {
                ""
            },
            if rule.blocks_on_critical_signals {
                ", blocked by critical signals"
            } else {
                ""
            }
        );
    }

    println!("\nCalendar-day SLA by status");
    for (status, days) in &policy.sla.base_days {
        println!("- {status}: {days} days");
    }
    println!("Priority multipliers");
    for (priority, multiplier) in &policy.sla.priority_multipliers {
        println!("- {}: x{multiplier}", priority.label());
    }

    let targets = &policy.signal_slas;
    println!(
        "\nBusiness-day targets: acknowledgment {} | first response {} | investigation {} \
         (at risk from {:.0}%)",
        targets.acknowledgment_days,
        targets.first_response_days,
        targets.investigation_days,
        targets.at_risk_ratio * 100.0
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monday_of_rewinds_to_the_week_start() {
        let friday = NaiveDate::from_ymd_opt(2026, 3, 6).expect("valid date");
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date");
        assert_eq!(monday_of(friday), monday);
        assert_eq!(monday_of(monday), monday);
    }

    #[test]
    fn at_offsets_from_midnight_utc() {
        let start = NaiveDate::from_ymd_opt(2026, 3, 2).expect("valid date");
        let expected = Utc
            .with_ymd_and_hms(2026, 3, 5, 9, 0, 0)
            .single()
            .expect("valid timestamp");
        assert_eq!(at(start, 3, 9), expected);
    }

    #[test]
    fn scripted_walkthrough_runs_end_to_end() {
        let args = DemoArgs {
            start: NaiveDate::from_ymd_opt(2026, 3, 2),
            json: true,
            csv: true,
        };
        run_demo(args).expect("demo completes");
    }

    #[test]
    fn policy_report_rejects_missing_files() {
        let args = PolicyArgs {
            path: Some(PathBuf::from("./does-not-exist/policy.json")),
        };
        assert!(matches!(run_policy_report(args), Err(AppError::Io(_))));
        assert!(run_policy_report(PolicyArgs::default()).is_ok());
    }
}
