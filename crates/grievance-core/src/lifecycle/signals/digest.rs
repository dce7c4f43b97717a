use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::super::domain::CaseId;
use super::{Signal, SignalSeverity, SignalType};

pub fn filter_by_severity(signals: &[Signal], severity: SignalSeverity) -> Vec<&Signal> {
    signals
        .iter()
        .filter(|signal| signal.severity == severity)
        .collect()
}

pub fn filter_by_type(signals: &[Signal], signal_type: SignalType) -> Vec<&Signal> {
    signals
        .iter()
        .filter(|signal| signal.signal_type == signal_type)
        .collect()
}

pub fn group_by_case(signals: &[Signal]) -> BTreeMap<CaseId, Vec<&Signal>> {
    let mut grouped: BTreeMap<CaseId, Vec<&Signal>> = BTreeMap::new();
    for signal in signals {
        grouped.entry(signal.case_id.clone()).or_default().push(signal);
    }
    grouped
}

/// Most severe signal per case. Ties keep the first signal seen.
pub fn highest_per_case(signals: &[Signal]) -> BTreeMap<CaseId, &Signal> {
    let mut highest: BTreeMap<CaseId, &Signal> = BTreeMap::new();
    for signal in signals {
        highest
            .entry(signal.case_id.clone())
            .and_modify(|current| {
                if signal.severity.rank() < current.severity.rank() {
                    *current = signal;
                }
            })
            .or_insert(signal);
    }
    highest
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignalDashboard {
    pub total: usize,
    pub critical: usize,
    pub urgent: usize,
    pub warning: usize,
    pub info: usize,
    pub actionable: usize,
    pub cases_affected: usize,
    pub by_type: BTreeMap<SignalType, usize>,
}

pub fn dashboard(signals: &[Signal]) -> SignalDashboard {
    let mut summary = SignalDashboard {
        total: signals.len(),
        ..SignalDashboard::default()
    };
    let mut cases = BTreeSet::new();

    for signal in signals {
        match signal.severity {
            SignalSeverity::Critical => summary.critical += 1,
            SignalSeverity::Urgent => summary.urgent += 1,
            SignalSeverity::Warning => summary.warning += 1,
            SignalSeverity::Info => summary.info += 1,
        }
        if signal.actionable {
            summary.actionable += 1;
        }
        *summary.by_type.entry(signal.signal_type).or_default() += 1;
        cases.insert(&signal.case_id);
    }

    summary.cases_affected = cases.len();
    summary
}

/// Outbound payload announcing a detected signal to an external integration.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalWebhookPayload {
    pub event: &'static str,
    pub signal: Signal,
    pub case_ref: CaseId,
    pub timestamp: DateTime<Utc>,
}

pub fn webhook_payload(signal: &Signal, now: DateTime<Utc>) -> SignalWebhookPayload {
    SignalWebhookPayload {
        event: "signal.detected",
        signal: signal.clone(),
        case_ref: signal.case_id.clone(),
        timestamp: now,
    }
}
