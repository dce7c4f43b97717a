//! Calendar-day SLA deadlines for the current lifecycle stage.
//!
//! This clock counts every calendar day. The signal detector runs on a separate
//! business-day clock (see [`super::signals::business_days`]); the two are never mixed.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use super::domain::{CaseStatus, Priority};
use super::policy::SlaTable;

const SECONDS_PER_DAY: i64 = 86_400;
/// Ceiling for a scaled grace period. Validated policies stay far below it; tables built
/// by hand are clamped instead of overflowing the date arithmetic.
const MAX_ADJUSTED_DAYS: i64 = 365_000;

/// Deadline state of a case in its current status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SlaDeadline {
    pub status: CaseStatus,
    pub priority: Priority,
    pub adjusted_days: i64,
    pub deadline: DateTime<Utc>,
    pub is_overdue: bool,
    /// Whole days left, rounded up. Negative once the deadline has passed.
    pub days_remaining: i64,
}

#[derive(Debug, Clone)]
pub struct DeadlineCalculator {
    table: SlaTable,
}

impl DeadlineCalculator {
    pub fn new(table: SlaTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &SlaTable {
        &self.table
    }

    pub fn adjusted_days(&self, status: CaseStatus, priority: Priority) -> i64 {
        let base = self.table.base_days_for(status) as f64;
        let scaled = base * self.table.multiplier_for(priority);
        if scaled.is_nan() {
            return 0;
        }
        scaled.ceil().clamp(0.0, MAX_ADJUSTED_DAYS as f64) as i64
    }

    pub fn deadline(
        &self,
        status: CaseStatus,
        priority: Priority,
        entered_at: DateTime<Utc>,
    ) -> DateTime<Utc> {
        shift(entered_at, self.adjusted_days(status, priority))
    }

    pub fn assess(
        &self,
        status: CaseStatus,
        priority: Priority,
        entered_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> SlaDeadline {
        let adjusted_days = self.adjusted_days(status, priority);
        let deadline = shift(entered_at, adjusted_days);
        let remaining_secs = (deadline - now).num_seconds();

        SlaDeadline {
            status,
            priority,
            adjusted_days,
            deadline,
            is_overdue: now > deadline,
            days_remaining: ceil_days(remaining_secs),
        }
    }
}

fn shift(entered_at: DateTime<Utc>, days: i64) -> DateTime<Utc> {
    Duration::try_days(days)
        .and_then(|offset| entered_at.checked_add_signed(offset))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn ceil_days(seconds: i64) -> i64 {
    let whole = seconds.div_euclid(SECONDS_PER_DAY);
    if seconds.rem_euclid(SECONDS_PER_DAY) > 0 {
        whole + 1
    } else {
        whole
    }
}
