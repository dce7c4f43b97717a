//! Business-day clock used only by the signal detector. Weekends are excluded and dates
//! are taken in UTC. Public holidays are not modelled.

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc, Weekday};

pub fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Number of weekdays in the half-open date range `(start, end]`.
pub fn business_days_between(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    let from = start.date_naive();
    let to = end.date_naive();
    if to <= from {
        return 0;
    }

    let total = (to - from).num_days();
    let full_weeks = total / 7;
    let mut count = full_weeks * 5;
    let mut day = from + Duration::days(full_weeks * 7);
    while day < to {
        day += Duration::days(1);
        if is_business_day(day) {
            count += 1;
        }
    }

    count
}

/// Moves `start` forward by `days` weekdays, keeping the time of day. Saturates at the
/// end of the representable calendar.
pub fn add_business_days(start: DateTime<Utc>, days: u32) -> DateTime<Utc> {
    let mut remaining = days;
    let mut current = start;
    // step until the rest is whole weeks counted from a weekday
    while remaining > 0 && (remaining % 5 != 0 || !is_business_day(current.date_naive())) {
        current = match current.checked_add_signed(Duration::days(1)) {
            Some(next) => next,
            None => return DateTime::<Utc>::MAX_UTC,
        };
        if is_business_day(current.date_naive()) {
            remaining -= 1;
        }
    }

    Duration::try_days(i64::from(remaining / 5) * 7)
        .and_then(|weeks| current.checked_add_signed(weeks))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
