// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `times` mode: fixed local minutes of the day in an IANA timezone.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

use crate::Evaluation;

/// Days searched ahead for the next firing. Two covers any DST gap.
const LOOKAHEAD_DAYS: i64 = 2;

/// A local wall-clock minute, `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalMinute {
    pub hour: u32,
    pub minute: u32,
}

impl LocalMinute {
    fn of<T: Timelike>(t: &T) -> Self {
        Self {
            hour: t.hour(),
            minute: t.minute(),
        }
    }

    fn naive_time(self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(self.hour, self.minute, 0)
    }
}

/// Parse a strict two-digit `HH:MM`.
pub fn parse_local_minute(raw: &str) -> Option<LocalMinute> {
    let (h, m) = raw.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let hour: u32 = h.parse().ok()?;
    let minute: u32 = m.parse().ok()?;
    (hour < 24 && minute < 60).then_some(LocalMinute { hour, minute })
}

/// Sorted, deduplicated minutes; `None` if any entry is malformed.
pub(crate) fn parse_all(raw: &[String]) -> Option<Vec<LocalMinute>> {
    let mut minutes = raw
        .iter()
        .map(|t| parse_local_minute(t))
        .collect::<Option<Vec<_>>>()?;
    minutes.sort();
    minutes.dedup();
    Some(minutes)
}

pub(crate) fn evaluate(
    minutes: &[LocalMinute],
    tz: Tz,
    last_run_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Evaluation {
    let local = now.with_timezone(&tz);
    let current = LocalMinute::of(&local);

    if minutes.contains(&current) && !ran_in_minute(last_run_at, tz, local.date_naive(), current)
    {
        return Evaluation::due(now);
    }
    Evaluation::waiting(next_after(minutes, tz, now))
}

/// `last_run_at` falls in `minute` of `date`, local time.
fn ran_in_minute(
    last_run_at: Option<DateTime<Utc>>,
    tz: Tz,
    date: NaiveDate,
    minute: LocalMinute,
) -> bool {
    last_run_at.is_some_and(|last| {
        let last = last.with_timezone(&tz);
        last.date_naive() == date && LocalMinute::of(&last) == minute
    })
}

/// Earliest configured local minute strictly after `now`.
///
/// Minutes that fall in a DST gap do not exist that day and are skipped.
/// Minutes repeated by a DST fold resolve to their first occurrence.
fn next_after(minutes: &[LocalMinute], tz: Tz, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let today = now.with_timezone(&tz).date_naive();
    (0..=LOOKAHEAD_DAYS)
        .filter_map(|offset| today.checked_add_signed(Duration::days(offset)))
        .flat_map(|date| {
            minutes
                .iter()
                .filter_map(move |m| m.naive_time().map(|t| date.and_time(t)))
        })
        .filter_map(|naive| match tz.from_local_datetime(&naive) {
            LocalResult::Single(t) => Some(t),
            LocalResult::Ambiguous(earliest, latest) => Some(earliest.min(latest)),
            LocalResult::None => None,
        })
        .map(|t| t.with_timezone(&Utc))
        .find(|t| *t > now)
}
