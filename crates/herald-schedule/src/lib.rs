// SPDX-FileCopyrightText: 2026 Herald Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Schedule trigger evaluation.
//!
//! Everything here is a pure function of the schedule and an instant. The
//! only state a schedule carries between runs is `last_run_at`, which the
//! dispatch pipeline writes; this crate never does.

mod times;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use herald_core::{HeraldError, Schedule, ScheduleMode};

pub use times::{LocalMinute, parse_local_minute};

/// Result of evaluating a schedule at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Evaluation {
    pub due: bool,
    /// Earliest instant the schedule can next fire. `now` when due; `None`
    /// for disabled or invalid schedules.
    pub next_eligible: Option<DateTime<Utc>>,
}

impl Evaluation {
    const NEVER: Self = Self {
        due: false,
        next_eligible: None,
    };

    fn due(now: DateTime<Utc>) -> Self {
        Self {
            due: true,
            next_eligible: Some(now),
        }
    }

    fn waiting(until: Option<DateTime<Utc>>) -> Self {
        Self {
            due: false,
            next_eligible: until,
        }
    }
}

/// Returns `true` if `schedule` should run at `now`.
pub fn is_due(schedule: &Schedule, now: DateTime<Utc>) -> bool {
    evaluate(schedule, now).due
}

/// Evaluate `schedule` at `now`. Disabled or invalid schedules are never due.
pub fn evaluate(schedule: &Schedule, now: DateTime<Utc>) -> Evaluation {
    if !schedule.enabled {
        return Evaluation::NEVER;
    }
    match schedule.mode {
        ScheduleMode::Immediate => Evaluation::due(now),
        ScheduleMode::Interval => match schedule.interval_minutes {
            Some(minutes) if minutes > 0 => evaluate_interval(minutes, schedule.last_run_at, now),
            _ => Evaluation::NEVER,
        },
        ScheduleMode::Times => {
            let Ok(tz) = schedule.timezone.parse::<Tz>() else {
                return Evaluation::NEVER;
            };
            let Some(minutes) = times::parse_all(&schedule.times) else {
                return Evaluation::NEVER;
            };
            if minutes.is_empty() {
                return Evaluation::NEVER;
            }
            times::evaluate(&minutes, tz, schedule.last_run_at, now)
        }
    }
}

fn evaluate_interval(
    minutes: u32,
    last_run_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Evaluation {
    let Some(last) = last_run_at else {
        return Evaluation::due(now);
    };
    let next = last + Duration::minutes(i64::from(minutes));
    if now >= next {
        Evaluation::due(now)
    } else {
        Evaluation::waiting(Some(next))
    }
}

/// Check the shape of a schedule.
///
/// Returns [`HeraldError::ConfigInvalid`] naming the schedule and the first
/// problem found.
pub fn validate(schedule: &Schedule) -> Result<(), HeraldError> {
    let invalid = |message: String| {
        Err(HeraldError::invalid(
            format!("schedule `{}`", schedule.id),
            message,
        ))
    };

    match schedule.mode {
        ScheduleMode::Immediate => {}
        ScheduleMode::Interval => match schedule.interval_minutes {
            Some(minutes) if minutes > 0 => {}
            Some(_) => return invalid("interval_minutes must be greater than 0".into()),
            None => return invalid("interval mode requires interval_minutes".into()),
        },
        ScheduleMode::Times => {
            if schedule.times.is_empty() {
                return invalid("times mode requires at least one HH:MM entry".into());
            }
            if let Some(bad) = schedule
                .times
                .iter()
                .find(|t| parse_local_minute(t).is_none())
            {
                return invalid(format!("`{bad}` is not a valid HH:MM time"));
            }
            if schedule.timezone.parse::<Tz>().is_err() {
                return invalid(format!("unknown timezone `{}`", schedule.timezone));
            }
        }
    }

    if schedule.target_ids.is_empty() {
        return invalid("no targets configured".into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 15, h, m, s).unwrap()
    }

    fn schedule(mode: ScheduleMode) -> Schedule {
        Schedule {
            id: "s1".into(),
            name: "Morning".into(),
            mode,
            interval_minutes: None,
            times: Vec::new(),
            timezone: "UTC".into(),
            feed_ids: vec!["f".into()],
            target_ids: vec!["t".into()],
            template_id: "tpl".into(),
            enabled: true,
            last_run_at: None,
        }
    }

    fn interval(minutes: u32, last: Option<DateTime<Utc>>) -> Schedule {
        Schedule {
            interval_minutes: Some(minutes),
            last_run_at: last,
            ..schedule(ScheduleMode::Interval)
        }
    }

    #[test]
    fn immediate_is_due_while_enabled() {
        let s = schedule(ScheduleMode::Immediate);
        assert!(is_due(&s, at(3, 0, 0)));
        let disabled = Schedule {
            enabled: false,
            ..s
        };
        assert_eq!(evaluate(&disabled, at(3, 0, 0)), Evaluation::NEVER);
    }

    #[test]
    fn interval_boundary_is_inclusive() {
        let now = at(12, 0, 0);
        assert!(!is_due(&interval(30, Some(now - Duration::minutes(29))), now));
        assert!(is_due(&interval(30, Some(now - Duration::minutes(30))), now));
        assert!(is_due(&interval(30, None), now));
    }

    #[test]
    fn interval_reports_next_eligible() {
        let now = at(12, 0, 0);
        let last = now - Duration::minutes(10);
        let eval = evaluate(&interval(30, Some(last)), now);
        assert!(!eval.due);
        assert_eq!(eval.next_eligible, Some(last + Duration::minutes(30)));
    }

    #[test]
    fn zero_interval_never_fires() {
        assert!(!is_due(&interval(0, None), at(12, 0, 0)));
    }

    #[test]
    fn validation_rejects_malformed_schedules() {
        assert!(validate(&interval(30, None)).is_ok());
        assert!(validate(&interval(0, None)).is_err());

        let times = Schedule {
            times: vec!["09:00".into(), "25:00".into()],
            ..schedule(ScheduleMode::Times)
        };
        let err = validate(&times).unwrap_err();
        assert!(err.to_string().contains("25:00"), "{err}");

        let empty = schedule(ScheduleMode::Times);
        assert!(validate(&empty).is_err());

        let bad_tz = Schedule {
            times: vec!["09:00".into()],
            timezone: "Mars/Olympus".into(),
            ..schedule(ScheduleMode::Times)
        };
        assert!(matches!(
            validate(&bad_tz),
            Err(HeraldError::ConfigInvalid { .. })
        ));

        let no_targets = Schedule {
            target_ids: Vec::new(),
            ..schedule(ScheduleMode::Immediate)
        };
        assert!(validate(&no_targets).is_err());
    }
}
