//! Recurring execution of a job on a cron schedule.
//!
//! Expressions use the six-field NCRONTAB form `sec min hour day month weekday`
//! (for example `0 0 2 * * *` for 02:00 UTC daily). Classic five-field crontab
//! expressions are accepted and fire at second zero. In both forms numeric
//! weekdays count from Sunday = 0 (7 is also Sunday), and names such as
//! `Mon-Fri` work as well.

use std::{collections::BTreeSet, future::Future, str::FromStr};

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;

use super::JobResult;
use crate::config::ConfigError;

/// Wake-ups later than this are logged as past due.
const PAST_DUE_THRESHOLD_SECS: i64 = 60;

/// Parse a cron expression into a schedule.
pub fn parse_schedule(expression: &str) -> Result<Schedule, ConfigError> {
    let expression = expression.trim();
    let invalid = |reason: String| ConfigError::Invalid {
        name: "schedule",
        value: expression.to_string(),
        reason,
    };

    let mut fields: Vec<String> = expression.split_whitespace().map(str::to_string).collect();
    match fields.len() {
        5 => fields.insert(0, "0".to_string()),
        6 => {}
        n => return Err(invalid(format!("expected 5 or 6 fields, got {}", n))),
    }
    fields[5] = crontab_weekdays(&fields[5]).map_err(invalid)?;

    Schedule::from_str(&fields.join(" ")).map_err(|e| invalid(e.to_string()))
}

/// Rewrite a crontab weekday field (0-7, Sunday = 0 or 7) into the `cron`
/// crate's numbering (1-7, Sunday = 1).
///
/// Numeric lists, ranges and steps are expanded to explicit days. `*`, `*/n`
/// and named days mean the same in both numberings and pass through.
fn crontab_weekdays(field: &str) -> Result<String, String> {
    let mut passthrough = Vec::new();
    let mut days = BTreeSet::new();

    for element in field.split(',') {
        let (base, step) = match element.split_once('/') {
            Some((base, step)) => (base, Some(step)),
            None => (element, None),
        };
        if base == "*" || base == "?" || base.chars().any(|c| c.is_ascii_alphabetic()) {
            passthrough.push(element.to_string());
            continue;
        }

        let (start, end) = match base.split_once('-') {
            Some((start, end)) => (weekday_number(start)?, weekday_number(end)?),
            None if step.is_some() => (weekday_number(base)?, 6),
            None => {
                let day = weekday_number(base)?;
                (day, day)
            }
        };
        if start > end {
            return Err(format!("weekday range {} runs backwards", base));
        }
        let step = match step {
            Some(step) => step
                .parse::<usize>()
                .ok()
                .filter(|s| *s > 0)
                .ok_or_else(|| format!("invalid weekday step '{}'", step))?,
            None => 1,
        };

        days.extend((start..=end).step_by(step).map(|d| if d == 7 { 1 } else { d + 1 }));
    }

    passthrough.extend(days.into_iter().map(|d| d.to_string()));
    Ok(passthrough.join(","))
}

fn weekday_number(value: &str) -> Result<u8, String> {
    value
        .parse::<u8>()
        .ok()
        .filter(|d| *d <= 7)
        .ok_or_else(|| format!("weekday '{}' is not in 0-7", value))
}

/// Whether a run that was due at `scheduled` and started at `started` is late.
pub fn is_past_due(scheduled: DateTime<Utc>, started: DateTime<Utc>) -> bool {
    started - scheduled > Duration::seconds(PAST_DUE_THRESHOLD_SECS)
}

/// The run that follows the slot at `last`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct NextRun {
    /// First slot after `last`.
    due: DateTime<Utc>,
    /// Latest slot this run stands in for. Later than `due` when slots were
    /// missed while an earlier run was still going.
    covers: DateTime<Utc>,
    /// Slots after `due` that already passed and are folded into this run.
    missed: usize,
}

fn next_run(schedule: &Schedule, last: DateTime<Utc>, now: DateTime<Utc>) -> Option<NextRun> {
    let due = schedule.after(&last).next()?;
    let mut run = NextRun {
        due,
        covers: due,
        missed: 0,
    };
    if due <= now {
        for slot in schedule.after(&due).take_while(|slot| *slot <= now) {
            run.covers = slot;
            run.missed += 1;
        }
    }
    Some(run)
}

/// Run `job` every time `schedule` fires until `shutdown` completes.
///
/// Each invocation calls `job` afresh, so configuration read inside it is
/// re-resolved per run. Failed runs are logged and the loop continues.
/// Shutdown is only observed between runs. Slots that pass while a run is
/// still going are folded into one immediate run flagged `past_due`.
pub async fn run_on_schedule<F, Fut, T, S>(name: &str, schedule: &Schedule, shutdown: S, mut job: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = JobResult<T>>,
    S: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    tracing::info!(job = name, "Scheduler started");

    let mut last = Utc::now();
    loop {
        let Some(next) = next_run(schedule, last, Utc::now()) else {
            tracing::warn!(job = name, "Schedule has no future occurrences, stopping");
            return;
        };
        tracing::debug!(job = name, next_run = %next.due, "Waiting for next run");

        let wait = (next.due - Utc::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = &mut shutdown => {
                tracing::info!(job = name, "Scheduler shutting down");
                return;
            }
            _ = tokio::time::sleep(wait) => {}
        }
        last = next.covers;

        let started = Utc::now();
        let past_due = is_past_due(next.due, started);
        if past_due {
            tracing::warn!(
                job = name,
                scheduled_for = %next.due,
                missed_slots = next.missed,
                "Timer is running late"
            );
        }
        tracing::info!(job = name, scheduled_for = %next.due, past_due, "Scheduled run starting");

        match job().await {
            Ok(_) => tracing::info!(job = name, "Scheduled run finished"),
            Err(e) => tracing::error!(job = name, error = %e, "Scheduled run failed"),
        }
    }
}
