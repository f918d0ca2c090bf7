//! Read-time aggregation of history rows.
//!
//! Archival appends one row per completed log, so the same
//! (employee, task, date) key can appear many times. Readers fold those rows
//! into one total per key with [`merge`]; folding an already merged set
//! changes nothing.

use crate::types::{HistoryRecord, WeeklyTotal};
use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;

/// Sum durations per (employee, task, date).
///
/// Output is ordered by employee, then date, then task. A merged row keeps
/// the department of the first input row seen for its key.
pub fn merge(records: &[HistoryRecord]) -> Vec<HistoryRecord> {
    let mut merged: BTreeMap<(String, NaiveDate, String), HistoryRecord> = BTreeMap::new();

    for record in records {
        let key = (
            record.employee_id.clone(),
            record.date,
            record.task.clone(),
        );
        merged
            .entry(key)
            .and_modify(|m| m.duration_secs += record.duration_secs)
            .or_insert_with(|| record.clone());
    }

    merged.into_values().collect()
}

/// Monday of the ISO week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// Roll history up to (employee, task, week) totals, ordered by employee,
/// week, then task.
pub fn weekly_totals(records: &[HistoryRecord]) -> Vec<WeeklyTotal> {
    let mut weeks: BTreeMap<(String, NaiveDate, String), WeeklyTotal> = BTreeMap::new();

    for record in records {
        let week = week_start(record.date);
        weeks
            .entry((record.employee_id.clone(), week, record.task.clone()))
            .and_modify(|w| w.duration_secs += record.duration_secs)
            .or_insert_with(|| WeeklyTotal {
                employee_id: record.employee_id.clone(),
                task: record.task.clone(),
                department: record.department.clone(),
                week_start: week,
                duration_secs: record.duration_secs,
            });
    }

    weeks.into_values().collect()
}

/// Total seconds per employee, for summary lines.
pub fn totals_by_employee(records: &[HistoryRecord]) -> BTreeMap<String, u64> {
    let mut totals = BTreeMap::new();
    for record in records {
        *totals.entry(record.employee_id.clone()).or_insert(0) += record.duration_secs;
    }
    totals
}
