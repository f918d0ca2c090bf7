//! Row filters for the live view and history queries.
//!
//! Each predicate is optional. A row is kept only if it passes every enabled
//! predicate; a disabled predicate passes everything.

use crate::format;
use crate::types::{ActiveTask, CompletedLog, HistoryRecord};
use chrono::{DateTime, NaiveDate, Utc};

/// Anything that can be filtered like an interval.
pub trait FilterRow {
    fn employee_id(&self) -> &str;
    fn department(&self) -> &str;
    fn task(&self) -> &str;
    /// Calendar day the row belongs to
    fn date(&self) -> NaiveDate;
    /// Duration in seconds; open rows are measured against `now`
    fn duration_secs(&self, now: DateTime<Utc>) -> u64;
}

impl FilterRow for ActiveTask {
    fn employee_id(&self) -> &str {
        &self.employee_id
    }

    fn department(&self) -> &str {
        &self.department
    }

    fn task(&self) -> &str {
        &self.task
    }

    fn date(&self) -> NaiveDate {
        format::date_of(self.start_time)
    }

    fn duration_secs(&self, now: DateTime<Utc>) -> u64 {
        self.elapsed_secs(now)
    }
}

impl FilterRow for CompletedLog {
    fn employee_id(&self) -> &str {
        &self.employee_id
    }

    fn department(&self) -> &str {
        &self.department
    }

    fn task(&self) -> &str {
        &self.task
    }

    fn date(&self) -> NaiveDate {
        CompletedLog::date(self)
    }

    fn duration_secs(&self, _now: DateTime<Utc>) -> u64 {
        CompletedLog::duration_secs(self)
    }
}

impl FilterRow for HistoryRecord {
    fn employee_id(&self) -> &str {
        &self.employee_id
    }

    fn department(&self) -> &str {
        &self.department
    }

    fn task(&self) -> &str {
        &self.task
    }

    fn date(&self) -> NaiveDate {
        self.date
    }

    fn duration_secs(&self, _now: DateTime<Utc>) -> u64 {
        self.duration_secs
    }
}

/// Filter configuration; `None` disables a predicate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RowFilter {
    /// Whitespace/comma separated terms; any term may match (substring, case-insensitive)
    pub employee: Option<String>,
    /// Exact department
    pub department: Option<String>,
    /// Exact task; only applied together with a department
    pub task: Option<String>,
    /// Exact calendar day
    pub date: Option<NaiveDate>,
    /// Minimum duration in minutes
    pub min_minutes: Option<u64>,
}

impl RowFilter {
    pub fn is_empty(&self) -> bool {
        *self == RowFilter::default()
    }

    fn employee_terms(&self) -> Vec<String> {
        self.employee
            .as_deref()
            .unwrap_or("")
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    }

    /// Whether `row` passes every enabled predicate.
    pub fn matches<R: FilterRow + ?Sized>(&self, row: &R, now: DateTime<Utc>) -> bool {
        let terms = self.employee_terms();
        if !terms.is_empty() {
            let id = row.employee_id().to_lowercase();
            if !terms.iter().any(|t| id.contains(t.as_str())) {
                return false;
            }
        }

        if let Some(department) = &self.department {
            if row.department() != department {
                return false;
            }
            if let Some(task) = &self.task {
                if row.task() != task {
                    return false;
                }
            }
        }

        if let Some(date) = self.date {
            if row.date() != date {
                return false;
            }
        }

        if let Some(min_minutes) = self.min_minutes {
            if row.duration_secs(now) < min_minutes.saturating_mul(60) {
                return false;
            }
        }

        true
    }

    /// Keep the rows that match, preserving order.
    pub fn apply<R: FilterRow + Clone>(&self, rows: &[R], now: DateTime<Utc>) -> Vec<R> {
        rows.iter()
            .filter(|r| self.matches(*r, now))
            .cloned()
            .collect()
    }
}
