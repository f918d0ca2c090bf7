//! Core domain types for shiftclock
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **Active task** | An open interval for one worker; at most one per identifier |
//! | **Completed log** | A closed interval with both start and end timestamps |
//! | **History record** | Seconds spent by one worker on one task on one UTC day |
//! | **Weekly total** | History records rolled up to the ISO week (Monday start) |
//! | **Archive batch** | The unit that moves completed logs into history |
//!
//! Field names serialize in camelCase so documents keep the shape existing
//! kiosk data already uses (`employeeId`, `startTime`, `durationSecs`, ...).

use crate::format::{self, iso_millis};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Task name recorded for the zero-length marker written at shift end.
pub const SHIFT_END_TASK: &str = "Shift End";

// ============================================
// Active tasks
// ============================================

/// An interval that is still running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveTask {
    pub employee_id: String,
    pub task: String,
    pub department: String,
    #[serde(with = "iso_millis")]
    pub start_time: DateTime<Utc>,
    /// Always `None` while the entry sits in the active table
    #[serde(with = "iso_millis::option", default)]
    pub end_time: Option<DateTime<Utc>>,
}

impl ActiveTask {
    /// Open a new interval at `start_time`.
    pub fn start(
        employee_id: impl Into<String>,
        task: impl Into<String>,
        department: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        Self {
            employee_id: employee_id.into(),
            task: task.into(),
            department: department.into(),
            start_time,
            end_time: None,
        }
    }

    /// Close this interval at `end_time`, keeping its task, department and start.
    pub fn close(&self, end_time: DateTime<Utc>) -> CompletedLog {
        CompletedLog {
            employee_id: self.employee_id.clone(),
            task: self.task.clone(),
            department: self.department.clone(),
            start_time: self.start_time,
            end_time,
        }
    }

    /// Seconds elapsed so far, measured against `now`.
    pub fn elapsed_secs(&self, now: DateTime<Utc>) -> u64 {
        format::duration_secs(self.start_time, self.end_time.unwrap_or(now))
    }
}

/// Full view of the active table, keyed by employee id.
pub type ActiveSnapshot = BTreeMap<String, ActiveTask>;

/// Where a worker stands after a selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerState {
    /// No open interval
    Idle,
    /// One open interval
    Active(ActiveTask),
}

impl WorkerState {
    pub fn is_active(&self) -> bool {
        matches!(self, WorkerState::Active(_))
    }
}

// ============================================
// Completed logs
// ============================================

/// A closed interval. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedLog {
    pub employee_id: String,
    pub task: String,
    pub department: String,
    #[serde(with = "iso_millis")]
    pub start_time: DateTime<Utc>,
    #[serde(with = "iso_millis")]
    pub end_time: DateTime<Utc>,
}

impl CompletedLog {
    /// Zero-length marker recorded when a worker ends their shift.
    pub fn shift_end(
        employee_id: impl Into<String>,
        department: impl Into<String>,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            employee_id: employee_id.into(),
            task: SHIFT_END_TASK.to_string(),
            department: department.into(),
            start_time: at,
            end_time: at,
        }
    }

    pub fn duration_secs(&self) -> u64 {
        format::duration_secs(self.start_time, self.end_time)
    }

    /// UTC calendar day the interval started on.
    pub fn date(&self) -> NaiveDate {
        format::date_of(self.start_time)
    }
}

/// A completed log together with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLog {
    pub id: i64,
    pub log: CompletedLog,
}

// ============================================
// History
// ============================================

/// Seconds spent by one worker on one task on one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub employee_id: String,
    pub task: String,
    pub department: String,
    pub duration_secs: u64,
    /// Serialized as `YYYY-MM-DD`
    pub date: NaiveDate,
}

impl From<&CompletedLog> for HistoryRecord {
    fn from(log: &CompletedLog) -> Self {
        Self {
            employee_id: log.employee_id.clone(),
            task: log.task.clone(),
            department: log.department.clone(),
            duration_secs: log.duration_secs(),
            date: log.date(),
        }
    }
}

/// History rolled up to the week starting on `week_start` (a Monday).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyTotal {
    pub employee_id: String,
    pub task: String,
    pub department: String,
    pub week_start: NaiveDate,
    pub duration_secs: u64,
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Both bounds are included.
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}
