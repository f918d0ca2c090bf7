//! Live board: the administrator's read model of the active table.
//!
//! The board owns its subscription. Each store notification carries the full
//! active table, so [`LiveBoard::refresh`] swaps the mirror out wholesale
//! instead of patching it.

use crate::filter::{FilterRow, RowFilter};
use crate::format;
use crate::types::ActiveSnapshot;
use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tokio::sync::watch;

/// One worker on the live board.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveRow {
    pub employee_id: String,
    pub task: String,
    pub department: String,
    #[serde(with = "format::iso_millis")]
    pub start_time: DateTime<Utc>,
    /// Seconds since `start_time`, as of the `now` the row was built with
    pub duration_secs: u64,
}

impl FilterRow for LiveRow {
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

    fn duration_secs(&self, _now: DateTime<Utc>) -> u64 {
        self.duration_secs
    }
}

pub struct LiveBoard {
    rx: watch::Receiver<ActiveSnapshot>,
    mirror: ActiveSnapshot,
}

impl LiveBoard {
    /// Start mirroring from a store subscription.
    pub fn new(mut rx: watch::Receiver<ActiveSnapshot>) -> Self {
        let mirror = rx.borrow_and_update().clone();
        Self { rx, mirror }
    }

    /// Pull the latest snapshot if one arrived. Returns whether the mirror
    /// changed.
    pub fn refresh(&mut self) -> bool {
        match self.rx.has_changed() {
            Ok(true) => {
                self.mirror = self.rx.borrow_and_update().clone();
                true
            }
            Ok(false) => false,
            Err(_) => {
                tracing::debug!("Active snapshot channel closed, keeping last mirror");
                false
            }
        }
    }

    /// Rows with live durations, ordered by employee id.
    pub fn rows(&self, now: DateTime<Utc>) -> Vec<LiveRow> {
        // BTreeMap iteration is already ordered by id
        self.mirror
            .values()
            .map(|task| LiveRow {
                employee_id: task.employee_id.clone(),
                task: task.task.clone(),
                department: task.department.clone(),
                start_time: task.start_time,
                duration_secs: task.elapsed_secs(now),
            })
            .collect()
    }

    pub fn filtered(&self, filter: &RowFilter, now: DateTime<Utc>) -> Vec<LiveRow> {
        filter.apply(&self.rows(now), now)
    }

    pub fn len(&self) -> usize {
        self.mirror.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mirror.is_empty()
    }
}
