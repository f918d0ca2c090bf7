//! Archival: moving completed logs into history.
//!
//! An archive run reads every completed log, turns each one into a history
//! row (duration in whole seconds, date from the UTC start day) and commits
//! the rows together with the deletion of exactly those logs and the clearing
//! of the active table. The batch carries a fresh id so that re-committing it
//! after an ambiguous failure cannot write the rows twice.

use crate::types::{HistoryRecord, StoredLog};
use crate::validate::validate_completed;

/// History rows plus the log ids they replace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveBatch {
    pub batch_id: String,
    pub log_ids: Vec<i64>,
    pub records: Vec<HistoryRecord>,
    /// Logs left in place because they failed validation
    pub skipped: usize,
}

impl ArchiveBatch {
    /// Plan a batch under a newly generated id.
    pub fn plan(logs: &[StoredLog]) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), logs)
    }

    /// Plan a batch under a caller-chosen id.
    pub fn with_id(batch_id: impl Into<String>, logs: &[StoredLog]) -> Self {
        let mut log_ids = Vec::with_capacity(logs.len());
        let mut records = Vec::with_capacity(logs.len());
        let mut skipped = 0;

        for stored in logs {
            match validate_completed(&stored.log) {
                Ok(()) => {
                    log_ids.push(stored.id);
                    records.push(HistoryRecord::from(&stored.log));
                }
                Err(rejection) => {
                    tracing::warn!(
                        log_id = stored.id,
                        employee_id = %stored.log.employee_id,
                        %rejection,
                        "Skipping invalid log during archival"
                    );
                    skipped += 1;
                }
            }
        }

        Self {
            batch_id: batch_id.into(),
            log_ids,
            records,
            skipped,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.log_ids.is_empty()
    }
}
