//! Administrator operations: live board, exports, archival, history, clearing.
//!
//! An [`AdminSession`] is only handed out by
//! [`AccessPolicy::authorize`](crate::access::AccessPolicy::authorize).

use crate::archive::ArchiveBatch;
use crate::catalog::Catalog;
use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::export::{self, CsvExport};
use crate::filter::RowFilter;
use crate::history;
use crate::identity::EmployeeId;
use crate::live::LiveBoard;
use crate::retry::RetryPolicy;
use crate::store::{ArchiveOutcome, ClearCounts, TaskStore};
use crate::types::{CompletedLog, DateRange, HistoryRecord, WeeklyTotal};
use crate::validate::{validate_completed, validate_document, Rejection};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Result of importing raw completed-log documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    /// Position in the input and why it was refused
    pub rejected: Vec<(usize, Rejection)>,
}

/// An authorized administrator's handle on the store.
pub struct AdminSession {
    admin_id: EmployeeId,
    store: Arc<dyn TaskStore>,
    catalog: Catalog,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl fmt::Debug for AdminSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdminSession")
            .field("admin_id", &self.admin_id)
            .finish_non_exhaustive()
    }
}

impl AdminSession {
    pub(crate) fn new(admin_id: EmployeeId, store: Arc<dyn TaskStore>) -> Self {
        Self {
            admin_id,
            store,
            catalog: Catalog::builtin(),
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::default(),
        }
    }

    /// Catalog that imported records are checked against.
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn admin_id(&self) -> &EmployeeId {
        &self.admin_id
    }

    /// Subscribe a live board to the active table.
    pub fn open_live_board(&self) -> LiveBoard {
        LiveBoard::new(self.store.subscribe_active())
    }

    /// Completed logs that pass validation, oldest start first.
    pub fn current_logs(&self) -> Result<Vec<CompletedLog>> {
        let stored = self.retry.run("list logs", || self.store.list_logs())?;
        Ok(stored
            .into_iter()
            .filter_map(|s| match validate_completed(&s.log) {
                Ok(()) => Some(s.log),
                Err(rejection) => {
                    tracing::warn!(log_id = s.id, %rejection, "Skipping invalid log");
                    None
                }
            })
            .collect())
    }

    /// `task-report.csv` for the current completed logs.
    pub fn export_current(&self) -> Result<CsvExport> {
        let logs = self.current_logs()?;
        tracing::info!(admin = %self.admin_id, rows = logs.len(), "Exporting current logs");
        Ok(export::current_logs_csv(&logs))
    }

    /// Move every completed log into history and clear the active table.
    ///
    /// The batch is planned once and re-committed under the same id on
    /// transient failure, so a retry never writes history twice.
    pub fn archive(&self) -> Result<ArchiveOutcome> {
        let logs = self.retry.run("list logs", || self.store.list_logs())?;
        let batch = ArchiveBatch::plan(&logs);

        let outcome = self
            .retry
            .run("commit archive", || self.store.commit_archive(&batch))?;

        tracing::info!(
            admin = %self.admin_id,
            batch_id = %outcome.batch_id,
            history_written = outcome.history_written,
            logs_removed = outcome.logs_removed,
            active_removed = outcome.active_removed,
            skipped = batch.skipped,
            already_applied = outcome.already_applied,
            "Archived completed logs"
        );
        Ok(outcome)
    }

    /// Merged history for the range, narrowed by `filter`.
    pub fn history(&self, range: &DateRange, filter: &RowFilter) -> Result<Vec<HistoryRecord>> {
        let raw = self
            .retry
            .run("query history", || self.store.query_history(range))?;
        let merged = history::merge(&raw);
        Ok(filter.apply(&merged, self.clock.now()))
    }

    /// Weekly totals built from the filtered, merged history.
    pub fn weekly(&self, range: &DateRange, filter: &RowFilter) -> Result<Vec<WeeklyTotal>> {
        Ok(history::weekly_totals(&self.history(range, filter)?))
    }

    /// `history.csv` for the range.
    pub fn export_history(&self, range: &DateRange, filter: &RowFilter) -> Result<CsvExport> {
        Ok(export::history_csv(&self.history(range, filter)?))
    }

    /// `weekly-history.csv` for the range.
    pub fn export_weekly(&self, range: &DateRange, filter: &RowFilter) -> Result<CsvExport> {
        Ok(export::weekly_csv(&self.weekly(range, filter)?))
    }

    /// Delete all history rows.
    pub fn clear_history(&self) -> Result<usize> {
        let removed = self
            .retry
            .run("clear history", || self.store.clear_history())?;
        tracing::warn!(admin = %self.admin_id, removed, "History cleared");
        Ok(removed)
    }

    /// Delete every completed log and active entry.
    pub fn clear_current(&self) -> Result<ClearCounts> {
        let counts = self
            .retry
            .run("clear current data", || self.store.clear_current())?;
        tracing::warn!(
            admin = %self.admin_id,
            logs = counts.logs,
            active = counts.active,
            "Current data cleared"
        );
        Ok(counts)
    }

    /// Validate raw completed-log documents and append the accepted ones.
    pub fn import_logs(&self, docs: &[Value]) -> Result<ImportReport> {
        let mut accepted = Vec::with_capacity(docs.len());
        let mut report = ImportReport::default();

        for (index, doc) in docs.iter().enumerate() {
            match validate_document(doc, &self.catalog) {
                Ok(log) => accepted.push(log),
                Err(rejection) => {
                    tracing::warn!(index, %rejection, "Rejected imported log");
                    report.rejected.push((index, rejection));
                }
            }
        }

        if !accepted.is_empty() {
            report.imported = self
                .retry
                .run("append logs", || self.store.append_logs(&accepted))?;
        }
        tracing::info!(
            admin = %self.admin_id,
            imported = report.imported,
            rejected = report.rejected.len(),
            "Imported logs"
        );
        Ok(report)
    }
}
