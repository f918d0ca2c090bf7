//! Store seam between the interval manager and its persistence backend.
//!
//! A [`TaskStore`] holds the three collections the kiosk works with:
//!
//! - the active table, one open interval per employee id, observable through
//!   a snapshot channel that carries the full table after every change
//! - the completed-log collection, append-only
//! - the history collection, append-only daily aggregates
//!
//! Writes that must land together are expressed as one call so that a backend
//! can commit them atomically: [`TaskStore::apply_transition`] for a task
//! selection and [`TaskStore::commit_archive`] for archival.
//!
//! Two backends ship with the crate: [`MemoryStore`] and the SQLite
//! [`Database`](crate::db::Database).

mod memory;

pub use memory::MemoryStore;

use crate::archive::ArchiveBatch;
use crate::error::{Error, Result};
use crate::types::{ActiveSnapshot, ActiveTask, CompletedLog, DateRange, HistoryRecord, StoredLog};
use tokio::sync::watch;

/// Everything one task selection writes, applied as a unit.
///
/// The write only goes through if the employee's current active entry still
/// equals `expected`; otherwise the backend returns [`Error::Conflict`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub employee_id: String,
    /// Active entry observed when the transition was planned
    pub expected: Option<ActiveTask>,
    /// Logs to append, in order
    pub closed: Vec<CompletedLog>,
    /// New active entry, or `None` to remove it
    pub next: Option<ActiveTask>,
}

/// Result of committing an archive batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveOutcome {
    pub batch_id: String,
    pub history_written: usize,
    pub logs_removed: usize,
    pub active_removed: usize,
    /// The batch had been committed before; nothing changed this time
    pub already_applied: bool,
}

/// Rows removed by clearing the current logs and active table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearCounts {
    pub logs: usize,
    pub active: usize,
}

/// Persistence backend for active tasks, completed logs and history.
pub trait TaskStore: Send + Sync {
    /// The employee's open interval, if any.
    fn active_task(&self, employee_id: &str) -> Result<Option<ActiveTask>>;

    /// The whole active table.
    fn active_snapshot(&self) -> Result<ActiveSnapshot>;

    /// Subscribe to full snapshots of the active table, one per change.
    fn subscribe_active(&self) -> watch::Receiver<ActiveSnapshot>;

    /// Apply a task selection atomically and conditionally.
    fn apply_transition(&self, transition: &Transition) -> Result<()>;

    /// Append already-validated logs; returns how many were written.
    fn append_logs(&self, logs: &[CompletedLog]) -> Result<usize>;

    /// All completed logs with their ids, oldest start first.
    fn list_logs(&self) -> Result<Vec<StoredLog>>;

    /// Write the batch's history rows, drop its logs and clear the active
    /// table in one step. Committing the same batch id twice is a no-op.
    fn commit_archive(&self, batch: &ArchiveBatch) -> Result<ArchiveOutcome>;

    /// Unmerged history rows whose date lies in `range` (inclusive).
    fn query_history(&self, range: &DateRange) -> Result<Vec<HistoryRecord>>;

    /// Delete every history row; returns how many were removed.
    fn clear_history(&self) -> Result<usize>;

    /// Delete every completed log and active entry.
    fn clear_current(&self) -> Result<ClearCounts>;
}

/// Compare the stored active entry against what the caller planned from.
pub(crate) fn check_expected(current: Option<&ActiveTask>, transition: &Transition) -> Result<()> {
    if current == transition.expected.as_ref() {
        Ok(())
    } else {
        Err(Error::Conflict(transition.employee_id.clone()))
    }
}
