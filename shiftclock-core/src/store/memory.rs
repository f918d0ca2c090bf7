//! In-process store backend.

use super::{check_expected, ArchiveOutcome, ClearCounts, TaskStore, Transition};
use crate::archive::ArchiveBatch;
use crate::error::{Error, Result};
use crate::types::{ActiveSnapshot, ActiveTask, CompletedLog, DateRange, HistoryRecord, StoredLog};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

#[derive(Default)]
struct State {
    active: ActiveSnapshot,
    logs: BTreeMap<i64, CompletedLog>,
    next_log_id: i64,
    history: Vec<HistoryRecord>,
    batches: HashMap<String, ArchiveOutcome>,
}

impl State {
    fn push_log(&mut self, log: CompletedLog) {
        self.next_log_id += 1;
        self.logs.insert(self.next_log_id, log);
    }
}

/// A [`TaskStore`] kept entirely in memory behind one lock.
///
/// Every call takes the lock once, so transitions and archive commits are
/// atomic with respect to each other.
pub struct MemoryStore {
    state: Mutex<State>,
    active_tx: watch::Sender<ActiveSnapshot>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (active_tx, _) = watch::channel(ActiveSnapshot::new());
        Self {
            state: Mutex::new(State::default()),
            active_tx,
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state.lock().map_err(|_| Error::poisoned())
    }

    fn publish(&self, active: &ActiveSnapshot) {
        self.active_tx.send_replace(active.clone());
    }
}

impl TaskStore for MemoryStore {
    fn active_task(&self, employee_id: &str) -> Result<Option<ActiveTask>> {
        Ok(self.lock()?.active.get(employee_id).cloned())
    }

    fn active_snapshot(&self) -> Result<ActiveSnapshot> {
        Ok(self.lock()?.active.clone())
    }

    fn subscribe_active(&self) -> watch::Receiver<ActiveSnapshot> {
        self.active_tx.subscribe()
    }

    fn apply_transition(&self, transition: &Transition) -> Result<()> {
        let mut state = self.lock()?;
        check_expected(state.active.get(&transition.employee_id), transition)?;

        for log in &transition.closed {
            state.push_log(log.clone());
        }
        match &transition.next {
            Some(next) => {
                state.active.insert(transition.employee_id.clone(), next.clone());
            }
            None => {
                state.active.remove(&transition.employee_id);
            }
        }
        self.publish(&state.active);
        Ok(())
    }

    fn append_logs(&self, logs: &[CompletedLog]) -> Result<usize> {
        let mut state = self.lock()?;
        for log in logs {
            state.push_log(log.clone());
        }
        Ok(logs.len())
    }

    fn list_logs(&self) -> Result<Vec<StoredLog>> {
        let state = self.lock()?;
        let mut logs: Vec<StoredLog> = state
            .logs
            .iter()
            .map(|(id, log)| StoredLog {
                id: *id,
                log: log.clone(),
            })
            .collect();
        logs.sort_by_key(|s| (s.log.start_time, s.id));
        Ok(logs)
    }

    fn commit_archive(&self, batch: &ArchiveBatch) -> Result<ArchiveOutcome> {
        let mut state = self.lock()?;
        if let Some(previous) = state.batches.get(&batch.batch_id) {
            return Ok(ArchiveOutcome {
                already_applied: true,
                ..previous.clone()
            });
        }

        state.history.extend(batch.records.iter().cloned());
        let logs_removed = batch
            .log_ids
            .iter()
            .filter(|id| state.logs.remove(*id).is_some())
            .count();
        let active_removed = state.active.len();
        state.active.clear();

        let outcome = ArchiveOutcome {
            batch_id: batch.batch_id.clone(),
            history_written: batch.records.len(),
            logs_removed,
            active_removed,
            already_applied: false,
        };
        state.batches.insert(batch.batch_id.clone(), outcome.clone());
        self.publish(&state.active);
        Ok(outcome)
    }

    fn query_history(&self, range: &DateRange) -> Result<Vec<HistoryRecord>> {
        Ok(self
            .lock()?
            .history
            .iter()
            .filter(|r| range.contains(r.date))
            .cloned()
            .collect())
    }

    fn clear_history(&self) -> Result<usize> {
        let mut state = self.lock()?;
        let removed = state.history.len();
        state.history.clear();
        Ok(removed)
    }

    fn clear_current(&self) -> Result<ClearCounts> {
        let mut state = self.lock()?;
        let counts = ClearCounts {
            logs: state.logs.len(),
            active: state.active.len(),
        };
        state.logs.clear();
        state.active.clear();
        self.publish(&state.active);
        Ok(counts)
    }
}
