//! Per-worker interval lifecycle.
//!
//! Each employee id is either idle or has exactly one open interval. A task
//! selection closes the open interval (if any) at "now" and then either opens
//! a new one or, for the shift-end task, records a zero-length marker and
//! leaves the worker idle.
//!
//! The store applies each selection as one conditional write. If another
//! kiosk changed the same worker in between, the selection is planned again
//! from the fresh state.

use crate::catalog::{is_shift_end, Catalog};
use crate::clock::{Clock, SystemClock};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::identity::EmployeeId;
use crate::retry::RetryPolicy;
use crate::store::{TaskStore, Transition};
use crate::types::{ActiveTask, CompletedLog, WorkerState};
use crate::validate::validate_completed;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Outcome of one task selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub employee_id: EmployeeId,
    /// Logs written by this selection, in order
    pub closed: Vec<CompletedLog>,
    pub shift_end: bool,
    pub state: WorkerState,
}

/// Plan the writes for selecting `task` in `department` at `now`.
///
/// The previous interval is always closed before shift end is considered.
/// A kiosk clock behind the one that opened the interval never closes it
/// before its start: the switch happens at the later of the two instants.
pub fn plan_selection(
    employee_id: &str,
    current: Option<&ActiveTask>,
    department: &str,
    task: &str,
    now: DateTime<Utc>,
) -> Transition {
    let at = current.map_or(now, |a| now.max(a.start_time));
    let mut closed: Vec<CompletedLog> = current.iter().map(|a| a.close(at)).collect();

    let next = if is_shift_end(task) {
        closed.push(CompletedLog::shift_end(employee_id, department, at));
        None
    } else {
        Some(ActiveTask::start(employee_id, task, department, at))
    };

    Transition {
        employee_id: employee_id.to_string(),
        expected: current.cloned(),
        closed,
        next,
    }
}

/// Drives task selections against a [`TaskStore`].
pub struct IntervalManager {
    store: Arc<dyn TaskStore>,
    catalog: Catalog,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
    conflict_retries: usize,
    /// Logs closed through this manager since it was created
    log_mirror: Vec<CompletedLog>,
}

impl IntervalManager {
    pub fn new(store: Arc<dyn TaskStore>, catalog: Catalog) -> Self {
        let defaults = StoreConfig::default();
        Self {
            store,
            catalog,
            clock: Arc::new(SystemClock),
            retry: RetryPolicy::from_config(&defaults),
            conflict_retries: defaults.conflict_retries,
            log_mirror: Vec::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Apply retry and conflict settings from config.
    pub fn with_store_config(mut self, config: &StoreConfig) -> Self {
        self.retry = RetryPolicy::from_config(config);
        self.conflict_retries = config.conflict_retries;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Logs closed by this manager, oldest first.
    pub fn session_log(&self) -> &[CompletedLog] {
        &self.log_mirror
    }

    /// Where the worker currently stands.
    pub fn status(&self, raw_id: &str) -> Result<WorkerState> {
        let employee_id = EmployeeId::parse(raw_id)?;
        let current = self
            .retry
            .run("read active task", || self.store.active_task(employee_id.as_str()))?;
        Ok(current.map_or(WorkerState::Idle, WorkerState::Active))
    }

    /// Select `task` in `department` for the scanned id.
    pub fn select_task(&mut self, raw_id: &str, department: &str, task: &str) -> Result<Selection> {
        let employee_id = EmployeeId::parse(raw_id).map_err(|e| {
            tracing::warn!(raw_id, "Rejected scan with malformed employee id");
            e
        })?;
        let (department, task) = self.catalog.resolve(department, task)?;

        let mut conflicts = 0;
        loop {
            let current = self
                .retry
                .run("read active task", || self.store.active_task(employee_id.as_str()))?;
            let now = self.clock.now();
            let transition =
                plan_selection(employee_id.as_str(), current.as_ref(), department, task, now);

            for log in &transition.closed {
                if let Err(rejection) = validate_completed(log) {
                    tracing::warn!(
                        employee_id = %employee_id,
                        %rejection,
                        "Completed log rejected, selection not saved"
                    );
                    return Err(rejection.into());
                }
            }

            match self
                .retry
                .run("apply transition", || self.store.apply_transition(&transition))
            {
                Ok(()) => {
                    self.log_mirror.extend(transition.closed.iter().cloned());
                    let shift_end = transition.next.is_none();
                    tracing::info!(
                        employee_id = %employee_id,
                        department,
                        task,
                        closed = transition.closed.len(),
                        shift_end,
                        "Task selected"
                    );
                    return Ok(Selection {
                        employee_id,
                        closed: transition.closed,
                        shift_end,
                        state: transition.next.map_or(WorkerState::Idle, WorkerState::Active),
                    });
                }
                Err(Error::Conflict(_)) if conflicts < self.conflict_retries => {
                    conflicts += 1;
                    tracing::warn!(
                        employee_id = %employee_id,
                        attempt = conflicts,
                        "Active task changed concurrently, replanning selection"
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveBatch;
    use crate::clock::ManualClock;
    use crate::format::parse_timestamp;
    use crate::store::{ArchiveOutcome, ClearCounts, MemoryStore};
    use crate::types::{ActiveSnapshot, DateRange, HistoryRecord, StoredLog, SHIFT_END_TASK};
    use chrono::Duration;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tokio::sync::watch;

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    /// Memory store that can race a second writer in front of the next
    /// transition, or fail a number of transitions transiently.
    #[derive(Default)]
    struct ScriptedStore {
        inner: MemoryStore,
        interference: Mutex<Vec<Transition>>,
        transient_failures: AtomicUsize,
    }

    impl TaskStore for ScriptedStore {
        fn active_task(&self, employee_id: &str) -> Result<Option<ActiveTask>> {
            self.inner.active_task(employee_id)
        }

        fn active_snapshot(&self) -> Result<ActiveSnapshot> {
            self.inner.active_snapshot()
        }

        fn subscribe_active(&self) -> watch::Receiver<ActiveSnapshot> {
            self.inner.subscribe_active()
        }

        fn apply_transition(&self, transition: &Transition) -> Result<()> {
            if self
                .transient_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(Error::Store {
                    message: "database is busy".to_string(),
                    transient: true,
                });
            }
            let racer = self.interference.lock().unwrap().pop();
            if let Some(racer) = racer {
                self.inner.apply_transition(&racer)?;
            }
            self.inner.apply_transition(transition)
        }

        fn append_logs(&self, logs: &[CompletedLog]) -> Result<usize> {
            self.inner.append_logs(logs)
        }

        fn list_logs(&self) -> Result<Vec<StoredLog>> {
            self.inner.list_logs()
        }

        fn commit_archive(&self, batch: &ArchiveBatch) -> Result<ArchiveOutcome> {
            self.inner.commit_archive(batch)
        }

        fn query_history(&self, range: &DateRange) -> Result<Vec<HistoryRecord>> {
            self.inner.query_history(range)
        }

        fn clear_history(&self) -> Result<usize> {
            self.inner.clear_history()
        }

        fn clear_current(&self) -> Result<ClearCounts> {
            self.inner.clear_current()
        }
    }

    fn manager(store: Arc<dyn TaskStore>, clock: Arc<ManualClock>) -> IntervalManager {
        IntervalManager::new(store, Catalog::builtin())
            .with_clock(clock)
            .with_retry(RetryPolicy::none())
    }

    fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, IntervalManager) {
        crate::logging::init_test();
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(ts("2024-01-01T08:00:00.000Z")));
        let manager = manager(store.clone(), clock.clone());
        (store, clock, manager)
    }

    #[test]
    fn test_idle_selection_opens_interval() {
        let (store, _clock, mut manager) = setup();

        let selection = manager
            .select_task("ajaypal.sangha", "Pick", "Chill Picking")
            .unwrap();

        assert!(selection.closed.is_empty());
        assert!(!selection.shift_end);
        let active = store.active_task("ajaypal.sangha").unwrap().unwrap();
        assert_eq!(active.task, "Chill Picking");
        assert_eq!(active.start_time, ts("2024-01-01T08:00:00.000Z"));
        assert!(active.end_time.is_none());
        assert_eq!(selection.state, WorkerState::Active(active));
    }

    #[test]
    fn test_next_selection_closes_previous() {
        let (store, clock, mut manager) = setup();
        manager.select_task("a.b", "Pick", "Chill Picking").unwrap();
        clock.advance(Duration::minutes(45));

        let selection = manager.select_task("a.b", "Others", "Break").unwrap();

        assert_eq!(selection.closed.len(), 1);
        let closed = &selection.closed[0];
        assert_eq!(closed.task, "Chill Picking");
        assert_eq!(closed.department, "Pick");
        assert_eq!(closed.start_time, ts("2024-01-01T08:00:00.000Z"));
        assert_eq!(closed.end_time, ts("2024-01-01T08:45:00.000Z"));
        assert!(closed.end_time >= closed.start_time);

        assert_eq!(store.list_logs().unwrap().len(), 1);
        assert_eq!(store.active_task("a.b").unwrap().unwrap().task, "Break");
    }

    #[test]
    fn test_shift_end_closes_and_marks() {
        let (store, clock, mut manager) = setup();
        manager.select_task("a.b", "Decant", "MHE").unwrap();
        clock.advance(Duration::hours(2));

        let selection = manager.select_task("a.b", "Others", "Shift End").unwrap();

        assert!(selection.shift_end);
        assert_eq!(selection.state, WorkerState::Idle);
        assert_eq!(selection.closed.len(), 2);
        assert_eq!(selection.closed[0].task, "MHE");
        assert_eq!(selection.closed[0].duration_secs(), 7200);

        let marker = &selection.closed[1];
        assert_eq!(marker.task, SHIFT_END_TASK);
        assert_eq!(marker.department, "Others");
        assert_eq!(marker.duration_secs(), 0);
        assert_eq!(marker.start_time, ts("2024-01-01T10:00:00.000Z"));

        assert!(store.active_task("a.b").unwrap().is_none());
        assert_eq!(manager.status("a.b").unwrap(), WorkerState::Idle);
    }

    #[test]
    fn test_shift_end_from_idle_writes_marker_only() {
        let (store, _clock, mut manager) = setup();
        let selection = manager.select_task("a.b", "Others", "Shift End").unwrap();
        assert_eq!(selection.closed.len(), 1);
        assert_eq!(store.list_logs().unwrap().len(), 1);
        assert!(store.active_snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_invalid_ids_never_persist() {
        let (store, _clock, mut manager) = setup();
        for raw in ["Ajay", "ajay_pal", "123.abc"] {
            let err = manager.select_task(raw, "Pick", "Chill Picking").unwrap_err();
            assert!(matches!(err, Error::InvalidEmployeeId(_)));
        }
        assert!(store.active_snapshot().unwrap().is_empty());
        assert!(store.list_logs().unwrap().is_empty());
    }

    #[test]
    fn test_scanned_id_is_normalized() {
        let (store, _clock, mut manager) = setup();
        let selection = manager.select_task(" Abin.Thomas ", "Pick", "Chill Picking").unwrap();
        assert_eq!(selection.employee_id.as_str(), "abin.thomas");
        assert!(store.active_task("abin.thomas").unwrap().is_some());
    }

    #[test]
    fn test_task_outside_department_rejected() {
        let (store, _clock, mut manager) = setup();
        let err = manager.select_task("a.b", "Pick", "Van Loading").unwrap_err();
        assert!(matches!(err, Error::UnknownTask { .. }));
        let err = manager.select_task("a.b", "Canteen", "Break").unwrap_err();
        assert!(matches!(err, Error::UnknownDepartment(_)));
        assert!(store.active_snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_catalog_names_are_canonical() {
        let (store, _clock, mut manager) = setup();
        manager.select_task("a.b", "pick", "chill picking").unwrap();
        let active = store.active_task("a.b").unwrap().unwrap();
        assert_eq!(active.department, "Pick");
        assert_eq!(active.task, "Chill Picking");
    }

    #[test]
    fn test_kiosk_clock_behind_opener() {
        let (store, clock, mut manager) = setup();
        // Another kiosk, a minute ahead, opened the interval
        store
            .apply_transition(&Transition {
                employee_id: "a.b".to_string(),
                expected: None,
                closed: vec![],
                next: Some(ActiveTask::start(
                    "a.b",
                    "Chill Picking",
                    "Pick",
                    ts("2024-01-01T08:01:00.000Z"),
                )),
            })
            .unwrap();

        let selection = manager.select_task("a.b", "Others", "Shift End").unwrap();

        assert_eq!(clock.now(), ts("2024-01-01T08:00:00.000Z"));
        assert_eq!(selection.closed.len(), 2);
        assert_eq!(selection.closed[0].end_time, ts("2024-01-01T08:01:00.000Z"));
        assert_eq!(selection.closed[0].duration_secs(), 0);
        assert_eq!(selection.closed[1].start_time, ts("2024-01-01T08:01:00.000Z"));
        assert!(store.active_task("a.b").unwrap().is_none());
        assert_eq!(store.list_logs().unwrap().len(), 2);
    }

    #[test]
    fn test_concurrent_change_is_replanned() {
        let store = Arc::new(ScriptedStore::default());
        let clock = Arc::new(ManualClock::new(ts("2024-01-01T08:00:00.000Z")));
        let mut manager = manager(store.clone(), clock.clone());

        // Another kiosk starts a break for the same worker just before our write
        store.interference.lock().unwrap().push(Transition {
            employee_id: "a.b".to_string(),
            expected: None,
            closed: vec![],
            next: Some(ActiveTask::start(
                "a.b",
                "Break",
                "Others",
                ts("2024-01-01T07:30:00.000Z"),
            )),
        });

        let selection = manager.select_task("a.b", "Pick", "Chill Picking").unwrap();

        assert_eq!(selection.closed.len(), 1);
        assert_eq!(selection.closed[0].task, "Break");
        assert_eq!(store.list_logs().unwrap().len(), 1);
        assert_eq!(
            store.active_task("a.b").unwrap().unwrap().task,
            "Chill Picking"
        );
    }

    #[test]
    fn test_conflict_surfaces_without_retries() {
        let store = Arc::new(ScriptedStore::default());
        let clock = Arc::new(ManualClock::new(ts("2024-01-01T08:00:00.000Z")));
        let mut manager = manager(store.clone(), clock).with_store_config(&StoreConfig {
            max_retries: 0,
            conflict_retries: 0,
            ..Default::default()
        });
        store.interference.lock().unwrap().push(Transition {
            employee_id: "a.b".to_string(),
            expected: None,
            closed: vec![],
            next: Some(ActiveTask::start(
                "a.b",
                "Break",
                "Others",
                ts("2024-01-01T07:30:00.000Z"),
            )),
        });

        let err = manager.select_task("a.b", "Pick", "Chill Picking").unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert!(manager.session_log().is_empty());
    }

    #[test]
    fn test_transient_failure_is_retried() {
        let store = Arc::new(ScriptedStore::default());
        store.transient_failures.store(2, Ordering::SeqCst);
        let clock = Arc::new(ManualClock::new(ts("2024-01-01T08:00:00.000Z")));
        let mut manager = manager(store.clone(), clock).with_store_config(&StoreConfig {
            max_retries: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            conflict_retries: 0,
        });

        manager.select_task("a.b", "Pick", "Chill Picking").unwrap();
        assert!(store.active_task("a.b").unwrap().is_some());
    }

    #[test]
    fn test_transient_failure_exhausts() {
        let store = Arc::new(ScriptedStore::default());
        store.transient_failures.store(5, Ordering::SeqCst);
        let clock = Arc::new(ManualClock::new(ts("2024-01-01T08:00:00.000Z")));
        let mut manager = manager(store.clone(), clock);

        let err = manager.select_task("a.b", "Pick", "Chill Picking").unwrap_err();
        assert!(err.is_transient());
        assert!(store.active_task("a.b").unwrap().is_none());
    }

    #[test]
    fn test_session_log_mirrors_closed_logs() {
        let (_store, clock, mut manager) = setup();
        manager.select_task("a.b", "Pick", "Chill Picking").unwrap();
        clock.advance(Duration::minutes(10));
        manager.select_task("c.d", "Decant", "MHE").unwrap();
        manager.select_task("a.b", "Others", "Shift End").unwrap();

        let tasks: Vec<&str> = manager.session_log().iter().map(|l| l.task.as_str()).collect();
        assert_eq!(tasks, vec!["Chill Picking", "Shift End"]);
    }

    #[test]
    fn test_plan_selection_expects_current() {
        let now = ts("2024-01-01T09:00:00.000Z");
        let current = ActiveTask::start("a.b", "MHE", "Decant", ts("2024-01-01T08:00:00.000Z"));
        let plan = plan_selection("a.b", Some(&current), "Decant", "MHE", now);
        assert_eq!(plan.expected, Some(current));
        assert_eq!(plan.closed.len(), 1);
        assert_eq!(plan.next.unwrap().start_time, now);
    }
}
