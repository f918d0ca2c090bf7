//! Integration tests for the kiosk flow against the SQLite store
//!
//! A shift is driven through [`IntervalManager`] with a manual clock, then
//! archived and exported through an admin session, all on a database file in
//! a temp directory.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use shiftclock_core::format::parse_timestamp;
use shiftclock_core::logging;
use shiftclock_core::{
    AccessPolicy, Catalog, Clock, Database, DateRange, Error, IntervalManager, ManualClock,
    RetryPolicy, RowFilter, TaskStore, WorkerState,
};
use std::sync::Arc;
use tempfile::TempDir;

fn ts(s: &str) -> DateTime<Utc> {
    parse_timestamp(s).unwrap()
}

struct Shift {
    _dir: TempDir,
    db: Arc<Database>,
    clock: Arc<ManualClock>,
}

impl Shift {
    fn start(at: &str) -> Self {
        logging::init_test();
        let dir = TempDir::new().unwrap();
        let db = Database::open(&dir.path().join("data.db")).unwrap();
        db.migrate().unwrap();
        Self {
            _dir: dir,
            db: Arc::new(db),
            clock: Arc::new(ManualClock::new(ts(at))),
        }
    }

    fn kiosk(&self) -> IntervalManager {
        IntervalManager::new(self.db.clone(), Catalog::builtin())
            .with_clock(self.clock.clone())
            .with_retry(RetryPolicy::none())
    }

    fn admin(&self) -> shiftclock_core::AdminSession {
        AccessPolicy::default()
            .authorize("camilo.torres", None, self.db.clone())
            .unwrap()
            .with_clock(self.clock.clone())
    }
}

// ============================================
// Full shift
// ============================================

#[test]
fn test_full_shift_to_history() {
    let shift = Shift::start("2024-01-01T06:00:00.000Z");
    let mut kiosk = shift.kiosk();

    kiosk.select_task("ajaypal.sangha", "Dispatch", "Van Loading").unwrap();
    kiosk.select_task("abin.thomas", "Pick", "Chill Picking").unwrap();
    shift.clock.advance(Duration::hours(2));
    kiosk.select_task("ajaypal.sangha", "Others", "Break").unwrap();
    shift.clock.advance(Duration::minutes(15));
    kiosk.select_task("ajaypal.sangha", "Dispatch", "Van Loading").unwrap();
    shift.clock.advance(Duration::hours(1));
    kiosk.select_task("ajaypal.sangha", "Others", "Shift End").unwrap();

    assert_eq!(kiosk.status("ajaypal.sangha").unwrap(), WorkerState::Idle);
    assert!(kiosk.status("abin.thomas").unwrap().is_active());

    let admin = shift.admin();
    let current = admin.export_current().unwrap().text();
    assert!(current.starts_with("Employee: ajaypal.sangha\ntask,department,startTime,endTime,duration\n"));
    assert!(current.contains(
        "\"Van Loading\",\"Dispatch\",\"2024-01-01T06:00:00.000Z\",\"2024-01-01T08:00:00.000Z\",\"02:00:00\""
    ));
    assert!(current.contains("\"Shift End\",\"Others\""));

    let outcome = admin.archive().unwrap();
    assert_eq!(outcome.logs_removed, 4);
    assert_eq!(outcome.active_removed, 1);
    assert!(shift.db.list_logs().unwrap().is_empty());

    let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let history = admin
        .history(&DateRange::new(day, day), &RowFilter::default())
        .unwrap();
    let van_loading = history
        .iter()
        .find(|r| r.employee_id == "ajaypal.sangha" && r.task == "Van Loading")
        .unwrap();
    assert_eq!(van_loading.duration_secs, 3 * 3600);

    let csv = admin
        .export_history(&DateRange::new(day, day), &RowFilter::default())
        .unwrap()
        .text();
    assert!(csv.contains("\"Van Loading\",\"Dispatch\",\"2024-01-01\",\"03:00:00\""));
}

#[test]
fn test_live_board_sees_kiosk_writes() {
    let shift = Shift::start("2024-01-01T06:00:00.000Z");
    let mut kiosk = shift.kiosk();
    let admin = shift.admin();
    let mut board = admin.open_live_board();

    kiosk.select_task("ajaypal.sangha", "Dispatch", "MHE").unwrap();
    kiosk.select_task("zoe.smith", "Pick", "Chill Picking").unwrap();
    assert!(board.refresh());
    shift.clock.advance(Duration::minutes(20));

    let only_pick = RowFilter {
        department: Some("Pick".to_string()),
        min_minutes: Some(20),
        ..Default::default()
    };
    let rows = board.filtered(&only_pick, shift.clock.now());
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].employee_id, "zoe.smith");
    assert_eq!(rows[0].duration_secs, 1200);
}

#[test]
fn test_two_kiosks_on_one_file() {
    let shift = Shift::start("2024-01-01T06:00:00.000Z");
    let other = Arc::new(Database::open(&shift._dir.path().join("data.db")).unwrap());
    other.migrate().unwrap();

    let mut first = shift.kiosk();
    let mut second = IntervalManager::new(other.clone(), Catalog::builtin())
        .with_clock(shift.clock.clone())
        .with_retry(RetryPolicy::none());

    first.select_task("a.b", "Pick", "Chill Picking").unwrap();
    shift.clock.advance(Duration::minutes(30));
    let selection = second.select_task("a.b", "Others", "Break").unwrap();

    // The second kiosk sees the first one's interval and closes it
    assert_eq!(selection.closed.len(), 1);
    assert_eq!(selection.closed[0].task, "Chill Picking");
    assert_eq!(shift.db.active_task("a.b").unwrap().unwrap().task, "Break");
}

#[test]
fn test_rejected_scan_leaves_store_untouched() {
    let shift = Shift::start("2024-01-01T06:00:00.000Z");
    let mut kiosk = shift.kiosk();

    let err = kiosk.select_task("ajay_pal", "Pick", "Chill Picking").unwrap_err();
    assert!(matches!(err, Error::InvalidEmployeeId(_)));
    assert!(shift.db.active_snapshot().unwrap().is_empty());
    assert!(shift.db.list_logs().unwrap().is_empty());
}
