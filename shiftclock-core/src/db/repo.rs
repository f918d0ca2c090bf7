//! Database repository layer
//!
//! SQLite implementation of [`TaskStore`].

use crate::archive::ArchiveBatch;
use crate::error::{Error, Result};
use crate::format::{format_timestamp, parse_timestamp};
use crate::store::{check_expected, ArchiveOutcome, ClearCounts, TaskStore, Transition};
use crate::types::{ActiveSnapshot, ActiveTask, CompletedLog, DateRange, HistoryRecord, StoredLog};
use crate::validate::{validate_fields, RawLogFields};
use chrono::{NaiveDate, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tokio::sync::watch;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// Database handle with connection pooling (single connection for now)
pub struct Database {
    conn: Mutex<Connection>,
    active_tx: watch::Sender<ActiveSnapshot>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL lets the live board read while a kiosk writes
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 250;
            ",
        )?;

        Ok(Self::from_connection(conn))
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(Connection::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        let (active_tx, _) = watch::channel(ActiveSnapshot::new());
        Self {
            conn: Mutex::new(conn),
            active_tx,
        }
    }

    /// Run migrations on this database and load the active table
    pub fn migrate(&self) -> Result<()> {
        {
            let conn = self.connection()?;
            super::schema::run_migrations(&conn)?;
        }
        self.poll_active_changes()?;
        Ok(())
    }

    /// Get the underlying connection (for advanced use)
    pub fn connection(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::poisoned())
    }

    /// Re-read the active table and notify subscribers if it changed.
    ///
    /// Other processes write the same file; the live view calls this on each
    /// tick to pick their changes up. Returns whether a snapshot was sent.
    pub fn poll_active_changes(&self) -> Result<bool> {
        let snapshot = {
            let conn = self.connection()?;
            read_active(&conn)?
        };
        Ok(self.active_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        }))
    }

    fn publish(&self, conn: &Connection) -> Result<()> {
        let snapshot = read_active(conn)?;
        self.active_tx.send_replace(snapshot);
        Ok(())
    }
}

// ============================================
// Row mapping
// ============================================

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn row_to_active(row: &Row) -> rusqlite::Result<ActiveTask> {
    let start_str: String = row.get(3)?;
    let start_time = parse_timestamp(&start_str).map_err(|e| conversion_error(3, e))?;
    Ok(ActiveTask::start(
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, String>(2)?,
        start_time,
    ))
}

fn row_to_history(row: &Row) -> rusqlite::Result<HistoryRecord> {
    let date_str: String = row.get(4)?;
    let duration: i64 = row.get(3)?;
    Ok(HistoryRecord {
        employee_id: row.get(0)?,
        task: row.get(1)?,
        department: row.get(2)?,
        duration_secs: duration.max(0) as u64,
        date: NaiveDate::parse_from_str(&date_str, DATE_FORMAT)
            .map_err(|e| conversion_error(4, e))?,
    })
}

fn read_active(conn: &Connection) -> Result<ActiveSnapshot> {
    let mut stmt = conn.prepare(
        "SELECT employee_id, task, department, start_time FROM active_tasks ORDER BY employee_id",
    )?;
    let rows = stmt.query_map([], row_to_active)?;

    let mut snapshot = ActiveSnapshot::new();
    for row in rows {
        let task = row?;
        snapshot.insert(task.employee_id.clone(), task);
    }
    Ok(snapshot)
}

fn insert_log(conn: &Connection, log: &CompletedLog) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO task_logs (employee_id, task, department, start_time, end_time)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            log.employee_id,
            log.task,
            log.department,
            format_timestamp(log.start_time),
            format_timestamp(log.end_time),
        ],
    )?;
    Ok(())
}

impl TaskStore for Database {
    fn active_task(&self, employee_id: &str) -> Result<Option<ActiveTask>> {
        let conn = self.connection()?;
        conn.query_row(
            "SELECT employee_id, task, department, start_time FROM active_tasks WHERE employee_id = ?",
            [employee_id],
            row_to_active,
        )
        .optional()
        .map_err(Error::from)
    }

    fn active_snapshot(&self) -> Result<ActiveSnapshot> {
        let conn = self.connection()?;
        read_active(&conn)
    }

    fn subscribe_active(&self) -> watch::Receiver<ActiveSnapshot> {
        self.active_tx.subscribe()
    }

    fn apply_transition(&self, transition: &Transition) -> Result<()> {
        let mut conn = self.connection()?;
        // IMMEDIATE takes the write lock up front so the compare and the
        // write see the same row even across processes
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let current = tx
            .query_row(
                "SELECT employee_id, task, department, start_time FROM active_tasks WHERE employee_id = ?",
                [&transition.employee_id],
                row_to_active,
            )
            .optional()?;
        check_expected(current.as_ref(), transition)?;

        for log in &transition.closed {
            insert_log(&tx, log)?;
        }

        match &transition.next {
            Some(next) => {
                tx.execute(
                    r#"
                    INSERT INTO active_tasks (employee_id, task, department, start_time)
                    VALUES (?1, ?2, ?3, ?4)
                    ON CONFLICT(employee_id) DO UPDATE SET
                        task = excluded.task,
                        department = excluded.department,
                        start_time = excluded.start_time
                    "#,
                    params![
                        transition.employee_id,
                        next.task,
                        next.department,
                        format_timestamp(next.start_time),
                    ],
                )?;
            }
            None => {
                tx.execute(
                    "DELETE FROM active_tasks WHERE employee_id = ?",
                    [&transition.employee_id],
                )?;
            }
        }

        tx.commit()?;
        self.publish(&conn)
    }

    fn append_logs(&self, logs: &[CompletedLog]) -> Result<usize> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        for log in logs {
            insert_log(&tx, log)?;
        }
        tx.commit()?;
        Ok(logs.len())
    }

    fn list_logs(&self) -> Result<Vec<StoredLog>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT id, employee_id, task, department, start_time, end_time
            FROM task_logs
            ORDER BY start_time, id
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut logs = Vec::new();
        for row in rows {
            let (id, employee_id, task, department, start_time, end_time) = row?;
            let raw = RawLogFields {
                employee_id: employee_id.as_deref(),
                task: task.as_deref(),
                department: department.as_deref(),
                start_time: start_time.as_deref(),
                end_time: end_time.as_deref(),
            };
            match validate_fields(raw) {
                Ok(log) => logs.push(StoredLog { id, log }),
                Err(rejection) => {
                    tracing::warn!(log_id = id, %rejection, "Skipping malformed task log row");
                }
            }
        }

        // Text order already matches time order for well-formed rows; offsets
        // other than Z would not, so sort on the parsed value
        logs.sort_by_key(|s| (s.log.start_time, s.id));
        Ok(logs)
    }

    fn commit_archive(&self, batch: &ArchiveBatch) -> Result<ArchiveOutcome> {
        let mut conn = self.connection()?;
        let tx = conn.transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let previous = tx
            .query_row(
                r#"
                SELECT history_written, logs_removed, active_removed
                FROM archive_batches WHERE batch_id = ?
                "#,
                [&batch.batch_id],
                |row| {
                    Ok(ArchiveOutcome {
                        batch_id: batch.batch_id.clone(),
                        history_written: row.get::<_, i64>(0)? as usize,
                        logs_removed: row.get::<_, i64>(1)? as usize,
                        active_removed: row.get::<_, i64>(2)? as usize,
                        already_applied: true,
                    })
                },
            )
            .optional()?;
        if let Some(previous) = previous {
            tracing::info!(batch_id = %batch.batch_id, "Archive batch already committed");
            return Ok(previous);
        }

        {
            let mut insert = tx.prepare(
                r#"
                INSERT INTO history (employee_id, task, department, duration_secs, date, batch_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
            )?;
            for record in &batch.records {
                insert.execute(params![
                    record.employee_id,
                    record.task,
                    record.department,
                    record.duration_secs as i64,
                    record.date.format(DATE_FORMAT).to_string(),
                    batch.batch_id,
                ])?;
            }
        }

        let mut logs_removed = 0;
        {
            let mut delete = tx.prepare("DELETE FROM task_logs WHERE id = ?")?;
            for id in &batch.log_ids {
                logs_removed += delete.execute([id])?;
            }
        }

        let active_removed = tx.execute("DELETE FROM active_tasks", [])?;

        tx.execute(
            r#"
            INSERT INTO archive_batches (batch_id, committed_at, history_written, logs_removed, active_removed)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                batch.batch_id,
                format_timestamp(Utc::now()),
                batch.records.len() as i64,
                logs_removed as i64,
                active_removed as i64,
            ],
        )?;

        tx.commit()?;
        self.publish(&conn)?;

        Ok(ArchiveOutcome {
            batch_id: batch.batch_id.clone(),
            history_written: batch.records.len(),
            logs_removed,
            active_removed,
            already_applied: false,
        })
    }

    fn query_history(&self, range: &DateRange) -> Result<Vec<HistoryRecord>> {
        let conn = self.connection()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT employee_id, task, department, duration_secs, date
            FROM history
            WHERE date >= ?1 AND date <= ?2
            ORDER BY date, id
            "#,
        )?;

        let records = stmt
            .query_map(
                params![
                    range.start.format(DATE_FORMAT).to_string(),
                    range.end.format(DATE_FORMAT).to_string(),
                ],
                row_to_history,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    fn clear_history(&self) -> Result<usize> {
        let conn = self.connection()?;
        Ok(conn.execute("DELETE FROM history", [])?)
    }

    fn clear_current(&self) -> Result<ClearCounts> {
        let mut conn = self.connection()?;
        let tx = conn.transaction()?;
        let logs = tx.execute("DELETE FROM task_logs", [])?;
        let active = tx.execute("DELETE FROM active_tasks", [])?;
        tx.commit()?;
        self.publish(&conn)?;
        Ok(ClearCounts { logs, active })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn ts(s: &str) -> DateTime<Utc> {
        parse_timestamp(s).unwrap()
    }

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.migrate().unwrap();
        db
    }

    fn create_test_log(employee_id: &str, start: &str, end: &str) -> CompletedLog {
        CompletedLog {
            employee_id: employee_id.to_string(),
            task: "Ambient Picking".to_string(),
            department: "Pick".to_string(),
            start_time: ts(start),
            end_time: ts(end),
        }
    }

    fn start(employee_id: &str, task: &str, at: &str) -> Transition {
        Transition {
            employee_id: employee_id.to_string(),
            expected: None,
            closed: vec![],
            next: Some(ActiveTask::start(employee_id, task, "Pick", ts(at))),
        }
    }

    #[test]
    fn test_transition_roundtrip() {
        let db = test_db();
        let mut rx = db.subscribe_active();

        db.apply_transition(&start("a.b", "Chill Picking", "2024-01-01T08:00:00.000Z"))
            .unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().len(), 1);

        let current = db.active_task("a.b").unwrap().unwrap();
        assert_eq!(current.start_time, ts("2024-01-01T08:00:00.000Z"));

        let closed = current.close(ts("2024-01-01T08:30:00.000Z"));
        db.apply_transition(&Transition {
            employee_id: "a.b".to_string(),
            expected: Some(current),
            closed: vec![closed.clone()],
            next: None,
        })
        .unwrap();

        assert!(db.active_task("a.b").unwrap().is_none());
        let logs = db.list_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log, closed);
    }

    #[test]
    fn test_stale_expectation_conflicts() {
        let db = test_db();
        db.apply_transition(&start("a.b", "Chill Picking", "2024-01-01T08:00:00.000Z"))
            .unwrap();

        let err = db
            .apply_transition(&start("a.b", "Ambient Picking", "2024-01-01T08:00:01.000Z"))
            .unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
        assert_eq!(db.active_task("a.b").unwrap().unwrap().task, "Chill Picking");
    }

    #[test]
    fn test_malformed_rows_are_skipped() {
        let db = test_db();
        db.append_logs(&[create_test_log(
            "a.b",
            "2024-01-01T08:00:00.000Z",
            "2024-01-01T09:00:00.000Z",
        )])
        .unwrap();
        db.connection()
            .unwrap()
            .execute(
                "INSERT INTO task_logs (employee_id, task, start_time, end_time)
                 VALUES ('c.d', 'MHE', '2024-01-01T08:00:00.000Z', '2024-01-01T09:00:00.000Z')",
                [],
            )
            .unwrap();
        db.connection()
            .unwrap()
            .execute(
                "INSERT INTO task_logs (employee_id, task, department, start_time, end_time)
                 VALUES ('e.f', 'MHE', 'Decant', 'yesterday', '2024-01-01T09:00:00.000Z')",
                [],
            )
            .unwrap();

        let logs = db.list_logs().unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].log.employee_id, "a.b");
    }

    #[test]
    fn test_archive_is_idempotent() {
        let db = test_db();
        db.append_logs(&[
            create_test_log("a.b", "2024-01-01T08:00:00.000Z", "2024-01-01T08:00:30.000Z"),
            create_test_log("a.b", "2024-01-01T09:00:00.000Z", "2024-01-01T09:01:00.000Z"),
        ])
        .unwrap();
        db.apply_transition(&start("c.d", "Chill Picking", "2024-01-01T10:00:00.000Z"))
            .unwrap();

        let batch = ArchiveBatch::with_id("batch-1", &db.list_logs().unwrap());
        let first = db.commit_archive(&batch).unwrap();
        assert_eq!(first.history_written, 2);
        assert_eq!(first.logs_removed, 2);
        assert_eq!(first.active_removed, 1);
        assert!(!first.already_applied);

        let second = db.commit_archive(&batch).unwrap();
        assert!(second.already_applied);
        assert_eq!(second.history_written, 2);

        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let history = db.query_history(&DateRange::new(day, day)).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history.iter().map(|r| r.duration_secs).sum::<u64>(), 90);
        assert!(db.active_snapshot().unwrap().is_empty());
    }

    #[test]
    fn test_history_range_is_inclusive() {
        let db = test_db();
        db.append_logs(&[
            create_test_log("a.b", "2023-12-31T23:00:00.000Z", "2023-12-31T23:30:00.000Z"),
            create_test_log("a.b", "2024-01-01T08:00:00.000Z", "2024-01-01T08:30:00.000Z"),
            create_test_log("a.b", "2024-01-07T08:00:00.000Z", "2024-01-07T08:30:00.000Z"),
            create_test_log("a.b", "2024-01-08T08:00:00.000Z", "2024-01-08T08:30:00.000Z"),
        ])
        .unwrap();
        db.commit_archive(&ArchiveBatch::plan(&db.list_logs().unwrap()))
            .unwrap();

        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        );
        let dates: Vec<NaiveDate> = db
            .query_history(&range)
            .unwrap()
            .into_iter()
            .map(|r| r.date)
            .collect();
        assert_eq!(dates, vec![range.start, range.end]);
    }

    #[test]
    fn test_clear_current_and_history() {
        let db = test_db();
        db.append_logs(&[create_test_log(
            "a.b",
            "2024-01-01T08:00:00.000Z",
            "2024-01-01T09:00:00.000Z",
        )])
        .unwrap();
        db.apply_transition(&start("a.b", "Chill Picking", "2024-01-01T09:00:00.000Z"))
            .unwrap();

        let counts = db.clear_current().unwrap();
        assert_eq!(counts, ClearCounts { logs: 1, active: 1 });
        assert!(db.list_logs().unwrap().is_empty());
        assert!(db.subscribe_active().borrow().is_empty());
        assert_eq!(db.clear_history().unwrap(), 0);
    }

    #[test]
    fn test_poll_picks_up_other_writers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.db");

        let viewer = Database::open(&path).unwrap();
        viewer.migrate().unwrap();
        let kiosk = Database::open(&path).unwrap();
        kiosk.migrate().unwrap();

        let mut rx = viewer.subscribe_active();
        assert!(!viewer.poll_active_changes().unwrap());

        kiosk
            .apply_transition(&start("a.b", "Chill Picking", "2024-01-01T08:00:00.000Z"))
            .unwrap();
        assert!(!rx.has_changed().unwrap());

        assert!(viewer.poll_active_changes().unwrap());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update()["a.b"].task, "Chill Picking");
    }
}
