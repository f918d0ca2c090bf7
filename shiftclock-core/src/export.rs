//! CSV exports consumed by downstream spreadsheets.
//!
//! Every export groups rows by employee (groups in lexicographic order).
//! A group is laid out as:
//!
//! ```text
//! Employee: <id>
//! <column header>
//! "<field>","<field>",...
//! <blank line>
//! ```
//!
//! The header line and column header are not quoted; every data field is.

use crate::format::{format_hms, format_timestamp};
use crate::types::{CompletedLog, HistoryRecord, WeeklyTotal};
use std::collections::BTreeMap;

/// File name for the current completed-log export.
pub const CURRENT_FILE_NAME: &str = "task-report.csv";
/// File name for the daily history export.
pub const HISTORY_FILE_NAME: &str = "history.csv";
/// File name for the weekly history export.
pub const WEEKLY_FILE_NAME: &str = "weekly-history.csv";

const CURRENT_COLUMNS: &str = "task,department,startTime,endTime,duration";
const HISTORY_COLUMNS: &str = "task,department,date,duration";
const WEEKLY_COLUMNS: &str = "task,department,weekStart,duration";

/// A rendered CSV file ready to hand out for download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvExport {
    pub file_name: &'static str,
    pub bytes: Vec<u8>,
}

impl CsvExport {
    fn new(file_name: &'static str, text: String) -> Self {
        Self {
            file_name,
            bytes: text.into_bytes(),
        }
    }

    /// The export as text (always valid UTF-8).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// Group rows by employee id; groups come back sorted by id.
fn group_by_employee<'a, T>(
    rows: &'a [T],
    employee_id: impl Fn(&'a T) -> &'a str,
) -> BTreeMap<&'a str, Vec<&'a T>> {
    let mut groups: BTreeMap<&'a str, Vec<&'a T>> = BTreeMap::new();
    for row in rows {
        groups.entry(employee_id(row)).or_default().push(row);
    }
    groups
}

fn write_group<I>(out: &mut String, employee_id: &str, columns: &str, rows: I)
where
    I: IntoIterator<Item = Vec<String>>,
{
    out.push_str(&format!("Employee: {}\n", employee_id));
    out.push_str(columns);
    out.push('\n');
    for fields in rows {
        let line: Vec<String> = fields.iter().map(|f| quote(f)).collect();
        out.push_str(&line.join(","));
        out.push('\n');
    }
    out.push('\n');
}

/// Export completed logs (`task-report.csv`).
///
/// Rows within a group are ordered by start time; durations are computed now
/// from the stored timestamps.
pub fn current_logs_csv(logs: &[CompletedLog]) -> CsvExport {
    let mut out = String::new();

    for (employee_id, mut rows) in group_by_employee(logs, |l| l.employee_id.as_str()) {
        rows.sort_by_key(|l| l.start_time);
        write_group(
            &mut out,
            employee_id,
            CURRENT_COLUMNS,
            rows.into_iter().map(|l| {
                vec![
                    l.task.clone(),
                    l.department.clone(),
                    format_timestamp(l.start_time),
                    format_timestamp(l.end_time),
                    format_hms(l.duration_secs()),
                ]
            }),
        );
    }

    CsvExport::new(CURRENT_FILE_NAME, out)
}

/// Export merged history (`history.csv`), rows ordered by date then task.
pub fn history_csv(records: &[HistoryRecord]) -> CsvExport {
    let mut out = String::new();

    for (employee_id, mut rows) in group_by_employee(records, |r| r.employee_id.as_str()) {
        rows.sort_by(|a, b| (a.date, &a.task).cmp(&(b.date, &b.task)));
        write_group(
            &mut out,
            employee_id,
            HISTORY_COLUMNS,
            rows.into_iter().map(|r| {
                vec![
                    r.task.clone(),
                    r.department.clone(),
                    r.date.format("%Y-%m-%d").to_string(),
                    format_hms(r.duration_secs),
                ]
            }),
        );
    }

    CsvExport::new(HISTORY_FILE_NAME, out)
}

/// Export weekly totals (`weekly-history.csv`), rows ordered by week then task.
pub fn weekly_csv(totals: &[WeeklyTotal]) -> CsvExport {
    let mut out = String::new();

    for (employee_id, mut rows) in group_by_employee(totals, |w| w.employee_id.as_str()) {
        rows.sort_by(|a, b| (a.week_start, &a.task).cmp(&(b.week_start, &b.task)));
        write_group(
            &mut out,
            employee_id,
            WEEKLY_COLUMNS,
            rows.into_iter().map(|w| {
                vec![
                    w.task.clone(),
                    w.department.clone(),
                    w.week_start.format("%Y-%m-%d").to_string(),
                    format_hms(w.duration_secs),
                ]
            }),
        );
    }

    CsvExport::new(WEEKLY_FILE_NAME, out)
}
