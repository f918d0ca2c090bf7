//! Plain-text rendering for command output.

use chrono::{DateTime, Utc};
use shiftclock_core::format::{format_hms, format_relative_time, format_timestamp};
use shiftclock_core::{
    history, ArchiveOutcome, Catalog, HistoryRecord, ImportReport, LiveRow, Selection,
    WeeklyTotal, WorkerState, SHIFT_END_TASK,
};

pub fn print_selection(selection: &Selection) {
    for log in &selection.closed {
        // The zero-length shift end marker is reported by the state line
        if log.task == SHIFT_END_TASK {
            continue;
        }
        println!(
            "Closed {} ({}) after {}",
            log.task,
            log.department,
            format_hms(log.duration_secs())
        );
    }

    match &selection.state {
        WorkerState::Active(task) => println!(
            "{} is now on {} ({}) since {}",
            selection.employee_id,
            task.task,
            task.department,
            format_timestamp(task.start_time)
        ),
        WorkerState::Idle => println!("{} ended their shift", selection.employee_id),
    }
}

pub fn print_catalog(catalog: &Catalog) {
    for department in catalog.departments() {
        println!("{}", department.name);
        for task in &department.tasks {
            println!("  - {}", task);
        }
    }
}

pub fn print_status(id: &str, state: &WorkerState, now: DateTime<Utc>) {
    let id = id.trim().to_lowercase();
    match state {
        WorkerState::Idle => println!("{}: idle", id),
        WorkerState::Active(task) => println!(
            "{}: {} ({}) started {} [{}]",
            id,
            task.task,
            task.department,
            format_relative_time(task.start_time, now),
            format_hms(task.elapsed_secs(now))
        ),
    }
}

pub fn print_live(rows: &[LiveRow], now: DateTime<Utc>) {
    if rows.is_empty() {
        println!("No active tasks");
        return;
    }

    println!(
        "{:<28} {:<12} {:<28} {:<14} {:>10}",
        "EMPLOYEE", "DEPARTMENT", "TASK", "STARTED", "DURATION"
    );
    for row in rows {
        println!(
            "{:<28} {:<12} {:<28} {:<14} {:>10}",
            row.employee_id,
            row.department,
            row.task,
            format_relative_time(row.start_time, now),
            format_hms(row.duration_secs)
        );
    }
    println!("{} active", rows.len());
}

pub fn print_archive(outcome: &ArchiveOutcome) {
    if outcome.already_applied {
        println!("Archive batch {} was already committed", outcome.batch_id);
        return;
    }
    println!("Archive complete:");
    println!("  Batch:              {}", outcome.batch_id);
    println!("  History rows:       {}", outcome.history_written);
    println!("  Logs removed:       {}", outcome.logs_removed);
    println!("  Active tasks reset: {}", outcome.active_removed);
}

pub fn print_history(records: &[HistoryRecord]) {
    if records.is_empty() {
        println!("No history in range");
        return;
    }

    println!(
        "{:<28} {:<10} {:<12} {:<28} {:>10}",
        "EMPLOYEE", "DATE", "DEPARTMENT", "TASK", "DURATION"
    );
    for record in records {
        println!(
            "{:<28} {:<10} {:<12} {:<28} {:>10}",
            record.employee_id,
            record.date,
            record.department,
            record.task,
            format_hms(record.duration_secs)
        );
    }

    println!();
    for (employee_id, secs) in history::totals_by_employee(records) {
        println!("{:<28} total {}", employee_id, format_hms(secs));
    }
}

pub fn print_weekly(totals: &[WeeklyTotal]) {
    if totals.is_empty() {
        println!("No history in range");
        return;
    }

    println!(
        "{:<28} {:<10} {:<12} {:<28} {:>10}",
        "EMPLOYEE", "WEEK OF", "DEPARTMENT", "TASK", "DURATION"
    );
    for total in totals {
        println!(
            "{:<28} {:<10} {:<12} {:<28} {:>10}",
            total.employee_id,
            total.week_start,
            total.department,
            total.task,
            format_hms(total.duration_secs)
        );
    }
}

pub fn print_import(report: &ImportReport) {
    println!("Imported {} log(s)", report.imported);
    for (index, rejection) in &report.rejected {
        println!("  Rejected #{}: {}", index, rejection);
    }
}
