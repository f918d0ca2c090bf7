//! Shape checks applied before a completed log is accepted.
//!
//! A record is either accepted as a [`CompletedLog`] or rejected with a
//! [`Rejection`] naming the offending field. Rejections are returned to the
//! caller; nothing is written for a rejected record.

use crate::catalog::Catalog;
use crate::error::Error;
use crate::format::parse_timestamp;
use crate::identity::EmployeeId;
use crate::types::CompletedLog;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Why a field failed the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Missing,
    NotAString,
    Empty,
    BadTimestamp,
    EndBeforeStart,
    BadEmployeeId,
    NotInCatalog,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectReason::Missing => "missing",
            RejectReason::NotAString => "not a string",
            RejectReason::Empty => "empty",
            RejectReason::BadTimestamp => "not an RFC 3339 timestamp",
            RejectReason::EndBeforeStart => "ends before it starts",
            RejectReason::BadEmployeeId => "is not a firstname.lastname id",
            RejectReason::NotInCatalog => "is not offered in the catalog",
        };
        f.write_str(text)
    }
}

/// A record that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} {reason}")]
pub struct Rejection {
    pub field: &'static str,
    pub reason: RejectReason,
}

impl Rejection {
    fn new(field: &'static str, reason: RejectReason) -> Self {
        Self { field, reason }
    }
}

/// Raw string fields of a completed log, as read from a store or import.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawLogFields<'a> {
    pub employee_id: Option<&'a str>,
    pub task: Option<&'a str>,
    pub department: Option<&'a str>,
    pub start_time: Option<&'a str>,
    pub end_time: Option<&'a str>,
}

fn required<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str, Rejection> {
    match value {
        None => Err(Rejection::new(field, RejectReason::Missing)),
        Some(v) if v.trim().is_empty() => Err(Rejection::new(field, RejectReason::Empty)),
        Some(v) => Ok(v),
    }
}

/// Validate raw fields and build the typed record.
pub fn validate_fields(raw: RawLogFields<'_>) -> Result<CompletedLog, Rejection> {
    let employee_id = required("employeeId", raw.employee_id)?;
    let task = required("task", raw.task)?;
    let department = required("department", raw.department)?;
    let start = required("startTime", raw.start_time)?;
    let end = required("endTime", raw.end_time)?;

    let start_time = parse_timestamp(start)
        .map_err(|_| Rejection::new("startTime", RejectReason::BadTimestamp))?;
    let end_time =
        parse_timestamp(end).map_err(|_| Rejection::new("endTime", RejectReason::BadTimestamp))?;

    let log = CompletedLog {
        employee_id: employee_id.to_string(),
        task: task.to_string(),
        department: department.to_string(),
        start_time,
        end_time,
    };
    validate_completed(&log)?;
    Ok(log)
}

/// Validate a JSON document in the stored completed-log shape.
///
/// On top of the field checks, the department/task pair must be offered by
/// `catalog`. Accepted records carry the catalog's spelling of both names.
pub fn validate_document(doc: &Value, catalog: &Catalog) -> Result<CompletedLog, Rejection> {
    fn field<'a>(doc: &'a Value, name: &'static str) -> Result<Option<&'a str>, Rejection> {
        match doc.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(_) => Err(Rejection::new(name, RejectReason::NotAString)),
        }
    }

    let mut log = validate_fields(RawLogFields {
        employee_id: field(doc, "employeeId")?,
        task: field(doc, "task")?,
        department: field(doc, "department")?,
        start_time: field(doc, "startTime")?,
        end_time: field(doc, "endTime")?,
    })?;

    let (department, task) = match catalog.resolve(&log.department, &log.task) {
        Ok(names) => names,
        Err(Error::UnknownDepartment(_)) => {
            return Err(Rejection::new("department", RejectReason::NotInCatalog))
        }
        Err(_) => return Err(Rejection::new("task", RejectReason::NotInCatalog)),
    };
    log.department = department.to_string();
    log.task = task.to_string();
    Ok(log)
}

/// Check an already-typed record before it is persisted.
pub fn validate_completed(log: &CompletedLog) -> Result<(), Rejection> {
    required("employeeId", Some(log.employee_id.as_str()))?;
    required("task", Some(log.task.as_str()))?;
    required("department", Some(log.department.as_str()))?;
    if !EmployeeId::is_well_formed(&log.employee_id) {
        return Err(Rejection::new("employeeId", RejectReason::BadEmployeeId));
    }
    if log.end_time < log.start_time {
        return Err(Rejection::new("endTime", RejectReason::EndBeforeStart));
    }
    Ok(())
}
