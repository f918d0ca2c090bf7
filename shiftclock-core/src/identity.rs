//! Worker identifiers scanned at the kiosk.

use crate::error::{Error, Result};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

/// `firstname.lastname`, optionally followed by digits.
const EMPLOYEE_ID_PATTERN: &str = r"^[a-z]+(\.[a-z]+)(\d+)?$";

fn employee_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(EMPLOYEE_ID_PATTERN).expect("employee id pattern is valid"))
}

/// A validated worker identifier.
///
/// Scanner input is trimmed and lowercased before the format check, so
/// `" Jane.Doe2 "` is accepted as `jane.doe2`. Anything else that fails the
/// pattern never gets past [`EmployeeId::parse`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmployeeId(String);

impl EmployeeId {
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = raw.trim().to_lowercase();
        if employee_id_regex().is_match(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(Error::InvalidEmployeeId(raw.to_string()))
        }
    }

    /// Whether `id` already is a stored-form identifier (no trimming or
    /// lowercasing applied).
    pub fn is_well_formed(id: &str) -> bool {
        employee_id_regex().is_match(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EmployeeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EmployeeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
