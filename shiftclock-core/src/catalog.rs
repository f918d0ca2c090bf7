//! The fixed department/task taxonomy offered at the kiosk.
//!
//! Departments keep their display order, and tasks keep their order within a
//! department. A task name may appear in more than one department (`MHE` is
//! offered under both Decant and Dispatch); the pair is what gets recorded.

use crate::config::DepartmentConfig;
use crate::error::{Error, Result};
use serde::Serialize;

/// Built-in taxonomy, in display order.
const DEFAULT_DEPARTMENTS: &[(&str, &[&str])] = &[
    (
        "Others",
        &["Shift End", "Washroom", "Break", "Move To Another Department"],
    ),
    ("Tote Wash", &["Tote Wash", "Tote Wash Cleanup", "Move Pallets"]),
    (
        "Pick",
        &[
            "Ambient Picking",
            "Ambient Pick Cleanup",
            "Chill Picking",
            "Chill Pick Cleanup",
        ],
    ),
    ("Bagging", &["Bagging", "Bagging Runner", "Bagging Cleanup"]),
    (
        "Decant",
        &[
            "MHE",
            "Ambient Decant",
            "Ambient Decant Cleanup",
            "Pallet Cleanup",
            "Baler Task",
            "Chill Decant",
            "Chill Decant Cleanup",
        ],
    ),
    (
        "Freezer",
        &[
            "Freezer Decant",
            "Freezer Putaway",
            "Freezer Pick",
            "Freezer Cleanup",
            "Unload And Icing Trolly",
        ],
    ),
    (
        "Dispatch",
        &[
            "Frameload",
            "MHE",
            "Dekit",
            "Van Loading",
            "Dispatch Cleanup",
            "Van Dekit",
            "Trailer Dekit",
            "Trailer Loading",
        ],
    ),
];

/// One department and its tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Department {
    pub name: String,
    pub tasks: Vec<String>,
}

/// Ordered department → task mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Catalog {
    departments: Vec<Department>,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    /// The taxonomy the kiosk ships with.
    pub fn builtin() -> Self {
        Self {
            departments: DEFAULT_DEPARTMENTS
                .iter()
                .map(|(name, tasks)| Department {
                    name: name.to_string(),
                    tasks: tasks.iter().map(|t| t.to_string()).collect(),
                })
                .collect(),
        }
    }

    /// Build a catalog from config overrides, falling back to the built-in one
    /// when none are given.
    pub fn from_config(departments: &[DepartmentConfig]) -> Result<Self> {
        if departments.is_empty() {
            return Ok(Self::builtin());
        }

        let catalog = Self {
            departments: departments
                .iter()
                .map(|d| Department {
                    name: d.name.clone(),
                    tasks: d.tasks.clone(),
                })
                .collect(),
        };
        catalog.check()?;
        Ok(catalog)
    }

    fn check(&self) -> Result<()> {
        for (i, dep) in self.departments.iter().enumerate() {
            if dep.name.trim().is_empty() {
                return Err(Error::Config("catalog department name is empty".to_string()));
            }
            if dep.tasks.is_empty() {
                return Err(Error::Config(format!(
                    "catalog department {:?} has no tasks",
                    dep.name
                )));
            }
            if self.departments[..i].iter().any(|d| d.name == dep.name) {
                return Err(Error::Config(format!(
                    "catalog department {:?} is listed twice",
                    dep.name
                )));
            }
        }
        if !self
            .departments
            .iter()
            .flat_map(|d| d.tasks.iter())
            .any(|t| is_shift_end(t))
        {
            return Err(Error::Config(
                "catalog must offer a shift end task".to_string(),
            ));
        }
        Ok(())
    }

    pub fn departments(&self) -> &[Department] {
        &self.departments
    }

    pub fn department(&self, name: &str) -> Option<&Department> {
        self.departments.iter().find(|d| d.name == name)
    }

    /// Look up `task` under `department`, ignoring case and surrounding
    /// whitespace, and return the catalog's spelling of both.
    pub fn resolve(&self, department: &str, task: &str) -> Result<(&str, &str)> {
        let dep = self
            .departments
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(department.trim()))
            .ok_or_else(|| Error::UnknownDepartment(department.to_string()))?;
        dep.tasks
            .iter()
            .find(|t| t.eq_ignore_ascii_case(task.trim()))
            .map(|t| (dep.name.as_str(), t.as_str()))
            .ok_or_else(|| Error::UnknownTask {
                department: dep.name.clone(),
                task: task.to_string(),
            })
    }
}

/// Whether selecting `task` ends the worker's shift.
pub fn is_shift_end(task: &str) -> bool {
    task.to_lowercase().contains("shift end")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_order() {
        let catalog = Catalog::builtin();
        let names: Vec<_> = catalog.departments().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(
            names,
            ["Others", "Tote Wash", "Pick", "Bagging", "Decant", "Freezer", "Dispatch"]
        );
        assert_eq!(catalog.department("Others").unwrap().tasks[0], "Shift End");
    }

    #[test]
    fn test_resolve() {
        let catalog = Catalog::builtin();
        assert_eq!(catalog.resolve("Decant", "MHE").unwrap(), ("Decant", "MHE"));
        assert_eq!(catalog.resolve("Dispatch", "MHE").unwrap(), ("Dispatch", "MHE"));
        assert_eq!(
            catalog.resolve(" tote wash ", "MOVE PALLETS").unwrap(),
            ("Tote Wash", "Move Pallets")
        );
        assert!(matches!(
            catalog.resolve("Pick", "MHE"),
            Err(Error::UnknownTask { .. })
        ));
        assert!(matches!(
            catalog.resolve("Laundry", "Wash"),
            Err(Error::UnknownDepartment(_))
        ));
    }

    #[test]
    fn test_shift_end_detection() {
        assert!(is_shift_end("Shift End"));
        assert!(is_shift_end("SHIFT END"));
        assert!(!is_shift_end("Break"));
    }

    #[test]
    fn test_from_config_requires_shift_end() {
        let overrides = vec![DepartmentConfig {
            name: "Pick".to_string(),
            tasks: vec!["Ambient Picking".to_string()],
        }];
        assert!(Catalog::from_config(&overrides).is_err());

        let overrides = vec![
            DepartmentConfig {
                name: "Others".to_string(),
                tasks: vec!["Shift End".to_string()],
            },
            DepartmentConfig {
                name: "Pick".to_string(),
                tasks: vec!["Ambient Picking".to_string()],
            },
        ];
        let catalog = Catalog::from_config(&overrides).unwrap();
        assert_eq!(catalog.departments().len(), 2);
        assert_eq!(Catalog::from_config(&[]).unwrap(), Catalog::builtin());
    }
}
