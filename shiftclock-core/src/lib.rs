//! # shiftclock-core
//!
//! Core library for shiftclock - a clock-in kiosk that records what each
//! worker on a shift is doing and for how long.
//!
//! This library provides:
//! - Domain types for active tasks, completed logs and history
//! - The interval lifecycle (task selection, shift end)
//! - Validation, aggregation, filtering and CSV export
//! - Administrator access and operations
//! - Store backends (SQLite and in-memory)
//! - Configuration management and logging infrastructure
//!
//! ## Data flow
//!
//! - **Active table:** one open interval per worker, published as full
//!   snapshots to subscribers such as the [`LiveBoard`]
//! - **Completed logs:** append-only closed intervals
//! - **History:** daily aggregates produced by archival, merged at read time
//!
//! ## Example
//!
//! ```rust,no_run
//! use shiftclock_core::{Catalog, Config, Database, IntervalManager};
//! use std::sync::Arc;
//!
//! let config = Config::load().expect("failed to load config");
//! let db = Database::open(&Config::database_path()).expect("failed to open database");
//! db.migrate().expect("failed to run migrations");
//!
//! let catalog = Catalog::from_config(&config.catalog.departments).expect("invalid catalog");
//! let mut kiosk = IntervalManager::new(Arc::new(db), catalog).with_store_config(&config.store);
//! kiosk.select_task("jane.doe", "Pick", "Chill Picking").expect("selection failed");
//! ```

// Re-export commonly used items at the crate root
pub use access::{hash_secret, AccessPolicy};
pub use admin::{AdminSession, ImportReport};
pub use archive::ArchiveBatch;
pub use catalog::{is_shift_end, Catalog, Department};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::Config;
pub use db::Database;
pub use error::{Error, Result};
pub use export::CsvExport;
pub use filter::{FilterRow, RowFilter};
pub use identity::EmployeeId;
pub use lifecycle::{IntervalManager, Selection};
pub use live::{LiveBoard, LiveRow};
pub use retry::RetryPolicy;
pub use store::{ArchiveOutcome, ClearCounts, MemoryStore, TaskStore, Transition};
pub use types::*;
pub use validate::{RejectReason, Rejection};

// Public modules
pub mod access;
pub mod admin;
pub mod archive;
pub mod catalog;
pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod filter;
pub mod format;
pub mod history;
pub mod identity;
pub mod lifecycle;
pub mod live;
pub mod logging;
pub mod retry;
pub mod store;
pub mod types;
pub mod validate;
