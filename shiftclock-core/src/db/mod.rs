//! Database layer for shiftclock
//!
//! SQLite storage for the active table, completed logs and history, with
//! schema migrations and change polling for the live view.

pub mod repo;
pub mod schema;

pub use repo::Database;
