//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite)
//! - `sqlite.rs`: `StudyStorage`, the query layer used by handlers

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::{DbGoal, DbHistoryEntry, DbUser, NewHistoryEntry};
pub use schema::SQLITE_INIT;
pub use sqlite::{SqlitePool, StudyStorage};
