//! Database module: models and schema for persistent storage.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `actor.rs`: the single-writer actor that owns the `SqlitePool`

pub mod actor;
pub mod models;
pub mod schema;

pub use actor::{ConsumeOutcome, DbActorHandle, spawn};
pub use models::{DbPrincipalRow, DbRefreshTokenRow};
pub use schema::SQLITE_INIT;
