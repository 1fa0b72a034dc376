//! SQLite backend for the Lineage evidence and episode store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. SQLite has no range types, so window
//! exclusion is checked in the application layer inside `BEGIN IMMEDIATE`
//! transactions, which serialise writers.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
