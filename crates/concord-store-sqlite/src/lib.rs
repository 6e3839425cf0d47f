//! SQLite backend for the Concord discussion store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. Every vote write and its counter
//! update share one transaction.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{Clock, SqliteStore};

#[cfg(test)]
mod tests;
