//! SQLite backend for the HR vault.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The phased import owns every
//! transaction; the repositories in [`repo`] only ever write inside one.

mod encode;
mod import;
mod managers;
mod schema;
mod store;
mod validate;

pub mod error;
pub mod repo;

pub use error::{Error, Result};
pub use schema::KNOWN_TABLES;
pub use store::SqliteStore;

#[cfg(test)]
mod tests;
