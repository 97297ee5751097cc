//! Narrow single-purpose repositories.
//!
//! Writers take a [`rusqlite::Transaction`] because the import owns every
//! transaction boundary; readers take a plain [`rusqlite::Connection`]. All
//! functions are synchronous and run inside `tokio_rusqlite::Connection::call`.

pub mod config;
pub mod contacts;
pub mod contracts;
pub mod custom_fields;
pub mod departments;
pub mod lookups;
pub mod persons;
pub mod preferences;
pub mod sources;

use rusqlite::{Connection, OptionalExtension as _};

use crate::Result;

/// Whether `table` exists in the main schema.
pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
  let found = conn
    .query_row(
      "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
      rusqlite::params![table],
      |_| Ok(true),
    )
    .optional()?;
  Ok(found.unwrap_or(false))
}

/// Row count of `table`. Only ever called with names from
/// [`crate::KNOWN_TABLES`].
#[cfg(test)]
pub fn count(conn: &Connection, table: &str) -> Result<usize> {
  let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?;
  Ok(n as usize)
}
