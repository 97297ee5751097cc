//! Single-key user preferences.

use rusqlite::{Connection, OptionalExtension as _};

use crate::{Result, encode::now_stamp};

/// Preferred primary manager policy, as detected or chosen.
pub const MANAGER_POLICY: &str = "primary_manager_policy";

pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
  Ok(
    conn
      .query_row(
        "SELECT value FROM preferences WHERE key = ?1",
        rusqlite::params![key],
        |r| r.get(0),
      )
      .optional()?,
  )
}

pub fn set(conn: &Connection, key: &str, value: &str) -> Result<()> {
  conn.execute(
    "INSERT INTO preferences (key, value, updated_at) VALUES (?1, ?2, ?3)
     ON CONFLICT (key) DO UPDATE SET
       value      = excluded.value,
       updated_at = excluded.updated_at",
    rusqlite::params![key, value, now_stamp()],
  )?;
  Ok(())
}
