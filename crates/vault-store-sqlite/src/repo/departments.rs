use rusqlite::{Connection, OptionalExtension as _, Row, Transaction};
use vault_core::model::Department;

use crate::Result;

/// Insert or update a declared department by `(external_id, source)`.
pub fn upsert(tx: &Transaction<'_>, dept: &Department) -> Result<()> {
  tx.execute(
    "INSERT INTO departments (
       external_id, source, display_name, code, parent_external_id, manager_person_id
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
     ON CONFLICT (external_id, source) DO UPDATE SET
       display_name       = excluded.display_name,
       code               = excluded.code,
       parent_external_id = excluded.parent_external_id,
       manager_person_id  = excluded.manager_person_id",
    rusqlite::params![
      dept.external_id,
      dept.source,
      dept.display_name,
      dept.code,
      dept.parent_external_id,
      dept.manager_person_id,
    ],
  )?;
  Ok(())
}

/// Insert a department only known from a contract reference. Returns whether
/// a row was inserted.
pub fn insert_if_missing(tx: &Transaction<'_>, dept: &Department) -> Result<bool> {
  let changed = tx.execute(
    "INSERT OR IGNORE INTO departments (external_id, source, display_name)
     VALUES (?1, ?2, ?3)",
    rusqlite::params![dept.external_id, dept.source, dept.display_name],
  )?;
  Ok(changed > 0)
}

/// Whether any source holds a department with `external_id`.
pub fn exists_any_source(conn: &Connection, external_id: &str) -> Result<bool> {
  let found = conn
    .query_row(
      "SELECT 1 FROM departments WHERE external_id = ?1 LIMIT 1",
      rusqlite::params![external_id],
      |_| Ok(true),
    )
    .optional()?;
  Ok(found.unwrap_or(false))
}

fn row_to_department(r: &Row<'_>) -> rusqlite::Result<Department> {
  Ok(Department {
    external_id:        r.get(0)?,
    source:             r.get(1)?,
    display_name:       r.get(2)?,
    code:               r.get(3)?,
    parent_external_id: r.get(4)?,
    manager_person_id:  r.get(5)?,
  })
}

#[cfg(test)]
pub fn get(conn: &Connection, external_id: &str, source: &str) -> Result<Option<Department>> {
  Ok(
    conn
      .query_row(
        "SELECT external_id, source, display_name, code, parent_external_id, manager_person_id
         FROM departments WHERE external_id = ?1 AND source = ?2",
        rusqlite::params![external_id, source],
        row_to_department,
      )
      .optional()?,
  )
}

pub fn all(conn: &Connection) -> Result<Vec<Department>> {
  let mut stmt = conn.prepare(
    "SELECT external_id, source, display_name, code, parent_external_id, manager_person_id
     FROM departments ORDER BY rowid",
  )?;
  let depts = stmt
    .query_map([], row_to_department)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(depts)
}
