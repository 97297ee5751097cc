//! Post-import consistency checks.
//!
//! Department rows are repaired in place by nulling the dangling column.
//! Contract references are only reported; the contract rows stay as inserted.

use rusqlite::Transaction;
use vault_core::{model::ReferenceKind, report::OrphanedReference};

use crate::Result;

/// Demote departments whose parent does not exist in their own source to
/// roots. Returns the number of rows repaired.
pub fn clear_dangling_parents(tx: &Transaction<'_>) -> Result<usize> {
  Ok(tx.execute(
    "UPDATE departments
     SET parent_external_id = NULL
     WHERE parent_external_id IS NOT NULL
       AND NOT EXISTS (
         SELECT 1 FROM departments p
         WHERE p.external_id = departments.parent_external_id
           AND p.source = departments.source
       )",
    [],
  )?)
}

/// Clear department managers that are not a known person.
pub fn clear_unknown_managers(tx: &Transaction<'_>) -> Result<usize> {
  Ok(tx.execute(
    "UPDATE departments
     SET manager_person_id = NULL
     WHERE manager_person_id IS NOT NULL
       AND NOT EXISTS (
         SELECT 1 FROM persons WHERE person_id = departments.manager_person_id
       )",
    [],
  )?)
}

/// Contract references without a lookup row under the same
/// `(external_id, source)` pair, by kind then contract insertion order.
pub fn orphaned_references(tx: &Transaction<'_>) -> Result<Vec<OrphanedReference>> {
  let mut orphans = Vec::new();

  for kind in std::iter::once(ReferenceKind::Department).chain(ReferenceKind::LOOKUPS) {
    let prefix = kind.column_prefix();
    let sql = format!(
      "SELECT c.external_id, c.{prefix}_external_id, c.{prefix}_source
       FROM contracts c
       WHERE c.{prefix}_external_id IS NOT NULL
         AND NOT EXISTS (
           SELECT 1 FROM {table} t
           WHERE t.external_id = c.{prefix}_external_id
             AND t.source = c.{prefix}_source
         )
       ORDER BY c.rowid",
      table = kind.table(),
    );
    let mut stmt = tx.prepare(&sql)?;
    let rows = stmt.query_map([], |r| {
      Ok(OrphanedReference {
        contract_external_id: r.get(0)?,
        kind,
        external_id: r.get(1)?,
        source: r.get::<_, Option<String>>(2)?.unwrap_or_default(),
      })
    })?;
    for row in rows {
      orphans.push(row?);
    }
  }

  Ok(orphans)
}
