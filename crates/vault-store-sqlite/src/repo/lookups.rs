use rusqlite::Transaction;
use vault_core::model::LookupEntity;

use crate::Result;

/// First-seen wins: an existing `(external_id, source)` row is left alone.
/// Returns whether a row was inserted.
pub fn insert_if_missing(tx: &Transaction<'_>, entity: &LookupEntity) -> Result<bool> {
  let sql = format!(
    "INSERT OR IGNORE INTO {} (external_id, source, code, name) VALUES (?1, ?2, ?3, ?4)",
    entity.kind.table()
  );
  let changed = tx.execute(
    &sql,
    rusqlite::params![entity.external_id, entity.source, entity.code, entity.name],
  )?;
  Ok(changed > 0)
}
