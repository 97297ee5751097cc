use rusqlite::Transaction;
use vault_core::model::SourceSystem;

use crate::Result;

/// Insert or refresh a source system. Present labels overwrite stored ones;
/// missing labels keep what is stored.
pub fn upsert(tx: &Transaction<'_>, source: &SourceSystem) -> Result<()> {
  tx.execute(
    "INSERT INTO source_systems (system_id, display_name, identification_key)
     VALUES (?1, ?2, ?3)
     ON CONFLICT (system_id) DO UPDATE SET
       display_name       = COALESCE(excluded.display_name, display_name),
       identification_key = COALESCE(excluded.identification_key, identification_key)",
    rusqlite::params![
      source.system_id,
      source.display_name,
      source.identification_key,
    ],
  )?;
  Ok(())
}
