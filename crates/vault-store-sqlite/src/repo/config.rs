//! The primary contract configuration table.

use rusqlite::{Connection, Transaction};
use vault_core::primary::PrimaryContractConfig;

use crate::{Result, encode::RawConfig};

/// All rows, active or not, by priority.
pub fn load(conn: &Connection) -> Result<Vec<PrimaryContractConfig>> {
  let mut stmt = conn.prepare(
    "SELECT field_name, sort_order, priority_order, is_active
     FROM primary_contract_config
     ORDER BY priority_order, field_name",
  )?;
  let rows = stmt
    .query_map([], |r| {
      Ok(RawConfig {
        field_name:     r.get(0)?,
        sort_order:     r.get(1)?,
        priority_order: r.get(2)?,
        is_active:      r.get(3)?,
      })
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  Ok(rows.into_iter().map(RawConfig::decode).collect())
}

/// Replace every row. Callers validate first.
pub fn replace(tx: &Transaction<'_>, config: &[PrimaryContractConfig]) -> Result<()> {
  tx.execute("DELETE FROM primary_contract_config", [])?;
  let mut stmt = tx.prepare(
    "INSERT INTO primary_contract_config (field_name, sort_order, priority_order, is_active)
     VALUES (?1, ?2, ?3, ?4)",
  )?;
  for row in config {
    stmt.execute(rusqlite::params![
      row.field_name,
      row.sort_order.to_string(),
      row.priority_order,
      row.is_active,
    ])?;
  }
  Ok(())
}
