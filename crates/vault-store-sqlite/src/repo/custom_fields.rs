use rusqlite::Transaction;
use vault_core::model::{CustomFieldSchema, CustomFieldValues};

use crate::{
  Result,
  encode::{encode_fields, now_stamp},
};

/// Register a field key for its owning table. An existing schema row keeps
/// its display name. Returns whether a row was inserted.
pub fn insert_schema(tx: &Transaction<'_>, schema: &CustomFieldSchema) -> Result<bool> {
  let changed = tx.execute(
    "INSERT OR IGNORE INTO custom_field_schemas (table_name, field_key, display_name)
     VALUES (?1, ?2, ?3)",
    rusqlite::params![schema.table.to_string(), schema.field_key, schema.display_name],
  )?;
  Ok(changed > 0)
}

/// Replace the JSON blob of one owning row.
pub fn upsert_values(tx: &Transaction<'_>, values: &CustomFieldValues) -> Result<()> {
  let json = encode_fields(&values.fields)?;
  tx.execute(
    "INSERT INTO custom_field_values (table_name, entity_id, fields_json, updated_at)
     VALUES (?1, ?2, ?3, ?4)
     ON CONFLICT (table_name, entity_id) DO UPDATE SET
       fields_json = excluded.fields_json,
       updated_at  = excluded.updated_at",
    rusqlite::params![values.table.to_string(), values.entity_id, json, now_stamp()],
  )?;
  Ok(())
}

#[cfg(test)]
pub fn values(
  conn: &rusqlite::Connection,
  table: vault_core::model::CustomFieldTable,
  entity_id: &str,
) -> Result<Option<std::collections::BTreeMap<String, String>>> {
  use rusqlite::OptionalExtension as _;

  let json: Option<String> = conn
    .query_row(
      "SELECT fields_json FROM custom_field_values WHERE table_name = ?1 AND entity_id = ?2",
      rusqlite::params![table.to_string(), entity_id],
      |r| r.get(0),
    )
    .optional()?;
  json.as_deref().map(crate::encode::decode_fields).transpose()
}
