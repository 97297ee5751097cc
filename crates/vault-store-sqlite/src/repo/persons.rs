use rusqlite::{Connection, OptionalExtension as _, Transaction};
use vault_core::{manager::ManagerPolicy, model::Person};

use crate::{
  Result,
  encode::{encode_date, now_stamp},
};

/// A person's stored primary manager and its provenance.
#[cfg(test)]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredManager {
  pub manager_person_id: Option<String>,
  pub provenance:        Option<ManagerPolicy>,
  pub updated_at:        Option<String>,
}

/// The `person_id` currently stored under `external_id`.
pub fn id_for_external(conn: &Connection, external_id: &str) -> Result<Option<String>> {
  Ok(
    conn
      .query_row(
        "SELECT person_id FROM persons WHERE external_id = ?1",
        rusqlite::params![external_id],
        |r| r.get(0),
      )
      .optional()?,
  )
}

pub fn exists(conn: &Connection, person_id: &str) -> Result<bool> {
  let found = conn
    .query_row(
      "SELECT 1 FROM persons WHERE person_id = ?1",
      rusqlite::params![person_id],
      |_| Ok(true),
    )
    .optional()?;
  Ok(found.unwrap_or(false))
}

/// Insert or update a person by `person_id`. A manager supplied by the export
/// is stored with `import` provenance; without one the stored manager is left
/// for the primary manager phase.
pub fn upsert(tx: &Transaction<'_>, person: &Person) -> Result<()> {
  let birth_date = person.birth_date.map(encode_date);
  let provenance = person
    .imported_manager_person_id
    .as_ref()
    .map(|_| ManagerPolicy::Import.to_string());
  let updated_at = person.imported_manager_person_id.as_ref().map(|_| now_stamp());

  tx.execute(
    "INSERT INTO persons (
       person_id, external_id, display_name, given_name, family_name, initials,
       user_name, gender, birth_date, is_excluded, is_blocked, source,
       primary_manager_person_id, primary_manager_source, primary_manager_updated_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
     ON CONFLICT (person_id) DO UPDATE SET
       external_id  = excluded.external_id,
       display_name = excluded.display_name,
       given_name   = excluded.given_name,
       family_name  = excluded.family_name,
       initials     = excluded.initials,
       user_name    = excluded.user_name,
       gender       = excluded.gender,
       birth_date   = excluded.birth_date,
       is_excluded  = excluded.is_excluded,
       is_blocked   = excluded.is_blocked,
       source       = excluded.source,
       primary_manager_person_id  =
         COALESCE(excluded.primary_manager_person_id, primary_manager_person_id),
       primary_manager_source     =
         COALESCE(excluded.primary_manager_source, primary_manager_source),
       primary_manager_updated_at =
         COALESCE(excluded.primary_manager_updated_at, primary_manager_updated_at)",
    rusqlite::params![
      person.person_id,
      person.external_id,
      person.display_name,
      person.given_name,
      person.family_name,
      person.initials,
      person.user_name,
      person.gender,
      birth_date,
      person.excluded,
      person.blocked,
      person.source,
      person.imported_manager_person_id,
      provenance,
      updated_at,
    ],
  )?;
  Ok(())
}

/// Every `person_id`, in insertion order.
pub fn all_ids(conn: &Connection) -> Result<Vec<String>> {
  let mut stmt = conn.prepare("SELECT person_id FROM persons ORDER BY rowid")?;
  let ids = stmt
    .query_map([], |r| r.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(ids)
}

/// Up to `limit` random `(person_id, manager)` pairs among persons that have
/// a stored manager.
pub fn sample_with_manager(conn: &Connection, limit: usize) -> Result<Vec<(String, String)>> {
  let mut stmt = conn.prepare(
    "SELECT person_id, primary_manager_person_id
     FROM persons
     WHERE primary_manager_person_id IS NOT NULL
     ORDER BY RANDOM()
     LIMIT ?1",
  )?;
  let rows = stmt
    .query_map(rusqlite::params![limit as i64], |r| Ok((r.get(0)?, r.get(1)?)))?
    .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
  Ok(rows)
}

#[cfg(test)]
pub fn stored_manager(conn: &Connection, person_id: &str) -> Result<Option<StoredManager>> {
  let row = conn
    .query_row(
      "SELECT primary_manager_person_id, primary_manager_source, primary_manager_updated_at
       FROM persons WHERE person_id = ?1",
      rusqlite::params![person_id],
      |r| {
        Ok((
          r.get::<_, Option<String>>(0)?,
          r.get::<_, Option<String>>(1)?,
          r.get::<_, Option<String>>(2)?,
        ))
      },
    )
    .optional()?;

  Ok(row.map(|(manager_person_id, source, updated_at)| StoredManager {
    manager_person_id,
    provenance: crate::encode::decode_policy(source.as_deref()),
    updated_at,
  }))
}

/// Persist a computed manager. Provenance is recorded only when a manager
/// was found; the timestamp always moves.
pub fn set_primary_manager(
  tx: &Transaction<'_>,
  person_id: &str,
  manager_person_id: Option<&str>,
  policy: ManagerPolicy,
) -> Result<()> {
  let provenance = manager_person_id.map(|_| policy.to_string());
  tx.execute(
    "UPDATE persons
     SET primary_manager_person_id  = ?2,
         primary_manager_source     = ?3,
         primary_manager_updated_at = ?4
     WHERE person_id = ?1",
    rusqlite::params![person_id, manager_person_id, provenance, now_stamp()],
  )?;
  Ok(())
}
