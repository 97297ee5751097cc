use rusqlite::Transaction;
use vault_core::model::Contact;

use crate::Result;

/// Insert or replace the contact of one kind for one person.
pub fn upsert(tx: &Transaction<'_>, contact: &Contact) -> Result<()> {
  tx.execute(
    "INSERT INTO contacts (
       person_id, contact_type, email, phone_mobile, phone_fixed,
       street, house_number, postal_code, locality, country
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
     ON CONFLICT (person_id, contact_type) DO UPDATE SET
       email        = excluded.email,
       phone_mobile = excluded.phone_mobile,
       phone_fixed  = excluded.phone_fixed,
       street       = excluded.street,
       house_number = excluded.house_number,
       postal_code  = excluded.postal_code,
       locality     = excluded.locality,
       country      = excluded.country",
    rusqlite::params![
      contact.person_id,
      contact.kind.to_string(),
      contact.email,
      contact.phone_mobile,
      contact.phone_fixed,
      contact.street,
      contact.house_number,
      contact.postal_code,
      contact.locality,
      contact.country,
    ],
  )?;
  Ok(())
}
