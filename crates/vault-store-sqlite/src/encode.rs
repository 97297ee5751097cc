//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Calendar dates are stored as `YYYY-MM-DD`, timestamps as RFC 3339 strings
//! and custom field values as a compact JSON object of strings.

use std::collections::BTreeMap;

use chrono::{NaiveDate, Utc};
use vault_core::{
  manager::ManagerPolicy,
  model::{Contract, ContractView, EntityKey, ReferenceKind, ReferenceLabel},
  primary::{PrimaryContractConfig, SortOrder},
};

use crate::{Error, Result};

const DATE_FORMAT: &str = "%Y-%m-%d";

// ─── Dates ───────────────────────────────────────────────────────────────────

pub fn encode_date(d: NaiveDate) -> String { d.format(DATE_FORMAT).to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, DATE_FORMAT)
    .map_err(|e| Error::DateParse(format!("{s:?}: {e}")))
}

pub fn decode_opt_date(s: Option<String>) -> Result<Option<NaiveDate>> {
  s.as_deref().map(decode_date).transpose()
}

/// The current instant, as stored in `*_updated_at` columns.
pub fn now_stamp() -> String { Utc::now().to_rfc3339() }

/// `on`, or today in UTC.
pub fn reference_date(on: Option<NaiveDate>) -> NaiveDate {
  on.unwrap_or_else(|| Utc::now().date_naive())
}

// ─── Custom fields ───────────────────────────────────────────────────────────

pub fn encode_fields(fields: &BTreeMap<String, String>) -> Result<String> {
  Ok(serde_json::to_string(fields)?)
}

pub fn decode_fields(s: &str) -> Result<BTreeMap<String, String>> {
  Ok(serde_json::from_str(s)?)
}

// ─── Manager provenance ──────────────────────────────────────────────────────

/// Stored provenance strings that do not name a policy decode to `None`.
pub fn decode_policy(s: Option<&str>) -> Option<ManagerPolicy> {
  s.and_then(|s| s.parse().ok())
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// One row of `primary_contract_config`.
pub struct RawConfig {
  pub field_name:     String,
  pub sort_order:     String,
  pub priority_order: i32,
  pub is_active:      bool,
}

impl RawConfig {
  pub fn decode(self) -> PrimaryContractConfig {
    PrimaryContractConfig {
      field_name:     self.field_name,
      sort_order:     SortOrder::from_stored(&self.sort_order),
      priority_order: self.priority_order,
      is_active:      self.is_active,
    }
  }
}

/// The identity and labels of one contract reference as joined from its
/// lookup table.
pub struct RawReference {
  pub kind:        ReferenceKind,
  pub external_id: Option<String>,
  pub source:      Option<String>,
  pub code:        Option<String>,
  pub name:        Option<String>,
}

/// Raw values read from a `contracts` row joined with its references, its
/// department and its custom field values.
pub struct RawContract {
  pub external_id:                   String,
  pub person_id:                     String,
  pub source:                        String,
  pub start_date:                    Option<String>,
  pub end_date:                      Option<String>,
  pub type_code:                     Option<String>,
  pub type_description:              Option<String>,
  pub fte:                           Option<f64>,
  pub hours_per_week:                Option<f64>,
  pub percentage:                    Option<f64>,
  pub sequence:                      Option<i64>,
  pub manager_person_id:             Option<String>,
  pub references:                    Vec<RawReference>,
  pub department_parent_external_id: Option<String>,
  pub department_manager_person_id:  Option<String>,
  pub custom_json:                   Option<String>,
}

impl RawContract {
  pub fn decode(self) -> Result<ContractView> {
    let mut references = BTreeMap::new();
    let mut labels = BTreeMap::new();

    for r in self.references {
      let Some(external_id) = r.external_id else { continue };
      let source = r.source.unwrap_or_else(|| self.source.clone());
      references.insert(r.kind, EntityKey::new(external_id, source));
      if r.code.is_some() || r.name.is_some() {
        labels.insert(r.kind, ReferenceLabel { code: r.code, name: r.name });
      }
    }

    let custom = match self.custom_json.as_deref() {
      Some(json) => decode_fields(json)?,
      None => BTreeMap::new(),
    };

    Ok(ContractView {
      contract: Contract {
        external_id: self.external_id,
        person_id: self.person_id,
        source: self.source,
        start_date: decode_opt_date(self.start_date)?,
        end_date: decode_opt_date(self.end_date)?,
        type_code: self.type_code,
        type_description: self.type_description,
        fte: self.fte,
        hours_per_week: self.hours_per_week,
        percentage: self.percentage,
        sequence: self.sequence,
        manager_person_id: self.manager_person_id,
        references,
      },
      labels,
      department_parent_external_id: self.department_parent_external_id,
      department_manager_person_id: self.department_manager_person_id,
      custom,
    })
  }
}
