//! The vault export document: the raw input to an import.
//!
//! Pipeline:
//!   raw &str
//!     └─ strip_trailing_commas()   → String
//!          └─ serde_json::Value      (lenient: any key casing)
//!               └─ normalize_keys()  → lower-cased keys, `Custom` maps kept
//!                    └─ VaultDocument
//!
//! Unknown fields are ignored. Property names are matched case-insensitively,
//! except inside `Custom` objects whose keys are user data.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, de::Error as _};
use serde_json::Value;

use crate::Result;

// ─── Root ────────────────────────────────────────────────────────────────────

/// The root of a vault export.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct VaultDocument {
  pub persons:     Vec<PersonEntry>,
  pub departments: Vec<DepartmentEntry>,
}

/// The upstream system a record originates from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceEntry {
  #[serde(rename = "systemid")]
  pub system_id:          Option<String>,
  #[serde(rename = "displayname")]
  pub display_name:       Option<String>,
  #[serde(rename = "identificationkey")]
  pub identification_key: Option<String>,
}

impl SourceEntry {
  /// The system id, if present and non-blank.
  pub fn id(&self) -> Option<&str> { non_blank(self.system_id.as_deref()) }
}

/// A pointer to a person by their vault `PersonId`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ManagerEntry {
  #[serde(rename = "personid")]
  pub person_id: Option<String>,
}

// ─── Persons ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PersonEntry {
  #[serde(rename = "personid")]
  pub person_id:       Option<String>,
  #[serde(rename = "externalid")]
  pub external_id:     Option<String>,
  #[serde(rename = "displayname")]
  pub display_name:    Option<String>,
  #[serde(rename = "givenname")]
  pub given_name:      Option<String>,
  #[serde(rename = "familyname")]
  pub family_name:     Option<String>,
  pub initials:        Option<String>,
  #[serde(rename = "username")]
  pub user_name:       Option<String>,
  pub gender:          Option<String>,
  #[serde(rename = "birthdate", deserialize_with = "lenient_date")]
  pub birth_date:      Option<NaiveDate>,
  pub excluded:        bool,
  pub blocked:         bool,
  pub source:          Option<SourceEntry>,
  /// A manager computed upstream; only trusted under the import policy.
  #[serde(rename = "primarymanager")]
  pub primary_manager: Option<ManagerEntry>,
  pub contracts:       Vec<ContractEntry>,
  pub contact:         Option<ContactSet>,
  pub custom:          BTreeMap<String, Value>,
}

/// Personal and business contact records of a person.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContactSet {
  pub personal: Option<ContactEntry>,
  pub business: Option<ContactEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContactEntry {
  pub email:   Option<String>,
  pub phone:   Option<PhoneEntry>,
  pub address: Option<AddressEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PhoneEntry {
  pub mobile: Option<String>,
  pub fixed:  Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AddressEntry {
  pub street:       Option<String>,
  #[serde(rename = "housenumber")]
  pub house_number: Option<String>,
  #[serde(rename = "postalcode")]
  pub postal_code:  Option<String>,
  pub locality:     Option<String>,
  pub country:      Option<String>,
}

// ─── Contracts ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContractEntry {
  #[serde(rename = "externalid")]
  pub external_id:   Option<String>,
  #[serde(rename = "startdate", deserialize_with = "lenient_date")]
  pub start_date:    Option<NaiveDate>,
  #[serde(rename = "enddate", deserialize_with = "lenient_date")]
  pub end_date:      Option<NaiveDate>,
  #[serde(rename = "type")]
  pub kind:          Option<ContractType>,
  pub details:       Option<ContractDetails>,
  pub location:      Option<ReferenceEntry>,
  pub department:    Option<ReferenceEntry>,
  #[serde(rename = "costcenter")]
  pub cost_center:   Option<ReferenceEntry>,
  #[serde(rename = "costbearer")]
  pub cost_bearer:   Option<ReferenceEntry>,
  pub employer:      Option<ReferenceEntry>,
  pub team:          Option<ReferenceEntry>,
  pub division:      Option<ReferenceEntry>,
  pub title:         Option<ReferenceEntry>,
  pub organization:  Option<ReferenceEntry>,
  pub manager:       Option<ManagerEntry>,
  pub source:        Option<SourceEntry>,
  pub custom:        BTreeMap<String, Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContractType {
  pub code:        Option<String>,
  pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ContractDetails {
  #[serde(deserialize_with = "lenient_number")]
  pub fte:            Option<f64>,
  #[serde(rename = "hoursperweek", deserialize_with = "lenient_number")]
  pub hours_per_week: Option<f64>,
  #[serde(deserialize_with = "lenient_number")]
  pub percentage:     Option<f64>,
  #[serde(deserialize_with = "lenient_integer")]
  pub sequence:       Option<i64>,
}

/// A reference from a contract to an organisational entity. Either field may
/// be missing; see [`crate::identity`] for how the stored identity is chosen.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReferenceEntry {
  #[serde(rename = "externalid")]
  pub external_id: Option<String>,
  pub name:        Option<String>,
  pub code:        Option<String>,
}

// ─── Departments ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DepartmentEntry {
  #[serde(rename = "externalid")]
  pub external_id:        Option<String>,
  #[serde(rename = "displayname")]
  pub display_name:       Option<String>,
  pub code:               Option<String>,
  #[serde(rename = "parentexternalid")]
  pub parent_external_id: Option<String>,
  pub manager:            Option<ManagerEntry>,
  pub source:             Option<SourceEntry>,
}

// ─── Parsing ─────────────────────────────────────────────────────────────────

/// Parse a vault document, tolerating trailing commas and any key casing.
pub fn parse(input: &str) -> Result<VaultDocument> {
  let cleaned = strip_trailing_commas(input);
  let raw: Value = serde_json::from_str(&cleaned)?;
  Ok(serde_json::from_value(normalize_keys(raw))?)
}

/// Remove commas that directly precede `}` or `]` (ignoring whitespace),
/// leaving string literals untouched.
pub(crate) fn strip_trailing_commas(input: &str) -> String {
  let chars: Vec<char> = input.chars().collect();
  let mut out = String::with_capacity(input.len());
  let mut in_string = false;
  let mut escaped = false;

  for (i, &c) in chars.iter().enumerate() {
    if in_string {
      out.push(c);
      if escaped {
        escaped = false;
      } else if c == '\\' {
        escaped = true;
      } else if c == '"' {
        in_string = false;
      }
      continue;
    }

    match c {
      '"' => {
        in_string = true;
        out.push(c);
      }
      ',' => {
        let next = chars[i + 1..].iter().find(|n| !n.is_whitespace());
        if !matches!(next, Some('}') | Some(']')) {
          out.push(c);
        }
      }
      _ => out.push(c),
    }
  }
  out
}

/// Lower-case every object key, except the keys of `custom` objects.
pub(crate) fn normalize_keys(value: Value) -> Value {
  match value {
    Value::Object(map) => Value::Object(
      map
        .into_iter()
        .map(|(k, v)| {
          let key = k.to_lowercase();
          let v = if key == "custom" { v } else { normalize_keys(v) };
          (key, v)
        })
        .collect(),
    ),
    Value::Array(items) => {
      Value::Array(items.into_iter().map(normalize_keys).collect())
    }
    other => other,
  }
}

pub(crate) fn non_blank(s: Option<&str>) -> Option<&str> {
  s.filter(|s| !s.trim().is_empty())
}

/// Parse `YYYY-MM-DD`, RFC 3339, or a naive `YYYY-MM-DDTHH:MM:SS[.fff]`.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
  let s = s.trim();
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .ok()
    .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
    .or_else(|| {
      NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|dt| dt.date())
    })
}

fn lenient_date<'de, D>(d: D) -> std::result::Result<Option<NaiveDate>, D::Error>
where
  D: Deserializer<'de>,
{
  match Option::<String>::deserialize(d)? {
    None => Ok(None),
    Some(s) if s.trim().is_empty() => Ok(None),
    Some(s) => parse_date(&s)
      .map(Some)
      .ok_or_else(|| D::Error::custom(format!("invalid date: {s:?}"))),
  }
}

fn lenient_number<'de, D>(d: D) -> std::result::Result<Option<f64>, D::Error>
where
  D: Deserializer<'de>,
{
  match Value::deserialize(d)? {
    Value::Number(n) => Ok(n.as_f64()),
    Value::String(s) if s.trim().is_empty() => Ok(None),
    Value::String(s) => s
      .trim()
      .replace(',', ".")
      .parse()
      .map(Some)
      .map_err(|_| D::Error::custom(format!("invalid number: {s:?}"))),
    Value::Null => Ok(None),
    other => Err(D::Error::custom(format!("invalid number: {other}"))),
  }
}

fn lenient_integer<'de, D>(d: D) -> std::result::Result<Option<i64>, D::Error>
where
  D: Deserializer<'de>,
{
  Ok(lenient_number(d)?.map(|n| n as i64))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn trailing_commas_are_removed_outside_strings() {
    let input = r#"{"a": [1, 2,], "b": "x,}", }"#;
    let cleaned = strip_trailing_commas(input);
    assert_eq!(cleaned, r#"{"a": [1, 2], "b": "x,}" }"#);
  }

  #[test]
  fn keys_are_case_insensitive_but_custom_keys_are_kept() {
    let doc = parse(
      r#"{
        "PERSONS": [{
          "ExternalID": "E1",
          "displayName": "Alice",
          "Custom": { "ShoeSize": 42, },
          "Contracts": [{
            "externalId": "C1",
            "StartDate": "2024-01-01T00:00:00Z",
            "Details": { "FTE": "0,8", "HoursPerWeek": 32 },
          }],
        }],
      }"#,
    )
    .unwrap();

    let p = &doc.persons[0];
    assert_eq!(p.external_id.as_deref(), Some("E1"));
    assert_eq!(p.display_name.as_deref(), Some("Alice"));
    assert!(p.custom.contains_key("ShoeSize"));

    let c = &p.contracts[0];
    assert_eq!(c.start_date, NaiveDate::from_ymd_opt(2024, 1, 1));
    let details = c.details.as_ref().unwrap();
    assert_eq!(details.fte, Some(0.8));
    assert_eq!(details.hours_per_week, Some(32.0));
  }

  #[test]
  fn malformed_document_is_an_error() {
    let err = parse(r#"{"Persons": [ {"ExternalId": "E1" ]}"#).unwrap_err();
    assert!(matches!(err, crate::Error::MalformedDocument(_)));
  }

  #[test]
  fn invalid_date_is_an_error() {
    let err =
      parse(r#"{"Persons":[{"Contracts":[{"StartDate":"soon"}]}]}"#).unwrap_err();
    assert!(matches!(err, crate::Error::MalformedDocument(_)));
  }

  #[test]
  fn naive_timestamps_parse_to_dates() {
    assert_eq!(
      parse_date("2023-05-06T12:30:00"),
      NaiveDate::from_ymd_opt(2023, 5, 6)
    );
    assert_eq!(parse_date("06-05-2023"), None);
  }
}
