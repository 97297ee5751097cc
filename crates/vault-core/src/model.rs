//! Domain rows produced by the collector and persisted by storage backends.
//!
//! Every organisational entity is identified by the pair
//! `(external_id, source)`: the same external id may exist independently in
//! several upstream systems.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};

/// The all-zero GUID some exports use in place of a missing manager.
pub const EMPTY_GUID: &str = "00000000-0000-0000-0000-000000000000";

/// Source id used when neither a record nor its owner names a source system.
pub const UNKNOWN_SOURCE: &str = "unknown";

// ─── Reference kinds ─────────────────────────────────────────────────────────

/// The organisational entities a contract may point at.
///
/// The snake_case name doubles as the column prefix on the `contracts` table
/// (`cost_center_external_id`, `cost_center_source`, …).
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Display,
  EnumIter,
  EnumString,
  IntoStaticStr,
  Serialize,
  Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
  Location,
  Department,
  CostCenter,
  CostBearer,
  Employer,
  Team,
  Division,
  Title,
  Organization,
}

impl ReferenceKind {
  /// The plain lookup tables, i.e. every kind except [`Self::Department`].
  pub const LOOKUPS: [ReferenceKind; 8] = [
    Self::Location,
    Self::CostCenter,
    Self::CostBearer,
    Self::Employer,
    Self::Team,
    Self::Division,
    Self::Title,
    Self::Organization,
  ];

  pub fn column_prefix(self) -> &'static str { self.into() }

  pub fn table(self) -> &'static str {
    match self {
      Self::Location => "locations",
      Self::Department => "departments",
      Self::CostCenter => "cost_centers",
      Self::CostBearer => "cost_bearers",
      Self::Employer => "employers",
      Self::Team => "teams",
      Self::Division => "divisions",
      Self::Title => "titles",
      Self::Organization => "organizations",
    }
  }
}

/// An `(external_id, source)` identity pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityKey {
  pub external_id: String,
  pub source:      String,
}

impl EntityKey {
  pub fn new(external_id: impl Into<String>, source: impl Into<String>) -> Self {
    Self { external_id: external_id.into(), source: source.into() }
  }
}

// ─── Rows ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSystem {
  pub system_id:          String,
  pub display_name:       Option<String>,
  pub identification_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Person {
  pub person_id:                 String,
  pub external_id:               String,
  pub display_name:              Option<String>,
  pub given_name:                Option<String>,
  pub family_name:               Option<String>,
  pub initials:                  Option<String>,
  pub user_name:                 Option<String>,
  pub gender:                    Option<String>,
  pub birth_date:                Option<NaiveDate>,
  pub excluded:                  bool,
  pub blocked:                   bool,
  pub source:                    String,
  /// Manager supplied by the export itself, stored with `import` provenance.
  pub imported_manager_person_id: Option<String>,
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
  Personal,
  Business,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
  pub person_id:    String,
  pub kind:         ContactKind,
  pub email:        Option<String>,
  pub phone_mobile: Option<String>,
  pub phone_fixed:  Option<String>,
  pub street:       Option<String>,
  pub house_number: Option<String>,
  pub postal_code:  Option<String>,
  pub locality:     Option<String>,
  pub country:      Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Department {
  pub external_id:        String,
  pub source:             String,
  pub display_name:       Option<String>,
  pub code:               Option<String>,
  pub parent_external_id: Option<String>,
  pub manager_person_id:  Option<String>,
}

impl Department {
  pub fn key(&self) -> EntityKey { EntityKey::new(&self.external_id, &self.source) }

  /// The parent identity; parents always live in the same source.
  pub fn parent_key(&self) -> Option<EntityKey> {
    self
      .parent_external_id
      .as_ref()
      .map(|p| EntityKey::new(p, &self.source))
  }
}

/// A row in one of the plain lookup tables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LookupEntity {
  pub kind:        ReferenceKind,
  pub external_id: String,
  pub source:      String,
  pub code:        Option<String>,
  pub name:        Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
  pub external_id:       String,
  pub person_id:         String,
  pub source:            String,
  pub start_date:        Option<NaiveDate>,
  pub end_date:          Option<NaiveDate>,
  pub type_code:         Option<String>,
  pub type_description:  Option<String>,
  pub fte:               Option<f64>,
  pub hours_per_week:    Option<f64>,
  pub percentage:        Option<f64>,
  pub sequence:          Option<i64>,
  /// The vault `PersonId` of the contract manager.
  pub manager_person_id: Option<String>,
  pub references:        BTreeMap<ReferenceKind, EntityKey>,
}

impl Contract {
  pub fn reference(&self, kind: ReferenceKind) -> Option<&EntityKey> {
    self.references.get(&kind)
  }
}

// ─── Custom fields ───────────────────────────────────────────────────────────

/// The owning table of a custom field. Persons and contracts have disjoint
/// field namespaces.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Display,
  EnumString,
  Serialize,
  Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum CustomFieldTable {
  Persons,
  Contracts,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CustomFieldSchema {
  pub table:        CustomFieldTable,
  pub field_key:    String,
  pub display_name: String,
}

/// All custom values of one owning row, stored as a single JSON object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldValues {
  pub table:     CustomFieldTable,
  /// `person_id` for persons, contract `external_id` for contracts.
  pub entity_id: String,
  pub fields:    BTreeMap<String, String>,
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// Code and display name of a resolved reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceLabel {
  pub code: Option<String>,
  pub name: Option<String>,
}

/// A persisted contract joined with everything the primary-contract cascade
/// can sort on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractView {
  pub contract:                      Contract,
  pub labels:                        BTreeMap<ReferenceKind, ReferenceLabel>,
  pub department_parent_external_id: Option<String>,
  pub department_manager_person_id:  Option<String>,
  pub custom:                        BTreeMap<String, String>,
}

impl ContractView {
  pub fn new(contract: Contract) -> Self {
    Self {
      contract,
      labels: BTreeMap::new(),
      department_parent_external_id: None,
      department_manager_person_id: None,
      custom: BTreeMap::new(),
    }
  }
}
