//! Primary contract resolution.
//!
//! Contracts are ordered by status first (active, future, past, undated), then
//! by every active configuration field in ascending `priority_order`. The
//! first contract after the cascade is the person's primary contract.

use std::cmp::Ordering;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
  Error, Result,
  model::{Contract, ContractView, ReferenceKind},
};

/// How many contracts a [`SelectionStep`] lists.
pub const DEFAULT_STEP_RANKING_LEN: usize = 5;

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "UPPERCASE", ascii_case_insensitive)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortOrder {
  Asc,
  Desc,
}

impl SortOrder {
  /// Lenient parse used for stored values: anything but `ASC` sorts
  /// descending.
  pub fn from_stored(s: &str) -> Self {
    if s.trim().eq_ignore_ascii_case("ASC") { Self::Asc } else { Self::Desc }
  }
}

/// One user-editable row of the primary contract cascade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryContractConfig {
  pub field_name:     String,
  pub sort_order:     SortOrder,
  pub priority_order: i32,
  pub is_active:      bool,
}

impl PrimaryContractConfig {
  pub fn new(field_name: impl Into<String>, sort_order: SortOrder, priority_order: i32) -> Self {
    Self { field_name: field_name.into(), sort_order, priority_order, is_active: true }
  }
}

/// A configuration can only be saved while at least one row is active.
pub fn validate_config(config: &[PrimaryContractConfig]) -> Result<()> {
  if config.iter().any(|c| c.is_active) {
    Ok(())
  } else {
    Err(Error::NoActiveConfigField)
  }
}

/// The active rows, in cascade order.
pub fn cascade(config: &[PrimaryContractConfig]) -> Vec<&PrimaryContractConfig> {
  let mut keys: Vec<_> = config.iter().filter(|c| c.is_active).collect();
  keys.sort_by_key(|c| c.priority_order);
  keys
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
  Active = 1,
  Future = 2,
  Past = 3,
  Unknown = 4,
}

impl ContractStatus {
  pub fn of(contract: &Contract, on: NaiveDate) -> Self {
    match (contract.start_date, contract.end_date) {
      (_, Some(end)) if end < on => Self::Past,
      (Some(start), _) if start > on => Self::Future,
      (Some(_), _) => Self::Active,
      (None, _) => Self::Unknown,
    }
  }
}

// ─── Field values ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
  Number(f64),
  Date(NaiveDate),
  Text(String),
}

impl FieldValue {
  fn rank(&self) -> u8 {
    match self {
      Self::Number(_) => 0,
      Self::Date(_) => 1,
      Self::Text(_) => 2,
    }
  }

  fn compare(&self, other: &Self) -> Ordering {
    match (self, other) {
      (Self::Number(a), Self::Number(b)) => a.total_cmp(b),
      (Self::Date(a), Self::Date(b)) => a.cmp(b),
      (Self::Text(a), Self::Text(b)) => a.cmp(b),
      _ => self.rank().cmp(&other.rank()),
    }
  }
}

fn text(s: &Option<String>) -> Option<FieldValue> {
  s.clone().map(FieldValue::Text)
}

/// The value `field` resolves to on `view`. Unknown field names fall back to
/// the contract's custom fields, compared numerically when they parse.
fn field_value(view: &ContractView, field: &str) -> Option<FieldValue> {
  let c = &view.contract;
  match field {
    "external_id" => Some(FieldValue::Text(c.external_id.clone())),
    "source" => Some(FieldValue::Text(c.source.clone())),
    "fte" => c.fte.map(FieldValue::Number),
    "hours_per_week" => c.hours_per_week.map(FieldValue::Number),
    "percentage" => c.percentage.map(FieldValue::Number),
    "sequence" => c.sequence.map(|s| FieldValue::Number(s as f64)),
    "start_date" => c.start_date.map(FieldValue::Date),
    "end_date" => c.end_date.map(FieldValue::Date),
    "type_code" => text(&c.type_code),
    "type_description" => text(&c.type_description),
    "manager_person_id" => text(&c.manager_person_id),
    "department_parent_external_id" => text(&view.department_parent_external_id),
    "department_manager_person_id" => text(&view.department_manager_person_id),
    other => reference_value(view, other).unwrap_or_else(|| custom_value(view, other)),
  }
}

/// `<kind>_external_id`, `<kind>_code` or `<kind>_name`; `None` when `field`
/// is not a reference field at all.
fn reference_value(view: &ContractView, field: &str) -> Option<Option<FieldValue>> {
  ReferenceKind::LOOKUPS
    .iter()
    .chain(std::iter::once(&ReferenceKind::Department))
    .find_map(|&kind| {
      let attr = field.strip_prefix(kind.column_prefix())?.strip_prefix('_')?;
      let label = view.labels.get(&kind);
      Some(match attr {
        "external_id" => view
          .contract
          .reference(kind)
          .map(|k| FieldValue::Text(k.external_id.clone())),
        "code" => label.and_then(|l| text(&l.code)),
        "name" => label.and_then(|l| text(&l.name)),
        _ => return None,
      })
    })
}

fn custom_value(view: &ContractView, field: &str) -> Option<FieldValue> {
  let raw = view.custom.get(field)?;
  Some(match raw.trim().parse::<f64>() {
    Ok(n) if n.is_finite() => FieldValue::Number(n),
    _ => FieldValue::Text(raw.clone()),
  })
}

/// Missing values sort after present ones in either direction.
fn compare_field(a: &ContractView, b: &ContractView, key: &PrimaryContractConfig) -> Ordering {
  match (field_value(a, &key.field_name), field_value(b, &key.field_name)) {
    (None, None) => Ordering::Equal,
    (None, Some(_)) => Ordering::Greater,
    (Some(_), None) => Ordering::Less,
    (Some(x), Some(y)) => match key.sort_order {
      SortOrder::Asc => x.compare(&y),
      SortOrder::Desc => y.compare(&x),
    },
  }
}

fn compare(
  a: &ContractView,
  b: &ContractView,
  keys: &[&PrimaryContractConfig],
  on: NaiveDate,
) -> Ordering {
  let by_status =
    ContractStatus::of(&a.contract, on).cmp(&ContractStatus::of(&b.contract, on));
  keys
    .iter()
    .fold(by_status, |acc, key| acc.then_with(|| compare_field(a, b, key)))
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// All contracts, best first. The sort is stable: contracts equal on every
/// key keep their input order.
pub fn rank<'a>(
  contracts: &'a [ContractView],
  config: &[PrimaryContractConfig],
  on: NaiveDate,
) -> Vec<&'a ContractView> {
  rank_by(contracts, &cascade(config), on)
}

fn rank_by<'a>(
  contracts: &'a [ContractView],
  keys: &[&PrimaryContractConfig],
  on: NaiveDate,
) -> Vec<&'a ContractView> {
  let mut ranked: Vec<&ContractView> = contracts.iter().collect();
  ranked.sort_by(|a, b| compare(a, b, keys, on));
  ranked
}

/// The primary contract, or `None` for a person without contracts. An empty
/// configuration degrades to status-only ordering.
pub fn resolve<'a>(
  contracts: &'a [ContractView],
  config: &[PrimaryContractConfig],
  on: NaiveDate,
) -> Option<&'a ContractView> {
  rank(contracts, config, on).into_iter().next()
}

/// The leading contract after one stage of the cascade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionStep {
  /// `None` for the initial status-only stage.
  pub field_name: Option<String>,
  pub sort_order: Option<SortOrder>,
  /// External id of the contract leading after this stage.
  pub leader:     String,
  /// External ids of the first few contracts after this stage.
  pub ranking:    Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimarySelection {
  pub winner: Option<ContractView>,
  pub status: Option<ContractStatus>,
  pub steps:  Vec<SelectionStep>,
}

/// [`resolve`], additionally recording the leader after every cascade stage.
/// The final stage uses the full cascade, so its leader is always the winner.
pub fn resolve_with_steps(
  contracts: &[ContractView],
  config: &[PrimaryContractConfig],
  on: NaiveDate,
  ranking_len: usize,
) -> PrimarySelection {
  let keys = cascade(config);
  let mut steps = Vec::with_capacity(keys.len() + 1);

  if contracts.is_empty() {
    return PrimarySelection { winner: None, status: None, steps };
  }

  for stage in 0..=keys.len() {
    let ranked = rank_by(contracts, &keys[..stage], on);
    let (field_name, sort_order) = match stage.checked_sub(1).map(|i| keys[i]) {
      Some(key) => (Some(key.field_name.clone()), Some(key.sort_order)),
      None => (None, None),
    };
    steps.push(SelectionStep {
      field_name,
      sort_order,
      leader: ranked[0].contract.external_id.clone(),
      ranking: ranked
        .iter()
        .take(ranking_len)
        .map(|v| v.contract.external_id.clone())
        .collect(),
    });
  }

  let winner = rank_by(contracts, &keys, on).into_iter().next().cloned();
  let status = winner.as_ref().map(|w| ContractStatus::of(&w.contract, on));
  PrimarySelection { winner, status, steps }
}
