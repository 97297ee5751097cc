//! Primary manager policies and policy detection.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::{
  Error, Result,
  model::{ContractView, Department, EntityKey, ReferenceKind},
};

/// Persons sampled when detecting the policy of an imported dataset.
pub const DETECTION_SAMPLE_SIZE: usize = 100;

/// Where a person's primary manager comes from. Also used as the provenance
/// recorded next to a stored manager.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Display,
  EnumString,
  Serialize,
  Deserialize,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ManagerPolicy {
  /// The primary contract's own manager.
  Contract,
  /// The manager of the primary contract's department.
  Department,
  /// Keep whatever the export supplied.
  Import,
}

impl ManagerPolicy {
  /// Whether the policy recomputes managers from contracts.
  pub fn is_computed(self) -> bool { !matches!(self, Self::Import) }

  /// Parse a policy name, ignoring case.
  pub fn from_name(name: &str) -> Result<Self> {
    name
      .trim()
      .parse()
      .map_err(|_| Error::UnknownManagerPolicy(name.to_owned()))
  }
}

/// Compute `person_id`'s manager from their primary contract.
///
/// Under [`ManagerPolicy::Department`] a department managed by the person
/// themself defers to its parent chain. [`ManagerPolicy::Import`] never
/// computes anything.
pub fn compute_manager(
  policy: ManagerPolicy,
  person_id: &str,
  primary: Option<&ContractView>,
  departments: &HashMap<EntityKey, Department>,
) -> Option<String> {
  let primary = primary?;
  match policy {
    ManagerPolicy::Contract => primary.contract.manager_person_id.clone(),
    ManagerPolicy::Department => {
      let key = primary.contract.reference(ReferenceKind::Department)?;
      department_manager(person_id, key, departments)
    }
    ManagerPolicy::Import => None,
  }
}

fn department_manager(
  person_id: &str,
  start: &EntityKey,
  departments: &HashMap<EntityKey, Department>,
) -> Option<String> {
  let mut visited = HashSet::new();
  let mut current = departments.get(start);

  while let Some(dept) = current {
    if !visited.insert(dept.key()) {
      return None;
    }
    match dept.manager_person_id.as_deref() {
      Some(m) if m != person_id => return Some(m.to_owned()),
      _ => current = dept.parent_key().and_then(|k| departments.get(&k)),
    }
  }
  None
}

// ─── Detection ───────────────────────────────────────────────────────────────

/// Outcome of sampling an imported dataset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDetection {
  pub tally:  PolicyTally,
  /// `None` when no sampled manager matched either policy.
  pub policy: Option<ManagerPolicy>,
}

/// How often each computed policy reproduces a stored manager.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTally {
  pub sampled:            usize,
  pub contract_matches:   usize,
  pub department_matches: usize,
}

impl PolicyTally {
  pub fn record(&mut self, stored: &str, by_contract: Option<&str>, by_department: Option<&str>) {
    self.sampled += 1;
    if by_contract == Some(stored) {
      self.contract_matches += 1;
    }
    if by_department == Some(stored) {
      self.department_matches += 1;
    }
  }

  /// The majority policy. No matches at all is undetermined; an equal,
  /// non-zero count favours the department policy.
  pub fn verdict(&self) -> Option<ManagerPolicy> {
    match (self.contract_matches, self.department_matches) {
      (0, 0) => None,
      (c, d) if c > d => Some(ManagerPolicy::Contract),
      _ => Some(ManagerPolicy::Department),
    }
  }
}
