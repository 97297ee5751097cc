//! Import options, progress updates and the import result contract.

use std::{collections::BTreeMap, fmt, sync::Arc, time::Duration};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
  manager::{ManagerPolicy, PolicyDetection},
  model::ReferenceKind,
};

/// Processed items between two progress updates within a phase.
pub const PROGRESS_BATCH: usize = 100;

// ─── Phases ──────────────────────────────────────────────────────────────────

/// The import state machine. Phases run strictly in declaration order;
/// [`ImportPhase::Failed`] is reachable from any of them.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
  Init,
  SchemaVerify,
  SourceSystems,
  LookupTables,
  Persons,
  Departments,
  OrphanDepartments,
  Contacts,
  Contracts,
  ReferenceValidation,
  PrimaryManagerCompute,
  CustomFieldSchemas,
  CustomFieldValues,
  Done,
  Failed,
}

// ─── Progress ────────────────────────────────────────────────────────────────

/// An advisory progress update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportProgress {
  pub current_operation: String,
  pub total_items:       usize,
  pub processed_items:   usize,
}

/// Receives [`ImportProgress`] updates; may be called from a worker thread.
pub type ProgressFn = Arc<dyn Fn(ImportProgress) + Send + Sync>;

/// A cloneable, optional progress sink.
#[derive(Clone, Default)]
pub struct Progress(Option<ProgressFn>);

impl Progress {
  pub fn new(f: impl Fn(ImportProgress) + Send + Sync + 'static) -> Self {
    Self(Some(Arc::new(f)))
  }

  pub fn none() -> Self { Self(None) }

  pub fn report(&self, operation: &str, total: usize, processed: usize) {
    if let Some(f) = &self.0 {
      f(ImportProgress {
        current_operation: operation.to_owned(),
        total_items:       total,
        processed_items:   processed,
      });
    }
  }

  /// Report after every [`PROGRESS_BATCH`] items and on the last one.
  pub fn tick(&self, operation: &str, total: usize, processed: usize) {
    if processed % PROGRESS_BATCH == 0 || processed == total {
      self.report(operation, total, processed);
    }
  }
}

impl fmt::Debug for Progress {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Progress").field(&self.0.is_some()).finish()
  }
}

// ─── Options ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ImportOptions {
  /// `contract`/`department` compute managers during the import; `import`
  /// keeps the exported values and only detects which policy produced them.
  pub manager_policy: ManagerPolicy,
  /// Date contract status is evaluated against; defaults to today (UTC).
  pub reference_date: Option<NaiveDate>,
  pub progress:       Progress,
}

impl Default for ImportOptions {
  fn default() -> Self {
    Self {
      manager_policy: ManagerPolicy::Department,
      reference_date: None,
      progress:       Progress::none(),
    }
  }
}

// ─── Result ──────────────────────────────────────────────────────────────────

/// Rows written per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportCounts {
  pub source_systems:                 usize,
  pub persons:                        usize,
  pub contacts:                       usize,
  pub contracts:                      usize,
  pub departments:                    usize,
  pub departments_auto_created:       usize,
  /// Newly inserted lookup rows; rows already present are not counted.
  pub lookups:                        BTreeMap<ReferenceKind, usize>,
  pub custom_field_schemas_persons:   usize,
  pub custom_field_schemas_contracts: usize,
  pub custom_field_values:            usize,
  pub empty_manager_guids:            usize,
  pub primary_managers_computed:      usize,
}

impl ImportCounts {
  pub fn lookup(&self, kind: ReferenceKind) -> usize {
    self.lookups.get(&kind).copied().unwrap_or_default()
  }
}

/// A contract reference with no lookup row under the same
/// `(external_id, source)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrphanedReference {
  pub contract_external_id: String,
  pub kind:                 ReferenceKind,
  pub external_id:          String,
  pub source:               String,
}

/// Everything skipped, repaired or merely reported along the way.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportDiagnostics {
  pub duplicate_persons:           usize,
  pub duplicate_contacts:          usize,
  pub duplicate_contracts:         usize,
  /// Contracts whose owning person was skipped.
  pub contracts_without_person:    usize,
  pub skipped_without_id:          usize,
  pub department_parents_cleared:  usize,
  pub department_managers_cleared: usize,
  pub orphaned_references:         Vec<OrphanedReference>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportResult {
  pub success:          bool,
  pub error:            Option<String>,
  /// The phase that failed, when `success` is false.
  pub failed_phase:     Option<ImportPhase>,
  pub elapsed:          Duration,
  pub counts:           ImportCounts,
  pub diagnostics:      ImportDiagnostics,
  /// Set when the import ran under [`ManagerPolicy::Import`].
  pub policy_detection: Option<PolicyDetection>,
}

impl ImportResult {
  pub fn new() -> Self {
    Self {
      success:          false,
      error:            None,
      failed_phase:     None,
      elapsed:          Duration::ZERO,
      counts:           ImportCounts::default(),
      diagnostics:      ImportDiagnostics::default(),
      policy_detection: None,
    }
  }
}

impl Default for ImportResult {
  fn default() -> Self { Self::new() }
}
