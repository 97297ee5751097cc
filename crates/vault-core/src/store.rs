//! The `VaultStore` and `SchemaInitializer` traits.
//!
//! Implemented by storage backends (e.g. `vault-store-sqlite`). The binary
//! and any other caller depend on these abstractions, not on a concrete
//! backend.

use std::future::Future;

use chrono::NaiveDate;

use crate::{
  document::VaultDocument,
  manager::{ManagerPolicy, PolicyDetection},
  primary::{PrimaryContractConfig, PrimarySelection},
  report::{ImportOptions, ImportResult},
};

/// The schema component the import relies on.
pub trait SchemaInitializer: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Create every table that does not exist yet. Idempotent.
  fn initialize(&self) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn table_exists<'a>(
    &'a self,
    table: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}

/// Abstraction over a vault store backend.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes.
pub trait VaultStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Import ────────────────────────────────────────────────────────────

  /// Run the phased import of `doc`.
  ///
  /// Never fails: any error rolls back the running phase and is reported
  /// through [`ImportResult::success`] and [`ImportResult::error`].
  fn import(
    &self,
    doc: VaultDocument,
    options: ImportOptions,
  ) -> impl Future<Output = ImportResult> + Send + '_;

  /// Parse `input` and import it. A malformed document is reported like any
  /// other failure.
  fn import_json<'a>(
    &'a self,
    input: &'a str,
    options: ImportOptions,
  ) -> impl Future<Output = ImportResult> + Send + 'a;

  // ── Primary managers ──────────────────────────────────────────────────

  /// Recompute and persist every person's primary manager. Returns how many
  /// persons ended up with a manager. [`ManagerPolicy::Import`] is rejected.
  fn refresh_all_primary_managers(
    &self,
    policy: ManagerPolicy,
    on: Option<NaiveDate>,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Sample stored managers, infer the policy that produced them and record
  /// it as the preferred policy. Person rows are never modified.
  fn detect_manager_policy(
    &self,
    on: Option<NaiveDate>,
  ) -> impl Future<Output = Result<PolicyDetection, Self::Error>> + Send + '_;

  /// The preferred policy, if one has been recorded.
  fn manager_policy(
    &self,
  ) -> impl Future<Output = Result<Option<ManagerPolicy>, Self::Error>> + Send + '_;

  // ── Primary contracts ─────────────────────────────────────────────────

  fn primary_contract_config(
    &self,
  ) -> impl Future<Output = Result<Vec<PrimaryContractConfig>, Self::Error>> + Send + '_;

  /// Replace the configuration. Rejected when no row is active.
  fn set_primary_contract_config(
    &self,
    config: Vec<PrimaryContractConfig>,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Resolve a person's primary contract with the stored configuration,
  /// including the per-stage selection steps.
  fn primary_contract<'a>(
    &'a self,
    person_id: &'a str,
    on: Option<NaiveDate>,
  ) -> impl Future<Output = Result<PrimarySelection, Self::Error>> + Send + 'a;
}
