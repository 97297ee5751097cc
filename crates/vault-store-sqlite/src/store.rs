//! [`SqliteStore`]: the SQLite implementation of [`VaultStore`].

use std::path::Path;

use chrono::NaiveDate;
use rusqlite::Transaction;
use tracing::info;
use vault_core::{
  document::VaultDocument,
  manager::{ManagerPolicy, PolicyDetection},
  primary::{PrimaryContractConfig, PrimarySelection, validate_config},
  report::{ImportOptions, ImportResult},
  store::{SchemaInitializer, VaultStore},
};

use crate::{
  Result,
  encode::reference_date,
  import, managers,
  repo::{self, config},
  schema::{KNOWN_TABLES, SCHEMA},
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// An HR vault backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .with_conn(|conn| {
        conn.execute_batch(SCHEMA)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
      })
      .await
  }

  /// Drop every vault table. The next import notices and recreates them.
  pub async fn reset(&self) -> Result<()> {
    self
      .with_conn(|conn| {
        conn.execute_batch("PRAGMA foreign_keys = OFF;")?;
        for table in KNOWN_TABLES.iter().rev() {
          conn.execute_batch(&format!("DROP TABLE IF EXISTS {table};"))?;
        }
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        Ok(())
      })
      .await?;
    info!("vault tables dropped");
    Ok(())
  }

  /// Run `f` on the connection thread. Errors raised by `f` come back
  /// unchanged.
  pub(crate) async fn with_conn<R, F>(&self, f: F) -> Result<R>
  where
    R: Send + 'static,
    F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Run `f` inside one transaction, committed when `f` succeeds and rolled
  /// back otherwise.
  pub(crate) async fn in_tx<R, F>(&self, f: F) -> Result<R>
  where
    R: Send + 'static,
    F: FnOnce(&Transaction<'_>) -> Result<R> + Send + 'static,
  {
    self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        let out = f(&tx)?;
        tx.commit()?;
        Ok(out)
      })
      .await
  }

  /// Toggle foreign key enforcement. Has no effect inside a transaction,
  /// which is why the import only calls it between phases.
  pub(crate) async fn set_foreign_keys(&self, on: bool) -> Result<()> {
    self
      .with_conn(move |conn| {
        conn.pragma_update(None, "foreign_keys", on)?;
        Ok(())
      })
      .await
  }

  #[cfg(test)]
  pub(crate) async fn foreign_keys_enabled(&self) -> Result<bool> {
    self
      .with_conn(|conn| Ok(conn.query_row("PRAGMA foreign_keys", [], |r| r.get(0))?))
      .await
  }
}

// ─── SchemaInitializer impl ──────────────────────────────────────────────────

impl SchemaInitializer for SqliteStore {
  type Error = crate::Error;

  async fn initialize(&self) -> Result<()> { self.init_schema().await }

  async fn table_exists(&self, table: &str) -> Result<bool> {
    let table = table.to_owned();
    self.with_conn(move |conn| repo::table_exists(conn, &table)).await
  }
}

// ─── VaultStore impl ─────────────────────────────────────────────────────────

impl VaultStore for SqliteStore {
  type Error = crate::Error;

  // ── Import ────────────────────────────────────────────────────────────────

  async fn import(&self, doc: VaultDocument, options: ImportOptions) -> ImportResult {
    import::run(self, doc, options).await
  }

  async fn import_json(&self, input: &str, options: ImportOptions) -> ImportResult {
    import::run_json(self, input, options).await
  }

  // ── Primary managers ──────────────────────────────────────────────────────

  async fn refresh_all_primary_managers(
    &self,
    policy: ManagerPolicy,
    on: Option<NaiveDate>,
  ) -> Result<usize> {
    let on = reference_date(on);
    self
      .with_conn(move |conn| managers::refresh_all(conn, policy, on))
      .await
  }

  async fn detect_manager_policy(&self, on: Option<NaiveDate>) -> Result<PolicyDetection> {
    let on = reference_date(on);
    self.with_conn(move |conn| managers::detect(conn, on)).await
  }

  async fn manager_policy(&self) -> Result<Option<ManagerPolicy>> {
    self.with_conn(|conn| managers::preferred_policy(conn)).await
  }

  // ── Primary contracts ─────────────────────────────────────────────────────

  async fn primary_contract_config(&self) -> Result<Vec<PrimaryContractConfig>> {
    self.with_conn(|conn| config::load(conn)).await
  }

  async fn set_primary_contract_config(&self, rows: Vec<PrimaryContractConfig>) -> Result<()> {
    validate_config(&rows)?;
    let count = rows.len();
    self.in_tx(move |tx| config::replace(tx, &rows)).await?;
    info!(rows = count, "primary contract configuration saved");
    Ok(())
  }

  async fn primary_contract(
    &self,
    person_id: &str,
    on: Option<NaiveDate>,
  ) -> Result<PrimarySelection> {
    let person_id = person_id.to_owned();
    let on = reference_date(on);
    self
      .with_conn(move |conn| managers::select_primary(conn, &person_id, on))
      .await
  }
}
