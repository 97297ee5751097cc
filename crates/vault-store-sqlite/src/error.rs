//! Error type for `vault-store-sqlite`.

use thiserror::Error;
use vault_core::manager::ManagerPolicy;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] vault_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("person not found: {0}")]
  PersonNotFound(String),

  /// Managers can only be recomputed under a contract or department policy.
  #[error("policy {0} does not compute managers")]
  PolicyNotComputed(ManagerPolicy),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
