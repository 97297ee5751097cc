//! Error types for `vault-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("malformed vault document: {0}")]
  MalformedDocument(#[from] serde_json::Error),

  /// The chain lists external ids from the first revisited department back
  /// to itself, e.g. `["A", "B", "A"]`.
  #[error("department cycle detected: {}", chain.join(" -> "))]
  DepartmentCycle { chain: Vec<String> },

  #[error("primary contract configuration has no active field")]
  NoActiveConfigField,

  #[error("unknown manager policy: {0:?}")]
  UnknownManagerPolicy(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
