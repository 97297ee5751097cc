//! Layered configuration: defaults, then the TOML file, then `VAULT_*`
//! environment variables. Command-line flags are applied on top by the caller.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use vault_core::manager::ManagerPolicy;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VaultConfig {
  /// SQLite database file; a leading `~/` is expanded.
  pub database_path:  PathBuf,
  /// Policy used by `import` unless `--policy` is given.
  pub manager_policy: ManagerPolicy,
  /// Date contract status is evaluated against; today when unset.
  #[serde(default)]
  pub reference_date: Option<NaiveDate>,
}

impl VaultConfig {
  pub fn load(file: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .set_default("database_path", "vault.db")?
      .set_default("manager_policy", "department")?
      .add_source(config::File::from(file).required(false))
      .add_source(config::Environment::with_prefix("VAULT"))
      .build()
      .with_context(|| format!("failed to read config file {}", file.display()))?;

    let mut cfg: VaultConfig = settings
      .try_deserialize()
      .context("failed to deserialise VaultConfig")?;
    cfg.database_path = expand_tilde(&cfg.database_path);
    Ok(cfg)
  }
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
