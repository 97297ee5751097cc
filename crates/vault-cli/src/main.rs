//! `vault`: import HR vault exports into SQLite and administer primary
//! contracts and managers.
//!
//! # Usage
//!
//! ```text
//! vault import export.json --policy import
//! vault refresh-managers --policy department
//! vault primary-contract 6f1d2c3e-...
//! vault config set fte DESC 1
//! ```

mod settings;

use std::path::PathBuf;

use anyhow::{Context as _, bail};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use vault_core::{
  manager::ManagerPolicy,
  primary::{PrimaryContractConfig, SortOrder},
  report::{ImportOptions, Progress},
  store::VaultStore,
};
use vault_store_sqlite::SqliteStore;

use crate::settings::VaultConfig;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "vault", version, about = "HR vault import and administration")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "vault.toml")]
  config: PathBuf,

  /// SQLite database file; overrides `database_path`.
  #[arg(long, value_name = "FILE")]
  database: Option<PathBuf>,

  /// Evaluate contract status on this date (YYYY-MM-DD) instead of today.
  #[arg(long, value_name = "DATE")]
  date: Option<NaiveDate>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Import a vault JSON document and print the import result.
  Import {
    file: PathBuf,
    /// contract, department or import.
    #[arg(long, value_parser = ManagerPolicy::from_name)]
    policy: Option<ManagerPolicy>,
  },
  /// Recompute every person's primary manager.
  RefreshManagers {
    /// contract or department.
    #[arg(long, value_parser = ManagerPolicy::from_name)]
    policy: ManagerPolicy,
  },
  /// Infer which policy produced the stored managers.
  DetectPolicy,
  /// Show how a person's primary contract is selected.
  PrimaryContract { person_id: String },
  /// Read or edit the primary contract configuration.
  Config {
    #[command(subcommand)]
    action: ConfigAction,
  },
}

#[derive(Subcommand)]
enum ConfigAction {
  Show,
  /// Add or replace one field of the cascade.
  Set {
    field:      String,
    /// ASC or DESC.
    sort_order: SortOrder,
    priority:   i32,
    /// Keep the row but skip it when ranking.
    #[arg(long)]
    inactive:   bool,
  },
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .with_writer(std::io::stderr)
    .init();

  let cli = Cli::parse();

  let mut cfg = VaultConfig::load(&cli.config)?;
  if let Some(path) = cli.database {
    cfg.database_path = path;
  }
  if cli.date.is_some() {
    cfg.reference_date = cli.date;
  }

  let store = SqliteStore::open(&cfg.database_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.database_path))?;

  match cli.command {
    Command::Import { file, policy } => import(&store, &cfg, file, policy).await,
    Command::RefreshManagers { policy } => {
      let with_manager = store
        .refresh_all_primary_managers(policy, cfg.reference_date)
        .await
        .context("refreshing primary managers")?;
      print_json(&serde_json::json!({ "policy": policy, "with_manager": with_manager }))
    }
    Command::DetectPolicy => {
      let detection = store
        .detect_manager_policy(cfg.reference_date)
        .await
        .context("detecting manager policy")?;
      print_json(&detection)
    }
    Command::PrimaryContract { person_id } => {
      let selection = store
        .primary_contract(&person_id, cfg.reference_date)
        .await
        .with_context(|| format!("resolving primary contract of {person_id}"))?;
      print_json(&selection)
    }
    Command::Config { action } => configure(&store, action).await,
  }
}

async fn import(
  store: &SqliteStore,
  cfg: &VaultConfig,
  file: PathBuf,
  policy: Option<ManagerPolicy>,
) -> anyhow::Result<()> {
  let input = tokio::fs::read_to_string(&file)
    .await
    .with_context(|| format!("reading {}", file.display()))?;

  let options = ImportOptions {
    manager_policy: policy.unwrap_or(cfg.manager_policy),
    reference_date: cfg.reference_date,
    progress:       Progress::new(|p| {
      tracing::debug!(
        operation = %p.current_operation,
        processed = p.processed_items,
        total = p.total_items,
        "progress"
      );
    }),
  };

  let result = store.import_json(&input, options).await;
  print_json(&result)?;
  if !result.success {
    bail!(result.error.unwrap_or_else(|| "import failed".into()));
  }
  Ok(())
}

async fn configure(store: &SqliteStore, action: ConfigAction) -> anyhow::Result<()> {
  match action {
    ConfigAction::Show => {
      let rows = store.primary_contract_config().await?;
      print_json(&rows)
    }
    ConfigAction::Set { field, sort_order, priority, inactive } => {
      let mut rows = store.primary_contract_config().await?;
      rows.retain(|r| r.field_name != field);
      rows.push(PrimaryContractConfig {
        field_name: field,
        sort_order,
        priority_order: priority,
        is_active: !inactive,
      });
      rows.sort_by_key(|r| r.priority_order);

      store
        .set_primary_contract_config(rows.clone())
        .await
        .context("saving primary contract configuration")?;
      print_json(&rows)
    }
  }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}
