//! Primary manager computation and policy detection against persisted data.
//!
//! Both run the full primary contract cascade per person in memory, so they
//! walk persons one at a time rather than issuing one bulk statement.

use std::collections::{HashMap, HashSet};

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{debug, info};
use vault_core::{
  manager::{DETECTION_SAMPLE_SIZE, ManagerPolicy, PolicyDetection, PolicyTally, compute_manager},
  model::{ContractView, Department, EntityKey},
  primary::{DEFAULT_STEP_RANKING_LEN, PrimarySelection, resolve, resolve_with_steps},
};

use crate::{
  Error, Result,
  encode::decode_policy,
  repo::{config, contracts, departments, persons, preferences},
};

fn department_index(conn: &Connection) -> Result<HashMap<EntityKey, Department>> {
  Ok(departments::all(conn)?.into_iter().map(|d| (d.key(), d)).collect())
}

/// Recompute and persist every person's manager under `policy`. Candidates
/// that are not a known person are stored as null. Returns how many persons
/// ended up with a manager.
pub fn refresh_all(conn: &mut Connection, policy: ManagerPolicy, on: NaiveDate) -> Result<usize> {
  if !policy.is_computed() {
    return Err(Error::PolicyNotComputed(policy));
  }

  let config = config::load(conn)?;
  let depts = department_index(conn)?;
  let views = contracts::views_by_person(conn)?;
  let ids = persons::all_ids(conn)?;
  let known: HashSet<&str> = ids.iter().map(String::as_str).collect();

  let tx = conn.transaction()?;
  let mut with_manager = 0;
  for person_id in &ids {
    let contracts: &[ContractView] = views.get(person_id).map(Vec::as_slice).unwrap_or_default();
    let primary = resolve(contracts, &config, on);
    let manager = compute_manager(policy, person_id, primary, &depts)
      .filter(|m| known.contains(m.as_str()));

    persons::set_primary_manager(&tx, person_id, manager.as_deref(), policy)?;
    if manager.is_some() {
      with_manager += 1;
    }
  }
  tx.commit()?;

  info!(%policy, persons = ids.len(), with_manager, "primary managers refreshed");
  Ok(with_manager)
}

/// Sample persons with a stored manager and count which computed policy
/// reproduces it. A decisive verdict is saved as the preferred policy.
pub fn detect(conn: &Connection, on: NaiveDate) -> Result<PolicyDetection> {
  let sample = persons::sample_with_manager(conn, DETECTION_SAMPLE_SIZE)?;
  let config = config::load(conn)?;
  let depts = department_index(conn)?;

  let mut tally = PolicyTally::default();
  for (person_id, stored) in &sample {
    let contracts = contracts::views_for_person(conn, person_id)?;
    let primary = resolve(&contracts, &config, on);
    let by_contract = compute_manager(ManagerPolicy::Contract, person_id, primary, &depts);
    let by_department = compute_manager(ManagerPolicy::Department, person_id, primary, &depts);
    tally.record(stored, by_contract.as_deref(), by_department.as_deref());
  }

  let policy = tally.verdict();
  match policy {
    Some(p) => {
      preferences::set(conn, preferences::MANAGER_POLICY, &p.to_string())?;
      info!(
        policy = %p,
        sampled = tally.sampled,
        contract = tally.contract_matches,
        department = tally.department_matches,
        "manager policy detected"
      );
    }
    None => debug!(sampled = tally.sampled, "manager policy undetermined"),
  }

  Ok(PolicyDetection { tally, policy })
}

/// The stored preferred policy; unreadable values count as unset.
pub fn preferred_policy(conn: &Connection) -> Result<Option<ManagerPolicy>> {
  let stored = preferences::get(conn, preferences::MANAGER_POLICY)?;
  Ok(decode_policy(stored.as_deref()))
}

/// Resolve one person's primary contract with the stored configuration.
pub fn select_primary(conn: &Connection, person_id: &str, on: NaiveDate) -> Result<PrimarySelection> {
  if !persons::exists(conn, person_id)? {
    return Err(Error::PersonNotFound(person_id.to_owned()));
  }
  let config = config::load(conn)?;
  let contracts = contracts::views_for_person(conn, person_id)?;
  Ok(resolve_with_steps(&contracts, &config, on, DEFAULT_STEP_RANKING_LEN))
}
