//! Integration tests for `SqliteStore` against an in-memory database.

use std::sync::{Arc, Mutex};

use chrono::NaiveDate;
use serde_json::{Value, json};
use vault_core::{
  manager::ManagerPolicy,
  model::{CustomFieldTable, EMPTY_GUID, ReferenceKind},
  primary::{PrimaryContractConfig, SortOrder},
  report::{ImportOptions, ImportPhase, ImportResult, Progress},
  store::{SchemaInitializer, VaultStore},
};

use crate::{
  Error, SqliteStore,
  repo::{self, custom_fields, departments, persons},
};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

fn on() -> NaiveDate { NaiveDate::from_ymd_opt(2024, 6, 1).unwrap() }

fn options(policy: ManagerPolicy) -> ImportOptions {
  ImportOptions {
    manager_policy: policy,
    reference_date: Some(on()),
    progress:       Progress::none(),
  }
}

async fn import(s: &SqliteStore, doc: Value) -> ImportResult {
  let result = s
    .import_json(&doc.to_string(), options(ManagerPolicy::Department))
    .await;
  assert!(result.success, "import failed: {:?}", result.error);
  result
}

async fn count(s: &SqliteStore, table: &'static str) -> usize {
  s.with_conn(move |c| repo::count(c, table)).await.unwrap()
}

fn contract(id: &str, start: &str, end: Option<&str>, fte: f64) -> Value {
  json!({
    "ExternalId": id,
    "StartDate": start,
    "EndDate": end,
    "Details": { "Fte": fte },
  })
}

fn sample_doc() -> Value {
  json!({
    "Persons": [{
      "PersonId": "p-1",
      "ExternalId": "E1",
      "DisplayName": "Ada",
      "Source": { "SystemId": "S1", "DisplayName": "Payroll" },
      "Contact": {
        "Business": { "Email": "ada@example.org" },
        "Personal": { "Phone": { "Mobile": "0600" } },
      },
      "Custom": { "Badge": 42 },
      "Contracts": [{
        "ExternalId": "C1",
        "StartDate": "2020-01-01",
        "Location": { "ExternalId": "L1", "Name": "HQ" },
        "Team": { "Name": "Ops" },
        "Title": { "ExternalId": "T1", "Code": "ENG", "Name": "Engineer" },
        "Department": { "ExternalId": "D1" },
        "Custom": { "Grade": "7" },
      }],
    }],
    "Departments": [
      { "ExternalId": "D1", "DisplayName": "Root", "Source": { "SystemId": "S1" } },
    ],
  })
}

// ─── Import basics ───────────────────────────────────────────────────────────

#[tokio::test]
async fn import_writes_every_category() {
  let s = store().await;
  let result = import(&s, sample_doc()).await;

  assert_eq!(result.counts.source_systems, 1);
  assert_eq!(result.counts.persons, 1);
  assert_eq!(result.counts.contacts, 2);
  assert_eq!(result.counts.contracts, 1);
  assert_eq!(result.counts.departments, 1);
  assert_eq!(result.counts.departments_auto_created, 0);
  assert_eq!(result.counts.lookup(ReferenceKind::Location), 1);
  assert_eq!(result.counts.lookup(ReferenceKind::Team), 1);
  assert_eq!(result.counts.lookup(ReferenceKind::Title), 1);
  assert_eq!(result.counts.lookup(ReferenceKind::Employer), 0);
  assert_eq!(result.counts.custom_field_schemas_persons, 1);
  assert_eq!(result.counts.custom_field_schemas_contracts, 1);
  assert_eq!(result.counts.custom_field_values, 2);
  assert!(result.diagnostics.orphaned_references.is_empty());
  assert!(result.failed_phase.is_none());
}

#[tokio::test]
async fn foreign_keys_are_restored_after_import() {
  let s = store().await;
  import(&s, sample_doc()).await;
  assert!(s.foreign_keys_enabled().await.unwrap());

  let failed = s.import_json("{ \"Persons\": [", ImportOptions::default()).await;
  assert!(!failed.success);
  assert!(s.foreign_keys_enabled().await.unwrap());
}

#[tokio::test]
async fn failing_phase_rolls_back_and_restores_foreign_keys() {
  let s = store().await;
  s.with_conn(|c| {
    c.execute_batch(
      "CREATE TRIGGER reject_contacts BEFORE INSERT ON contacts
       BEGIN SELECT RAISE(ABORT, 'contacts rejected'); END;",
    )?;
    Ok(())
  })
  .await
  .unwrap();

  let result = s
    .import_json(&sample_doc().to_string(), options(ManagerPolicy::Department))
    .await;

  assert!(!result.success);
  assert_eq!(result.failed_phase, Some(ImportPhase::Contacts));
  assert!(result.error.unwrap().starts_with("contacts failed"));
  assert!(s.foreign_keys_enabled().await.unwrap());
  // Earlier phases stay committed; the failing one and later ones write nothing.
  assert_eq!(count(&s, "persons").await, 1);
  assert_eq!(count(&s, "contacts").await, 0);
  assert_eq!(count(&s, "contracts").await, 0);
}

#[tokio::test]
async fn lookup_insertion_is_idempotent() {
  let s = store().await;
  import(&s, sample_doc()).await;
  let before = (count(&s, "locations").await, count(&s, "teams").await, count(&s, "titles").await);

  let second = import(&s, sample_doc()).await;
  let after = (count(&s, "locations").await, count(&s, "teams").await, count(&s, "titles").await);

  assert_eq!(before, (1, 1, 1));
  assert_eq!(before, after);
  assert_eq!(second.counts.lookup(ReferenceKind::Team), 0);
  assert_eq!(count(&s, "persons").await, 1);
  assert_eq!(count(&s, "contracts").await, 1);
}

#[tokio::test]
async fn reimport_updates_persons_in_place() {
  let s = store().await;
  import(&s, sample_doc()).await;

  let mut doc = sample_doc();
  doc["Persons"][0]["DisplayName"] = json!("Ada L.");
  import(&s, doc).await;

  let name: String = s
    .with_conn(|c| {
      Ok(c.query_row("SELECT display_name FROM persons WHERE person_id = 'p-1'", [], |r| {
        r.get(0)
      })?)
    })
    .await
    .unwrap();
  assert_eq!(name, "Ada L.");
  assert_eq!(count(&s, "persons").await, 1);
}

#[tokio::test]
async fn malformed_document_fails_without_writing() {
  let s = store().await;
  let result = s.import_json("{ not json", ImportOptions::default()).await;

  assert!(!result.success);
  assert_eq!(result.failed_phase, Some(ImportPhase::Init));
  assert!(result.error.unwrap().contains("malformed"));
  assert_eq!(count(&s, "persons").await, 0);
}

#[tokio::test]
async fn trailing_commas_and_key_casing_are_tolerated() {
  let s = store().await;
  let input = r#"{
    "persons": [
      { "EXTERNALID": "E1", "contracts": [ { "externalId": "C1", }, ], },
    ],
  }"#;
  let result = s.import_json(input, options(ManagerPolicy::Department)).await;
  assert!(result.success, "{:?}", result.error);
  assert_eq!(result.counts.persons, 1);
  assert_eq!(result.counts.contracts, 1);
}

// ─── Departments ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn department_cycle_aborts_the_import() {
  let s = store().await;
  let result = s
    .import_json(
      &json!({
        "Persons": [{ "ExternalId": "E1" }],
        "Departments": [
          { "ExternalId": "A", "ParentExternalId": "B", "Source": { "SystemId": "S1" } },
          { "ExternalId": "B", "ParentExternalId": "A", "Source": { "SystemId": "S1" } },
        ],
      })
      .to_string(),
      ImportOptions::default(),
    )
    .await;

  assert!(!result.success);
  assert_eq!(result.failed_phase, Some(ImportPhase::Init));
  assert!(result.error.unwrap().contains("cycle"));
  assert_eq!(count(&s, "departments").await, 0);
  assert_eq!(count(&s, "persons").await, 0);
}

#[tokio::test]
async fn children_declared_before_parents_are_inserted() {
  let s = store().await;
  let result = import(&s, json!({
    "Departments": [
      { "ExternalId": "C", "ParentExternalId": "B", "Source": { "SystemId": "S1" } },
      { "ExternalId": "B", "ParentExternalId": "A", "Source": { "SystemId": "S1" } },
      { "ExternalId": "A", "Source": { "SystemId": "S1" } },
    ],
  }))
  .await;

  assert_eq!(result.counts.departments, 3);
  assert_eq!(result.diagnostics.department_parents_cleared, 0);
  let c = s
    .with_conn(|conn| departments::get(conn, "C", "S1"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(c.parent_external_id.as_deref(), Some("B"));
}

#[tokio::test]
async fn dangling_department_parent_and_manager_are_cleared() {
  let s = store().await;
  let result = import(&s, json!({
    "Persons": [{ "PersonId": "boss", "ExternalId": "E1" }],
    "Departments": [
      { "ExternalId": "D1", "ParentExternalId": "gone",
        "Manager": { "PersonId": "ghost" }, "Source": { "SystemId": "S1" } },
      { "ExternalId": "D2", "Manager": { "PersonId": "boss" },
        "Source": { "SystemId": "S1" } },
      { "ExternalId": "D3", "ParentExternalId": "D2", "Source": { "SystemId": "S2" } },
    ],
  }))
  .await;

  assert_eq!(result.diagnostics.department_parents_cleared, 2);
  assert_eq!(result.diagnostics.department_managers_cleared, 1);

  let all = s.with_conn(|c| departments::all(c)).await.unwrap();
  let d1 = all.iter().find(|d| d.external_id == "D1").unwrap();
  assert_eq!(d1.parent_external_id, None);
  assert_eq!(d1.manager_person_id, None);
  let d2 = all.iter().find(|d| d.external_id == "D2").unwrap();
  assert_eq!(d2.manager_person_id.as_deref(), Some("boss"));
  // Parents never cross sources.
  let d3 = all.iter().find(|d| d.external_id == "D3").unwrap();
  assert_eq!(d3.parent_external_id, None);
}

#[tokio::test]
async fn orphan_department_is_auto_created() {
  let s = store().await;
  let result = import(&s, json!({
    "Persons": [{
      "ExternalId": "E1",
      "Source": { "SystemId": "S1" },
      "Contracts": [
        { "ExternalId": "C1", "Department": { "ExternalId": "D9", "Name": "Nine" } },
        { "ExternalId": "C2", "Department": { "ExternalId": "D9", "Name": "Nine" } },
      ],
    }],
  }))
  .await;

  assert_eq!(result.counts.departments_auto_created, 1);
  assert!(result.diagnostics.orphaned_references.is_empty());

  let d9 = s
    .with_conn(|c| departments::get(c, "D9", "S1"))
    .await
    .unwrap()
    .expect("auto-created department");
  assert_eq!(d9.display_name.as_deref(), Some("Nine"));
  assert_eq!(d9.code, None);
  assert_eq!(d9.parent_external_id, None);
  assert_eq!(d9.manager_person_id, None);
  assert_eq!(count(&s, "departments").await, 1);
}

#[tokio::test]
async fn mismatched_source_reference_is_reported_not_repaired() {
  let s = store().await;
  let result = import(&s, json!({
    "Persons": [{
      "ExternalId": "E1",
      "Source": { "SystemId": "S1" },
      "Contracts": [{ "ExternalId": "C1", "Department": { "ExternalId": "D5" } }],
    }],
    "Departments": [{ "ExternalId": "D5", "Source": { "SystemId": "S2" } }],
  }))
  .await;

  assert_eq!(result.counts.departments_auto_created, 0);
  let orphans = &result.diagnostics.orphaned_references;
  assert_eq!(orphans.len(), 1);
  assert_eq!(orphans[0].contract_external_id, "C1");
  assert_eq!(orphans[0].kind, ReferenceKind::Department);
  assert_eq!(orphans[0].external_id, "D5");
  assert_eq!(orphans[0].source, "S1");
  assert_eq!(count(&s, "contracts").await, 1);
}

// ─── Identity and duplicates ─────────────────────────────────────────────────

#[tokio::test]
async fn anonymous_references_collapse_by_name() {
  let s = store().await;
  let result = import(&s, json!({
    "Persons": [{
      "ExternalId": "E1",
      "Source": { "SystemId": "S1" },
      "Contracts": [
        { "ExternalId": "C1", "Location": { "Name": "HQ" } },
        { "ExternalId": "C2", "Location": { "Name": "HQ" } },
        { "ExternalId": "C3", "Location": { "Name": "Depot" } },
      ],
    }],
  }))
  .await;

  assert_eq!(result.counts.lookup(ReferenceKind::Location), 2);
  assert_eq!(count(&s, "locations").await, 2);
  let distinct: i64 = s
    .with_conn(|c| {
      Ok(c.query_row(
        "SELECT COUNT(DISTINCT location_external_id) FROM contracts",
        [],
        |r| r.get(0),
      )?)
    })
    .await
    .unwrap();
  assert_eq!(distinct, 2);
}

#[tokio::test]
async fn duplicates_within_a_document_are_skipped() {
  let s = store().await;
  let result = import(&s, json!({
    "Persons": [
      { "ExternalId": "E1", "DisplayName": "First",
        "Contracts": [{ "ExternalId": "C1" }, { "ExternalId": "C1" }] },
      { "PersonId": "other", "ExternalId": "E1", "DisplayName": "Second",
        "Contracts": [{ "ExternalId": "C2" }] },
    ],
  }))
  .await;

  assert_eq!(result.counts.persons, 1);
  assert_eq!(result.diagnostics.duplicate_persons, 1);
  assert_eq!(result.counts.contracts, 1);
  assert_eq!(result.diagnostics.duplicate_contracts, 1);
  assert_eq!(result.diagnostics.contracts_without_person, 1);
  assert_eq!(count(&s, "contracts").await, 1);
}

#[tokio::test]
async fn skipped_duplicates_leave_the_first_record_untouched() {
  let s = store().await;
  let result = import(&s, json!({
    "Persons": [
      { "PersonId": "p-1", "ExternalId": "E1", "Custom": { "Badge": "first" },
        "Contracts": [
          { "ExternalId": "C1", "Custom": { "Grade": "first" } },
          { "ExternalId": "C1", "Custom": { "Grade": "second" },
            "Manager": { "PersonId": EMPTY_GUID } },
        ] },
      { "PersonId": "p-1", "ExternalId": "E1", "Custom": { "Badge": "second" },
        "Contact": { "Business": { "Email": "second@example.org" } },
        "Contracts": [
          { "ExternalId": "C9", "Manager": { "PersonId": EMPTY_GUID } },
        ] },
    ],
  }))
  .await;

  assert_eq!(result.diagnostics.duplicate_persons, 1);
  assert_eq!(result.diagnostics.duplicate_contracts, 1);
  assert_eq!(result.diagnostics.contracts_without_person, 1);
  assert_eq!(result.counts.contracts, 1);
  assert_eq!(result.counts.contacts, 0);
  assert_eq!(result.counts.empty_manager_guids, 0);
  assert_eq!(result.counts.custom_field_values, 2);
  assert_eq!(count(&s, "contracts").await, 1);
  assert_eq!(count(&s, "contacts").await, 0);

  let person = s
    .with_conn(|c| custom_fields::values(c, CustomFieldTable::Persons, "p-1"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(person.get("Badge").map(String::as_str), Some("first"));

  let contract = s
    .with_conn(|c| custom_fields::values(c, CustomFieldTable::Contracts, "C1"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(contract.get("Grade").map(String::as_str), Some("first"));
}

#[tokio::test]
async fn empty_manager_guid_is_stored_as_null() {
  let s = store().await;
  let result = import(&s, json!({
    "Persons": [{
      "ExternalId": "E1",
      "Contracts": [{ "ExternalId": "C1", "Manager": { "PersonId": EMPTY_GUID } }],
    }],
  }))
  .await;

  assert_eq!(result.counts.empty_manager_guids, 1);
  let manager: Option<String> = s
    .with_conn(|c| {
      Ok(c.query_row(
        "SELECT manager_person_external_id FROM contracts WHERE external_id = 'C1'",
        [],
        |r| r.get(0),
      )?)
    })
    .await
    .unwrap();
  assert_eq!(manager, None);
}

#[tokio::test]
async fn custom_values_are_stored_as_text() {
  let s = store().await;
  import(&s, sample_doc()).await;

  let person = s
    .with_conn(|c| custom_fields::values(c, CustomFieldTable::Persons, "p-1"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(person.get("Badge").map(String::as_str), Some("42"));

  let contract = s
    .with_conn(|c| custom_fields::values(c, CustomFieldTable::Contracts, "C1"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(contract.get("Grade").map(String::as_str), Some("7"));
}

// ─── Schema ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn schema_is_recreated_after_reset() {
  let s = store().await;
  import(&s, sample_doc()).await;
  s.reset().await.unwrap();
  assert!(!s.table_exists("persons").await.unwrap());

  let result = import(&s, sample_doc()).await;
  assert_eq!(result.counts.persons, 1);
  assert!(s.table_exists("persons").await.unwrap());
  assert_eq!(s.primary_contract_config().await.unwrap().len(), 3);
}

#[tokio::test]
async fn file_backed_store_persists_between_opens() {
  let dir = tempfile::tempdir().unwrap();
  let path = dir.path().join("vault.db");

  let s = SqliteStore::open(&path).await.unwrap();
  import(&s, sample_doc()).await;
  drop(s);

  let reopened = SqliteStore::open(&path).await.unwrap();
  assert_eq!(count(&reopened, "persons").await, 1);
  assert!(reopened.foreign_keys_enabled().await.unwrap());
}

// ─── Primary contracts ───────────────────────────────────────────────────────

#[tokio::test]
async fn default_configuration_is_seeded() {
  let s = store().await;
  let config = s.primary_contract_config().await.unwrap();
  let fields: Vec<_> = config.iter().map(|c| (c.field_name.as_str(), c.sort_order)).collect();
  assert_eq!(fields, [
    ("fte", SortOrder::Desc),
    ("hours_per_week", SortOrder::Desc),
    ("start_date", SortOrder::Asc),
  ]);
}

#[tokio::test]
async fn configuration_without_active_rows_is_rejected() {
  let s = store().await;
  let mut row = PrimaryContractConfig::new("fte", SortOrder::Desc, 1);
  row.is_active = false;

  let err = s.set_primary_contract_config(vec![row]).await.unwrap_err();
  assert!(matches!(err, Error::Core(vault_core::Error::NoActiveConfigField)));
  assert_eq!(s.primary_contract_config().await.unwrap().len(), 3);
}

#[tokio::test]
async fn primary_contract_follows_status_then_fte() {
  let s = store().await;
  import(&s, json!({
    "Persons": [{
      "PersonId": "p-1",
      "ExternalId": "E1",
      "Contracts": [
        contract("past", "2018-01-01", Some("2019-12-31"), 0.5),
        contract("small", "2020-01-01", None, 0.3),
        contract("big", "2021-01-01", None, 0.8),
      ],
    }],
  }))
  .await;

  s.set_primary_contract_config(vec![PrimaryContractConfig::new("fte", SortOrder::Desc, 1)])
    .await
    .unwrap();

  let selection = s.primary_contract("p-1", Some(on())).await.unwrap();
  let winner = selection.winner.unwrap();
  assert_eq!(winner.contract.external_id, "big");
  assert_eq!(selection.steps.len(), 2);
  assert_eq!(selection.steps.last().unwrap().leader, "big");
}

#[tokio::test]
async fn primary_contract_can_sort_on_lookup_labels() {
  let s = store().await;
  import(&s, json!({
    "Persons": [{
      "PersonId": "p-1",
      "ExternalId": "E1",
      "Source": { "SystemId": "S1" },
      "Contracts": [
        { "ExternalId": "a", "StartDate": "2020-01-01",
          "Title": { "ExternalId": "T1", "Code": "B" } },
        { "ExternalId": "b", "StartDate": "2020-01-01",
          "Title": { "ExternalId": "T2", "Code": "A" } },
      ],
    }],
  }))
  .await;

  s.set_primary_contract_config(vec![PrimaryContractConfig::new(
    "title_code",
    SortOrder::Asc,
    1,
  )])
  .await
  .unwrap();
  let selection = s.primary_contract("p-1", Some(on())).await.unwrap();
  assert_eq!(selection.winner.unwrap().contract.external_id, "b");
}

#[tokio::test]
async fn primary_contract_of_unknown_person_fails() {
  let s = store().await;
  let err = s.primary_contract("nobody", None).await.unwrap_err();
  assert!(matches!(err, Error::PersonNotFound(id) if id == "nobody"));
}

// ─── Primary managers ────────────────────────────────────────────────────────

fn managed_doc() -> Value {
  json!({
    "Persons": [
      { "PersonId": "boss", "ExternalId": "B" },
      { "PersonId": "lead", "ExternalId": "L" },
      {
        "PersonId": "p-1",
        "ExternalId": "E1",
        "Source": { "SystemId": "S1" },
        "Contracts": [{
          "ExternalId": "C1",
          "StartDate": "2020-01-01",
          "Manager": { "PersonId": "lead" },
          "Department": { "ExternalId": "D2" },
        }],
      },
    ],
    "Departments": [
      { "ExternalId": "D1", "Manager": { "PersonId": "boss" }, "Source": { "SystemId": "S1" } },
      { "ExternalId": "D2", "ParentExternalId": "D1", "Manager": { "PersonId": "p-1" },
        "Source": { "SystemId": "S1" } },
    ],
  })
}

#[tokio::test]
async fn import_computes_managers_under_the_requested_policy() {
  let s = store().await;
  let result = s
    .import_json(&managed_doc().to_string(), options(ManagerPolicy::Contract))
    .await;
  assert!(result.success, "{:?}", result.error);
  assert_eq!(result.counts.primary_managers_computed, 1);

  let stored = s
    .with_conn(|c| persons::stored_manager(c, "p-1"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored.manager_person_id.as_deref(), Some("lead"));
  assert_eq!(stored.provenance, Some(ManagerPolicy::Contract));
  assert!(stored.updated_at.is_some());
}

#[tokio::test]
async fn department_refresh_skips_self_management() {
  let s = store().await;
  import(&s, managed_doc()).await;

  let with_manager = s
    .refresh_all_primary_managers(ManagerPolicy::Department, Some(on()))
    .await
    .unwrap();
  assert_eq!(with_manager, 1);

  let stored = s
    .with_conn(|c| persons::stored_manager(c, "p-1"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored.manager_person_id.as_deref(), Some("boss"));
  assert_eq!(stored.provenance, Some(ManagerPolicy::Department));

  let without = s
    .with_conn(|c| persons::stored_manager(c, "boss"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(without.manager_person_id, None);
  assert_eq!(without.provenance, None);
  assert!(without.updated_at.is_some());
}

#[tokio::test]
async fn refresh_rejects_the_import_policy() {
  let s = store().await;
  let err = s
    .refresh_all_primary_managers(ManagerPolicy::Import, None)
    .await
    .unwrap_err();
  assert!(matches!(err, Error::PolicyNotComputed(ManagerPolicy::Import)));
}

/// Ten persons whose imported manager matches the contract manager seven
/// times and the department manager three times.
fn detection_doc() -> Value {
  let persons: Vec<Value> = (0..10)
    .map(|i| {
      let stored = if i < 7 { "m-contract" } else { "m-department" };
      json!({
        "PersonId": format!("p-{i}"),
        "ExternalId": format!("E{i}"),
        "Source": { "SystemId": "S1" },
        "PrimaryManager": { "PersonId": stored },
        "Contracts": [{
          "ExternalId": format!("C{i}"),
          "StartDate": "2020-01-01",
          "Manager": { "PersonId": "m-contract" },
          "Department": { "ExternalId": "D1" },
        }],
      })
    })
    .chain([
      json!({ "PersonId": "m-contract", "ExternalId": "MC" }),
      json!({ "PersonId": "m-department", "ExternalId": "MD" }),
    ])
    .collect();

  json!({
    "Persons": persons,
    "Departments": [{
      "ExternalId": "D1",
      "Manager": { "PersonId": "m-department" },
      "Source": { "SystemId": "S1" },
    }],
  })
}

#[tokio::test]
async fn detection_picks_the_majority_policy() {
  let s = store().await;
  let result = s
    .import_json(&detection_doc().to_string(), options(ManagerPolicy::Import))
    .await;
  assert!(result.success, "{:?}", result.error);

  let detection = result.policy_detection.expect("detection ran");
  assert_eq!(detection.tally.sampled, 10);
  assert_eq!(detection.tally.contract_matches, 7);
  assert_eq!(detection.tally.department_matches, 3);
  assert_eq!(detection.policy, Some(ManagerPolicy::Contract));
  assert_eq!(s.manager_policy().await.unwrap(), Some(ManagerPolicy::Contract));

  // Detection never rewrites person rows.
  let stored = s
    .with_conn(|c| persons::stored_manager(c, "p-9"))
    .await
    .unwrap()
    .unwrap();
  assert_eq!(stored.manager_person_id.as_deref(), Some("m-department"));
  assert_eq!(stored.provenance, Some(ManagerPolicy::Import));
}

#[tokio::test]
async fn detection_without_matches_is_undetermined() {
  let s = store().await;
  import(&s, sample_doc()).await;

  let detection = s.detect_manager_policy(Some(on())).await.unwrap();
  assert_eq!(detection.tally.sampled, 0);
  assert_eq!(detection.policy, None);
  assert_eq!(s.manager_policy().await.unwrap(), None);
}

// ─── Progress ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_walks_the_phases_in_order() {
  let s = store().await;
  let seen = Arc::new(Mutex::new(Vec::new()));
  let sink = seen.clone();
  let opts = ImportOptions {
    progress: Progress::new(move |p| sink.lock().unwrap().push(p.current_operation)),
    ..options(ManagerPolicy::Department)
  };

  let result = s.import_json(&sample_doc().to_string(), opts).await;
  assert!(result.success);

  let ops = seen.lock().unwrap().clone();
  let position = |name: &str| ops.iter().position(|o| o == name).unwrap();
  assert!(position("schema_verify") < position("persons"));
  assert!(position("persons") < position("departments"));
  assert!(position("departments") < position("orphan_departments"));
  assert!(position("contracts") < position("reference_validation"));
  assert_eq!(ops.last().map(String::as_str), Some("done"));
}
