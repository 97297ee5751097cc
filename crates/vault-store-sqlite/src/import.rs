//! The phased import.
//!
//! Collection and the department sort run before anything is written, so a
//! malformed document or a department cycle aborts with nothing committed.
//! Every writing phase then runs in its own transaction on the connection
//! thread; an error drops that transaction (rolling it back) and ends the
//! import. Foreign keys are switched off after the schema check and switched
//! back on once the import ends, whatever the outcome.

use std::{
  collections::{BTreeMap, HashSet},
  sync::Arc,
  time::Instant,
};

use tracing::{debug, error, info, warn};
use vault_core::{
  collect::{ImportContext, collect},
  document::{self, VaultDocument},
  model::{ContactKind, CustomFieldTable, ReferenceKind},
  report::{ImportOptions, ImportPhase, ImportResult},
  store::SchemaInitializer,
  topo::sort_departments,
};

use crate::{
  Error, Result, SqliteStore,
  encode::reference_date,
  managers,
  repo::{contacts, contracts, custom_fields, departments, lookups, persons, sources},
  schema::KNOWN_TABLES,
  validate,
};

/// Parse `input` and import it. A malformed document fails the `init` phase.
pub(crate) async fn run_json(
  store: &SqliteStore,
  input: &str,
  options: ImportOptions,
) -> ImportResult {
  match document::parse(input) {
    Ok(doc) => run(store, doc, options).await,
    Err(e) => {
      let e = Error::from(e);
      let mut result = ImportResult::new();
      result.failed_phase = Some(ImportPhase::Init);
      result.error = Some(format!("{} failed: {e}", ImportPhase::Init));
      error!(error = %e, "import rejected: malformed document");
      options.progress.report(&ImportPhase::Failed.to_string(), 0, 0);
      result
    }
  }
}

/// Run every phase of the import. Never fails; see [`ImportResult`].
pub(crate) async fn run(
  store: &SqliteStore,
  doc: VaultDocument,
  options: ImportOptions,
) -> ImportResult {
  let started = Instant::now();
  let mut importer = Importer::new(store, &options);
  let outcome = importer.run_phases(&doc).await;

  if let Err(e) = store.set_foreign_keys(true).await {
    warn!(error = %e, "could not restore foreign key enforcement");
  }

  let Importer { mut result, phase, .. } = importer;
  result.elapsed = started.elapsed();

  match outcome {
    Ok(()) => {
      result.success = true;
      options.progress.report(&ImportPhase::Done.to_string(), 1, 1);
      info!(
        elapsed_ms = result.elapsed.as_millis() as u64,
        persons = result.counts.persons,
        contracts = result.counts.contracts,
        departments = result.counts.departments,
        "import finished"
      );
    }
    Err(e) => {
      result.failed_phase = Some(phase);
      result.error = Some(format!("{phase} failed: {e}"));
      options.progress.report(&ImportPhase::Failed.to_string(), 0, 0);
      error!(%phase, error = %e, "import failed");
    }
  }
  result
}

struct Importer<'a> {
  store:     &'a SqliteStore,
  options:   &'a ImportOptions,
  result:    ImportResult,
  phase:     ImportPhase,
  /// Indexes of the person records written by the persons phase.
  persons:   Arc<HashSet<usize>>,
  /// Indexes of the contract records written by the contracts phase.
  contracts: Arc<HashSet<usize>>,
}

impl<'a> Importer<'a> {
  fn new(store: &'a SqliteStore, options: &'a ImportOptions) -> Self {
    Self {
      store,
      options,
      result: ImportResult::new(),
      phase: ImportPhase::Init,
      persons: Arc::default(),
      contracts: Arc::default(),
    }
  }

  /// The only interruption point: hand control back to the runtime, then
  /// start `phase`.
  async fn enter(&mut self, phase: ImportPhase, total: usize) {
    tokio::task::yield_now().await;
    self.phase = phase;
    debug!(%phase, total, "phase started");
    self.options.progress.report(&phase.to_string(), total, 0);
  }

  async fn run_phases(&mut self, doc: &VaultDocument) -> Result<()> {
    self.enter(ImportPhase::Init, doc.persons.len()).await;
    let ctx = Arc::new(self.prepare(doc)?);

    self.enter(ImportPhase::SchemaVerify, KNOWN_TABLES.len()).await;
    self.verify_schema().await?;
    self.store.set_foreign_keys(false).await?;

    self.enter(ImportPhase::SourceSystems, ctx.source_systems.len()).await;
    self.source_systems(&ctx).await?;

    let lookup_total = ctx.lookups.values().map(Vec::len).sum();
    self.enter(ImportPhase::LookupTables, lookup_total).await;
    self.lookup_tables(&ctx).await?;

    self.enter(ImportPhase::Persons, ctx.persons.len()).await;
    self.persons(&ctx).await?;

    self.enter(ImportPhase::Departments, ctx.departments.len()).await;
    self.departments(&ctx).await?;

    self.enter(ImportPhase::OrphanDepartments, ctx.referenced_departments.len()).await;
    self.orphan_departments(&ctx).await?;

    self.enter(ImportPhase::Contacts, ctx.contacts.len()).await;
    self.contacts(&ctx).await?;

    self.enter(ImportPhase::Contracts, ctx.contracts.len()).await;
    self.contracts(&ctx).await?;

    self.enter(ImportPhase::ReferenceValidation, ctx.contracts.len()).await;
    self.reference_validation().await?;

    self.enter(ImportPhase::PrimaryManagerCompute, self.persons.len()).await;
    self.primary_managers().await?;

    self.enter(ImportPhase::CustomFieldSchemas, ctx.custom_schemas.len()).await;
    self.custom_field_schemas(&ctx).await?;

    self.enter(ImportPhase::CustomFieldValues, ctx.custom_values.len()).await;
    self.custom_field_values(&ctx).await?;

    self.phase = ImportPhase::Done;
    Ok(())
  }

  // ── Init ──────────────────────────────────────────────────────────────────

  fn prepare(&mut self, doc: &VaultDocument) -> Result<ImportContext> {
    let mut ctx = collect(doc);
    ctx.departments = sort_departments(std::mem::take(&mut ctx.departments))?;

    self.result.diagnostics.skipped_without_id = ctx.skipped_without_id;
    if ctx.skipped_without_id > 0 {
      warn!(count = ctx.skipped_without_id, "records without an identifier skipped");
    }
    info!(
      persons = ctx.persons.len(),
      contracts = ctx.contracts.len(),
      departments = ctx.departments.len(),
      "document collected"
    );
    Ok(ctx)
  }

  // ── SchemaVerify ──────────────────────────────────────────────────────────

  async fn verify_schema(&mut self) -> Result<()> {
    let mut missing = Vec::new();
    for table in KNOWN_TABLES {
      if !self.store.table_exists(table).await? {
        missing.push(*table);
      }
    }
    if !missing.is_empty() {
      warn!(?missing, "tables missing, re-initialising schema");
      self.store.initialize().await?;
    }
    Ok(())
  }

  // ── SourceSystems ─────────────────────────────────────────────────────────

  async fn source_systems(&mut self, ctx: &Arc<ImportContext>) -> Result<()> {
    let ctx = Arc::clone(ctx);
    let progress = self.options.progress.clone();
    let op = self.phase.to_string();

    let written = self
      .store
      .in_tx(move |tx| {
        let total = ctx.source_systems.len();
        for (i, source) in ctx.source_systems.iter().enumerate() {
          sources::upsert(tx, source)?;
          progress.tick(&op, total, i + 1);
        }
        Ok(total)
      })
      .await?;

    self.result.counts.source_systems = written;
    info!(count = written, "source systems imported");
    Ok(())
  }

  // ── LookupTables ──────────────────────────────────────────────────────────

  async fn lookup_tables(&mut self, ctx: &Arc<ImportContext>) -> Result<()> {
    let ctx = Arc::clone(ctx);
    let progress = self.options.progress.clone();
    let op = self.phase.to_string();

    let inserted = self
      .store
      .in_tx(move |tx| {
        let total = ctx.lookups.values().map(Vec::len).sum();
        let mut processed = 0;
        let mut inserted = BTreeMap::new();
        for kind in ReferenceKind::LOOKUPS {
          let mut n = 0;
          for entity in ctx.lookups_of(kind) {
            if lookups::insert_if_missing(tx, entity)? {
              n += 1;
            }
            processed += 1;
            progress.tick(&op, total, processed);
          }
          inserted.insert(kind, n);
        }
        Ok(inserted)
      })
      .await?;

    info!(?inserted, "lookup tables imported");
    self.result.counts.lookups = inserted;
    Ok(())
  }

  // ── Persons ───────────────────────────────────────────────────────────────

  async fn persons(&mut self, ctx: &Arc<ImportContext>) -> Result<()> {
    let ctx = Arc::clone(ctx);
    let progress = self.options.progress.clone();
    let op = self.phase.to_string();

    let (written, duplicates) = self
      .store
      .in_tx(move |tx| {
        let total = ctx.persons.len();
        let mut seen_external = HashSet::new();
        let mut seen_ids = HashSet::new();
        let mut written = HashSet::new();
        let mut duplicates = 0;

        for (i, person) in ctx.persons.iter().enumerate() {
          progress.tick(&op, total, i + 1);

          if !seen_external.insert(person.external_id.as_str())
            || !seen_ids.insert(person.person_id.as_str())
          {
            warn!(external_id = %person.external_id, "duplicate person skipped");
            duplicates += 1;
            continue;
          }
          if let Some(stored) = persons::id_for_external(tx, &person.external_id)?
            && stored != person.person_id
          {
            warn!(
              external_id = %person.external_id,
              stored = %stored,
              "external id already belongs to another person, skipped"
            );
            duplicates += 1;
            continue;
          }

          persons::upsert(tx, person)?;
          written.insert(i);
        }
        Ok((written, duplicates))
      })
      .await?;

    self.result.counts.persons = written.len();
    self.result.diagnostics.duplicate_persons = duplicates;
    info!(count = written.len(), duplicates, "persons imported");
    self.persons = Arc::new(written);
    Ok(())
  }

  // ── Departments ───────────────────────────────────────────────────────────

  async fn departments(&mut self, ctx: &Arc<ImportContext>) -> Result<()> {
    let ctx = Arc::clone(ctx);
    let progress = self.options.progress.clone();
    let op = self.phase.to_string();

    let (written, parents, managers) = self
      .store
      .in_tx(move |tx| {
        let total = ctx.departments.len();
        for (i, dept) in ctx.departments.iter().enumerate() {
          departments::upsert(tx, dept)?;
          progress.tick(&op, total, i + 1);
        }
        let parents = validate::clear_dangling_parents(tx)?;
        let managers = validate::clear_unknown_managers(tx)?;
        Ok((total, parents, managers))
      })
      .await?;

    self.result.counts.departments = written;
    self.record_repairs(parents, managers);
    info!(count = written, "departments imported");
    Ok(())
  }

  fn record_repairs(&mut self, parents: usize, managers: usize) {
    if parents > 0 {
      warn!(count = parents, "departments with a missing parent demoted to roots");
    }
    if managers > 0 {
      warn!(count = managers, "department managers without a person cleared");
    }
    self.result.diagnostics.department_parents_cleared += parents;
    self.result.diagnostics.department_managers_cleared += managers;
  }

  // ── OrphanDepartments ─────────────────────────────────────────────────────

  async fn orphan_departments(&mut self, ctx: &Arc<ImportContext>) -> Result<()> {
    let ctx = Arc::clone(ctx);
    let progress = self.options.progress.clone();
    let op = self.phase.to_string();

    let created = self
      .store
      .in_tx(move |tx| {
        let total = ctx.referenced_departments.len();
        let mut created = 0;
        for (i, dept) in ctx.referenced_departments.iter().enumerate() {
          progress.tick(&op, total, i + 1);
          if departments::exists_any_source(tx, &dept.external_id)? {
            continue;
          }
          if departments::insert_if_missing(tx, dept)? {
            debug!(external_id = %dept.external_id, source = %dept.source, "department auto-created");
            created += 1;
          }
        }
        Ok(created)
      })
      .await?;

    self.result.counts.departments_auto_created = created;
    if created > 0 {
      info!(count = created, "departments auto-created from contract references");
    }
    Ok(())
  }

  // ── Contacts ──────────────────────────────────────────────────────────────

  async fn contacts(&mut self, ctx: &Arc<ImportContext>) -> Result<()> {
    let ctx = Arc::clone(ctx);
    let written_persons = Arc::clone(&self.persons);
    let progress = self.options.progress.clone();
    let op = self.phase.to_string();

    let (written, skipped) = self
      .store
      .in_tx(move |tx| {
        let total = ctx.contacts.len();
        let mut seen: HashSet<(&str, ContactKind)> = HashSet::new();
        let (mut written, mut skipped) = (0, 0);

        for (i, contact) in ctx.contacts.iter().enumerate() {
          progress.tick(&op, total, i + 1);
          let row = &contact.row;
          if !written_persons.contains(&contact.owner)
            || !seen.insert((row.person_id.as_str(), row.kind))
          {
            skipped += 1;
            continue;
          }
          contacts::upsert(tx, row)?;
          written += 1;
        }
        Ok((written, skipped))
      })
      .await?;

    self.result.counts.contacts = written;
    self.result.diagnostics.duplicate_contacts = skipped;
    if skipped > 0 {
      warn!(count = skipped, "duplicate contacts skipped");
    }
    info!(count = written, "contacts imported");
    Ok(())
  }

  // ── Contracts ─────────────────────────────────────────────────────────────

  async fn contracts(&mut self, ctx: &Arc<ImportContext>) -> Result<()> {
    let ctx = Arc::clone(ctx);
    let written_persons = Arc::clone(&self.persons);
    let progress = self.options.progress.clone();
    let op = self.phase.to_string();

    let (written, duplicates, without_person, empty_guids) = self
      .store
      .in_tx(move |tx| {
        let total = ctx.contracts.len();
        let mut seen = HashSet::new();
        let mut written = HashSet::new();
        let (mut duplicates, mut without_person) = (0, 0);

        for (i, contract) in ctx.contracts.iter().enumerate() {
          progress.tick(&op, total, i + 1);
          let row = &contract.row;
          if !seen.insert(row.external_id.as_str()) {
            warn!(external_id = %row.external_id, "duplicate contract skipped");
            duplicates += 1;
            continue;
          }
          if !written_persons.contains(&contract.owner) {
            without_person += 1;
            continue;
          }
          contracts::upsert(tx, row)?;
          written.insert(i);
        }
        let empty_guids = ctx.empty_manager_contracts.intersection(&written).count();
        Ok((written, duplicates, without_person, empty_guids))
      })
      .await?;

    self.result.counts.contracts = written.len();
    self.result.counts.empty_manager_guids = empty_guids;
    self.result.diagnostics.duplicate_contracts = duplicates;
    self.result.diagnostics.contracts_without_person = without_person;
    if without_person > 0 {
      warn!(count = without_person, "contracts of skipped persons dropped");
    }
    if empty_guids > 0 {
      warn!(count = empty_guids, "empty manager GUIDs stored as null");
    }
    info!(count = written.len(), duplicates, "contracts imported");
    self.contracts = Arc::new(written);
    Ok(())
  }

  // ── ReferenceValidation ───────────────────────────────────────────────────

  async fn reference_validation(&mut self) -> Result<()> {
    let (parents, managers, orphans) = self
      .store
      .in_tx(|tx| {
        let parents = validate::clear_dangling_parents(tx)?;
        let managers = validate::clear_unknown_managers(tx)?;
        let orphans = validate::orphaned_references(tx)?;
        Ok((parents, managers, orphans))
      })
      .await?;

    self.record_repairs(parents, managers);
    for o in &orphans {
      debug!(
        contract = %o.contract_external_id,
        kind = %o.kind,
        external_id = %o.external_id,
        source = %o.source,
        "orphaned contract reference"
      );
    }
    if !orphans.is_empty() {
      warn!(count = orphans.len(), "contract references without a matching lookup row");
    }
    self.result.diagnostics.orphaned_references = orphans;
    Ok(())
  }

  // ── PrimaryManagerCompute ─────────────────────────────────────────────────

  async fn primary_managers(&mut self) -> Result<()> {
    let policy = self.options.manager_policy;
    let on = reference_date(self.options.reference_date);

    if policy.is_computed() {
      let computed = self
        .store
        .with_conn(move |conn| managers::refresh_all(conn, policy, on))
        .await?;
      self.result.counts.primary_managers_computed = computed;
    } else {
      let detection = self
        .store
        .with_conn(move |conn| managers::detect(conn, on))
        .await?;
      self.result.policy_detection = Some(detection);
    }
    Ok(())
  }

  // ── CustomFieldSchemas ────────────────────────────────────────────────────

  async fn custom_field_schemas(&mut self, ctx: &Arc<ImportContext>) -> Result<()> {
    let ctx = Arc::clone(ctx);
    let progress = self.options.progress.clone();
    let op = self.phase.to_string();

    let (for_persons, for_contracts) = self
      .store
      .in_tx(move |tx| {
        let total = ctx.custom_schemas.len();
        let (mut for_persons, mut for_contracts) = (0, 0);
        for (i, schema) in ctx.custom_schemas.iter().enumerate() {
          progress.tick(&op, total, i + 1);
          if !custom_fields::insert_schema(tx, schema)? {
            continue;
          }
          match schema.table {
            CustomFieldTable::Persons => for_persons += 1,
            CustomFieldTable::Contracts => for_contracts += 1,
          }
        }
        Ok((for_persons, for_contracts))
      })
      .await?;

    self.result.counts.custom_field_schemas_persons = for_persons;
    self.result.counts.custom_field_schemas_contracts = for_contracts;
    info!(persons = for_persons, contracts = for_contracts, "custom field schemas inferred");
    Ok(())
  }

  // ── CustomFieldValues ─────────────────────────────────────────────────────

  async fn custom_field_values(&mut self, ctx: &Arc<ImportContext>) -> Result<()> {
    let ctx = Arc::clone(ctx);
    let written_persons = Arc::clone(&self.persons);
    let written_contracts = Arc::clone(&self.contracts);
    let progress = self.options.progress.clone();
    let op = self.phase.to_string();

    let written = self
      .store
      .in_tx(move |tx| {
        let total = ctx.custom_values.len();
        let mut written = 0;
        for (i, values) in ctx.custom_values.iter().enumerate() {
          progress.tick(&op, total, i + 1);
          let owner_written = match values.row.table {
            CustomFieldTable::Persons => written_persons.contains(&values.owner),
            CustomFieldTable::Contracts => written_contracts.contains(&values.owner),
          };
          if owner_written {
            custom_fields::upsert_values(tx, &values.row)?;
            written += 1;
          }
        }
        Ok(written)
      })
      .await?;

    self.result.counts.custom_field_values = written;
    info!(count = written, "custom field values stored");
    Ok(())
  }
}
