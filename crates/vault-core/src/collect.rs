//! Reference data collection.
//!
//! One pass over the document in order (persons → their contracts, then the
//! top-level departments) that maps every record onto a domain row and
//! gathers the deduplicated lookup entities. No I/O happens here; the storage
//! backend consumes the resulting [`ImportContext`] phase by phase.

use std::collections::{BTreeMap, HashSet};

use serde_json::Value;
use uuid::Uuid;

use crate::{
  document::{
    ContactEntry, ContractEntry, ManagerEntry, PersonEntry, SourceEntry,
    VaultDocument, non_blank,
  },
  identity::SeenMaps,
  model::{
    Contact, ContactKind, Contract, CustomFieldSchema, CustomFieldTable,
    CustomFieldValues, Department, EMPTY_GUID, EntityKey, LookupEntity, Person,
    ReferenceKind, SourceSystem, UNKNOWN_SOURCE,
  },
};

const PERSON_ID_NAMESPACE: Uuid =
  Uuid::from_u128(0x3b7e_91a4_0c2d_4f6e_8a15_d2c4_6b8e_0f31);

/// A row tied to the document record it came from.
///
/// `owner` indexes [`ImportContext::persons`] for contacts, contracts and
/// person custom values, and [`ImportContext::contracts`] for contract custom
/// values. Two records may share an identifier; the owner tells them apart
/// once one of them has been skipped.
#[derive(Debug, Clone)]
pub struct Owned<T> {
  pub owner: usize,
  pub row:   T,
}

/// Everything an import needs, in document order.
#[derive(Debug, Default)]
pub struct ImportContext {
  pub source_systems:          Vec<SourceSystem>,
  /// First occurrence of each `(external_id, source)` per lookup kind.
  pub lookups:                 BTreeMap<ReferenceKind, Vec<LookupEntity>>,
  pub persons:                 Vec<Person>,
  pub contacts:                Vec<Owned<Contact>>,
  pub departments:             Vec<Department>,
  /// Departments as referenced from contracts: display name plus the
  /// contract's source. Declared departments take precedence over these.
  pub referenced_departments:  Vec<Department>,
  pub contracts:               Vec<Owned<Contract>>,
  pub custom_schemas:          Vec<CustomFieldSchema>,
  pub custom_values:           Vec<Owned<CustomFieldValues>>,
  pub seen:                    SeenMaps,
  /// Indexes into `contracts` whose manager was [`EMPTY_GUID`] and is now
  /// null.
  pub empty_manager_contracts: HashSet<usize>,
  /// Records dropped because they carried no usable identifier.
  pub skipped_without_id:      usize,
}

impl ImportContext {
  pub fn lookups_of(&self, kind: ReferenceKind) -> &[LookupEntity] {
    self.lookups.get(&kind).map(Vec::as_slice).unwrap_or_default()
  }
}

#[derive(Default)]
struct Collector {
  ctx:              ImportContext,
  seen_sources:     HashSet<String>,
  seen_lookups:     HashSet<(ReferenceKind, EntityKey)>,
  seen_referenced:  HashSet<EntityKey>,
  seen_schemas:     HashSet<(CustomFieldTable, String)>,
}

/// Walk `doc` once and build the [`ImportContext`].
pub fn collect(doc: &VaultDocument) -> ImportContext {
  let mut c = Collector::default();

  for person in &doc.persons {
    c.person(person);
  }

  for entry in &doc.departments {
    let Some(external_id) = non_blank(entry.external_id.as_deref()) else {
      c.ctx.skipped_without_id += 1;
      continue;
    };
    let source = c.source(entry.source.as_ref(), UNKNOWN_SOURCE);
    let (manager_person_id, _) = manager(entry.manager.as_ref());
    c.ctx.departments.push(Department {
      external_id: external_id.to_owned(),
      source,
      display_name: entry.display_name.clone(),
      code: entry.code.clone(),
      parent_external_id: non_blank(entry.parent_external_id.as_deref())
        .map(str::to_owned),
      manager_person_id,
    });
  }

  c.ctx
}

impl Collector {
  /// Register `entry` as a source system and return its id, or `fallback`
  /// when the entry names none.
  fn source(&mut self, entry: Option<&SourceEntry>, fallback: &str) -> String {
    let id = entry.and_then(SourceEntry::id).unwrap_or(fallback).to_owned();
    if self.seen_sources.insert(id.clone()) {
      self.ctx.source_systems.push(SourceSystem {
        system_id:          id.clone(),
        display_name:       entry.and_then(|e| e.display_name.clone()),
        identification_key: entry.and_then(|e| e.identification_key.clone()),
      });
    }
    id
  }

  fn person(&mut self, entry: &PersonEntry) {
    let doc_person_id = non_blank(entry.person_id.as_deref());
    let Some(external_id) =
      non_blank(entry.external_id.as_deref()).or(doc_person_id)
    else {
      self.ctx.skipped_without_id += 1;
      return;
    };

    let source = self.source(entry.source.as_ref(), UNKNOWN_SOURCE);
    let person_id = doc_person_id.map(str::to_owned).unwrap_or_else(|| {
      let seed = format!("{source}|{external_id}");
      Uuid::new_v5(&PERSON_ID_NAMESPACE, seed.as_bytes()).to_string()
    });
    let (imported_manager_person_id, _) = manager(entry.primary_manager.as_ref());

    let owner = self.ctx.persons.len();
    self.ctx.persons.push(Person {
      person_id: person_id.clone(),
      external_id: external_id.to_owned(),
      display_name: entry.display_name.clone(),
      given_name: entry.given_name.clone(),
      family_name: entry.family_name.clone(),
      initials: entry.initials.clone(),
      user_name: entry.user_name.clone(),
      gender: entry.gender.clone(),
      birth_date: entry.birth_date,
      excluded: entry.excluded,
      blocked: entry.blocked,
      source: source.clone(),
      imported_manager_person_id,
    });

    if let Some(set) = &entry.contact {
      for (kind, contact) in [
        (ContactKind::Personal, &set.personal),
        (ContactKind::Business, &set.business),
      ] {
        if let Some(contact) = contact.as_ref().and_then(|c| map_contact(&person_id, kind, c)) {
          self.ctx.contacts.push(Owned { owner, row: contact });
        }
      }
    }

    self.custom(CustomFieldTable::Persons, owner, &person_id, &entry.custom);

    for contract in &entry.contracts {
      self.contract(owner, &person_id, &source, contract);
    }
  }

  fn contract(
    &mut self,
    owner: usize,
    person_id: &str,
    person_source: &str,
    entry: &ContractEntry,
  ) {
    let Some(external_id) = non_blank(entry.external_id.as_deref()) else {
      self.ctx.skipped_without_id += 1;
      return;
    };
    let source = self.source(entry.source.as_ref(), person_source);

    let mut references = BTreeMap::new();
    for (kind, reference) in [
      (ReferenceKind::Location, &entry.location),
      (ReferenceKind::Department, &entry.department),
      (ReferenceKind::CostCenter, &entry.cost_center),
      (ReferenceKind::CostBearer, &entry.cost_bearer),
      (ReferenceKind::Employer, &entry.employer),
      (ReferenceKind::Team, &entry.team),
      (ReferenceKind::Division, &entry.division),
      (ReferenceKind::Title, &entry.title),
      (ReferenceKind::Organization, &entry.organization),
    ] {
      let Some(id) = self.ctx.seen.resolve(kind, reference.as_ref(), &source) else {
        continue;
      };
      let key = EntityKey::new(id, &source);
      let reference = reference.as_ref();
      let name = reference.and_then(|r| r.name.clone());

      if kind == ReferenceKind::Department {
        if self.seen_referenced.insert(key.clone()) {
          self.ctx.referenced_departments.push(Department {
            external_id:        key.external_id.clone(),
            source:             key.source.clone(),
            display_name:       name,
            code:               None,
            parent_external_id: None,
            manager_person_id:  None,
          });
        }
      } else if self.seen_lookups.insert((kind, key.clone())) {
        self.ctx.lookups.entry(kind).or_default().push(LookupEntity {
          kind,
          external_id: key.external_id.clone(),
          source: key.source.clone(),
          code: reference.and_then(|r| r.code.clone()),
          name,
        });
      }
      references.insert(kind, key);
    }

    let index = self.ctx.contracts.len();
    let (manager_person_id, empty_guid) = manager(entry.manager.as_ref());
    if empty_guid {
      self.ctx.empty_manager_contracts.insert(index);
    }
    let kind = entry.kind.as_ref();
    let details = entry.details.as_ref();

    let row = Contract {
      external_id: external_id.to_owned(),
      person_id: person_id.to_owned(),
      source,
      start_date: entry.start_date,
      end_date: entry.end_date,
      type_code: kind.and_then(|k| k.code.clone()),
      type_description: kind.and_then(|k| k.description.clone()),
      fte: details.and_then(|d| d.fte),
      hours_per_week: details.and_then(|d| d.hours_per_week),
      percentage: details.and_then(|d| d.percentage),
      sequence: details.and_then(|d| d.sequence),
      manager_person_id,
      references,
    };
    self.ctx.contracts.push(Owned { owner, row });

    self.custom(CustomFieldTable::Contracts, index, external_id, &entry.custom);
  }

  fn custom(
    &mut self,
    table: CustomFieldTable,
    owner: usize,
    entity_id: &str,
    custom: &BTreeMap<String, Value>,
  ) {
    let fields: BTreeMap<String, String> = custom
      .iter()
      .filter_map(|(k, v)| custom_text(v).map(|t| (k.clone(), t)))
      .collect();

    for key in fields.keys() {
      if self.seen_schemas.insert((table, key.clone())) {
        self.ctx.custom_schemas.push(CustomFieldSchema {
          table,
          field_key: key.clone(),
          display_name: key.clone(),
        });
      }
    }

    if !fields.is_empty() {
      let row = CustomFieldValues { table, entity_id: entity_id.to_owned(), fields };
      self.ctx.custom_values.push(Owned { owner, row });
    }
  }
}

/// The person a manager reference names, and whether it was the all-zero
/// GUID. The sentinel is never returned as an id.
fn manager(entry: Option<&ManagerEntry>) -> (Option<String>, bool) {
  match non_blank(entry.and_then(|m| m.person_id.as_deref())) {
    Some(id) if id.eq_ignore_ascii_case(EMPTY_GUID) => (None, true),
    id => (id.map(str::to_owned), false),
  }
}

fn map_contact(person_id: &str, kind: ContactKind, entry: &ContactEntry) -> Option<Contact> {
  let phone = entry.phone.as_ref();
  let address = entry.address.as_ref();
  let contact = Contact {
    person_id:    person_id.to_owned(),
    kind,
    email:        entry.email.clone(),
    phone_mobile: phone.and_then(|p| p.mobile.clone()),
    phone_fixed:  phone.and_then(|p| p.fixed.clone()),
    street:       address.and_then(|a| a.street.clone()),
    house_number: address.and_then(|a| a.house_number.clone()),
    postal_code:  address.and_then(|a| a.postal_code.clone()),
    locality:     address.and_then(|a| a.locality.clone()),
    country:      address.and_then(|a| a.country.clone()),
  };

  let empty = [
    &contact.email,
    &contact.phone_mobile,
    &contact.phone_fixed,
    &contact.street,
    &contact.house_number,
    &contact.postal_code,
    &contact.locality,
    &contact.country,
  ]
  .iter()
  .all(|f| non_blank(f.as_deref()).is_none());

  (!empty).then_some(contact)
}

/// Custom values are always stored as text.
fn custom_text(value: &Value) -> Option<String> {
  match value {
    Value::Null => None,
    Value::String(s) => Some(s.clone()),
    other => Some(other.to_string()),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  fn doc(value: Value) -> VaultDocument {
    crate::document::parse(&value.to_string()).unwrap()
  }

  #[test]
  fn anonymous_references_dedupe_by_name_and_source() {
    let ctx = collect(&doc(json!({
      "Persons": [{
        "ExternalId": "P1",
        "Source": { "SystemId": "S1" },
        "Contracts": [
          { "ExternalId": "C1", "Location": { "Name": "HQ" } },
          { "ExternalId": "C2", "Location": { "Name": "HQ" } },
          { "ExternalId": "C3", "Location": { "Name": "Depot" } },
        ],
      }],
    })));

    let loc = |i: usize| {
      ctx.contracts[i]
        .row
        .reference(ReferenceKind::Location)
        .unwrap()
        .external_id
        .clone()
    };
    assert_eq!(loc(0), loc(1));
    assert_ne!(loc(0), loc(2));
    assert_eq!(ctx.lookups_of(ReferenceKind::Location).len(), 2);
  }

  #[test]
  fn contract_inherits_person_source() {
    let ctx = collect(&doc(json!({
      "Persons": [{
        "ExternalId": "P1",
        "Source": { "SystemId": "S1", "DisplayName": "Payroll" },
        "Contracts": [
          { "ExternalId": "C1", "Team": { "ExternalId": "T1" } },
          { "ExternalId": "C2", "Source": { "SystemId": "S2" },
            "Team": { "ExternalId": "T1" } },
        ],
      }],
    })));

    assert_eq!(ctx.contracts[0].row.source, "S1");
    assert_eq!(ctx.contracts[1].row.source, "S2");
    // Same external id under two sources is two lookup rows.
    assert_eq!(ctx.lookups_of(ReferenceKind::Team).len(), 2);
    assert_eq!(ctx.source_systems.len(), 2);
    assert_eq!(ctx.source_systems[0].display_name.as_deref(), Some("Payroll"));
  }

  #[test]
  fn empty_manager_guid_is_nulled_and_marked() {
    let ctx = collect(&doc(json!({
      "Persons": [{
        "ExternalId": "P1",
        "PrimaryManager": { "PersonId": EMPTY_GUID },
        "Contracts": [
          { "ExternalId": "C1", "Manager": { "PersonId": "M1" } },
          { "ExternalId": "C2", "Manager": { "PersonId": EMPTY_GUID } },
        ],
      }],
    })));

    assert_eq!(ctx.persons[0].imported_manager_person_id, None);
    assert_eq!(ctx.contracts[0].row.manager_person_id.as_deref(), Some("M1"));
    assert_eq!(ctx.contracts[1].row.manager_person_id, None);
    assert_eq!(ctx.empty_manager_contracts, HashSet::from([1]));
  }

  #[test]
  fn department_references_become_candidates() {
    let ctx = collect(&doc(json!({
      "Persons": [{
        "ExternalId": "P1",
        "Source": { "SystemId": "S1" },
        "Contracts": [
          { "ExternalId": "C1", "Department": { "ExternalId": "D9", "Name": "Nine" } },
          { "ExternalId": "C2", "Department": { "ExternalId": "D9", "Name": "Nine" } },
        ],
      }],
    })));

    assert_eq!(ctx.referenced_departments.len(), 1);
    let d = &ctx.referenced_departments[0];
    assert_eq!(d.key(), EntityKey::new("D9", "S1"));
    assert_eq!(d.display_name.as_deref(), Some("Nine"));
    assert!(ctx.lookups.get(&ReferenceKind::Department).is_none());
  }

  #[test]
  fn custom_fields_become_text_per_table() {
    let ctx = collect(&doc(json!({
      "Persons": [{
        "ExternalId": "P1",
        "PersonId": "p-1",
        "Custom": { "Badge": 1234, "Nick": "Al", "Empty": null },
        "Contracts": [{ "ExternalId": "C1", "Custom": { "Badge": "x" } }],
      }],
    })));

    assert_eq!(ctx.custom_schemas.len(), 3);
    let person_values = &ctx.custom_values[0].row;
    assert_eq!(person_values.table, CustomFieldTable::Persons);
    assert_eq!(person_values.entity_id, "p-1");
    assert_eq!(person_values.fields.get("Badge").map(String::as_str), Some("1234"));
    assert!(!person_values.fields.contains_key("Empty"));
  }

  #[test]
  fn records_without_identifier_are_skipped() {
    let ctx = collect(&doc(json!({
      "Persons": [
        { "DisplayName": "Nobody" },
        { "PersonId": "p-2", "Contracts": [{ "StartDate": "2024-01-01" }] },
      ],
      "Departments": [{ "DisplayName": "Nameless" }],
    })));

    assert_eq!(ctx.persons.len(), 1);
    assert_eq!(ctx.persons[0].external_id, "p-2");
    assert!(ctx.contracts.is_empty());
    assert_eq!(ctx.skipped_without_id, 3);
  }

  #[test]
  fn generated_person_ids_are_stable() {
    let input = json!({ "Persons": [{ "ExternalId": "P1" }] });
    let a = collect(&doc(input.clone()));
    let b = collect(&doc(input));
    assert_eq!(a.persons[0].person_id, b.persons[0].person_id);
  }
}
