use std::{collections::BTreeMap, sync::LazyLock};

use rusqlite::{Connection, Row, ToSql, Transaction};
use vault_core::model::{Contract, ContractView, ReferenceKind};

use crate::{
  Result,
  encode::{RawContract, RawReference, encode_date},
};

/// Every reference kind in column order. The department comes first so its
/// join alias is `r0`.
const KINDS: [ReferenceKind; 9] = [
  ReferenceKind::Department,
  ReferenceKind::Location,
  ReferenceKind::CostCenter,
  ReferenceKind::CostBearer,
  ReferenceKind::Employer,
  ReferenceKind::Team,
  ReferenceKind::Division,
  ReferenceKind::Title,
  ReferenceKind::Organization,
];

const FIXED_COLUMNS: [&str; 12] = [
  "external_id",
  "person_id",
  "source",
  "start_date",
  "end_date",
  "type_code",
  "type_description",
  "fte",
  "hours_per_week",
  "percentage",
  "sequence",
  "manager_person_external_id",
];

fn all_columns() -> Vec<String> {
  let mut cols: Vec<String> = FIXED_COLUMNS.iter().map(|c| (*c).to_owned()).collect();
  for kind in KINDS {
    let prefix = kind.column_prefix();
    cols.push(format!("{prefix}_external_id"));
    cols.push(format!("{prefix}_source"));
  }
  cols
}

static UPSERT_SQL: LazyLock<String> = LazyLock::new(|| {
  let cols = all_columns();
  let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
  let updates: Vec<String> = cols
    .iter()
    .skip(1)
    .map(|c| format!("{c} = excluded.{c}"))
    .collect();
  format!(
    "INSERT INTO contracts ({}) VALUES ({}) ON CONFLICT (external_id) DO UPDATE SET {}",
    cols.join(", "),
    placeholders.join(", "),
    updates.join(", "),
  )
});

/// The contract view query without its `WHERE` clause. Lookup labels come
/// from a join on the full `(external_id, source)` pair; a department's label
/// is its display name.
static VIEW_SQL: LazyLock<String> = LazyLock::new(|| {
  let mut select: Vec<String> = FIXED_COLUMNS.iter().map(|c| format!("c.{c}")).collect();
  let mut joins = Vec::with_capacity(KINDS.len());

  for (i, kind) in KINDS.iter().enumerate() {
    let prefix = kind.column_prefix();
    let label = if *kind == ReferenceKind::Department { "display_name" } else { "name" };
    select.push(format!("c.{prefix}_external_id"));
    select.push(format!("c.{prefix}_source"));
    select.push(format!("r{i}.code"));
    select.push(format!("r{i}.{label}"));
    joins.push(format!(
      "LEFT JOIN {table} r{i} ON r{i}.external_id = c.{prefix}_external_id \
       AND r{i}.source = c.{prefix}_source",
      table = kind.table(),
    ));
  }
  select.push("r0.parent_external_id".into());
  select.push("r0.manager_person_id".into());
  select.push("cf.fields_json".into());

  format!(
    "SELECT {} FROM contracts c {} \
     LEFT JOIN custom_field_values cf \
       ON cf.table_name = 'contracts' AND cf.entity_id = c.external_id",
    select.join(", "),
    joins.join(" "),
  )
});

/// Insert or update a contract by `external_id`.
pub fn upsert(tx: &Transaction<'_>, contract: &Contract) -> Result<()> {
  let start_date = contract.start_date.map(encode_date);
  let end_date = contract.end_date.map(encode_date);
  let refs: Vec<(Option<&str>, Option<&str>)> = KINDS
    .iter()
    .map(|kind| {
      contract
        .reference(*kind)
        .map(|k| (k.external_id.as_str(), k.source.as_str()))
        .unzip()
    })
    .collect();

  let mut params: Vec<&dyn ToSql> = vec![
    &contract.external_id,
    &contract.person_id,
    &contract.source,
    &start_date,
    &end_date,
    &contract.type_code,
    &contract.type_description,
    &contract.fte,
    &contract.hours_per_week,
    &contract.percentage,
    &contract.sequence,
    &contract.manager_person_id,
  ];
  for (external_id, source) in &refs {
    params.push(external_id);
    params.push(source);
  }

  tx.execute(UPSERT_SQL.as_str(), params.as_slice())?;
  Ok(())
}

fn row_to_raw(r: &Row<'_>) -> rusqlite::Result<RawContract> {
  let base = FIXED_COLUMNS.len();
  let references = KINDS
    .iter()
    .enumerate()
    .map(|(i, &kind)| {
      let at = base + i * 4;
      Ok(RawReference {
        kind,
        external_id: r.get(at)?,
        source: r.get(at + 1)?,
        code: r.get(at + 2)?,
        name: r.get(at + 3)?,
      })
    })
    .collect::<rusqlite::Result<Vec<_>>>()?;
  let tail = base + KINDS.len() * 4;

  Ok(RawContract {
    external_id: r.get(0)?,
    person_id: r.get(1)?,
    source: r.get(2)?,
    start_date: r.get(3)?,
    end_date: r.get(4)?,
    type_code: r.get(5)?,
    type_description: r.get(6)?,
    fte: r.get(7)?,
    hours_per_week: r.get(8)?,
    percentage: r.get(9)?,
    sequence: r.get(10)?,
    manager_person_id: r.get(11)?,
    references,
    department_parent_external_id: r.get(tail)?,
    department_manager_person_id: r.get(tail + 1)?,
    custom_json: r.get(tail + 2)?,
  })
}

/// All contracts of one person, in insertion order.
pub fn views_for_person(conn: &Connection, person_id: &str) -> Result<Vec<ContractView>> {
  let sql = format!("{} WHERE c.person_id = ?1 ORDER BY c.rowid", VIEW_SQL.as_str());
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map(rusqlite::params![person_id], row_to_raw)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawContract::decode).collect()
}

/// Every contract grouped by owning person, each group in insertion order.
pub fn views_by_person(conn: &Connection) -> Result<BTreeMap<String, Vec<ContractView>>> {
  let sql = format!("{} ORDER BY c.person_id, c.rowid", VIEW_SQL.as_str());
  let mut stmt = conn.prepare(&sql)?;
  let raws = stmt
    .query_map([], row_to_raw)?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut grouped: BTreeMap<String, Vec<ContractView>> = BTreeMap::new();
  for raw in raws {
    let view = raw.decode()?;
    grouped.entry(view.contract.person_id.clone()).or_default().push(view);
  }
  Ok(grouped)
}
