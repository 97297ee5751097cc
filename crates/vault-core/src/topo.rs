//! Parent-first ordering of departments.

use std::collections::{HashMap, HashSet};

use crate::{
  Error, Result,
  model::{Department, EntityKey},
};

/// Order `departments` so every parent present in the input precedes its
/// children.
///
/// Departments whose parent is not part of the input are treated as roots;
/// repairing the dangling parent is left to the consistency validator.
/// Duplicate keys keep their first occurrence. A cycle fails with
/// [`Error::DepartmentCycle`].
pub fn sort_departments(departments: Vec<Department>) -> Result<Vec<Department>> {
  let mut order: Vec<EntityKey> = Vec::with_capacity(departments.len());
  let mut by_key: HashMap<EntityKey, Department> = HashMap::with_capacity(departments.len());
  for d in departments {
    let key = d.key();
    if !by_key.contains_key(&key) {
      order.push(key.clone());
      by_key.insert(key, d);
    }
  }

  let mut sorter = Sorter {
    by_key:   &by_key,
    visiting: Vec::new(),
    visited:  HashSet::with_capacity(order.len()),
    out:      Vec::with_capacity(order.len()),
  };
  for key in &order {
    sorter.visit(key)?;
  }

  let sorted = sorter.out;
  Ok(
    sorted
      .into_iter()
      .filter_map(|k| by_key.get(&k).cloned())
      .collect(),
  )
}

struct Sorter<'a> {
  by_key:   &'a HashMap<EntityKey, Department>,
  /// The current DFS path, root-most first.
  visiting: Vec<EntityKey>,
  visited:  HashSet<EntityKey>,
  out:      Vec<EntityKey>,
}

impl Sorter<'_> {
  fn visit(&mut self, key: &EntityKey) -> Result<()> {
    if self.visited.contains(key) {
      return Ok(());
    }
    if let Some(pos) = self.visiting.iter().position(|k| k == key) {
      let mut chain: Vec<String> = self.visiting[pos..]
        .iter()
        .map(|k| k.external_id.clone())
        .collect();
      chain.push(key.external_id.clone());
      return Err(Error::DepartmentCycle { chain });
    }

    let Some(dept) = self.by_key.get(key) else {
      return Ok(());
    };

    self.visiting.push(key.clone());
    if let Some(parent) = dept.parent_key()
      && self.by_key.contains_key(&parent)
    {
      self.visit(&parent)?;
    }
    self.visiting.pop();

    self.visited.insert(key.clone());
    self.out.push(key.clone());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dept(id: &str, parent: Option<&str>) -> Department {
    Department {
      external_id:        id.into(),
      source:             "S1".into(),
      display_name:       None,
      code:               None,
      parent_external_id: parent.map(Into::into),
      manager_person_id:  None,
    }
  }

  fn index_of(sorted: &[Department], id: &str) -> usize {
    sorted.iter().position(|d| d.external_id == id).unwrap()
  }

  #[test]
  fn parents_come_first() {
    let sorted = sort_departments(vec![
      dept("leaf", Some("mid")),
      dept("mid", Some("root")),
      dept("other", Some("root")),
      dept("root", None),
    ])
    .unwrap();

    assert_eq!(sorted.len(), 4);
    for d in &sorted {
      if let Some(p) = &d.parent_external_id {
        assert!(index_of(&sorted, p) < index_of(&sorted, &d.external_id));
      }
    }
  }

  #[test]
  fn missing_parent_is_a_root() {
    let sorted =
      sort_departments(vec![dept("a", Some("ghost")), dept("b", Some("a"))]).unwrap();
    assert_eq!(index_of(&sorted, "a"), 0);
    assert_eq!(index_of(&sorted, "b"), 1);
  }

  #[test]
  fn parent_in_other_source_is_not_a_parent() {
    let mut child = dept("child", Some("p"));
    child.source = "S2".into();
    let sorted = sort_departments(vec![child, dept("p", None)]).unwrap();
    assert_eq!(index_of(&sorted, "child"), 0);
  }

  #[test]
  fn mutual_parents_are_a_cycle() {
    let err =
      sort_departments(vec![dept("A", Some("B")), dept("B", Some("A"))]).unwrap_err();
    match err {
      Error::DepartmentCycle { chain } => assert_eq!(chain, ["A", "B", "A"]),
      other => panic!("unexpected error: {other}"),
    }
  }

  #[test]
  fn self_parent_is_a_cycle() {
    let err = sort_departments(vec![dept("A", Some("A"))]).unwrap_err();
    assert!(matches!(err, Error::DepartmentCycle { .. }));
  }

  #[test]
  fn duplicates_keep_first_occurrence() {
    let mut second = dept("a", None);
    second.code = Some("dup".into());
    let sorted = sort_departments(vec![dept("a", None), second]).unwrap();
    assert_eq!(sorted.len(), 1);
    assert_eq!(sorted[0].code, None);
  }
}
