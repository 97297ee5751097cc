//! Reference identity resolution.
//!
//! Contracts point at organisational entities through `{ExternalId?, Name?}`
//! objects. An explicit external id is authoritative. An anonymous reference
//! that only carries a display name gets a placeholder identity scoped to the
//! contract's source, and every later anonymous reference with the same name
//! and source collapses onto that same identity.

use std::collections::{BTreeMap, HashMap};

use uuid::Uuid;

use crate::{
  document::{ReferenceEntry, non_blank},
  model::ReferenceKind,
};

/// Namespace for placeholder identities; see [`placeholder_id`].
const PLACEHOLDER_NAMESPACE: Uuid =
  Uuid::from_u128(0x6f1d_2c3e_8a4b_4c5d_9e6f_7a8b_9c0d_1e2f);

/// Placeholder identities handed out so far, keyed by `source|name`.
#[derive(Debug, Clone, Default)]
pub struct SeenMap {
  ids: HashMap<String, String>,
}

impl SeenMap {
  pub fn len(&self) -> usize { self.ids.len() }

  pub fn is_empty(&self) -> bool { self.ids.is_empty() }

  pub fn get(&self, source: &str, name: &str) -> Option<&str> {
    self.ids.get(&seen_key(source, name)).map(String::as_str)
  }
}

/// One [`SeenMap`] per reference kind, so a team and a location that share a
/// display name stay distinct.
#[derive(Debug, Clone, Default)]
pub struct SeenMaps {
  maps: BTreeMap<ReferenceKind, SeenMap>,
}

impl SeenMaps {
  pub fn resolve(
    &mut self,
    kind: ReferenceKind,
    reference: Option<&ReferenceEntry>,
    source: &str,
  ) -> Option<String> {
    let seen = self.maps.entry(kind).or_default();
    resolve_reference(kind, reference, source, seen)
  }

  pub fn get(&self, kind: ReferenceKind) -> Option<&SeenMap> { self.maps.get(&kind) }
}

fn seen_key(source: &str, name: &str) -> String { format!("{source}|{name}") }

/// The external id to store on a contract for `reference`.
///
/// - explicit, non-blank `ExternalId` → returned unchanged
/// - only a `Name` → the placeholder recorded in `seen` for `source|name`,
///   generating and recording one on first sight
/// - neither → `None`
pub fn resolve_reference(
  kind: ReferenceKind,
  reference: Option<&ReferenceEntry>,
  source: &str,
  seen: &mut SeenMap,
) -> Option<String> {
  let reference = reference?;

  if let Some(id) = non_blank(reference.external_id.as_deref()) {
    return Some(id.to_owned());
  }

  let name = non_blank(reference.name.as_deref())?;
  let id = seen
    .ids
    .entry(seen_key(source, name))
    .or_insert_with(|| placeholder_id(kind, source, name));
  Some(id.clone())
}

/// Placeholders are name-based UUIDs so a re-import of the same document maps
/// anonymous references onto the rows it created the first time.
fn placeholder_id(kind: ReferenceKind, source: &str, name: &str) -> String {
  let seed = format!("{kind}|{source}|{name}");
  Uuid::new_v5(&PLACEHOLDER_NAMESPACE, seed.as_bytes()).to_string()
}
