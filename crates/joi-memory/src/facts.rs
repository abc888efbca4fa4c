//! [`FactStore`] – structured personal knowledge for one user identity.
//!
//! Holds everything the assistant has been told to remember about its user,
//! addressed two ways:
//!
//! * **Path form** – a dotted key path (`Juan.mascota.nombre`) mapping to a
//!   scalar value, with intermediate keys denoting nested containers.
//! * **Triple form** – two entity names joined by a single labeled,
//!   undirected relation (`Juan —amigos— Ana`).
//!
//! Internally both live in one document: a `BTreeMap` tree for the path
//! facts plus a relation map keyed by the unordered entity pair. `BTreeMap`
//! keeps every level lexicographically sorted, so [`FactStore::render`] is
//! deterministic even after a reload from an unordered backing store.
//!
//! ## Merge semantics
//!
//! Last write wins at every level. Writing a deeper path through a key that
//! currently holds a scalar silently replaces that scalar with a container;
//! sibling values under a shared prefix are preserved. A relation written
//! for an entity pair that already has one overwrites the label — there is
//! never more than one edge per unordered pair.
//!
//! ## Persistence
//!
//! The document is loaded once when the store is opened and written back
//! after every mutation (write-through, no batching). Both directions are
//! fail-soft: a missing or corrupt document yields an empty store, and a
//! failed write is logged while the in-memory state stays authoritative
//! until the next successful persist.
//!
//! # Example
//!
//! ```rust
//! use joi_memory::document::SqliteDocumentStore;
//! use joi_memory::facts::FactStore;
//!
//! let backing = SqliteDocumentStore::open_in_memory().unwrap();
//! let mut facts = FactStore::open("juan", Box::new(backing));
//!
//! facts.upsert_path("Juan.mascota.nombre", "Bigotes".into()).unwrap();
//! facts.upsert_path("Juan.mascota.tipo", "gato".into()).unwrap();
//! facts.upsert_relation("Juan", "amigos", "Ana").unwrap();
//!
//! let block = facts.render();
//! assert!(block.contains("nombre: Bigotes"));
//! assert!(block.contains("tipo: gato"));
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

use crate::document::DocumentStore;

// ─────────────────────────────────────────────────────────────────────────────
// Error type
// ─────────────────────────────────────────────────────────────────────────────

/// Validation errors for fact writes.
///
/// These are the only ways an upsert can fail; absent paths are never an
/// error (containers are created as needed), and persistence problems are
/// handled fail-soft rather than surfaced here.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum FactError {
    #[error("fact path must not be empty")]
    EmptyPath,
    #[error("fact value must be a string, number, or boolean")]
    UnsupportedValue,
    #[error("entity and relation names must not be empty")]
    EmptyEntity,
}

// ─────────────────────────────────────────────────────────────────────────────
// Document shape
// ─────────────────────────────────────────────────────────────────────────────

/// One node in the path-fact tree: either a scalar leaf or a container of
/// further nodes. Serializes transparently to nested JSON objects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FactNode {
    Branch(BTreeMap<String, FactNode>),
    Leaf(Value),
}

/// Wire form of one undirected relation; `a <= b` lexicographically.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RelationEntry {
    a: String,
    b: String,
    relation: String,
}

/// The persisted document: path tree plus relation list.
#[derive(Debug, Default, Serialize, Deserialize)]
struct FactDocument {
    #[serde(default)]
    facts: BTreeMap<String, FactNode>,
    #[serde(default)]
    relations: Vec<RelationEntry>,
}

// ─────────────────────────────────────────────────────────────────────────────
// FactStore
// ─────────────────────────────────────────────────────────────────────────────

/// The fact collection for a single user identity.
///
/// The store owns its document exclusively; the identity doubles as the
/// document key in the backing [`DocumentStore`]. All mutation is
/// synchronous and single-writer – sessions that share an identity must
/// serialize access externally (a mutex per identity is sufficient; the
/// last-write-wins rules above hold across interleaved writers).
pub struct FactStore {
    identity: String,
    tree: BTreeMap<String, FactNode>,
    relations: BTreeMap<(String, String), String>,
    backing: Box<dyn DocumentStore>,
}

impl FactStore {
    /// Open the fact store for `identity`, loading any persisted document.
    ///
    /// Never fails: a missing, unreadable, or corrupt document produces an
    /// empty store and a warning in the log.
    pub fn open(identity: impl Into<String>, backing: Box<dyn DocumentStore>) -> Self {
        let mut store = Self {
            identity: identity.into(),
            tree: BTreeMap::new(),
            relations: BTreeMap::new(),
            backing,
        };
        store.load();
        store
    }

    /// Reload the document from the backing store, replacing in-memory state.
    ///
    /// Fail-soft: on any error the store is left empty and a warning is
    /// logged.
    pub fn load(&mut self) {
        self.tree.clear();
        self.relations.clear();
        let bytes = match self.backing.get(&self.identity) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return,
            Err(e) => {
                warn!(identity = %self.identity, error = %e, "failed to load facts; starting empty");
                return;
            }
        };
        match serde_json::from_slice::<FactDocument>(&bytes) {
            Ok(doc) => {
                self.tree = doc.facts;
                for entry in doc.relations {
                    self.relations
                        .insert(pair_key(&entry.a, &entry.b), entry.relation);
                }
            }
            Err(e) => {
                warn!(identity = %self.identity, error = %e, "corrupt fact document; starting empty");
            }
        }
    }

    /// Write the current document to the backing store.
    ///
    /// Fail-soft: a failed write is logged and the in-memory store remains
    /// authoritative until the next successful persist.
    pub fn persist(&mut self) {
        let doc = FactDocument {
            facts: self.tree.clone(),
            relations: self
                .relations
                .iter()
                .map(|((a, b), relation)| RelationEntry {
                    a: a.clone(),
                    b: b.clone(),
                    relation: relation.clone(),
                })
                .collect(),
        };
        let bytes = match serde_json::to_vec(&doc) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(identity = %self.identity, error = %e, "failed to serialize fact document");
                return;
            }
        };
        if let Err(e) = self.backing.set(&self.identity, &bytes) {
            warn!(identity = %self.identity, error = %e, "failed to persist facts; keeping in-memory state");
        }
    }

    /// Write `value` at the dotted `path`, creating containers as needed.
    ///
    /// # Errors
    ///
    /// [`FactError::EmptyPath`] when the path (or any of its segments) is
    /// empty, [`FactError::UnsupportedValue`] when the value is not a
    /// string, number, or boolean. Nothing is persisted on error.
    pub fn upsert_path(&mut self, path: &str, value: Value) -> Result<(), FactError> {
        let keys: Vec<&str> = path.split('.').map(str::trim).collect();
        if path.trim().is_empty() || keys.iter().any(|k| k.is_empty()) {
            return Err(FactError::EmptyPath);
        }
        if !matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_)) {
            return Err(FactError::UnsupportedValue);
        }
        set_nested(&mut self.tree, &keys, value);
        self.persist();
        Ok(())
    }

    /// Set the relation label between entities `a` and `b`.
    ///
    /// The relation is undirected and unique per pair: a later call for the
    /// same two entities (in either order) overwrites the label.
    pub fn upsert_relation(&mut self, a: &str, relation: &str, b: &str) -> Result<(), FactError> {
        let (a, relation, b) = (a.trim(), relation.trim(), b.trim());
        if a.is_empty() || relation.is_empty() || b.is_empty() {
            return Err(FactError::EmptyEntity);
        }
        self.relations.insert(pair_key(a, b), relation.to_string());
        self.persist();
        Ok(())
    }

    /// Read back the scalar stored at a dotted path, if any.
    ///
    /// Returns `None` for absent paths and for paths that address a
    /// container rather than a leaf.
    pub fn value_at(&self, path: &str) -> Option<&Value> {
        let keys: Vec<&str> = path.split('.').map(str::trim).collect();
        let (last, prefix) = keys.split_last()?;
        let mut map = &self.tree;
        for key in prefix {
            match map.get(*key)? {
                FactNode::Branch(child) => map = child,
                // A scalar at a prefix means the deeper path does not exist.
                FactNode::Leaf(_) => return None,
            }
        }
        match map.get(*last)? {
            FactNode::Leaf(value) => Some(value),
            FactNode::Branch(_) => None,
        }
    }

    /// All `(relation, neighbor)` lines for `entity`, formatted as
    /// `relation: neighbor`. Unknown entities yield an empty vec.
    pub fn query(&self, entity: &str) -> Vec<String> {
        self.relations
            .iter()
            .filter_map(|((a, b), relation)| {
                if a == entity {
                    Some(format!("{relation}: {b}"))
                } else if b == entity {
                    Some(format!("{relation}: {a}"))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Flatten the store into an indentation-nested text block for prompt
    /// injection.
    ///
    /// Deterministic: keys at every level appear in lexicographic order.
    /// An empty store renders as the empty string, with no header.
    pub fn render(&self) -> String {
        let mut lines = Vec::new();
        render_tree(&self.tree, 0, &mut lines);
        for ((a, b), relation) in &self.relations {
            lines.push(format!("- {a} <-> {b}: {relation}"));
        }
        lines.join("\n")
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty() && self.relations.is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Internal helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Normalize an entity pair to its unordered key.
fn pair_key(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_string(), b.to_string())
    } else {
        (b.to_string(), a.to_string())
    }
}

/// Walk `keys` into the tree, replacing any scalar found at an intermediate
/// key with a fresh container.
fn set_nested(map: &mut BTreeMap<String, FactNode>, keys: &[&str], value: Value) {
    let (first, rest) = keys
        .split_first()
        .expect("set_nested called with validated, non-empty path");
    if rest.is_empty() {
        map.insert((*first).to_string(), FactNode::Leaf(value));
        return;
    }
    let entry = map
        .entry((*first).to_string())
        .or_insert_with(|| FactNode::Branch(BTreeMap::new()));
    if let FactNode::Leaf(_) = entry {
        *entry = FactNode::Branch(BTreeMap::new());
    }
    if let FactNode::Branch(child) = entry {
        set_nested(child, rest, value);
    }
}

fn render_tree(map: &BTreeMap<String, FactNode>, depth: usize, lines: &mut Vec<String>) {
    for (key, node) in map {
        let indent = " ".repeat(depth);
        match node {
            FactNode::Branch(child) => {
                lines.push(format!("{indent}- {key}:"));
                render_tree(child, depth + 1, lines);
            }
            FactNode::Leaf(value) => {
                lines.push(format!("{indent}- {key}: {}", render_value(value)));
            }
        }
    }
}

/// Strings render bare (no quotes); numbers and booleans via their JSON form.
fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::SqliteDocumentStore;

    fn make_store() -> FactStore {
        let backing = SqliteDocumentStore::open_in_memory().unwrap();
        FactStore::open("juan", Box::new(backing))
    }

    // ── upsert_path ──────────────────────────────────────────────────────────

    #[test]
    fn path_upsert_roundtrip() {
        let mut facts = make_store();
        facts
            .upsert_path("Juan.gustos.color_favorito", "azul".into())
            .unwrap();
        assert_eq!(
            facts.value_at("Juan.gustos.color_favorito"),
            Some(&Value::String("azul".into()))
        );
    }

    #[test]
    fn deeper_write_preserves_siblings() {
        let mut facts = make_store();
        facts
            .upsert_path("Juan.mascota.nombre", "Bigotes".into())
            .unwrap();
        facts.upsert_path("Juan.mascota.tipo", "gato".into()).unwrap();
        assert_eq!(
            facts.value_at("Juan.mascota.nombre"),
            Some(&Value::String("Bigotes".into()))
        );
        assert_eq!(
            facts.value_at("Juan.mascota.tipo"),
            Some(&Value::String("gato".into()))
        );
    }

    #[test]
    fn deeper_write_replaces_scalar_prefix_with_container() {
        let mut facts = make_store();
        facts.upsert_path("Juan.mascota", "Bigotes".into()).unwrap();
        facts
            .upsert_path("Juan.mascota.nombre", "Bigotes".into())
            .unwrap();
        // The old scalar at the prefix is gone; the deeper value is present.
        assert_eq!(facts.value_at("Juan.mascota"), None);
        assert_eq!(
            facts.value_at("Juan.mascota.nombre"),
            Some(&Value::String("Bigotes".into()))
        );
    }

    #[test]
    fn later_write_overwrites_leaf() {
        let mut facts = make_store();
        facts.upsert_path("Juan.edad", 30.into()).unwrap();
        facts.upsert_path("Juan.edad", 31.into()).unwrap();
        assert_eq!(facts.value_at("Juan.edad"), Some(&Value::from(31)));
    }

    #[test]
    fn empty_path_is_rejected() {
        let mut facts = make_store();
        assert_eq!(
            facts.upsert_path("", "x".into()),
            Err(FactError::EmptyPath)
        );
        assert_eq!(
            facts.upsert_path("Juan..nombre", "x".into()),
            Err(FactError::EmptyPath)
        );
        assert!(facts.is_empty());
    }

    #[test]
    fn non_scalar_values_are_rejected() {
        let mut facts = make_store();
        assert_eq!(
            facts.upsert_path("Juan.cosas", serde_json::json!(["a", "b"])),
            Err(FactError::UnsupportedValue)
        );
        assert_eq!(
            facts.upsert_path("Juan.cosas", Value::Null),
            Err(FactError::UnsupportedValue)
        );
        assert!(facts.is_empty());
    }

    // ── relations ────────────────────────────────────────────────────────────

    #[test]
    fn relation_is_undirected_and_unique_per_pair() {
        let mut facts = make_store();
        facts.upsert_relation("Juan", "amigos", "Ana").unwrap();
        // Reversed order addresses the same pair; the label is overwritten.
        facts.upsert_relation("Ana", "vecinos", "Juan").unwrap();
        assert_eq!(facts.query("Juan"), vec!["vecinos: Ana".to_string()]);
        assert_eq!(facts.query("Ana"), vec!["vecinos: Juan".to_string()]);
    }

    #[test]
    fn query_unknown_entity_is_empty() {
        let facts = make_store();
        assert!(facts.query("desconocido").is_empty());
    }

    #[test]
    fn empty_relation_parts_are_rejected() {
        let mut facts = make_store();
        assert_eq!(
            facts.upsert_relation("Juan", "", "Ana"),
            Err(FactError::EmptyEntity)
        );
    }

    // ── render ───────────────────────────────────────────────────────────────

    #[test]
    fn empty_store_renders_empty_string() {
        let facts = make_store();
        assert_eq!(facts.render(), "");
    }

    #[test]
    fn render_is_nested_and_lexicographic() {
        let mut facts = make_store();
        facts.upsert_path("Juan.mascota.tipo", "gato".into()).unwrap();
        facts
            .upsert_path("Juan.mascota.nombre", "Bigotes".into())
            .unwrap();
        facts
            .upsert_path("Juan.gustos.color_favorito", "azul".into())
            .unwrap();
        let block = facts.render();
        assert_eq!(
            block,
            "- Juan:\n \
             - gustos:\n  \
             - color_favorito: azul\n \
             - mascota:\n  \
             - nombre: Bigotes\n  \
             - tipo: gato"
        );
    }

    #[test]
    fn render_is_deterministic_across_calls() {
        let mut facts = make_store();
        facts.upsert_path("b.y", "2".into()).unwrap();
        facts.upsert_path("a.x", "1".into()).unwrap();
        facts.upsert_relation("Juan", "amigos", "Ana").unwrap();
        assert_eq!(facts.render(), facts.render());
    }

    // ── persistence ──────────────────────────────────────────────────────────

    #[test]
    fn document_roundtrip_through_file_store() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backing = crate::document::FileDocumentStore::new(dir.path());
            let mut facts = FactStore::open("juan", Box::new(backing));
            facts
                .upsert_path("Juan.ubicacion.ciudad", "Palo Negro".into())
                .unwrap();
            facts.upsert_relation("Juan", "hermanos", "Luis").unwrap();
        }
        // A fresh store over the same directory sees the persisted facts.
        let backing = crate::document::FileDocumentStore::new(dir.path());
        let facts = FactStore::open("juan", Box::new(backing));
        assert_eq!(
            facts.value_at("Juan.ubicacion.ciudad"),
            Some(&Value::String("Palo Negro".into()))
        );
        assert_eq!(facts.query("Luis"), vec!["hermanos: Juan".to_string()]);
    }

    #[test]
    fn corrupt_document_loads_as_empty_store() {
        let mut backing = SqliteDocumentStore::open_in_memory().unwrap();
        backing.set("juan", b"{not json").unwrap();
        let facts = FactStore::open("juan", Box::new(backing));
        assert!(facts.is_empty());
    }

    #[test]
    fn render_order_survives_reload() {
        let dir = tempfile::tempdir().unwrap();
        let rendered_before = {
            let backing = crate::document::FileDocumentStore::new(dir.path());
            let mut facts = FactStore::open("juan", Box::new(backing));
            facts.upsert_path("z.final", "1".into()).unwrap();
            facts.upsert_path("a.inicio", "2".into()).unwrap();
            facts.render()
        };
        let backing = crate::document::FileDocumentStore::new(dir.path());
        let facts = FactStore::open("juan", Box::new(backing));
        assert_eq!(facts.render(), rendered_before);
    }
}
