//! Records and relative slots
//!
//! A `Record` is a mutable container for one table row: its `ModelType`, a set
//! of named field values, and a side-table of loaded relatives keyed by
//! relation name. Presence of a key in the side-table - not the value stored
//! under it - means the relation has been loaded, which distinguishes "loaded
//! but empty" from "never loaded".
//!
//! Records are shared through `SharedRecord` so that one in-memory instance can
//! sit under several parents at once (many-to-many children, closed cycles).

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde_json::Value;
use uuid::Uuid;

use crate::schema::ModelType;

/// A normalized identity value derived from a record field.
///
/// Only values with a stable equality make keys; floats and composites do not.
/// String values that parse as UUIDs normalize to `Key::Uuid` so textual and
/// native UUID columns compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Uuid(Uuid),
    Str(String),
    Bool(bool),
}

impl Key {
    /// Normalize a JSON field value into a key, or `None` when the value is
    /// null or has no stable equality.
    pub fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Null => None,
            Value::Number(n) => n.as_i64().map(Key::Int),
            Value::String(s) => match Uuid::parse_str(s) {
                Ok(uuid) => Some(Key::Uuid(uuid)),
                Err(_) => Some(Key::Str(s.clone())),
            },
            Value::Bool(b) => Some(Key::Bool(*b)),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Render the key back into a JSON value for query binding.
    pub fn to_value(&self) -> Value {
        match self {
            Key::Int(n) => Value::Number((*n).into()),
            Key::Uuid(u) => Value::String(u.to_string()),
            Key::Str(s) => Value::String(s.clone()),
            Key::Bool(b) => Value::Bool(*b),
        }
    }
}

/// One loaded-relatives entry.
///
/// `Null` is "loaded, no relative"; `One` and `Many` carry the relatives for
/// the two cardinalities. "Not loaded" is the absence of the entry itself.
#[derive(Debug, Clone)]
pub enum RelativeSlot {
    Null,
    One(SharedRecord),
    Many(Vec<SharedRecord>),
}

impl RelativeSlot {
    /// All records held by the slot, empty for `Null`.
    pub fn records(&self) -> Vec<SharedRecord> {
        match self {
            RelativeSlot::Null => Vec::new(),
            RelativeSlot::One(record) => vec![record.clone()],
            RelativeSlot::Many(records) => records.clone(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            RelativeSlot::Null => true,
            RelativeSlot::One(_) => false,
            RelativeSlot::Many(records) => records.is_empty(),
        }
    }
}

/// One table row in memory: model type, field values, loaded relatives.
#[derive(Debug)]
pub struct Record {
    model: ModelType,
    fields: HashMap<String, Value>,
    relatives: HashMap<String, RelativeSlot>,
}

impl Record {
    /// Create an empty record of the given model type.
    pub fn new(model: ModelType) -> Self {
        Self {
            model,
            fields: HashMap::new(),
            relatives: HashMap::new(),
        }
    }

    /// Create a record from a fetched row map.
    pub fn from_row(model: ModelType, fields: HashMap<String, Value>) -> Self {
        Self {
            model,
            fields,
            relatives: HashMap::new(),
        }
    }

    pub fn model(&self) -> &ModelType {
        &self.model
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    pub fn set_field(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    pub fn fields(&self) -> &HashMap<String, Value> {
        &self.fields
    }

    /// The record's identifier value as a normalized key, if present.
    pub fn key(&self) -> Option<Key> {
        self.fields
            .get(&self.model.primary_key)
            .and_then(Key::from_value)
    }

    /// Whether the named relation has been loaded (key presence, not value).
    pub fn has_loaded(&self, relation: &str) -> bool {
        self.relatives.contains_key(relation)
    }

    pub fn relative(&self, relation: &str) -> Option<&RelativeSlot> {
        self.relatives.get(relation)
    }

    pub fn set_relative(&mut self, relation: &str, slot: RelativeSlot) {
        self.relatives.insert(relation.to_string(), slot);
    }

    /// Drop a loaded-relatives entry, returning the relation to "not loaded".
    pub fn unload(&mut self, relation: &str) {
        self.relatives.remove(relation);
    }
}

/// A shared, mutable handle to one record instance.
///
/// Object identity (`ptr_eq`) is the identity the loaders preserve: two
/// parents holding the same child hold the same `SharedRecord`. Concurrent
/// mutation of one record from several threads is last-write-wins; callers
/// wanting stronger guarantees must serialize externally.
#[derive(Debug, Clone)]
pub struct SharedRecord(Arc<RwLock<Record>>);

impl SharedRecord {
    pub fn new(record: Record) -> Self {
        Self(Arc::new(RwLock::new(record)))
    }

    pub fn from_row(model: ModelType, fields: HashMap<String, Value>) -> Self {
        Self::new(Record::from_row(model, fields))
    }

    /// Reference equality: do both handles point at the same instance?
    pub fn ptr_eq(&self, other: &SharedRecord) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Stable per-instance key for identity-based deduplication.
    pub fn ptr_key(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    fn read(&self) -> RwLockReadGuard<'_, Record> {
        self.0.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Record> {
        self.0.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn model(&self) -> ModelType {
        self.read().model().clone()
    }

    pub fn field(&self, name: &str) -> Option<Value> {
        self.read().field(name).cloned()
    }

    pub fn set_field(&self, name: &str, value: Value) {
        self.write().set_field(name, value);
    }

    /// The record's identifier as a normalized key, if present and keyable.
    pub fn key(&self) -> Option<Key> {
        self.read().key()
    }

    /// The (model name, identifier key) pair used by the cyclic identity set.
    pub fn identity(&self) -> Option<(String, Key)> {
        let record = self.read();
        let key = record.key()?;
        Some((record.model().name.clone(), key))
    }

    pub fn has_loaded(&self, relation: &str) -> bool {
        self.read().has_loaded(relation)
    }

    pub fn relative(&self, relation: &str) -> Option<RelativeSlot> {
        self.read().relative(relation).cloned()
    }

    pub fn set_relative(&self, relation: &str, slot: RelativeSlot) {
        self.write().set_relative(relation, slot);
    }

    pub fn unload(&self, relation: &str) {
        self.write().unload(relation);
    }

    /// Records loaded under the relation name; empty when not loaded or `Null`.
    pub fn loaded_records(&self, relation: &str) -> Vec<SharedRecord> {
        self.read()
            .relative(relation)
            .map(RelativeSlot::records)
            .unwrap_or_default()
    }

    /// Run a closure against the locked record.
    pub fn with<R>(&self, f: impl FnOnce(&Record) -> R) -> R {
        f(&self.read())
    }
}
