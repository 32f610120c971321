//! Grouping and indexing helpers over shared records

use std::collections::HashMap;

use crate::record::{Key, SharedRecord};
use crate::schema::ModelType;

/// Partition records by model type, preserving the order types first appear
/// and the record order within each group.
pub fn group_by_type(records: &[SharedRecord]) -> Vec<(ModelType, Vec<SharedRecord>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, (ModelType, Vec<SharedRecord>)> = HashMap::new();
    for record in records {
        let model = record.model();
        if !groups.contains_key(&model.name) {
            order.push(model.name.clone());
            groups.insert(model.name.clone(), (model.clone(), Vec::new()));
        }
        if let Some((_, members)) = groups.get_mut(&model.name) {
            members.push(record.clone());
        }
    }
    order
        .into_iter()
        .filter_map(|name| groups.remove(&name))
        .collect()
}

/// Index records by a field value; later records win on collision, records
/// without a usable value are skipped.
pub fn index_by_field(records: &[SharedRecord], field: &str) -> HashMap<Key, SharedRecord> {
    let mut index = HashMap::new();
    for record in records {
        if let Some(key) = record.field(field).as_ref().and_then(Key::from_value) {
            index.insert(key, record.clone());
        }
    }
    index
}

/// Group records by a field value, skipping records without a usable value.
pub fn group_by_field(records: &[SharedRecord], field: &str) -> HashMap<Key, Vec<SharedRecord>> {
    let mut groups: HashMap<Key, Vec<SharedRecord>> = HashMap::new();
    for record in records {
        if let Some(key) = record.field(field).as_ref().and_then(Key::from_value) {
            groups.entry(key).or_default().push(record.clone());
        }
    }
    groups
}
