//! Batched eager loading along dotted relation paths
//!
//! `load("posts.comments")` on a set of users issues one query per path
//! segment per model type, walking the loaded relatives level by level
//! instead of querying per record.

use std::collections::HashSet;

use tracing::debug;

use crate::error::{OrmError, OrmResult};
use crate::query::Scope;
use crate::record::SharedRecord;
use crate::relations::RelationRegistry;
use crate::source::DataSource;
use crate::support::group_by_type;

pub struct EagerLoader<'a> {
    source: &'a dyn DataSource,
    registry: &'a RelationRegistry,
}

impl<'a> EagerLoader<'a> {
    pub fn new(source: &'a dyn DataSource, registry: &'a RelationRegistry) -> Self {
        Self { source, registry }
    }

    pub fn registry(&self) -> &RelationRegistry {
        self.registry
    }

    /// Load the dotted `path` for every subject, returning the records at the
    /// level the final segment was loaded onto.
    pub async fn load(
        &self,
        subjects: &[SharedRecord],
        path: &str,
    ) -> OrmResult<Vec<SharedRecord>> {
        self.load_with(subjects, path, None, false).await
    }

    /// Like [`load`](Self::load) but with an optional scope applied to the
    /// final segment's fetch, and `only_missing` skipping final-segment
    /// subjects whose entry is already loaded. Intermediate segments always
    /// skip already-loaded subjects; a scope never applies to them.
    pub async fn load_with(
        &self,
        subjects: &[SharedRecord],
        path: &str,
        scope: Option<&Scope>,
        only_missing: bool,
    ) -> OrmResult<Vec<SharedRecord>> {
        if subjects.is_empty() {
            return Ok(Vec::new());
        }
        let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
        if segments.is_empty() || segments.len() != path.split('.').count() {
            return Err(OrmError::InvalidArgument(format!(
                "'{path}' is not a valid relation path"
            )));
        }

        let mut penultimate = Vec::new();
        for (model, group) in group_by_type(subjects) {
            let mut current = group;
            let mut current_model = model;
            for (index, segment) in segments.iter().enumerate() {
                if current.is_empty() {
                    break;
                }
                let last = index + 1 == segments.len();
                let relation = self.registry.resolve(&current_model.name, segment)?;

                // Reloading an already-loaded level would discard instances
                // other paths may hold references to.
                let to_load: Vec<SharedRecord> = match !last || only_missing {
                    true => current
                        .iter()
                        .filter(|s| !s.has_loaded(segment))
                        .cloned()
                        .collect(),
                    false => current.clone(),
                };
                if !to_load.is_empty() {
                    let segment_scope = match last {
                        true => scope,
                        false => None,
                    };
                    relation
                        .load_relatives(self.source, segment, &to_load, segment_scope)
                        .await?;
                }
                debug!(
                    model = %current_model.name,
                    segment,
                    subjects = current.len(),
                    fetched_for = to_load.len(),
                    "eager load level"
                );

                if last {
                    break;
                }
                current = collect_level(&current, segment);
                current_model = relation.target().clone();
            }
            penultimate.extend(current);
        }
        Ok(penultimate)
    }
}

/// The union of loaded relatives under `segment` across `records`, deduped by
/// instance identity so shared relatives advance once.
fn collect_level(records: &[SharedRecord], segment: &str) -> Vec<SharedRecord> {
    let mut seen = HashSet::new();
    let mut next = Vec::new();
    for record in records {
        for relative in record.loaded_records(segment) {
            if seen.insert(relative.ptr_key()) {
                next.push(relative);
            }
        }
    }
    next
}
