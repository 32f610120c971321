//! Cycle-aware traversal loading
//!
//! Repeatedly applies an eager-load path to the records produced by its final
//! segment, interning every record by (model, primary key) so a row reached
//! twice resolves to the same instance. When a chain closes on a record
//! already in the identity set the traversal stops there, which materializes
//! cyclic rows as reference cycles instead of infinite trees.

use std::collections::HashMap;

use tracing::debug;

use crate::error::OrmResult;
use crate::query::Scope;
use crate::record::{Key, RelativeSlot, SharedRecord};
use crate::relations::RelationRegistry;
use crate::source::DataSource;

use super::eager::EagerLoader;

pub struct CyclicLoader<'a> {
    loader: EagerLoader<'a>,
}

/// Identity set over (model name, primary key) mapping to the canonical
/// instance for that row.
type IdentitySet = HashMap<String, HashMap<Key, SharedRecord>>;

impl<'a> CyclicLoader<'a> {
    pub fn new(source: &'a dyn DataSource, registry: &'a RelationRegistry) -> Self {
        Self {
            loader: EagerLoader::new(source, registry),
        }
    }

    pub async fn load(&self, subjects: &[SharedRecord], path: &str) -> OrmResult<()> {
        self.load_with(subjects, path, None, false).await
    }

    /// Follow `path` from `subjects` until every chain terminates or closes
    /// on an already-visited row. `scope` and `only_missing` pass through to
    /// each level's final-segment load.
    pub async fn load_with(
        &self,
        subjects: &[SharedRecord],
        path: &str,
        scope: Option<&Scope>,
        only_missing: bool,
    ) -> OrmResult<()> {
        let terminal = path.rsplit('.').next().unwrap_or(path);

        let mut identities: IdentitySet = HashMap::new();
        for subject in subjects {
            remember(&mut identities, subject);
        }

        let mut frontier: Vec<SharedRecord> = subjects.to_vec();
        let mut level = 0usize;
        while !frontier.is_empty() {
            let parents = self
                .loader
                .load_with(&frontier, path, scope, only_missing)
                .await
                .map_err(|err| match level {
                    0 => err,
                    // Past the first level the path has been reapplied to
                    // loaded relatives, so a missing relation usually means
                    // the chain left the type the path was written for.
                    _ => err.with_cyclic_hint(),
                })?;

            let mut next = Vec::new();
            for parent in &parents {
                let slot = match parent.relative(terminal) {
                    Some(slot) => slot,
                    None => continue,
                };
                let rebuilt = self.intern_slot(slot, &mut identities, &mut next);
                parent.set_relative(terminal, rebuilt);
            }
            debug!(level, frontier = frontier.len(), advancing = next.len(), "cyclic level");
            frontier = next;
            level += 1;
        }
        Ok(())
    }

    /// Replace each record in the slot with its canonical instance. Records
    /// seen for the first time (or without an identity) continue into the
    /// next frontier; records already interned close a cycle and do not.
    fn intern_slot(
        &self,
        slot: RelativeSlot,
        identities: &mut IdentitySet,
        next: &mut Vec<SharedRecord>,
    ) -> RelativeSlot {
        match slot {
            RelativeSlot::Null => RelativeSlot::Null,
            RelativeSlot::One(record) => RelativeSlot::One(self.intern(record, identities, next)),
            RelativeSlot::Many(records) => RelativeSlot::Many(
                records
                    .into_iter()
                    .map(|record| self.intern(record, identities, next))
                    .collect(),
            ),
        }
    }

    fn intern(
        &self,
        record: SharedRecord,
        identities: &mut IdentitySet,
        next: &mut Vec<SharedRecord>,
    ) -> SharedRecord {
        match record.identity() {
            Some((model, key)) => {
                let slot = identities.entry(model).or_default();
                match slot.get(&key) {
                    Some(canonical) => canonical.clone(),
                    None => {
                        slot.insert(key, record.clone());
                        next.push(record.clone());
                        record
                    }
                }
            }
            // Unpersisted records carry no identity; always treat as new.
            None => {
                next.push(record.clone());
                record
            }
        }
    }
}

fn remember(identities: &mut IdentitySet, record: &SharedRecord) {
    if let Some((model, key)) = record.identity() {
        identities.entry(model).or_default().entry(key).or_insert_with(|| record.clone());
    }
}
