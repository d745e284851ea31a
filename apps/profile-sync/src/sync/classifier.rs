//! Change classification for id-keyed collections.
//!
//! Compares Draft rows against Baseline rows by identifier and sorts each Draft
//! row into exactly one bucket. Only `to_create` and `to_update` rows produce
//! network calls.

use std::collections::{HashMap, HashSet};

use crate::models::records::{Entry, ItemId, Record};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    /// Draft indices of rows to send in the batched create, in Draft order.
    pub to_create: Vec<usize>,
    /// Draft indices of existing rows whose fields differ from the Baseline.
    pub to_update: Vec<usize>,
    /// Draft indices needing no call, blank placeholder rows included.
    pub unchanged: Vec<usize>,
    /// Baseline identifiers no longer present in the Draft. Informational:
    /// deletion is an explicit action and never part of a save.
    pub removed_locally: Vec<ItemId>,
}

impl Classification {
    pub fn has_writes(&self) -> bool {
        !self.to_create.is_empty() || !self.to_update.is_empty()
    }
}

pub fn classify<T: Record>(draft: &[Entry<T>], baseline: &[Entry<T>]) -> Classification {
    let known: HashMap<ItemId, &T> = baseline
        .iter()
        .filter_map(|e| e.id.map(|id| (id, &e.fields)))
        .collect();

    let mut result = Classification::default();
    let mut seen = HashSet::new();

    for (index, entry) in draft.iter().enumerate() {
        match entry.id.and_then(|id| known.get(&id).map(|base| (id, base))) {
            Some((id, base)) => {
                seen.insert(id);
                if entry.fields.same_fields(base) {
                    result.unchanged.push(index);
                } else {
                    result.to_update.push(index);
                }
            }
            // No id, or an id the Baseline never saw: treat as new.
            None if entry.fields.is_blank() => result.unchanged.push(index),
            None => result.to_create.push(index),
        }
    }

    result.removed_locally = baseline
        .iter()
        .filter_map(|e| e.id)
        .filter(|id| !seen.contains(id))
        .collect();

    result
}
