//! Collection merge between stored rows and a submitted object graph.
//!
//! Rows are keyed by name. A submission is reconciled against what is
//! stored by creating rows only present in the submission, deleting rows only
//! present in storage, and updating rows present in both whose content
//! differs. Rows that are equal on both sides produce no change.

use serde_json::Value;
use std::collections::BTreeMap;

/// Named rows of one stored object.
pub type Rows = BTreeMap<String, Value>;

/// The changes needed to turn stored rows into submitted rows.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    pub create: Rows,
    pub update: Rows,
    pub delete: Vec<String>,
}

impl ChangeSet {
    pub fn is_empty(&self) -> bool {
        self.create.is_empty() && self.update.is_empty() && self.delete.is_empty()
    }

    /// Number of row operations.
    pub fn len(&self) -> usize {
        self.create.len() + self.update.len() + self.delete.len()
    }

    /// Apply to `rows` in place. Returns the name of the first row the change
    /// set does not fit (a create over an existing row, an update or delete
    /// of a missing one), leaving `rows` partially modified.
    pub fn apply_to(&self, rows: &mut Rows) -> Result<(), String> {
        for name in &self.delete {
            if rows.remove(name).is_none() {
                return Err(name.clone());
            }
        }
        for (name, value) in &self.update {
            match rows.get_mut(name) {
                Some(slot) => *slot = value.clone(),
                None => return Err(name.clone()),
            }
        }
        for (name, value) in &self.create {
            if rows.insert(name.clone(), value.clone()).is_some() {
                return Err(name.clone());
            }
        }
        Ok(())
    }
}

/// Compute the change set from `stored` to `submitted`.
pub fn diff_rows(stored: &Rows, submitted: &Rows) -> ChangeSet {
    let mut changes = ChangeSet::default();

    for (name, value) in submitted {
        match stored.get(name) {
            None => {
                changes.create.insert(name.clone(), value.clone());
            }
            Some(existing) if existing != value => {
                changes.update.insert(name.clone(), value.clone());
            }
            Some(_) => {}
        }
    }

    changes.delete = stored
        .keys()
        .filter(|name| !submitted.contains_key(*name))
        .cloned()
        .collect();

    changes
}
