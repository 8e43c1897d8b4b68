use crate::timestamp::Timestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Bound;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    #[serde(rename = "mtime")]
    pub modified: Timestamp,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl FileEntry {
    /// Empty files have nothing to tail yet.
    pub fn is_navigable(&self) -> bool {
        self.size > 0 && !self.deleted
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexChange {
    Upserted { position: usize, inserted: bool },
    Removed { position: usize },
    Unchanged,
}

/// Known files keyed by name, iterated in ascending name order.
#[derive(Debug, Default)]
pub struct IndexModel {
    entries: BTreeMap<String, FileEntry>,
}

impl IndexModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, entry: FileEntry) -> IndexChange {
        if entry.deleted {
            let position = self.position(&entry.name);
            return match self.entries.remove(&entry.name) {
                Some(_) => IndexChange::Removed { position },
                None => IndexChange::Unchanged,
            };
        }
        let position = self.position(&entry.name);
        let inserted = self.entries.insert(entry.name.clone(), entry).is_none();
        IndexChange::Upserted { position, inserted }
    }

    /// Sorted row of `name`, or the row it would take if inserted.
    pub fn position(&self, name: &str) -> usize {
        self.entries
            .range::<str, _>((Bound::Unbounded, Bound::Excluded(name)))
            .count()
    }

    pub fn get(&self, name: &str) -> Option<&FileEntry> {
        self.entries.get(name)
    }

    pub fn get_index(&self, position: usize) -> Option<&FileEntry> {
        self.entries.values().nth(position)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) -> usize {
        let removed = self.entries.len();
        self.entries.clear();
        removed
    }
}
