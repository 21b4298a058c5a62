use std::collections::HashMap;
use std::collections::HashSet;

use parking_lot::RwLock;
use tracing::debug;
use tracing::trace;

use crate::ConfigEntry;
use crate::ConfigFilter;
use crate::ConfigId;
use crate::ConfigObject;
use crate::Delta;
use crate::Result;
use crate::StoreError;

/// Thread-safe mapping from configuration id to configuration value
///
/// `get`, `snapshot` and `update_config` are linearizable with respect to
/// each other: readers copy under the read lock, a bulk update diffs and swaps
/// under a single write lock.
#[derive(Debug)]
pub struct ConfigStore<C> {
    data: RwLock<HashMap<ConfigId, C>>,
}

impl<C> Default for ConfigStore<C> {
    fn default() -> Self {
        Self {
            data: RwLock::new(HashMap::new()),
        }
    }
}

impl<C> ConfigStore<C> {
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

impl<C: ConfigObject> ConfigStore<C> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        id: &ConfigId,
    ) -> Option<C> {
        self.data.read().get(id).cloned()
    }

    /// Point-in-time copy of every stored entry
    pub fn snapshot(&self) -> Vec<ConfigEntry<C>> {
        self.snapshot_filtered(&ConfigFilter::All)
    }

    /// Point-in-time copy of the entries selected by `filter`
    pub fn snapshot_filtered(
        &self,
        filter: &ConfigFilter,
    ) -> Vec<ConfigEntry<C>> {
        let data = self.data.read();

        // Exact lookups do not need a scan
        if let ConfigFilter::Exact(id) = filter {
            return data
                .get(id)
                .map(|config| vec![ConfigEntry::new(id.clone(), config.clone())])
                .unwrap_or_default();
        }

        data.iter()
            .filter(|(id, _)| filter.matches(id))
            .map(|(id, config)| ConfigEntry::new(id.clone(), config.clone()))
            .collect()
    }

    /// Replace the whole store with `entries` and report what changed.
    ///
    /// An id whose submitted value equals the stored one lands in neither
    /// `added` nor `updated`. A duplicate id rejects the whole call and leaves
    /// the store untouched.
    pub fn update_config(
        &self,
        entries: Vec<ConfigEntry<C>>,
    ) -> Result<Delta<C>> {
        let mut seen = HashSet::with_capacity(entries.len());
        for entry in &entries {
            if !seen.insert(&entry.id) {
                return Err(StoreError::DuplicateId(entry.id.clone()).into());
            }
        }

        let mut next = HashMap::with_capacity(entries.len());
        let mut delta = Delta::default();

        let mut data = self.data.write();
        for entry in entries {
            match data.get(&entry.id) {
                None => {
                    trace!(id = %entry.id, "config added");
                    delta.added.push(entry.clone());
                }
                Some(current) if current != &entry.config => {
                    trace!(id = %entry.id, "config updated");
                    delta.updated.push(entry.clone());
                }
                Some(_) => {
                    trace!(id = %entry.id, "config unchanged");
                }
            }
            next.insert(entry.id, entry.config);
        }

        delta.removed = data.keys().filter(|id| !next.contains_key(*id)).cloned().collect();
        *data = next;

        debug!(
            added = delta.added.len(),
            updated = delta.updated.len(),
            removed = delta.removed.len(),
            size = data.len(),
            "config store updated"
        );

        Ok(delta)
    }
}
