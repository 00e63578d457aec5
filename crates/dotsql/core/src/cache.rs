// Dotlanth
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Reference-counted entry cache
//!
//! Maps item ids to live entries. Concurrent fetches of a missing id
//! materialize the entry exactly once; the other callers wait on the loading
//! set and pick up the shared copy. An entry is destroyed, releasing its
//! data handle, when the last reference goes away.

use std::collections::{HashMap, HashSet};
use std::ops::Deref;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use dotsql_common::ItemId;

use crate::common::{EngineError, EngineResult};
use crate::dm::DataManager;
use crate::entry::Entry;

struct CacheSlot {
    entry: Arc<Entry>,
    refs: usize,
}

#[derive(Default)]
struct CacheInner {
    slots: HashMap<ItemId, CacheSlot>,
    loading: HashSet<ItemId>,
    hits: u64,
    misses: u64,
}

/// Statistics about cache usage
#[derive(Debug, Clone, Default)]
pub struct CacheStats {
    /// Number of entries currently held live
    pub live_entries: usize,
    /// Lookups served from a live entry
    pub hit_count: u64,
    /// Lookups that had to materialize from the data manager
    pub miss_count: u64,
}

/// Bounded, reference-counted cache of live entries
pub struct EntryCache {
    dm: Arc<dyn DataManager>,
    max_handles: usize,
    inner: Mutex<CacheInner>,
    loaded: Condvar,
}

impl EntryCache {
    /// Create a cache over `dm`. `max_handles` bounds the number of live
    /// entries; zero means unbounded.
    pub fn new(dm: Arc<dyn DataManager>, max_handles: usize) -> Self {
        Self {
            dm,
            max_handles,
            inner: Mutex::new(CacheInner::default()),
            loaded: Condvar::new(),
        }
    }

    /// Fetch the entry for `id`, incrementing its reference count.
    ///
    /// Returns `NilEntry` when the data manager reports the item absent; I/O
    /// failures propagate unchanged.
    pub fn get(self: &Arc<Self>, id: ItemId) -> EngineResult<EntryRef> {
        let mut guard = self.inner.lock();
        loop {
            let inner = &mut *guard;
            if let Some(slot) = inner.slots.get_mut(&id) {
                slot.refs += 1;
                let entry = Arc::clone(&slot.entry);
                inner.hits += 1;
                return Ok(EntryRef {
                    cache: Arc::clone(self),
                    entry,
                });
            }
            if inner.loading.contains(&id) {
                // another caller is materializing this id
                self.loaded.wait(&mut guard);
                continue;
            }
            if self.max_handles > 0 && inner.slots.len() >= self.max_handles {
                return Err(EngineError::CacheFull);
            }
            inner.loading.insert(id);
            break;
        }
        drop(guard);

        let loaded = self.dm.read(id);

        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        inner.loading.remove(&id);
        self.loaded.notify_all();
        match loaded {
            Ok(Some(handle)) => {
                inner.misses += 1;
                let entry = Arc::new(Entry::new(id, handle));
                inner.slots.insert(
                    id,
                    CacheSlot {
                        entry: Arc::clone(&entry),
                        refs: 1,
                    },
                );
                Ok(EntryRef {
                    cache: Arc::clone(self),
                    entry,
                })
            }
            Ok(None) => Err(EngineError::NilEntry),
            Err(e) => Err(e),
        }
    }

    fn release(&self, id: ItemId) {
        let mut inner = self.inner.lock();
        let emptied = match inner.slots.get_mut(&id) {
            Some(slot) => {
                slot.refs -= 1;
                slot.refs == 0
            }
            None => false,
        };
        if emptied {
            inner.slots.remove(&id);
        }
    }

    /// Get cache usage statistics
    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            live_entries: inner.slots.len(),
            hit_count: inner.hits,
            miss_count: inner.misses,
        }
    }
}

/// A live, reference-counted view of a cached entry.
/// Dropping the reference returns it to the cache.
pub struct EntryRef {
    cache: Arc<EntryCache>,
    entry: Arc<Entry>,
}

impl Deref for EntryRef {
    type Target = Entry;

    fn deref(&self) -> &Entry {
        &self.entry
    }
}

impl Drop for EntryRef {
    fn drop(&mut self) {
        self.cache.release(self.entry.id());
    }
}
