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

//! Data item access
//!
//! The data manager stores opaque byte payloads keyed by item id. Payload
//! bytes are only reachable through a page-level latch, so readers observe a
//! consistent image while a writer updates version fields in place.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use dotsql_common::{ItemId, Xid};

use crate::common::EngineResult;

/// A latched, shared handle to a stored data item
pub type DataHandle = Arc<DataItem>;

/// A single stored payload guarded by its page latch
pub struct DataItem {
    id: ItemId,
    payload: RwLock<Vec<u8>>,
}

impl DataItem {
    pub(crate) fn new(id: ItemId, payload: Vec<u8>) -> Self {
        Self {
            id,
            payload: RwLock::new(payload),
        }
    }

    /// Get the item id
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Run `f` over the payload under the read latch
    pub fn with_payload<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let payload = self.payload.read();
        f(&payload)
    }

    /// Run `f` over the payload under the write latch
    pub fn with_payload_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> R {
        let mut payload = self.payload.write();
        f(&mut payload)
    }
}

/// Contract the engine consumes for durable item storage
pub trait DataManager: Send + Sync {
    /// Store a new payload on behalf of `xid`, returning its item id.
    /// Ids are unique for the lifetime of the database.
    fn insert(&self, xid: Xid, data: &[u8]) -> EngineResult<ItemId>;

    /// Fetch the latched handle for `id`. `None` means the item is absent,
    /// either because it never existed or because recovery discarded it.
    fn read(&self, id: ItemId) -> EngineResult<Option<DataHandle>>;
}

/// In-memory data manager used by tests and embedded callers
pub struct MemoryDataManager {
    items: RwLock<HashMap<ItemId, DataHandle>>,
    next_id: AtomicU64,
}

impl MemoryDataManager {
    pub fn new() -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Drop an item, leaving later reads to report it absent. Mirrors what
    /// recovery does to items created by discarded transactions.
    pub fn remove(&self, id: ItemId) {
        self.items.write().remove(&id);
    }

    /// Number of stored items
    pub fn len(&self) -> usize {
        self.items.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.read().is_empty()
    }
}

impl Default for MemoryDataManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DataManager for MemoryDataManager {
    fn insert(&self, _xid: Xid, data: &[u8]) -> EngineResult<ItemId> {
        let id = ItemId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let item = Arc::new(DataItem::new(id, data.to_vec()));
        self.items.write().insert(id, item);
        Ok(id)
    }

    fn read(&self, id: ItemId) -> EngineResult<Option<DataHandle>> {
        Ok(self.items.read().get(&id).cloned())
    }
}
