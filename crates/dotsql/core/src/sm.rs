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

//! Serializability manager
//!
//! Orchestrates transaction begin/commit/abort and the MVCC read, insert and
//! delete paths over the transaction manager, data manager, entry cache and
//! lock table. A serialization conflict (deadlock or version skip) poisons
//! the offending transaction: it is rolled back on the spot but stays
//! registered, so every later operation fails with the same error until the
//! session issues an explicit abort.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use dotsql_common::{ItemId, SUPER_XID, Xid};

use crate::cache::EntryCache;
use crate::common::{EngineError, EngineResult};
use crate::dm::DataManager;
use crate::entry::wrap_entry;
use crate::locktable::LockTable;
use crate::tm::TransactionManager;
use crate::transaction::{IsolationLevel, TransactionContext, TransactionState};
use crate::visibility::{is_version_skip, is_visible};

/// MVCC transaction coordinator
pub struct SerializabilityManager {
    tm: Arc<dyn TransactionManager>,
    dm: Arc<dyn DataManager>,
    cache: Arc<EntryCache>,
    lock_table: LockTable,
    active: Mutex<HashMap<Xid, Arc<TransactionContext>>>,
}

impl SerializabilityManager {
    /// Create a manager with an unbounded entry cache
    pub fn new(tm: Arc<dyn TransactionManager>, dm: Arc<dyn DataManager>) -> Self {
        Self::with_max_handles(tm, dm, 0)
    }

    /// Create a manager whose entry cache holds at most `max_handles` live
    /// entries (0 = unbounded)
    pub fn with_max_handles(
        tm: Arc<dyn TransactionManager>,
        dm: Arc<dyn DataManager>,
        max_handles: usize,
    ) -> Self {
        let cache = Arc::new(EntryCache::new(Arc::clone(&dm), max_handles));
        let mut active = HashMap::new();
        // bootstrap context for system-level reads
        active.insert(
            SUPER_XID,
            Arc::new(TransactionContext::new(
                SUPER_XID,
                IsolationLevel::ReadCommitted,
                [],
            )),
        );
        Self {
            tm,
            dm,
            cache,
            lock_table: LockTable::new(),
            active: Mutex::new(active),
        }
    }

    fn context(&self, xid: Xid) -> EngineResult<Arc<TransactionContext>> {
        self.active
            .lock()
            .get(&xid)
            .cloned()
            .ok_or(EngineError::UnknownTransaction(xid))
    }

    /// Start a transaction at `level` and register its context.
    ///
    /// The active-table mutex covers the transaction manager call: a
    /// repeatable-read snapshot taken concurrently must not miss an id that
    /// is already allocated but not yet registered.
    pub fn begin(&self, level: IsolationLevel) -> EngineResult<Xid> {
        let mut active = self.active.lock();
        let xid = self.tm.begin()?;
        let context = TransactionContext::new(xid, level, active.keys().copied());
        active.insert(xid, Arc::new(context));
        debug!("begin transaction {} at {:?}", xid, level);
        Ok(xid)
    }

    /// Read the data of `id` as seen by `xid`. `Ok(None)` covers absent
    /// items as well as versions the transaction cannot see.
    pub fn read(&self, xid: Xid, id: ItemId) -> EngineResult<Option<Vec<u8>>> {
        let t = self.context(xid)?;
        t.check_usable()?;

        let entry = match self.cache.get(id) {
            Ok(entry) => entry,
            Err(EngineError::NilEntry) => return Ok(None),
            Err(e) => return Err(e),
        };
        if is_visible(self.tm.as_ref(), &t, &entry) {
            Ok(Some(entry.data()))
        } else {
            Ok(None)
        }
    }

    /// Store `data` as a new entry created by `xid`
    pub fn insert(&self, xid: Xid, data: &[u8]) -> EngineResult<ItemId> {
        let t = self.context(xid)?;
        t.check_usable()?;
        self.dm.insert(xid, &wrap_entry(xid, data))
    }

    /// Delete the entry `id` on behalf of `xid`.
    ///
    /// `Ok(false)` means there was nothing to delete: the item is absent,
    /// invisible to the transaction, or already deleted by it. A deadlock or
    /// version skip rolls the transaction back and returns the sticky
    /// serialization error.
    pub fn delete(&self, xid: Xid, id: ItemId) -> EngineResult<bool> {
        let t = self.context(xid)?;
        t.check_usable()?;

        let entry = match self.cache.get(id) {
            Ok(entry) => entry,
            Err(EngineError::NilEntry) => return Ok(false),
            Err(e) => return Err(e),
        };
        if !is_visible(self.tm.as_ref(), &t, &entry) {
            return Ok(false);
        }

        let grant = match self.lock_table.add(xid, id) {
            Ok(grant) => grant,
            Err(EngineError::Deadlock(_)) => {
                self.poison(&t)?;
                return Err(EngineError::CannotSerialize);
            }
            Err(e) => return Err(e),
        };
        grant.wait();

        if entry.xmax() == xid {
            return Ok(false);
        }
        if is_version_skip(self.tm.as_ref(), &t, &entry) {
            self.poison(&t)?;
            return Err(EngineError::CannotSerialize);
        }

        entry.set_xmax(xid);
        Ok(true)
    }

    /// Commit `xid`. A poisoned transaction fails with its sticky error and
    /// can only be aborted.
    pub fn commit(&self, xid: Xid) -> EngineResult<()> {
        if xid == SUPER_XID {
            return Err(EngineError::InvalidOperation(
                "the super transaction cannot be ended".to_string(),
            ));
        }
        let t = self.context(xid)?;
        t.check_usable()?;

        self.active.lock().remove(&xid);
        self.lock_table.remove(xid);
        self.tm.commit(xid)?;
        debug!("commit transaction {}", xid);
        Ok(())
    }

    /// Manually roll back `xid` and deregister it. For a transaction that
    /// was already auto-aborted only the deregistration is left to do.
    pub fn abort(&self, xid: Xid) -> EngineResult<()> {
        if xid == SUPER_XID {
            return Err(EngineError::InvalidOperation(
                "the super transaction cannot be ended".to_string(),
            ));
        }
        let t = self
            .active
            .lock()
            .remove(&xid)
            .ok_or(EngineError::UnknownTransaction(xid))?;

        if t.state() == TransactionState::Poisoned {
            return Ok(());
        }
        self.lock_table.remove(xid);
        self.tm.abort(xid)?;
        debug!("abort transaction {}", xid);
        Ok(())
    }

    // Auto-abort after a serialization conflict: the context stays in the
    // active table so later operations observe the sticky error. The
    // poisoned transition runs at most once, and so does the rollback.
    fn poison(&self, t: &TransactionContext) -> EngineResult<()> {
        if t.poison() {
            warn!(
                "serialization failure, rolling back transaction {}",
                t.xid()
            );
            self.lock_table.remove(t.xid());
            self.tm.abort(t.xid())?;
        }
        Ok(())
    }
}
