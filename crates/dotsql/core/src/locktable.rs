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

//! Wait-for graph lock table
//!
//! Serializes writers per data item. A resource has at most one holder;
//! contending transactions queue behind it and suspend on a one-shot grant.
//! Cycle checks run synchronously at add time, so deadlock surfaces to the
//! requesting transaction instead of a background watchdog.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

use dotsql_common::{ItemId, Xid};

use crate::common::{EngineError, EngineResult};

struct GrantState {
    fired: Mutex<bool>,
    signal: Condvar,
}

/// One-shot grant signal handed out by [`LockTable::add`].
///
/// Either pre-fired (the resource was granted immediately) or fired later
/// when a predecessor's release hands the resource over.
#[derive(Clone)]
pub struct LockGrant {
    state: Arc<GrantState>,
}

impl LockGrant {
    fn new(fired: bool) -> Self {
        Self {
            state: Arc::new(GrantState {
                fired: Mutex::new(fired),
                signal: Condvar::new(),
            }),
        }
    }

    fn granted() -> Self {
        Self::new(true)
    }

    fn pending() -> Self {
        Self::new(false)
    }

    fn fire(&self) {
        let mut fired = self.state.fired.lock();
        *fired = true;
        self.state.signal.notify_all();
    }

    /// Block until the lock is held. Returns immediately for grants that
    /// fired at add time.
    pub fn wait(&self) {
        let mut fired = self.state.fired.lock();
        while !*fired {
            self.state.signal.wait(&mut fired);
        }
    }

    /// Whether the grant has fired
    pub fn is_granted(&self) -> bool {
        *self.state.fired.lock()
    }
}

#[derive(Default)]
struct LockTableInner {
    /// resource -> owning transaction
    holder: HashMap<ItemId, Xid>,
    /// transaction -> resources it owns
    held: HashMap<Xid, Vec<ItemId>>,
    /// resource -> queued waiters, granted head-of-queue first
    queue: HashMap<ItemId, VecDeque<Xid>>,
    /// transaction -> the single resource it waits for
    waits_on: HashMap<Xid, ItemId>,
    /// transaction -> its unfired grant
    pending: HashMap<Xid, LockGrant>,
}

impl LockTableInner {
    /// Walk the wait-for chain starting at `start`. Out-degree is at most
    /// one (a transaction waits on a single resource and a resource has a
    /// single holder), so revisiting any node means the new edge closed a
    /// cycle.
    fn creates_cycle(&self, start: Xid) -> bool {
        let mut seen = HashSet::new();
        let mut xid = start;
        loop {
            if !seen.insert(xid) {
                return true;
            }
            let Some(resource) = self.waits_on.get(&xid) else {
                return false;
            };
            match self.holder.get(resource) {
                Some(&next) => xid = next,
                None => return false,
            }
        }
    }

    /// Hand `resource` to its first still-live queued waiter and fire its
    /// grant. Waiters that vanished while queued are skipped.
    fn promote(&mut self, resource: ItemId) {
        loop {
            let next = match self.queue.get_mut(&resource) {
                Some(waiters) => waiters.pop_front(),
                None => return,
            };
            let Some(next) = next else {
                self.queue.remove(&resource);
                return;
            };
            if let Some(grant) = self.pending.remove(&next) {
                self.holder.insert(resource, next);
                self.held.entry(next).or_default().push(resource);
                self.waits_on.remove(&next);
                grant.fire();
                return;
            }
        }
    }
}

/// Statistics about the lock table
#[derive(Debug, Clone, Default)]
pub struct LockTableStats {
    /// Number of resources with a holder
    pub held_resources: usize,
    /// Number of transactions suspended on a grant
    pub waiting_transactions: usize,
}

/// Per-item writer lock table with synchronous deadlock detection
#[derive(Default)]
pub struct LockTable {
    inner: Mutex<LockTableInner>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire `resource` for `owner`.
    ///
    /// Returns a pre-fired grant when the resource is free or already held
    /// by `owner`. When another transaction holds it, the wait edge is
    /// recorded first: if that closes a cycle the edge is undone and
    /// `Deadlock` is returned, otherwise `owner` queues up and receives a
    /// grant that fires once the resource is handed over. Waiting on the
    /// grant happens outside the table's mutex.
    pub fn add(&self, owner: Xid, resource: ItemId) -> EngineResult<LockGrant> {
        let mut inner = self.inner.lock();
        match inner.holder.get(&resource).copied() {
            Some(current) if current == owner => Ok(LockGrant::granted()),
            Some(_) => {
                inner.waits_on.insert(owner, resource);
                if inner.creates_cycle(owner) {
                    inner.waits_on.remove(&owner);
                    return Err(EngineError::Deadlock(owner));
                }
                let grant = LockGrant::pending();
                inner.queue.entry(resource).or_default().push_back(owner);
                inner.pending.insert(owner, grant.clone());
                Ok(grant)
            }
            None => {
                inner.holder.insert(resource, owner);
                inner.held.entry(owner).or_default().push(resource);
                Ok(LockGrant::granted())
            }
        }
    }

    /// Release every resource held by `owner` and hand each one to its next
    /// live waiter. Also clears any wait `owner` itself had registered.
    pub fn remove(&self, owner: Xid) {
        let mut inner = self.inner.lock();
        if let Some(resources) = inner.held.remove(&owner) {
            for resource in resources {
                inner.holder.remove(&resource);
                inner.promote(resource);
            }
        }
        inner.waits_on.remove(&owner);
        inner.pending.remove(&owner);
        // stale queue entries for `owner` are skipped at promotion time
    }

    /// Get lock table statistics
    pub fn stats(&self) -> LockTableStats {
        let inner = self.inner.lock();
        LockTableStats {
            held_resources: inner.holder.len(),
            waiting_transactions: inner.pending.len(),
        }
    }
}
