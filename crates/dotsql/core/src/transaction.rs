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

// Per-transaction context
// Carries the isolation level, the begin-time snapshot used by repeatable
// read, and the poisoned flag set when a serialization conflict rolled the
// transaction back underneath the session.

use std::collections::HashSet;

use parking_lot::Mutex;

use dotsql_common::{SUPER_XID, Xid};

use crate::common::{EngineError, EngineResult};

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Each operation sees the latest committed data
    ReadCommitted,
    /// The transaction sees a snapshot fixed at begin time
    RepeatableRead,
}

/// Health of a registered transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction can perform operations
    Active,
    /// Transaction hit a serialization conflict and was rolled back; it
    /// stays registered so later operations observe the sticky error, until
    /// the session aborts it explicitly.
    Poisoned,
}

/// Per-transaction bookkeeping kept in the active table
pub struct TransactionContext {
    xid: Xid,
    level: IsolationLevel,
    snapshot: HashSet<Xid>,
    state: Mutex<TransactionState>,
}

impl TransactionContext {
    /// Build the context for `xid`. Repeatable read snapshots every other
    /// transaction active at begin time; the super transaction is never part
    /// of a snapshot. Read committed keeps the snapshot empty.
    pub fn new(xid: Xid, level: IsolationLevel, active: impl IntoIterator<Item = Xid>) -> Self {
        let mut snapshot = HashSet::new();
        if level == IsolationLevel::RepeatableRead {
            for other in active {
                if other != xid && other != SUPER_XID {
                    snapshot.insert(other);
                }
            }
        }
        Self {
            xid,
            level,
            snapshot,
            state: Mutex::new(TransactionState::Active),
        }
    }

    /// Get the transaction id
    pub fn xid(&self) -> Xid {
        self.xid
    }

    /// Get the isolation level
    pub fn level(&self) -> IsolationLevel {
        self.level
    }

    /// Whether `xid` was active when this transaction began
    pub fn in_snapshot(&self, xid: Xid) -> bool {
        self.snapshot.contains(&xid)
    }

    /// Get the current state
    pub fn state(&self) -> TransactionState {
        *self.state.lock()
    }

    /// Mark the transaction poisoned. Returns true only for the caller that
    /// wins the transition, so rollback work runs exactly once.
    pub(crate) fn poison(&self) -> bool {
        let mut state = self.state.lock();
        match *state {
            TransactionState::Poisoned => false,
            TransactionState::Active => {
                *state = TransactionState::Poisoned;
                true
            }
        }
    }

    /// Reject further work once the transaction is poisoned
    pub fn check_usable(&self) -> EngineResult<()> {
        match self.state() {
            TransactionState::Active => Ok(()),
            TransactionState::Poisoned => Err(EngineError::CannotSerialize),
        }
    }
}
