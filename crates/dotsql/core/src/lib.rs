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

// DotSQL transaction engine
// Multi-version concurrency control with a deadlock-detecting lock table.
// The serializability manager enforces read-committed and repeatable-read
// isolation and rolls conflicting transactions back automatically; the
// executor maps session statements onto transactional operations.

pub mod cache;
pub mod common;
pub mod dm;
pub mod entry;
pub mod executor;
pub mod locktable;
pub mod sm;
pub mod statement;
pub mod tm;
pub mod transaction;
pub mod visibility;

// Public exports
pub use cache::{CacheStats, EntryCache, EntryRef};
pub use common::{EngineConfig, EngineError, EngineResult, calculate_checksum};
pub use dm::{DataHandle, DataItem, DataManager, MemoryDataManager};
pub use dotsql_common::{ItemId, SUPER_XID, Xid};
pub use entry::{Entry, wrap_entry};
pub use executor::{Executor, TableManager};
pub use locktable::{LockGrant, LockTable, LockTableStats};
pub use sm::SerializabilityManager;
pub use statement::{Statement, parse_statement};
pub use tm::{FileTransactionManager, TransactionManager};
pub use transaction::{IsolationLevel, TransactionContext, TransactionState};
pub use visibility::{is_version_skip, is_visible};
