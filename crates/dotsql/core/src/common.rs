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

// Common types and utilities for the transaction engine

use std::io;
use std::path::PathBuf;

use dotsql_common::Xid;

use crate::transaction::IsolationLevel;

/// Error types specific to the transaction engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The requested entry exists in storage but is logically absent,
    /// e.g. because recovery discarded its creating transaction.
    #[error("entry is logically absent")]
    NilEntry,

    /// Serialization conflict; the transaction has been rolled back.
    #[error("could not serialize access due to concurrent update")]
    CannotSerialize,

    #[error("deadlock detected for transaction {0}")]
    Deadlock(Xid),

    #[error("no nested transaction")]
    NoNestedTransaction,

    #[error("not in any transaction")]
    NotInAnyTransaction,

    #[error("transaction {0} is not registered")]
    UnknownTransaction(Xid),

    #[error("entry cache is full")]
    CacheFull,

    #[error("corrupted transaction file: {0}")]
    Corruption(String),

    #[error("invalid statement: {0}")]
    InvalidStatement(String),

    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

/// Result type for engine operations
pub type EngineResult<T> = std::result::Result<T, EngineError>;

/// Engine configuration options
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding the durable transaction status file
    pub path: PathBuf,
    /// Maximum number of live entry handles (0 = unbounded)
    pub max_entry_handles: usize,
    /// Isolation level used for implicit transactions
    pub default_isolation: IsolationLevel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data"),
            max_entry_handles: 0,
            default_isolation: IsolationLevel::ReadCommitted,
        }
    }
}

/// Calculate CRC32 checksum for data integrity
pub fn calculate_checksum(data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(data);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_stable() {
        let a = calculate_checksum(b"dotsql");
        let b = calculate_checksum(b"dotsql");
        assert_eq!(a, b);
        assert_ne!(a, calculate_checksum(b"dotsql!"));
    }

    #[test]
    fn default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_entry_handles, 0);
        assert_eq!(config.default_isolation, IsolationLevel::ReadCommitted);
    }
}
