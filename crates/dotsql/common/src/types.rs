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

use std::fmt;

/// Transaction identifier type. Regular ids are strictly positive and
/// allocated in increasing order.
pub type Xid = u64;

/// Reserved transaction id used for system and bootstrap operations.
/// It is always reported committed and never takes part in a snapshot.
pub const SUPER_XID: Xid = 0;

/// Represents a unique identifier for a stored data item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemId(pub u64);

impl ItemId {
    /// Get the raw id value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ItemId {
    fn from(raw: u64) -> Self {
        ItemId(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_display_matches_raw() {
        assert_eq!(ItemId(42).to_string(), "42");
        assert_eq!(ItemId::from(7).as_u64(), 7);
    }

    #[test]
    fn super_xid_is_zero() {
        assert_eq!(SUPER_XID, 0);
    }
}
