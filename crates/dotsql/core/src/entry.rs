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

// MVCC entry framing
// An entry is the tuple (XMIN, XMAX, data) laid out little-endian inside a
// stored payload. XMIN is fixed at creation; XMAX is zero while the entry is
// alive and records the deleting transaction afterwards. Data never changes:
// updates are a delete plus an insert of a new item.

use byteorder::{ByteOrder, LittleEndian};

use dotsql_common::{ItemId, Xid};

use crate::dm::DataHandle;

const XMIN_OFFSET: usize = 0;
const XMAX_OFFSET: usize = 8;
const DATA_OFFSET: usize = 16;

/// Produce the stored image of a fresh entry created by `xid`
pub fn wrap_entry(xid: Xid, data: &[u8]) -> Vec<u8> {
    let mut raw = vec![0u8; DATA_OFFSET + data.len()];
    LittleEndian::write_u64(&mut raw[XMIN_OFFSET..XMAX_OFFSET], xid);
    raw[DATA_OFFSET..].copy_from_slice(data);
    raw
}

/// A typed view over a stored MVCC tuple
pub struct Entry {
    id: ItemId,
    item: DataHandle,
}

impl Entry {
    pub(crate) fn new(id: ItemId, item: DataHandle) -> Self {
        Self { id, item }
    }

    /// Get the item id backing this entry
    pub fn id(&self) -> ItemId {
        self.id
    }

    /// Creating transaction, read under the page latch
    pub fn xmin(&self) -> Xid {
        self.item
            .with_payload(|p| LittleEndian::read_u64(&p[XMIN_OFFSET..XMAX_OFFSET]))
    }

    /// Deleting transaction, zero while the entry is alive
    pub fn xmax(&self) -> Xid {
        self.item
            .with_payload(|p| LittleEndian::read_u64(&p[XMAX_OFFSET..DATA_OFFSET]))
    }

    /// Copy of the user data
    pub fn data(&self) -> Vec<u8> {
        self.item.with_payload(|p| p[DATA_OFFSET..].to_vec())
    }

    /// Record `xid` as the deleting transaction. The caller must hold the
    /// lock table grant for this item; the write itself runs under the page
    /// latch.
    pub(crate) fn set_xmax(&self, xid: Xid) {
        self.item
            .with_payload_mut(|p| LittleEndian::write_u64(&mut p[XMAX_OFFSET..DATA_OFFSET], xid));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dm::DataItem;
    use std::sync::Arc;

    fn entry_from_raw(raw: Vec<u8>) -> Entry {
        Entry::new(ItemId(1), Arc::new(DataItem::new(ItemId(1), raw)))
    }

    #[test]
    fn wrap_layout_is_little_endian() {
        let raw = wrap_entry(0x0102, b"ab");
        assert_eq!(raw.len(), 18);
        assert_eq!(&raw[0..8], &[0x02, 0x01, 0, 0, 0, 0, 0, 0]);
        assert_eq!(&raw[8..16], &[0u8; 8]);
        assert_eq!(&raw[16..], b"ab");
    }

    #[test]
    fn wrap_empty_data() {
        let raw = wrap_entry(5, b"");
        assert_eq!(raw.len(), 16);
    }

    #[test]
    fn accessors_decode_fields() {
        let entry = entry_from_raw(wrap_entry(7, b"hello"));
        assert_eq!(entry.xmin(), 7);
        assert_eq!(entry.xmax(), 0);
        assert_eq!(entry.data(), b"hello");
    }

    #[test]
    fn set_xmax_only_touches_version_field() {
        let entry = entry_from_raw(wrap_entry(3, b"data"));
        entry.set_xmax(9);
        assert_eq!(entry.xmin(), 3);
        assert_eq!(entry.xmax(), 9);
        assert_eq!(entry.data(), b"data");
    }
}
