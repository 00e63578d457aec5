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

//! Version visibility rules
//!
//! Pure predicates deciding which entry versions a transaction observes,
//! following the usual XMIN/XMAX analysis. Version-skip detection guards
//! repeatable-read writers against overwriting versions whose deletion they
//! cannot see.

use crate::entry::Entry;
use crate::tm::TransactionManager;
use crate::transaction::{IsolationLevel, TransactionContext};

/// Test whether `entry` is visible to `t`
pub fn is_visible(tm: &dyn TransactionManager, t: &TransactionContext, entry: &Entry) -> bool {
    match t.level() {
        IsolationLevel::ReadCommitted => read_committed(tm, t, entry),
        IsolationLevel::RepeatableRead => repeatable_read(tm, t, entry),
    }
}

/// Detect a version skip: a committed deletion of `entry` that `t` cannot
/// see, meaning a repeatable-read writer would silently jump over that
/// version. Read committed never skips versions.
pub fn is_version_skip(tm: &dyn TransactionManager, t: &TransactionContext, entry: &Entry) -> bool {
    if t.level() == IsolationLevel::ReadCommitted {
        return false;
    }
    let xmax = entry.xmax();
    tm.is_committed(xmax) && (xmax > t.xid() || t.in_snapshot(xmax))
}

// Visible iff the entry was created by `t` itself and is still alive, or was
// created by a committed transaction and is not yet deleted by a committed
// one other than `t`.
fn read_committed(tm: &dyn TransactionManager, t: &TransactionContext, entry: &Entry) -> bool {
    let xid = t.xid();
    let xmin = entry.xmin();
    let xmax = entry.xmax();

    if xmin == xid && xmax == 0 {
        return true;
    }

    if tm.is_committed(xmin) {
        if xmax == 0 {
            return true;
        }
        if xmax != xid && !tm.is_committed(xmax) {
            return true;
        }
    }
    false
}

// As read committed, but the creator must additionally have committed before
// `t` began, and a deletion is ignored when its transaction began after `t`
// or was still in flight at `t`'s begin.
fn repeatable_read(tm: &dyn TransactionManager, t: &TransactionContext, entry: &Entry) -> bool {
    let xid = t.xid();
    let xmin = entry.xmin();
    let xmax = entry.xmax();

    if xmin == xid && xmax == 0 {
        return true;
    }

    if tm.is_committed(xmin) && xmin < xid && !t.in_snapshot(xmin) {
        if xmax == 0 {
            return true;
        }
        if xmax != xid && (!tm.is_committed(xmax) || xmax > xid || t.in_snapshot(xmax)) {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::EngineResult;
    use crate::dm::DataItem;
    use crate::entry::wrap_entry;
    use dotsql_common::{ItemId, SUPER_XID, Xid};
    use std::collections::HashSet;
    use std::sync::Arc;

    struct StubTm {
        committed: HashSet<Xid>,
    }

    impl StubTm {
        fn with_committed(xids: &[Xid]) -> Self {
            Self {
                committed: xids.iter().copied().collect(),
            }
        }
    }

    impl TransactionManager for StubTm {
        fn begin(&self) -> EngineResult<Xid> {
            unimplemented!("not used by visibility tests")
        }

        fn commit(&self, _xid: Xid) -> EngineResult<()> {
            Ok(())
        }

        fn abort(&self, _xid: Xid) -> EngineResult<()> {
            Ok(())
        }

        fn is_committed(&self, xid: Xid) -> bool {
            xid == SUPER_XID || self.committed.contains(&xid)
        }
    }

    fn entry(xmin: Xid, xmax: Xid) -> Entry {
        let entry = Entry::new(
            ItemId(1),
            Arc::new(DataItem::new(ItemId(1), wrap_entry(xmin, b"row"))),
        );
        if xmax != 0 {
            entry.set_xmax(xmax);
        }
        entry
    }

    fn context(xid: Xid, level: IsolationLevel, active: &[Xid]) -> TransactionContext {
        TransactionContext::new(xid, level, active.iter().copied())
    }

    #[test]
    fn own_live_insert_is_visible_at_both_levels() {
        let tm = StubTm::with_committed(&[]);
        for level in [IsolationLevel::ReadCommitted, IsolationLevel::RepeatableRead] {
            let t = context(5, level, &[]);
            assert!(is_visible(&tm, &t, &entry(5, 0)));
        }
    }

    #[test]
    fn read_committed_sees_committed_live_entries() {
        let tm = StubTm::with_committed(&[2]);
        let t = context(5, IsolationLevel::ReadCommitted, &[]);
        assert!(is_visible(&tm, &t, &entry(2, 0)));
        // uncommitted creator
        assert!(!is_visible(&tm, &t, &entry(3, 0)));
    }

    #[test]
    fn read_committed_ignores_uncommitted_deletion() {
        let tm = StubTm::with_committed(&[2]);
        let t = context(5, IsolationLevel::ReadCommitted, &[]);
        // deleted by an uncommitted stranger: still visible
        assert!(is_visible(&tm, &t, &entry(2, 7)));
        // own deletion hides the entry
        assert!(!is_visible(&tm, &t, &entry(2, 5)));
    }

    #[test]
    fn read_committed_hides_committed_deletion() {
        let tm = StubTm::with_committed(&[2, 7]);
        let t = context(5, IsolationLevel::ReadCommitted, &[]);
        assert!(!is_visible(&tm, &t, &entry(2, 7)));
    }

    #[test]
    fn repeatable_read_hides_later_transactions() {
        let tm = StubTm::with_committed(&[7]);
        let t = context(5, IsolationLevel::RepeatableRead, &[]);
        // committed, but began after t
        assert!(!is_visible(&tm, &t, &entry(7, 0)));
    }

    #[test]
    fn repeatable_read_hides_snapshotted_creators() {
        let tm = StubTm::with_committed(&[3]);
        // 3 was still active when t began
        let t = context(5, IsolationLevel::RepeatableRead, &[3]);
        assert!(!is_visible(&tm, &t, &entry(3, 0)));

        // same creator, committed before a later transaction began
        let t2 = context(8, IsolationLevel::RepeatableRead, &[]);
        assert!(is_visible(&tm, &t2, &entry(3, 0)));
    }

    #[test]
    fn repeatable_read_ignores_masked_deletions() {
        let tm = StubTm::with_committed(&[2, 7]);
        let t = context(5, IsolationLevel::RepeatableRead, &[]);
        // deleted by a committed transaction that began after t: still visible
        assert!(is_visible(&tm, &t, &entry(2, 7)));

        // deleted by a transaction active at t's begin: still visible
        let tm = StubTm::with_committed(&[2, 4]);
        let t = context(5, IsolationLevel::RepeatableRead, &[4]);
        assert!(is_visible(&tm, &t, &entry(2, 4)));

        // deleted by a transaction committed before t began: hidden
        let tm = StubTm::with_committed(&[2, 3]);
        let t = context(5, IsolationLevel::RepeatableRead, &[]);
        assert!(!is_visible(&tm, &t, &entry(2, 3)));
    }

    #[test]
    fn super_transaction_counts_as_committed() {
        let tm = StubTm::with_committed(&[]);
        let t = context(5, IsolationLevel::RepeatableRead, &[]);
        assert!(is_visible(&tm, &t, &entry(SUPER_XID, 0)));
    }

    #[test]
    fn version_skip_only_under_repeatable_read() {
        let tm = StubTm::with_committed(&[7]);
        let rr = context(5, IsolationLevel::RepeatableRead, &[]);
        let rc = context(5, IsolationLevel::ReadCommitted, &[]);
        let deleted_later = entry(2, 7);

        assert!(is_version_skip(&tm, &rr, &deleted_later));
        assert!(!is_version_skip(&tm, &rc, &deleted_later));
    }

    #[test]
    fn version_skip_on_snapshotted_deleter() {
        let tm = StubTm::with_committed(&[4]);
        let t = context(5, IsolationLevel::RepeatableRead, &[4]);
        assert!(is_version_skip(&tm, &t, &entry(2, 4)));
    }

    #[test]
    fn live_entry_is_never_a_version_skip() {
        let tm = StubTm::with_committed(&[]);
        let t = context(5, IsolationLevel::RepeatableRead, &[]);
        assert!(!is_version_skip(&tm, &t, &entry(2, 0)));
    }

    #[test]
    fn earlier_committed_deleter_is_not_a_skip() {
        // deletion t can see (committed before t began): no skip
        let tm = StubTm::with_committed(&[3]);
        let t = context(5, IsolationLevel::RepeatableRead, &[]);
        assert!(!is_version_skip(&tm, &t, &entry(2, 3)));
    }
}
