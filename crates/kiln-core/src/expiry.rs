//! Expiration index: a timer-bucket set over entries with finite
//! deadlines.
//!
//! Entries are filed into one of 65 buckets addressed by the number of
//! leading zeros of `deadline ^ last`, where `last` is the horizon of
//! the most recent drain. Higher bucket indices share more leading
//! bits with the horizon and therefore hold nearer deadlines; bucket 64
//! holds deadlines at or before the horizon. When a drain advances the
//! horizon to `now`, every bucket above the horizon's own bucket is
//! expired wholesale and only the one boundary bucket is filtered
//! entry by entry. Buckets are doubly-linked lists threaded through
//! each entry's `expiry_link`, so membership, removal, and re-filing
//! are O(1) and the index owns nothing.
//!
//! The earliest pending deadline is tracked exactly: the timer armed
//! from it always equals the true minimum, at the cost of a rescan
//! when the minimum itself is removed.

use crate::arena::{EntryArena, EntryHandle};
use crate::time::NO_EXPIRY;

const TIMESTAMP_BITS: usize = u64::BITS as usize;
const N_BUCKETS: usize = TIMESTAMP_BITS + 1;

/// Per-entry linkage for the expiration index. `bucket` doubles as the
/// membership flag.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ExpiryLink {
    pub(crate) prev: Option<EntryHandle>,
    pub(crate) next: Option<EntryHandle>,
    pub(crate) bucket: Option<u8>,
}

#[derive(Debug)]
pub(crate) struct ExpiryIndex {
    buckets: [Option<EntryHandle>; N_BUCKETS],
    /// Bit i set iff bucket i is non-empty.
    non_empty: u128,
    /// Horizon of the most recent drain.
    last: u64,
    /// Exact earliest pending deadline; `u64::MAX` when empty.
    next: u64,
    len: usize,
}

impl ExpiryIndex {
    pub(crate) fn new() -> Self {
        Self {
            buckets: [None; N_BUCKETS],
            non_empty: 0,
            last: 0,
            next: u64::MAX,
            len: 0,
        }
    }

    fn bucket_of(&self, deadline: u64) -> usize {
        if deadline <= self.last {
            N_BUCKETS - 1
        } else {
            (deadline ^ self.last).leading_zeros() as usize
        }
    }

    fn link_into_bucket(&mut self, arena: &mut EntryArena, handle: EntryHandle, deadline: u64) {
        let bucket = self.bucket_of(deadline);
        let head = self.buckets[bucket];
        arena.get_mut(handle).expiry_link = ExpiryLink {
            prev: None,
            next: head,
            bucket: Some(bucket as u8),
        };
        if let Some(old_head) = head {
            arena.get_mut(old_head).expiry_link.prev = Some(handle);
        }
        self.buckets[bucket] = Some(handle);
        self.non_empty |= 1u128 << bucket;
    }

    /// Files an entry under its deadline.
    ///
    /// Returns `true` iff the insertion lowered the earliest pending
    /// deadline, i.e. the caller must re-arm its timer. Inserting an
    /// entry that is already a member is a membership no-op returning
    /// `false`; deadline changes go through remove-then-insert.
    pub(crate) fn insert(&mut self, arena: &mut EntryArena, handle: EntryHandle) -> bool {
        let entry = arena.get(handle);
        if entry.expiry_link.bucket.is_some() {
            return false;
        }
        let deadline = entry.expires_at_ms();
        debug_assert_ne!(deadline, NO_EXPIRY, "entries without a deadline never join");

        self.link_into_bucket(arena, handle, deadline);
        self.len += 1;

        if deadline < self.next {
            self.next = deadline;
            true
        } else {
            false
        }
    }

    /// Unlinks an entry. A no-op when the entry is not a member.
    pub(crate) fn remove(&mut self, arena: &mut EntryArena, handle: EntryHandle) {
        let link = arena.get(handle).expiry_link;
        let bucket = match link.bucket {
            Some(b) => b as usize,
            None => return,
        };

        match link.prev {
            Some(prev) => arena.get_mut(prev).expiry_link.next = link.next,
            None => self.buckets[bucket] = link.next,
        }
        if let Some(next) = link.next {
            arena.get_mut(next).expiry_link.prev = link.prev;
        }
        arena.get_mut(handle).expiry_link = ExpiryLink::default();
        if self.buckets[bucket].is_none() {
            self.non_empty &= !(1u128 << bucket);
        }
        self.len -= 1;

        let deadline = arena.get(handle).expires_at_ms();
        if self.len == 0 {
            self.next = u64::MAX;
        } else if deadline <= self.next {
            self.recompute_next(arena);
        }
    }

    /// Drains every entry whose deadline is at or before `now` into a
    /// batch, advancing the horizon. Entries with equal deadlines come
    /// out in no particular order.
    pub(crate) fn expire(&mut self, arena: &mut EntryArena, now: u64) -> Vec<EntryHandle> {
        debug_assert!(now >= self.last, "the clock is monotonic");
        let mut batch = Vec::new();
        let boundary = self.bucket_of(now);

        // buckets above the boundary hold deadlines at or before now
        for bucket in (boundary + 1)..N_BUCKETS {
            if self.non_empty & (1u128 << bucket) == 0 {
                continue;
            }
            let mut cursor = self.buckets[bucket].take();
            self.non_empty &= !(1u128 << bucket);
            while let Some(handle) = cursor {
                let entry = arena.get_mut(handle);
                cursor = entry.expiry_link.next;
                entry.expiry_link = ExpiryLink::default();
                batch.push(handle);
            }
        }

        self.last = now;

        // the boundary bucket straddles now; survivors are re-filed
        // under the advanced horizon
        if self.non_empty & (1u128 << boundary) != 0 {
            let mut cursor = self.buckets[boundary].take();
            self.non_empty &= !(1u128 << boundary);
            while let Some(handle) = cursor {
                let (after, deadline) = {
                    let entry = arena.get_mut(handle);
                    let after = entry.expiry_link.next;
                    entry.expiry_link = ExpiryLink::default();
                    (after, entry.expires_at_ms())
                };
                cursor = after;
                if deadline <= now {
                    batch.push(handle);
                } else {
                    self.link_into_bucket(arena, handle, deadline);
                }
            }
        }

        self.len -= batch.len();
        if self.len == 0 {
            self.next = u64::MAX;
        } else {
            self.recompute_next(arena);
        }
        batch
    }

    /// The exact earliest pending deadline, or `None` when empty.
    pub(crate) fn next_timeout(&self) -> Option<u64> {
        if self.len == 0 {
            None
        } else {
            Some(self.next)
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Forgets every member. Entry links are not touched; callers only
    /// clear in lockstep with dropping the entries themselves.
    pub(crate) fn clear(&mut self) {
        self.buckets = [None; N_BUCKETS];
        self.non_empty = 0;
        self.next = u64::MAX;
        self.len = 0;
    }

    fn recompute_next(&mut self, arena: &EntryArena) {
        let mut next = u64::MAX;
        let mut bits = self.non_empty;
        while bits != 0 {
            let bucket = bits.trailing_zeros() as usize;
            bits &= bits - 1;
            let mut cursor = self.buckets[bucket];
            while let Some(handle) = cursor {
                let entry = arena.get(handle);
                next = next.min(entry.expires_at_ms());
                cursor = entry.expiry_link.next;
            }
        }
        self.next = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::key::fingerprint;
    use bytes::Bytes;

    fn entry_at(arena: &mut EntryArena, key: &str, deadline: u64) -> EntryHandle {
        let k = Bytes::copy_from_slice(key.as_bytes());
        let h = fingerprint(&k);
        let mut e = Entry::new_int64(k, h, 0);
        e.set_expires_at(deadline);
        arena.insert(e).unwrap()
    }

    #[test]
    fn insert_reports_lowered_deadline() {
        let mut arena = EntryArena::new();
        let mut index = ExpiryIndex::new();

        let a = entry_at(&mut arena, "a", 1_000);
        assert!(index.insert(&mut arena, a));
        assert_eq!(index.next_timeout(), Some(1_000));

        let b = entry_at(&mut arena, "b", 2_000);
        assert!(!index.insert(&mut arena, b));
        assert_eq!(index.next_timeout(), Some(1_000));

        let c = entry_at(&mut arena, "c", 500);
        assert!(index.insert(&mut arena, c));
        assert_eq!(index.next_timeout(), Some(500));
        assert_eq!(index.len(), 3);
    }

    #[test]
    fn double_insert_is_a_membership_noop() {
        let mut arena = EntryArena::new();
        let mut index = ExpiryIndex::new();
        let a = entry_at(&mut arena, "a", 1_000);
        assert!(index.insert(&mut arena, a));
        assert!(!index.insert(&mut arena, a));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remove_restores_the_minimum() {
        let mut arena = EntryArena::new();
        let mut index = ExpiryIndex::new();
        let a = entry_at(&mut arena, "a", 1_000);
        let b = entry_at(&mut arena, "b", 2_000);
        index.insert(&mut arena, a);
        index.insert(&mut arena, b);

        index.remove(&mut arena, a);
        assert_eq!(index.next_timeout(), Some(2_000));
        assert_eq!(index.len(), 1);

        index.remove(&mut arena, b);
        assert_eq!(index.next_timeout(), None);
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn remove_of_non_member_is_a_noop() {
        let mut arena = EntryArena::new();
        let mut index = ExpiryIndex::new();
        let a = entry_at(&mut arena, "a", 1_000);
        index.remove(&mut arena, a);
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn expire_drains_everything_due() {
        let mut arena = EntryArena::new();
        let mut index = ExpiryIndex::new();
        let a = entry_at(&mut arena, "a", 100);
        let b = entry_at(&mut arena, "b", 200);
        let c = entry_at(&mut arena, "c", 5_000);
        index.insert(&mut arena, a);
        index.insert(&mut arena, b);
        index.insert(&mut arena, c);

        let mut due = index.expire(&mut arena, 300);
        due.sort_by_key(|h| arena.get(*h).expires_at_ms());
        assert_eq!(due, vec![a, b]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.next_timeout(), Some(5_000));
    }

    #[test]
    fn expire_with_nothing_due_is_empty() {
        let mut arena = EntryArena::new();
        let mut index = ExpiryIndex::new();
        let a = entry_at(&mut arena, "a", 10_000);
        index.insert(&mut arena, a);

        assert!(index.expire(&mut arena, 50).is_empty());
        assert_eq!(index.len(), 1);
        assert_eq!(index.next_timeout(), Some(10_000));
    }

    #[test]
    fn drained_entries_can_rejoin() {
        let mut arena = EntryArena::new();
        let mut index = ExpiryIndex::new();
        let a = entry_at(&mut arena, "a", 100);
        index.insert(&mut arena, a);

        let due = index.expire(&mut arena, 150);
        assert_eq!(due, vec![a]);

        // re-file under a later deadline, past the advanced horizon
        arena.get_mut(a).set_expires_at(900);
        assert!(index.insert(&mut arena, a));
        assert_eq!(index.next_timeout(), Some(900));
        let due = index.expire(&mut arena, 1_000);
        assert_eq!(due, vec![a]);
    }

    #[test]
    fn deadline_at_the_horizon_expires() {
        let mut arena = EntryArena::new();
        let mut index = ExpiryIndex::new();
        let a = entry_at(&mut arena, "a", 100);
        index.insert(&mut arena, a);
        index.expire(&mut arena, 100);
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn repeated_drains_at_the_same_instant() {
        let mut arena = EntryArena::new();
        let mut index = ExpiryIndex::new();
        index.expire(&mut arena, 500);

        // a deadline before the horizon goes to the overdue bucket and
        // still comes out on the next drain
        let a = entry_at(&mut arena, "a", 200);
        assert!(index.insert(&mut arena, a));
        let due = index.expire(&mut arena, 500);
        assert_eq!(due, vec![a]);
    }

    #[test]
    fn many_scattered_deadlines_drain_in_order() {
        let mut arena = EntryArena::new();
        let mut index = ExpiryIndex::new();

        let mut handles = Vec::new();
        for i in 1..=200u64 {
            let h = entry_at(&mut arena, &format!("k{i}"), i * 37);
            index.insert(&mut arena, h);
            handles.push(h);
        }
        assert_eq!(index.len(), 200);
        assert_eq!(index.next_timeout(), Some(37));

        // drain in three passes and check nothing is lost or early
        let mut seen = 0;
        for (now, expected) in [(37 * 50, 50), (37 * 120, 70), (u64::MAX / 2, 80)] {
            let due = index.expire(&mut arena, now);
            assert_eq!(due.len(), expected);
            for h in &due {
                assert!(arena.get(*h).expires_at_ms() <= now);
            }
            seen += due.len();
        }
        assert_eq!(seen, 200);
        assert_eq!(index.next_timeout(), None);
    }

    #[test]
    fn clear_forgets_members() {
        let mut arena = EntryArena::new();
        let mut index = ExpiryIndex::new();
        let a = entry_at(&mut arena, "a", 1_000);
        index.insert(&mut arena, a);
        index.clear();
        assert_eq!(index.len(), 0);
        assert_eq!(index.next_timeout(), None);
    }
}
