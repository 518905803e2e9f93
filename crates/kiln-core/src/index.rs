//! Primary index: a chained hash table over arena handles.
//!
//! Buckets hold the head of a singly-linked chain threaded through each
//! entry's `bucket_next` slot, so the index stores no keys of its own.
//! Lookup compares the stored fingerprint first and the key bytes only
//! on a fingerprint match. Growth doubles the bucket array in one shot
//! once the load factor is crossed; if the allocator refuses, the index
//! keeps serving at the old size and the next insertion retries.

use tracing::{debug, warn};

use crate::arena::{EntryArena, EntryHandle};

/// Initial bucket count. Must be a power of two.
pub const DEFAULT_INITIAL_SIZE: usize = 1 << 20;

/// Fraction of the bucket count at which the index grows.
pub const LOAD_FACTOR: f64 = 0.75;

fn grow_threshold(bucket_count: usize) -> usize {
    (bucket_count as f64 * LOAD_FACTOR) as usize
}

#[derive(Debug)]
pub(crate) struct PrimaryIndex {
    buckets: Vec<Option<EntryHandle>>,
    len: usize,
    grow_at: usize,
}

impl PrimaryIndex {
    /// Creates an index with `bucket_count` buckets (a power of two).
    pub(crate) fn with_buckets(bucket_count: usize) -> Self {
        assert!(
            bucket_count.is_power_of_two(),
            "bucket count must be a power of two"
        );
        Self {
            buckets: vec![None; bucket_count],
            len: 0,
            grow_at: grow_threshold(bucket_count),
        }
    }

    fn bucket_of(&self, fingerprint: u64) -> usize {
        (fingerprint as usize) & (self.buckets.len() - 1)
    }

    /// Finds the entry matching `fingerprint` + `key`, if any.
    pub(crate) fn find(
        &self,
        arena: &EntryArena,
        fingerprint: u64,
        key: &[u8],
    ) -> Option<EntryHandle> {
        let mut cursor = self.buckets[self.bucket_of(fingerprint)];
        while let Some(handle) = cursor {
            let entry = arena.get(handle);
            if entry.key_hash() == fingerprint && entry.key() == key {
                return Some(handle);
            }
            cursor = entry.bucket_next;
        }
        None
    }

    /// Links an entry into its bucket. Does not check for duplicates;
    /// that is the facade's job.
    pub(crate) fn insert(&mut self, arena: &mut EntryArena, handle: EntryHandle) {
        let bucket = self.bucket_of(arena.get(handle).key_hash());
        let head = self.buckets[bucket];
        arena.get_mut(handle).bucket_next = head;
        self.buckets[bucket] = Some(handle);
        self.len += 1;
    }

    /// Unlinks an entry from its bucket chain.
    pub(crate) fn remove(&mut self, arena: &mut EntryArena, handle: EntryHandle) {
        let bucket = self.bucket_of(arena.get(handle).key_hash());
        let next = arena.get(handle).bucket_next;

        if self.buckets[bucket] == Some(handle) {
            self.buckets[bucket] = next;
        } else {
            let mut cursor = self.buckets[bucket];
            loop {
                let prev = cursor.expect("entry not found in its bucket chain");
                if arena.get(prev).bucket_next == Some(handle) {
                    arena.get_mut(prev).bucket_next = next;
                    break;
                }
                cursor = arena.get(prev).bucket_next;
            }
        }

        arena.get_mut(handle).bucket_next = None;
        self.len -= 1;
    }

    /// `true` once the load factor threshold has been reached.
    pub(crate) fn needs_grow(&self) -> bool {
        self.len >= self.grow_at
    }

    /// Doubles the bucket array and redistributes every chain.
    ///
    /// Growth is a single synchronous rebucketing. An allocation
    /// failure is swallowed: the old table stays in service and a
    /// later insertion retries.
    pub(crate) fn try_grow(&mut self, arena: &mut EntryArena) {
        let new_count = self.buckets.len() * 2;

        let mut grown: Vec<Option<EntryHandle>> = Vec::new();
        if grown.try_reserve_exact(new_count).is_err() {
            warn!(
                buckets = self.buckets.len(),
                entries = self.len,
                "bucket growth failed, keeping current table"
            );
            return;
        }
        grown.resize(new_count, None);

        let old = std::mem::replace(&mut self.buckets, grown);
        let mask = (new_count - 1) as u64;
        for mut cursor in old {
            while let Some(handle) = cursor {
                let entry = arena.get_mut(handle);
                cursor = entry.bucket_next.take();
                let bucket = (entry.key_hash() & mask) as usize;
                entry.bucket_next = self.buckets[bucket];
                self.buckets[bucket] = Some(handle);
            }
        }

        self.grow_at = grow_threshold(new_count);
        debug!(buckets = new_count, entries = self.len, "hash index grown");
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// Empties every bucket. The bucket array keeps its current size;
    /// the index never shrinks.
    pub(crate) fn clear(&mut self) {
        self.buckets.iter_mut().for_each(|b| *b = None);
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::Entry;
    use crate::key::fingerprint;
    use bytes::Bytes;

    fn put(index: &mut PrimaryIndex, arena: &mut EntryArena, key: &str, v: i64) -> EntryHandle {
        let k = Bytes::copy_from_slice(key.as_bytes());
        let h = fingerprint(&k);
        let handle = arena.insert(Entry::new_int64(k, h, v)).unwrap();
        index.insert(arena, handle);
        handle
    }

    fn find(index: &PrimaryIndex, arena: &EntryArena, key: &str) -> Option<EntryHandle> {
        index.find(arena, fingerprint(key.as_bytes()), key.as_bytes())
    }

    #[test]
    fn insert_then_find() {
        let mut arena = EntryArena::new();
        let mut index = PrimaryIndex::with_buckets(8);
        let h = put(&mut index, &mut arena, "foo", 1);
        assert_eq!(find(&index, &arena, "foo"), Some(h));
        assert_eq!(find(&index, &arena, "bar"), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn remove_unlinks_from_chain() {
        let mut arena = EntryArena::new();
        // a single bucket forces every entry onto one chain
        let mut index = PrimaryIndex::with_buckets(1);
        let a = put(&mut index, &mut arena, "a", 1);
        let b = put(&mut index, &mut arena, "b", 2);
        let c = put(&mut index, &mut arena, "c", 3);

        // middle of the chain
        index.remove(&mut arena, b);
        assert_eq!(find(&index, &arena, "a"), Some(a));
        assert_eq!(find(&index, &arena, "b"), None);
        assert_eq!(find(&index, &arena, "c"), Some(c));

        // chain head
        index.remove(&mut arena, c);
        assert_eq!(find(&index, &arena, "a"), Some(a));
        assert_eq!(find(&index, &arena, "c"), None);
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn growth_preserves_every_key() {
        let mut arena = EntryArena::new();
        let mut index = PrimaryIndex::with_buckets(4);

        for i in 0..64 {
            put(&mut index, &mut arena, &format!("key:{i}"), i);
            if index.needs_grow() {
                index.try_grow(&mut arena);
            }
        }

        assert!(index.bucket_count() > 4);
        assert!(index.bucket_count().is_power_of_two());
        assert_eq!(index.len(), 64);
        for i in 0..64 {
            let found = find(&index, &arena, &format!("key:{i}"));
            let handle = found.expect("key lost during rehash");
            assert_eq!(arena.get(handle).value_int().unwrap(), i);
        }
    }

    #[test]
    fn threshold_follows_load_factor() {
        let mut arena = EntryArena::new();
        let mut index = PrimaryIndex::with_buckets(8);

        // 8 buckets at 0.75 load: the sixth insertion hits the threshold
        for i in 0..5 {
            put(&mut index, &mut arena, &format!("k{i}"), i);
            assert!(!index.needs_grow());
        }
        put(&mut index, &mut arena, "k5", 5);
        assert!(index.needs_grow());
    }

    #[test]
    fn clear_keeps_bucket_count() {
        let mut arena = EntryArena::new();
        let mut index = PrimaryIndex::with_buckets(16);
        put(&mut index, &mut arena, "x", 1);
        index.clear();
        assert_eq!(index.len(), 0);
        assert_eq!(index.bucket_count(), 16);
        assert_eq!(find(&index, &arena, "x"), None);
    }

    #[test]
    fn fingerprint_collisions_fall_back_to_bytes() {
        let mut arena = EntryArena::new();
        let index = {
            let mut index = PrimaryIndex::with_buckets(4);
            // same fabricated fingerprint for both keys
            let k1 = Bytes::from("one");
            let k2 = Bytes::from("two");
            let h1 = arena.insert(Entry::new_int64(k1, 9, 1)).unwrap();
            let h2 = arena.insert(Entry::new_int64(k2, 9, 2)).unwrap();
            index.insert(&mut arena, h1);
            index.insert(&mut arena, h2);
            index
        };

        let one = index.find(&arena, 9, b"one").unwrap();
        let two = index.find(&arena, 9, b"two").unwrap();
        assert_eq!(arena.get(one).value_int().unwrap(), 1);
        assert_eq!(arena.get(two).value_int().unwrap(), 2);
        assert_eq!(index.find(&arena, 9, b"three"), None);
    }
}
