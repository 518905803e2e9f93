//! The store facade: the public surface of one shard's keyspace.
//!
//! A `Store` owns the entry arena, the primary hash index, and the
//! expiration index, and keeps the three consistent: an entry is in the
//! expiration index exactly when it carries a finite deadline, and the
//! armed timer deadline always equals the earliest pending one. All
//! operations are single-threaded per shard with no internal locking;
//! callers serialize access (normally by pinning the store to one task,
//! see [`crate::shard`]).
//!
//! Expired entries are not dropped behind the caller's back: a sweep
//! drains them from the expiration index and hands each one to the
//! registered expired-entry releaser, which reclaims it from the
//! primary index (and may run its own bookkeeping first).

use tracing::debug;

use crate::arena::{EntryArena, EntryHandle};
use crate::entry::Entry;
use crate::error::StoreError;
use crate::expiry::ExpiryIndex;
use crate::index::{PrimaryIndex, DEFAULT_INITIAL_SIZE};
use crate::key::LookupKey;
use crate::time;

/// Callback invoked once per expired entry during a sweep.
///
/// The releaser runs re-entrantly: it receives the store itself and is
/// responsible for calling [`Store::reclaim`] on the handle (after any
/// bookkeeping such as keyspace notifications). The handle is valid
/// until reclaimed.
pub type ExpiredEntryReleaser = Box<dyn FnMut(&mut Store, EntryHandle) + Send>;

/// Configuration for a single store / shard.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Initial bucket count for the primary index. Must be a power of
    /// two. The index only ever grows.
    pub initial_buckets: usize,
    /// Numeric identifier for this shard, used in log fields.
    pub shard_id: u16,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            initial_buckets: DEFAULT_INITIAL_SIZE,
            shard_id: 0,
        }
    }
}

/// Result of a TTL query, matching Redis semantics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TtlResult {
    /// Key exists and has a TTL. Returns remaining seconds.
    Seconds(u64),
    /// Key exists and has a TTL. Returns remaining milliseconds.
    Milliseconds(u64),
    /// Key exists but has no expiration set.
    NoExpiry,
    /// Key does not exist.
    NotFound,
}

/// Aggregated statistics for a store. All fields are tracked
/// incrementally, so this is O(1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of live keys.
    pub key_count: usize,
    /// Number of keys with an expiration set.
    pub keys_with_expiry: usize,
    /// Cumulative count of keys released by expiration sweeps.
    pub keys_expired: u64,
    /// Current bucket count of the primary index.
    pub bucket_count: usize,
}

/// The single-shard keyed value store.
pub struct Store {
    arena: EntryArena,
    index: PrimaryIndex,
    alive: ExpiryIndex,
    releaser: Option<ExpiredEntryReleaser>,
    /// Deadline the timer is armed at; `None` means disarmed. Kept
    /// equal to `alive.next_timeout()` after every mutation.
    armed_at: Option<u64>,
    expired_total: u64,
    shard_id: u16,
}

impl Store {
    /// Creates an empty store with default config.
    pub fn new() -> Self {
        Self::with_config(StoreConfig::default())
    }

    /// Creates an empty store with the given config.
    pub fn with_config(config: StoreConfig) -> Self {
        Self {
            arena: EntryArena::new(),
            index: PrimaryIndex::with_buckets(config.initial_buckets),
            alive: ExpiryIndex::new(),
            releaser: None,
            armed_at: None,
            expired_total: 0,
            shard_id: config.shard_id,
        }
    }

    /// Registers the expired-entry releaser. Must be called before the
    /// first sweep; sweeping without one panics.
    pub fn set_expired_entry_releaser(
        &mut self,
        releaser: impl FnMut(&mut Store, EntryHandle) + Send + 'static,
    ) {
        self.releaser = Some(Box::new(releaser));
    }

    /// Returns `true` if a live entry matches the key.
    pub fn exists(&self, key: &LookupKey<'_>) -> bool {
        self.find(key).is_some()
    }

    /// Runs a visitor against the matching entry, or against absence.
    pub fn with_entry<R>(&self, key: &LookupKey<'_>, f: impl FnOnce(Option<&Entry>) -> R) -> R {
        match self.find(key) {
            Some(handle) => f(Some(self.arena.get(handle))),
            None => f(None),
        }
    }

    /// Runs a visitor with mutable access to the matching entry's
    /// payload, or against absence. The entry's key, fingerprint, kind,
    /// and deadline cannot be changed through it.
    pub fn with_entry_mut<R>(
        &mut self,
        key: &LookupKey<'_>,
        f: impl FnOnce(Option<&mut Entry>) -> R,
    ) -> R {
        match self.find(key) {
            Some(handle) => f(Some(self.arena.get_mut(handle))),
            None => f(None),
        }
    }

    /// Removes the entry matching the key. Returns `true` if one was
    /// present.
    pub fn erase(&mut self, key: &LookupKey<'_>) -> bool {
        match self.find(key) {
            Some(handle) => {
                self.reclaim(handle);
                true
            }
            None => false,
        }
    }

    /// Links a fresh entry unconditionally.
    ///
    /// The caller asserts no entry with this key exists; duplicate
    /// handling belongs to [`Store::replace`] and [`Store::insert_if`].
    pub fn insert(&mut self, entry: Entry) -> Result<(), StoreError> {
        debug_assert!(!self.exists(&LookupKey::with_fingerprint(entry.key(), entry.key_hash())));
        let handle = self.arena.insert(entry)?;
        self.index.insert(&mut self.arena, handle);
        self.maybe_rehash();
        Ok(())
    }

    /// Inserts an entry, removing any prior entry with the same key
    /// first. Returns `true` if the key was absent, `false` if a prior
    /// entry was overwritten.
    pub fn replace(&mut self, entry: Entry) -> Result<bool, StoreError> {
        let prior = self.index.find(&self.arena, entry.key_hash(), entry.key());
        // allocate before removing so a failure leaves the store intact
        let handle = self.arena.insert(entry)?;
        let was_absent = prior.is_none();
        if let Some(prior) = prior {
            self.release(prior);
        }
        self.index.insert(&mut self.arena, handle);
        self.maybe_rehash();
        Ok(was_absent)
    }

    /// Conditional insert: the NX/XX state machine.
    ///
    /// With `nx` the insert only happens if the key is absent; with
    /// `xx` only if it is present (replacing the prior entry). Setting
    /// both is rejected with `InvalidPredicate` before any mutation.
    /// A `ttl_ms` of zero means the new entry never expires; a positive
    /// one files the entry under `now + ttl_ms` and re-arms the timer
    /// if that lowered the earliest pending deadline.
    ///
    /// Returns `true` iff the entry was inserted.
    pub fn insert_if(
        &mut self,
        entry: Entry,
        ttl_ms: u64,
        nx: bool,
        xx: bool,
    ) -> Result<bool, StoreError> {
        if nx && xx {
            return Err(StoreError::InvalidPredicate);
        }

        let prior = self.index.find(&self.arena, entry.key_hash(), entry.key());
        let should_insert = match prior {
            Some(_) => !nx,
            None => !xx,
        };
        if !should_insert {
            return Ok(false);
        }

        // allocate before removing so a failure leaves the store intact
        let handle = self.arena.insert(entry)?;
        if let Some(prior) = prior {
            self.release(prior);
        }

        if ttl_ms > 0 {
            let deadline = time::deadline_after(ttl_ms);
            self.arena.get_mut(handle).set_expires_at(deadline);
            if self.alive.insert(&mut self.arena, handle) {
                self.armed_at = Some(deadline);
            }
        }

        self.index.insert(&mut self.arena, handle);
        self.maybe_rehash();
        Ok(true)
    }

    /// Sets a deadline `ttl_ms` from now on an existing entry, filing
    /// it in the expiration index (re-filing if it was already a
    /// member) and re-arming the timer when needed. A zero TTL is
    /// equivalent to [`Store::persist`].
    ///
    /// Returns `true` if the deadline was applied.
    pub fn expire(&mut self, key: &LookupKey<'_>, ttl_ms: u64) -> bool {
        if ttl_ms == 0 {
            return self.persist(key);
        }
        let Some(handle) = self.find(key) else {
            return false;
        };

        self.alive.remove(&mut self.arena, handle);
        let deadline = time::deadline_after(ttl_ms);
        self.arena.get_mut(handle).set_expires_at(deadline);
        if self.alive.insert(&mut self.arena, handle) {
            self.armed_at = Some(deadline);
        } else {
            self.armed_at = self.alive.next_timeout();
        }
        true
    }

    /// Clears the deadline of an existing entry, removing it from the
    /// expiration index. Returns `true` if the entry existed and had a
    /// deadline.
    pub fn persist(&mut self, key: &LookupKey<'_>) -> bool {
        let Some(handle) = self.find(key) else {
            return false;
        };
        if !self.arena.get(handle).ever_expires() {
            return false;
        }
        self.alive.remove(&mut self.arena, handle);
        self.arena.get_mut(handle).clear_expiry();
        self.armed_at = self.alive.next_timeout();
        true
    }

    /// Remaining time-to-live in whole seconds.
    pub fn ttl(&self, key: &LookupKey<'_>) -> TtlResult {
        match self.find(key) {
            Some(handle) => match time::remaining_secs(self.arena.get(handle).expires_at_ms()) {
                Some(secs) => TtlResult::Seconds(secs),
                None => TtlResult::NoExpiry,
            },
            None => TtlResult::NotFound,
        }
    }

    /// Remaining time-to-live in milliseconds.
    pub fn pttl(&self, key: &LookupKey<'_>) -> TtlResult {
        match self.find(key) {
            Some(handle) => match time::remaining_ms(self.arena.get(handle).expires_at_ms()) {
                Some(ms) => TtlResult::Milliseconds(ms),
                None => TtlResult::NoExpiry,
            },
            None => TtlResult::NotFound,
        }
    }

    /// Releases every entry and empties both indices. The bucket array
    /// keeps its size and the timer is disarmed.
    pub fn flush_all(&mut self) {
        self.alive.clear();
        self.index.clear();
        self.arena.clear();
        self.armed_at = None;
    }

    /// Drains every entry whose deadline has passed, invoking the
    /// registered releaser once per entry, then re-arms the timer at
    /// the new earliest deadline. Returns the number of entries
    /// released.
    ///
    /// Panics if no releaser is registered; that is a setup bug.
    ///
    /// The releaser may re-enter the facade. If it erases other keys,
    /// handles later in the batch may already be gone; those are
    /// skipped.
    pub fn sweep(&mut self) -> usize {
        let mut releaser = self
            .releaser
            .take()
            .expect("expired-entry releaser must be registered before sweeping");

        let batch = self.alive.expire(&mut self.arena, time::now_ms());
        let mut released = 0;
        for handle in batch {
            if !self.arena.contains(handle) {
                continue;
            }
            self.expired_total += 1;
            released += 1;
            releaser(self, handle);
        }
        // the callback may have registered a replacement; keep it
        if self.releaser.is_none() {
            self.releaser = Some(releaser);
        }

        self.armed_at = self.alive.next_timeout();
        if released > 0 {
            debug!(shard_id = self.shard_id, released, "expiration sweep");
        }
        released
    }

    /// Removes an entry from both indices and releases it, returning
    /// it for final bookkeeping. This is what the expired-entry
    /// releaser calls; `erase` goes through it too.
    pub fn reclaim(&mut self, handle: EntryHandle) -> Entry {
        self.release(handle)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// `true` when no keys are live.
    pub fn is_empty(&self) -> bool {
        self.index.len() == 0
    }

    /// Number of keys with a finite deadline.
    pub fn expiring_len(&self) -> usize {
        self.alive.len()
    }

    /// The deadline the timer is armed at, `None` when disarmed.
    /// Always equals the earliest pending deadline.
    pub fn timer_deadline(&self) -> Option<u64> {
        self.armed_at
    }

    /// Current bucket count of the primary index.
    pub fn bucket_count(&self) -> usize {
        self.index.bucket_count()
    }

    /// O(1) aggregate statistics.
    pub fn stats(&self) -> StoreStats {
        debug_assert_eq!(self.arena.len(), self.index.len());
        StoreStats {
            key_count: self.index.len(),
            keys_with_expiry: self.alive.len(),
            keys_expired: self.expired_total,
            bucket_count: self.index.bucket_count(),
        }
    }

    fn find(&self, key: &LookupKey<'_>) -> Option<EntryHandle> {
        self.index.find(&self.arena, key.fingerprint(), key.bytes())
    }

    /// Unlinks an entry from both indices, frees its slot, and re-arms
    /// the timer in case the entry was the earliest pending deadline.
    fn release(&mut self, handle: EntryHandle) -> Entry {
        self.alive.remove(&mut self.arena, handle);
        self.index.remove(&mut self.arena, handle);
        let entry = self.arena.remove(handle);
        self.armed_at = self.alive.next_timeout();
        entry
    }

    fn maybe_rehash(&mut self) {
        if self.index.needs_grow() {
            self.index.try_grow(&mut self.arena);
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
