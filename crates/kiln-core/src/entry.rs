//! The keyed entry: one key, one tagged payload, one deadline, and the
//! linkage slots for the two indices.
//!
//! An entry is built with one constructor per kind and its discriminant
//! never changes afterwards. Payload accessors are discriminant-checked
//! and fail with [`WrongKind`] on a mismatch. The key, the fingerprint,
//! and the deadline are read-only outside the store; deadline changes
//! go through the store so expiration-index membership can never drift
//! from the deadline.

use bytes::Bytes;

use crate::arena::EntryHandle;
use crate::error::WrongKind;
use crate::expiry::ExpiryLink;
use crate::time::{self, NO_EXPIRY};
use crate::types::{Dict, Kind, List, SortedSet, Value, HLL_BYTES_SIZE};

/// A single keyed record owned by the store.
#[derive(Debug)]
pub struct Entry {
    key: Bytes,
    key_hash: u64,
    value: Value,
    /// Absolute monotonic deadline in ms. [`NO_EXPIRY`] means never.
    expires_at_ms: u64,
    /// Bucket chain link, used exclusively by the primary index.
    pub(crate) bucket_next: Option<EntryHandle>,
    /// Timer-bucket link, used exclusively by the expiration index.
    pub(crate) expiry_link: ExpiryLink,
}

impl Entry {
    /// General constructor from an already-built payload.
    pub fn with_value(key: Bytes, key_hash: u64, value: Value) -> Self {
        debug_assert!(!key.is_empty(), "keys must be at least one byte");
        Self {
            key,
            key_hash,
            value,
            expires_at_ms: NO_EXPIRY,
            bucket_next: None,
            expiry_link: ExpiryLink::default(),
        }
    }

    /// A float entry.
    pub fn new_float(key: Bytes, key_hash: u64, value: f64) -> Self {
        Self::with_value(key, key_hash, Value::Float(value))
    }

    /// An integer entry.
    pub fn new_int64(key: Bytes, key_hash: u64, value: i64) -> Self {
        Self::with_value(key, key_hash, Value::Int64(value))
    }

    /// A byte-string entry holding `data`.
    pub fn new_bytes(key: Bytes, key_hash: u64, data: Bytes) -> Self {
        Self::with_value(key, key_hash, Value::Bytes(data))
    }

    /// A byte-string entry holding `len` zero bytes.
    pub fn new_zeroed_bytes(key: Bytes, key_hash: u64, len: usize) -> Self {
        Self::with_value(key, key_hash, Value::Bytes(Bytes::from(vec![0u8; len])))
    }

    /// An empty list entry.
    pub fn new_list(key: Bytes, key_hash: u64) -> Self {
        Self::with_value(key, key_hash, Value::List(List::new()))
    }

    /// An empty hash entry.
    pub fn new_hash(key: Bytes, key_hash: u64) -> Self {
        Self::with_value(key, key_hash, Value::Hash(Box::default()))
    }

    /// An empty set entry.
    pub fn new_set(key: Bytes, key_hash: u64) -> Self {
        Self::with_value(key, key_hash, Value::Set(Box::default()))
    }

    /// An empty sorted-set entry.
    pub fn new_sorted_set(key: Bytes, key_hash: u64) -> Self {
        Self::with_value(key, key_hash, Value::SortedSet(SortedSet::new()))
    }

    /// A HyperLogLog entry with all registers zeroed.
    pub fn new_hll(key: Bytes, key_hash: u64) -> Self {
        Self::with_value(
            key,
            key_hash,
            Value::Hll(Bytes::from(vec![0u8; HLL_BYTES_SIZE])),
        )
    }

    /// The key bytes.
    pub fn key(&self) -> &[u8] {
        &self.key
    }

    /// The precomputed 64-bit key fingerprint.
    pub fn key_hash(&self) -> u64 {
        self.key_hash
    }

    /// The active discriminant.
    pub fn kind(&self) -> Kind {
        self.value.kind()
    }

    /// Read access to the payload.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// `true` if this entry carries a finite deadline.
    pub fn ever_expires(&self) -> bool {
        self.expires_at_ms != NO_EXPIRY
    }

    /// The absolute deadline in ms, or [`NO_EXPIRY`].
    pub fn expires_at_ms(&self) -> u64 {
        self.expires_at_ms
    }

    /// Remaining time-to-live in ms, or `None` without a deadline.
    pub fn time_to_live_ms(&self) -> Option<u64> {
        time::remaining_ms(self.expires_at_ms)
    }

    pub(crate) fn set_expires_at(&mut self, deadline_ms: u64) {
        debug_assert_ne!(deadline_ms, NO_EXPIRY);
        self.expires_at_ms = deadline_ms;
    }

    pub(crate) fn clear_expiry(&mut self) {
        self.expires_at_ms = NO_EXPIRY;
    }

    // -- discriminant-checked payload access --

    /// The integer payload.
    pub fn value_int(&self) -> Result<i64, WrongKind> {
        match self.value {
            Value::Int64(v) => Ok(v),
            _ => Err(WrongKind),
        }
    }

    /// Adds `delta` to the integer payload in place, wrapping on
    /// overflow, and returns the new value.
    pub fn incr_int(&mut self, delta: i64) -> Result<i64, WrongKind> {
        match &mut self.value {
            Value::Int64(v) => {
                *v = v.wrapping_add(delta);
                Ok(*v)
            }
            _ => Err(WrongKind),
        }
    }

    /// The float payload.
    pub fn value_float(&self) -> Result<f64, WrongKind> {
        match self.value {
            Value::Float(v) => Ok(v),
            _ => Err(WrongKind),
        }
    }

    /// Adds `delta` to the float payload in place (IEEE-754 semantics)
    /// and returns the new value.
    pub fn incr_float(&mut self, delta: f64) -> Result<f64, WrongKind> {
        match &mut self.value {
            Value::Float(v) => {
                *v += delta;
                Ok(*v)
            }
            _ => Err(WrongKind),
        }
    }

    /// The byte-string payload.
    pub fn value_bytes(&self) -> Result<&Bytes, WrongKind> {
        match &self.value {
            Value::Bytes(b) => Ok(b),
            _ => Err(WrongKind),
        }
    }

    pub fn value_bytes_mut(&mut self) -> Result<&mut Bytes, WrongKind> {
        match &mut self.value {
            Value::Bytes(b) => Ok(b),
            _ => Err(WrongKind),
        }
    }

    /// The list payload.
    pub fn value_list(&self) -> Result<&List, WrongKind> {
        match &self.value {
            Value::List(l) => Ok(l),
            _ => Err(WrongKind),
        }
    }

    pub fn value_list_mut(&mut self) -> Result<&mut List, WrongKind> {
        match &mut self.value {
            Value::List(l) => Ok(l),
            _ => Err(WrongKind),
        }
    }

    /// The hash payload.
    pub fn value_map(&self) -> Result<&Dict, WrongKind> {
        match &self.value {
            Value::Hash(d) => Ok(d),
            _ => Err(WrongKind),
        }
    }

    pub fn value_map_mut(&mut self) -> Result<&mut Dict, WrongKind> {
        match &mut self.value {
            Value::Hash(d) => Ok(d),
            _ => Err(WrongKind),
        }
    }

    /// The set payload.
    pub fn value_set(&self) -> Result<&Dict, WrongKind> {
        match &self.value {
            Value::Set(d) => Ok(d),
            _ => Err(WrongKind),
        }
    }

    pub fn value_set_mut(&mut self) -> Result<&mut Dict, WrongKind> {
        match &mut self.value {
            Value::Set(d) => Ok(d),
            _ => Err(WrongKind),
        }
    }

    /// The sorted-set payload.
    pub fn value_sorted_set(&self) -> Result<&SortedSet, WrongKind> {
        match &self.value {
            Value::SortedSet(ss) => Ok(ss),
            _ => Err(WrongKind),
        }
    }

    pub fn value_sorted_set_mut(&mut self) -> Result<&mut SortedSet, WrongKind> {
        match &mut self.value {
            Value::SortedSet(ss) => Ok(ss),
            _ => Err(WrongKind),
        }
    }

    /// The HyperLogLog registers.
    pub fn value_hll(&self) -> Result<&Bytes, WrongKind> {
        match &self.value {
            Value::Hll(b) => Ok(b),
            _ => Err(WrongKind),
        }
    }

    pub fn value_hll_mut(&mut self) -> Result<&mut Bytes, WrongKind> {
        match &mut self.value {
            Value::Hll(b) => Ok(b),
            _ => Err(WrongKind),
        }
    }

    // -- kind predicates --

    pub fn is_float(&self) -> bool {
        self.kind() == Kind::Float
    }

    pub fn is_int(&self) -> bool {
        self.kind() == Kind::Int64
    }

    pub fn is_bytes(&self) -> bool {
        self.kind() == Kind::Bytes
    }

    pub fn is_list(&self) -> bool {
        self.kind() == Kind::List
    }

    pub fn is_map(&self) -> bool {
        self.kind() == Kind::Hash
    }

    pub fn is_set(&self) -> bool {
        self.kind() == Kind::Set
    }

    pub fn is_sorted_set(&self) -> bool {
        self.kind() == Kind::SortedSet
    }

    pub fn is_hll(&self) -> bool {
        self.kind() == Kind::Hll
    }
}
