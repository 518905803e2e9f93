//! Data type representations for stored values.
//!
//! The store holds exactly one typed payload per key. Scalars (integer,
//! float) live inline in the value; byte strings and HyperLogLog
//! sketches own a byte buffer; lists, hashes, sets, and sorted sets own
//! their container. Hash and set share the same dictionary container,
//! sets simply store members with empty field values.

pub mod sorted_set;

use std::collections::VecDeque;

use ahash::RandomState;
use bytes::Bytes;

pub use sorted_set::SortedSet;

/// Ordered list of binary-safe elements. `VecDeque` gives O(1) push/pop
/// at both ends.
pub type List = VecDeque<Bytes>;

/// Field -> value dictionary, used for both the hash and set kinds.
/// Set members are stored as fields with empty values.
pub type Dict = std::collections::HashMap<Bytes, Bytes, RandomState>;

/// HyperLogLog precision: 2^14 registers.
pub const HLL_REGISTERS: usize = 1 << 14;

/// Fixed byte length of a HyperLogLog payload: dense encoding, one byte
/// per register.
pub const HLL_BYTES_SIZE: usize = HLL_REGISTERS;

/// The discriminant selecting which payload variant is active.
///
/// Fixed at entry construction and immutable for the entry's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Float,
    Int64,
    Bytes,
    List,
    Hash,
    Set,
    SortedSet,
    Hll,
}

impl Kind {
    /// Protocol-level type name, as reported by a TYPE-style command.
    /// All scalar and byte-string kinds present as "string".
    pub fn type_name(self) -> &'static str {
        match self {
            Kind::Float | Kind::Int64 | Kind::Bytes => "string",
            Kind::List => "list",
            Kind::Hash => "hash",
            Kind::Set => "set",
            Kind::SortedSet => "zset",
            Kind::Hll => "hyperloglog",
        }
    }
}

/// A stored value: the tagged payload of one entry.
///
/// The enum tag is the single source of truth for the entry's kind, so
/// the discriminant and the payload can never disagree.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// IEEE-754 double.
    Float(f64),
    /// Signed 64-bit integer.
    Int64(i64),
    /// Binary-safe string data.
    Bytes(Bytes),
    /// Ordered list of elements.
    List(List),
    /// Field -> value mapping. Boxed to keep the value small.
    Hash(Box<Dict>),
    /// Member set, stored as a dictionary with empty values.
    Set(Box<Dict>),
    /// Members ordered by (score, member).
    SortedSet(SortedSet),
    /// Dense HyperLogLog registers, always `HLL_BYTES_SIZE` bytes.
    Hll(Bytes),
}

impl Value {
    /// Returns the discriminant for this payload.
    pub fn kind(&self) -> Kind {
        match self {
            Value::Float(_) => Kind::Float,
            Value::Int64(_) => Kind::Int64,
            Value::Bytes(_) => Kind::Bytes,
            Value::List(_) => Kind::List,
            Value::Hash(_) => Kind::Hash,
            Value::Set(_) => Kind::Set,
            Value::SortedSet(_) => Kind::SortedSet,
            Value::Hll(_) => Kind::Hll,
        }
    }

    /// Number of elements for containers, byte length for buffers,
    /// 1 for scalars.
    pub fn size(&self) -> usize {
        match self {
            Value::Float(_) | Value::Int64(_) => 1,
            Value::Bytes(b) | Value::Hll(b) => b.len(),
            Value::List(l) => l.len(),
            Value::Hash(d) | Value::Set(d) => d.len(),
            Value::SortedSet(ss) => ss.len(),
        }
    }
}
