//! Entry arena: slot storage with stable generational handles.
//!
//! The arena is the store's allocation strategy. Every live entry
//! occupies one slot; both the primary index and the expiration index
//! refer to entries by [`EntryHandle`], so a single entry can be a
//! member of both without either index owning it. Freed slots go on a
//! free list and bump their generation, which turns any use of a stale
//! handle into a deterministic panic instead of aliasing a new entry.

use crate::entry::Entry;
use crate::error::StoreError;

/// A stable reference to an entry slot.
///
/// Handles are only ever minted by the store and stay valid until the
/// entry is released. The generation detects reuse of a freed slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug)]
enum SlotState {
    Occupied(Entry),
    Vacant { next_free: Option<u32> },
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    state: SlotState,
}

/// Slot arena owning every live entry.
#[derive(Debug, Default)]
pub(crate) struct EntryArena {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    len: usize,
}

impl EntryArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Moves an entry into a slot and returns its handle.
    ///
    /// Growth is fallible: if the allocator refuses more slot storage
    /// the entry is dropped and the arena is unchanged.
    pub(crate) fn insert(&mut self, entry: Entry) -> Result<EntryHandle, StoreError> {
        let handle = match self.free_head {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                let next_free = match slot.state {
                    SlotState::Vacant { next_free } => next_free,
                    SlotState::Occupied(_) => panic!("free list points at an occupied slot"),
                };
                self.free_head = next_free;
                slot.state = SlotState::Occupied(entry);
                EntryHandle {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                self.slots
                    .try_reserve(1)
                    .map_err(|_| StoreError::AllocationFailure)?;
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    state: SlotState::Occupied(entry),
                });
                EntryHandle {
                    index,
                    generation: 0,
                }
            }
        };
        self.len += 1;
        Ok(handle)
    }

    /// Releases a slot and returns the entry it held.
    ///
    /// Panics on a stale handle; that is a programming error on the
    /// caller's side.
    pub(crate) fn remove(&mut self, handle: EntryHandle) -> Entry {
        let slot = &mut self.slots[handle.index as usize];
        assert_eq!(slot.generation, handle.generation, "stale entry handle");
        slot.generation = slot.generation.wrapping_add(1);
        let state = std::mem::replace(
            &mut slot.state,
            SlotState::Vacant {
                next_free: self.free_head,
            },
        );
        let entry = match state {
            SlotState::Occupied(entry) => entry,
            SlotState::Vacant { .. } => panic!("stale entry handle"),
        };
        self.free_head = Some(handle.index);
        self.len -= 1;
        entry
    }

    /// Returns `true` if the handle refers to a live entry.
    pub(crate) fn contains(&self, handle: EntryHandle) -> bool {
        self.slots
            .get(handle.index as usize)
            .is_some_and(|slot| {
                slot.generation == handle.generation
                    && matches!(slot.state, SlotState::Occupied(_))
            })
    }

    pub(crate) fn get(&self, handle: EntryHandle) -> &Entry {
        let slot = &self.slots[handle.index as usize];
        match &slot.state {
            SlotState::Occupied(entry) if slot.generation == handle.generation => entry,
            _ => panic!("stale entry handle"),
        }
    }

    pub(crate) fn get_mut(&mut self, handle: EntryHandle) -> &mut Entry {
        let slot = &mut self.slots[handle.index as usize];
        match &mut slot.state {
            SlotState::Occupied(entry) if slot.generation == handle.generation => entry,
            _ => panic!("stale entry handle"),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Drops every entry and rebuilds the free list in place. Slot
    /// generations advance so handles from before the clear stay stale.
    pub(crate) fn clear(&mut self) {
        self.free_head = None;
        self.len = 0;
        for (index, slot) in self.slots.iter_mut().enumerate().rev() {
            if matches!(slot.state, SlotState::Occupied(_)) {
                slot.generation = slot.generation.wrapping_add(1);
            }
            slot.state = SlotState::Vacant {
                next_free: self.free_head,
            };
            self.free_head = Some(index as u32);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::fingerprint;
    use bytes::Bytes;

    fn entry(key: &str, v: i64) -> Entry {
        let key = Bytes::copy_from_slice(key.as_bytes());
        let hash = fingerprint(&key);
        Entry::new_int64(key, hash, v)
    }

    #[test]
    fn insert_and_get() {
        let mut arena = EntryArena::new();
        let h = arena.insert(entry("a", 1)).unwrap();
        assert_eq!(arena.get(h).value_int().unwrap(), 1);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn remove_returns_the_entry() {
        let mut arena = EntryArena::new();
        let h = arena.insert(entry("a", 7)).unwrap();
        let e = arena.remove(h);
        assert_eq!(e.value_int().unwrap(), 7);
        assert_eq!(arena.len(), 0);
        assert!(!arena.contains(h));
    }

    #[test]
    fn slots_are_reused() {
        let mut arena = EntryArena::new();
        let a = arena.insert(entry("a", 1)).unwrap();
        arena.remove(a);
        let b = arena.insert(entry("b", 2)).unwrap();
        // same slot, different generation
        assert_ne!(a, b);
        assert!(arena.contains(b));
        assert!(!arena.contains(a));
    }

    #[test]
    #[should_panic(expected = "stale entry handle")]
    fn stale_handle_panics() {
        let mut arena = EntryArena::new();
        let h = arena.insert(entry("a", 1)).unwrap();
        arena.remove(h);
        arena.insert(entry("b", 2)).unwrap();
        arena.get(h);
    }

    #[test]
    fn clear_invalidates_all_handles() {
        let mut arena = EntryArena::new();
        let a = arena.insert(entry("a", 1)).unwrap();
        let b = arena.insert(entry("b", 2)).unwrap();
        arena.clear();
        assert_eq!(arena.len(), 0);
        assert!(!arena.contains(a));
        assert!(!arena.contains(b));

        // slots come back from the free list with fresh generations
        let c = arena.insert(entry("c", 3)).unwrap();
        assert!(arena.contains(c));
        assert_eq!(arena.get(c).value_int().unwrap(), 3);
    }
}
