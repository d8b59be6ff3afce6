//! Texture records and the table that stores them.
//!
//! The driver owns its texture objects; the cache tracks only the residency
//! state of each one. That state lives in a [`TextureTable`], a slab-style
//! arena indexed by plain [`TextureId`] handles, which is what makes the
//! heap's back-pointers safe: a resident texture stores the 1-based heap slot
//! it currently occupies instead of a pointer into the heap's storage.

use crate::alloc::BackingHandle;
use crate::heap::Cost;

/// Handle to a texture registered with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(u32);

impl TextureId {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Cache-visible residency state of one texture.
#[derive(Debug)]
pub struct TextureRecord {
    /// Size of the current (or last) backing request in bytes. Set by a
    /// successful allocation; used for stats and eviction accounting.
    pub(crate) byte_size: u64,
    /// Handle into device memory; `None` while not resident.
    pub(crate) backing: Option<BackingHandle>,
    /// Caller-assigned importance. Larger = more valuable, never changed by
    /// the cache itself.
    pub(crate) priority: u32,
    /// Clock value as of the last touch or insertion.
    pub(crate) recency_tick: u64,
    /// 0 while not resident, otherwise the 1-based slot this texture occupies
    /// in the eviction heap. Kept consistent on every element move the heap
    /// performs.
    pub(crate) heap_slot: usize,
}

impl TextureRecord {
    pub(crate) fn new(priority: u32) -> Self {
        Self {
            byte_size: 0,
            backing: None,
            priority,
            recency_tick: 0,
            heap_slot: 0,
        }
    }

    /// Eviction ordering key. Lower cost is evicted first.
    pub fn cost(&self) -> Cost {
        Cost {
            priority: self.priority,
            tick: self.recency_tick,
        }
    }

    /// Whether the texture currently has backing memory.
    pub fn is_resident(&self) -> bool {
        self.backing.is_some()
    }

    /// Caller-assigned priority.
    pub fn priority(&self) -> u32 {
        self.priority
    }

    /// Clock value at the last touch or insertion.
    pub fn recency_tick(&self) -> u64 {
        self.recency_tick
    }

    /// Size in bytes of the current backing allocation.
    pub fn byte_size(&self) -> u64 {
        self.byte_size
    }

    /// 1-based heap slot, or 0 while not resident.
    pub fn heap_slot(&self) -> usize {
        self.heap_slot
    }
}

/// Slab arena of texture records.
///
/// Vacated slots are recycled through a free list, so ids stay small and the
/// table never shrinks below its high-water mark.
#[derive(Debug, Default)]
pub struct TextureTable {
    slots: Vec<Option<TextureRecord>>,
    free: Vec<u32>,
}

impl TextureTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, record: TextureRecord) -> TextureId {
        match self.free.pop() {
            Some(index) => {
                self.slots[index as usize] = Some(record);
                TextureId(index)
            }
            None => {
                self.slots.push(Some(record));
                TextureId((self.slots.len() - 1) as u32)
            }
        }
    }

    pub(crate) fn remove(&mut self, id: TextureId) -> Option<TextureRecord> {
        let record = self.slots.get_mut(id.index())?.take()?;
        self.free.push(id.0);
        Some(record)
    }

    /// Look up a record, or `None` if the id is stale or unknown.
    pub fn get(&self, id: TextureId) -> Option<&TextureRecord> {
        self.slots.get(id.index())?.as_ref()
    }

    pub(crate) fn get_mut(&mut self, id: TextureId) -> Option<&mut TextureRecord> {
        self.slots.get_mut(id.index())?.as_mut()
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Whether the table holds no records.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
