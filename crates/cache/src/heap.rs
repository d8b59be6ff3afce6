//! Indexed priority heap ordering resident textures by eviction cost.
//!
//! A growable array-based binary min-heap addressed as a 1-based binary
//! tree: the root lives at slot 1 and the children of slot `k` are `2k` and
//! `2k + 1`. Elements are [`TextureId`]s whose records store their own
//! current slot, which is what makes arbitrary-position deletion and key
//! update O(log n) instead of a linear scan.

use tracing::warn;

use crate::error::{CacheError, CacheResult};
use crate::texture::{TextureId, TextureTable};

/// Eviction ordering key: lexicographic `(priority, tick)`.
///
/// Lower cost is evicted first, so among textures of equal priority the
/// ordering degrades to true LRU on the recency tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Cost {
    /// Caller-assigned importance; compared first.
    pub priority: u32,
    /// Logical clock value of the last touch; breaks priority ties.
    pub tick: u64,
}

/// Binary min-heap of resident textures keyed by [`Cost`].
///
/// Every operation that moves an element also rewrites that element's
/// `heap_slot` back-pointer in the [`TextureTable`], so for any resident
/// texture `heap[record.heap_slot] == id` holds at all times.
#[derive(Debug)]
pub struct TextureHeap {
    /// The element at logical slot `k` lives at `entries[k - 1]`.
    entries: Vec<TextureId>,
    /// Makes the next `insert` report a growth failure, for exercising the
    /// caller's rollback path.
    #[cfg(test)]
    fail_next_insert: bool,
}

impl TextureHeap {
    /// Creates an empty heap with room for `capacity` elements.
    ///
    /// Fails only if the initial array allocation fails.
    pub fn with_capacity(capacity: usize) -> CacheResult<Self> {
        let mut entries = Vec::new();
        entries
            .try_reserve_exact(capacity)
            .map_err(|_| CacheError::OutOfMemory)?;
        Ok(Self {
            entries,
            #[cfg(test)]
            fail_next_insert: false,
        })
    }

    #[cfg(test)]
    pub(crate) fn force_insert_failure(&mut self) {
        self.fail_next_insert = true;
    }

    /// Number of resident textures in the heap.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the heap holds no textures.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Current capacity of the backing array.
    pub fn capacity(&self) -> usize {
        self.entries.capacity()
    }

    /// The cheapest texture (next eviction candidate) without removing it.
    pub fn peek_min(&self) -> Option<TextureId> {
        self.entries.first().copied()
    }

    /// All resident ids in slot order (root first), for inspection.
    pub fn iter(&self) -> impl Iterator<Item = TextureId> + '_ {
        self.entries.iter().copied()
    }

    /// Adds a texture keyed by its record's current cost.
    ///
    /// When the backing array is full it grows by doubling. A failed growth
    /// leaves the heap completely unchanged and the insert is rejected with
    /// [`CacheError::OutOfMemory`]; this is the only way `insert` can fail.
    pub fn insert(&mut self, table: &mut TextureTable, id: TextureId) -> CacheResult<()> {
        #[cfg(test)]
        if std::mem::take(&mut self.fail_next_insert) {
            return Err(CacheError::OutOfMemory);
        }

        if self.entries.len() == self.entries.capacity() {
            let additional = self.entries.capacity().max(1);
            if self.entries.try_reserve(additional).is_err() {
                warn!(
                    capacity = self.entries.capacity(),
                    "failed to allocate memory to grow heap"
                );
                return Err(CacheError::OutOfMemory);
            }
        }

        let cost = record_cost(table, id);

        // Open a hole at the next free slot and pull parents down into it
        // until the new element's place is found.
        self.entries.push(id);
        let slot = self.find_slot(table, cost, self.len());
        self.place(table, slot, id);
        Ok(())
    }

    /// Removes and returns the cheapest texture, or `None` if empty.
    pub fn extract_min(&mut self, table: &mut TextureTable) -> Option<TextureId> {
        let min = *self.entries.first()?;
        let last = self.entries.pop()?;
        if !self.entries.is_empty() {
            self.place(table, 1, last);
            self.sift_down(table, 1);
        }
        set_heap_slot(table, min, 0);
        Some(min)
    }

    /// Removes and returns the most expensive texture, or `None` if empty.
    ///
    /// The maximum can never sit at an internal node: every parent is no
    /// more expensive than its children, so only the leaf range (slots whose
    /// left child index is out of bounds) needs to be scanned.
    pub fn extract_max(&mut self, table: &mut TextureTable) -> Option<TextureId> {
        let len = self.len();
        if len == 0 {
            return None;
        }

        let mut max_slot = len;
        let mut max_cost = self.cost_at(table, len);
        let mut k = len;
        while k >= 1 && 2 * k > len {
            let cost = self.cost_at(table, k);
            if cost > max_cost {
                max_cost = cost;
                max_slot = k;
            }
            k -= 1;
        }

        let id = self.entry(max_slot);
        self.delete(table, id);
        Some(id)
    }

    /// Removes a texture from whatever slot it currently occupies.
    ///
    /// The vacated slot is refilled with the element from the last slot. If
    /// that replacement is cheaper than the removed texture it can only
    /// belong closer to the root, so it is sifted upward; otherwise it is
    /// placed and sifted downward. This avoids a full re-heapify.
    pub fn delete(&mut self, table: &mut TextureTable, id: TextureId) {
        let slot = heap_slot(table, id);
        debug_assert_ne!(slot, 0, "delete requires a resident texture");
        if slot == 0 {
            return;
        }

        let last = match self.entries.pop() {
            Some(last) => last,
            None => return,
        };

        if last != id {
            let last_cost = record_cost(table, last);
            if last_cost < record_cost(table, id) {
                let new_slot = self.find_slot(table, last_cost, slot);
                self.place(table, new_slot, last);
            } else {
                self.place(table, slot, last);
                self.sift_down(table, slot);
            }
        }

        set_heap_slot(table, id, 0);
    }

    /// Re-keys a resident texture in place.
    ///
    /// A cheaper key can only move the element toward the root; anything
    /// else is written in place and corrected by a downward pass. This makes
    /// a touch a single O(log n) operation instead of remove + reinsert.
    pub fn update_key(&mut self, table: &mut TextureTable, id: TextureId, priority: u32, tick: u64) {
        let slot = heap_slot(table, id);
        debug_assert_ne!(slot, 0, "update_key requires a resident texture");
        if slot == 0 {
            return;
        }

        let new_cost = Cost { priority, tick };
        if new_cost < record_cost(table, id) {
            let new_slot = self.find_slot(table, new_cost, slot);
            set_key(table, id, priority, tick);
            self.place(table, new_slot, id);
        } else {
            set_key(table, id, priority, tick);
            self.sift_down(table, slot);
        }
    }

    fn entry(&self, slot: usize) -> TextureId {
        self.entries[slot - 1]
    }

    fn cost_at(&self, table: &TextureTable, slot: usize) -> Cost {
        record_cost(table, self.entry(slot))
    }

    /// Writes `id` into `slot` and updates its back-pointer.
    fn place(&mut self, table: &mut TextureTable, slot: usize, id: TextureId) {
        self.entries[slot - 1] = id;
        set_heap_slot(table, id, slot);
    }

    /// Walks from `slot` toward the root, pulling each parent more expensive
    /// than `cost` down into the hole, and returns the slot where an element
    /// of that cost belongs. The caller is expected to `place` into it.
    fn find_slot(&mut self, table: &mut TextureTable, cost: Cost, mut slot: usize) -> usize {
        while slot > 1 {
            let parent = self.entry(slot / 2);
            if cost < record_cost(table, parent) {
                self.place(table, slot, parent);
                slot /= 2;
            } else {
                break;
            }
        }
        slot
    }

    /// Restores the heap order downward from `slot`, assuming the rest of
    /// the heap is well ordered.
    fn sift_down(&mut self, table: &mut TextureTable, mut slot: usize) {
        loop {
            let left = 2 * slot;
            let right = left + 1;
            let mut smallest = slot;

            if left <= self.len() && self.cost_at(table, left) < self.cost_at(table, smallest) {
                smallest = left;
            }
            if right <= self.len() && self.cost_at(table, right) < self.cost_at(table, smallest) {
                smallest = right;
            }
            if smallest == slot {
                break;
            }

            let a = self.entry(slot);
            let b = self.entry(smallest);
            self.place(table, slot, b);
            self.place(table, smallest, a);
            slot = smallest;
        }
    }
}

fn record_cost(table: &TextureTable, id: TextureId) -> Cost {
    table.get(id).expect("heap entry must have a live record").cost()
}

fn heap_slot(table: &TextureTable, id: TextureId) -> usize {
    table
        .get(id)
        .expect("heap entry must have a live record")
        .heap_slot
}

fn set_heap_slot(table: &mut TextureTable, id: TextureId, slot: usize) {
    table
        .get_mut(id)
        .expect("heap entry must have a live record")
        .heap_slot = slot;
}

fn set_key(table: &mut TextureTable, id: TextureId, priority: u32, tick: u64) {
    let record = table
        .get_mut(id)
        .expect("heap entry must have a live record");
    record.priority = priority;
    record.recency_tick = tick;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::TextureRecord;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn add(table: &mut TextureTable, priority: u32, tick: u64) -> TextureId {
        let mut record = TextureRecord::new(priority);
        record.recency_tick = tick;
        table.insert(record)
    }

    /// Checks the heap property and back-pointer consistency for every slot.
    fn assert_invariants(heap: &TextureHeap, table: &TextureTable) {
        let ids: Vec<_> = heap.iter().collect();
        for (i, &id) in ids.iter().enumerate() {
            let slot = i + 1;
            let record = table.get(id).expect("heap entry must be live");
            assert_eq!(
                record.heap_slot(),
                slot,
                "back-pointer of {id:?} disagrees with its slot"
            );
            if slot > 1 {
                let parent = ids[slot / 2 - 1];
                let parent_cost = table.get(parent).unwrap().cost();
                assert!(
                    parent_cost <= record.cost(),
                    "heap property violated at slot {slot}"
                );
            }
        }
    }

    fn drain_min(heap: &mut TextureHeap, table: &mut TextureTable) -> Vec<Cost> {
        let mut out = Vec::new();
        while let Some(id) = heap.extract_min(table) {
            out.push(table.get(id).unwrap().cost());
            assert_eq!(table.get(id).unwrap().heap_slot(), 0);
            assert_invariants(heap, table);
        }
        out
    }

    #[test]
    fn test_insert_then_extract_min_in_cost_order() {
        let mut table = TextureTable::new();
        let mut heap = TextureHeap::with_capacity(8).unwrap();

        for (priority, tick) in [(3, 10), (1, 4), (2, 2), (1, 2), (5, 1)] {
            let id = add(&mut table, priority, tick);
            heap.insert(&mut table, id).unwrap();
            assert_invariants(&heap, &table);
        }

        let drained = drain_min(&mut heap, &mut table);
        let mut expected = drained.clone();
        expected.sort();
        assert_eq!(drained, expected);
        assert_eq!(drained[0], Cost { priority: 1, tick: 2 });
        assert!(heap.is_empty());
    }

    #[test]
    fn test_extract_from_empty_heap() {
        let mut table = TextureTable::new();
        let mut heap = TextureHeap::with_capacity(4).unwrap();
        assert!(heap.extract_min(&mut table).is_none());
        assert!(heap.extract_max(&mut table).is_none());
        assert!(heap.peek_min().is_none());
    }

    #[test]
    fn test_extract_max_returns_most_expensive() {
        let mut table = TextureTable::new();
        let mut heap = TextureHeap::with_capacity(8).unwrap();

        let mut ids = Vec::new();
        for (priority, tick) in [(2, 8), (4, 1), (1, 9), (4, 7), (3, 3), (1, 1)] {
            let id = add(&mut table, priority, tick);
            heap.insert(&mut table, id).unwrap();
            ids.push(id);
        }

        let max = heap.extract_max(&mut table).unwrap();
        assert_eq!(table.get(max).unwrap().cost(), Cost { priority: 4, tick: 7 });
        assert_invariants(&heap, &table);

        let max = heap.extract_max(&mut table).unwrap();
        assert_eq!(table.get(max).unwrap().cost(), Cost { priority: 4, tick: 1 });
        assert_invariants(&heap, &table);
        assert_eq!(heap.len(), 4);
    }

    #[test]
    fn test_extract_max_single_element() {
        let mut table = TextureTable::new();
        let mut heap = TextureHeap::with_capacity(2).unwrap();
        let id = add(&mut table, 9, 9);
        heap.insert(&mut table, id).unwrap();

        assert_eq!(heap.extract_max(&mut table), Some(id));
        assert!(heap.is_empty());
        assert_eq!(table.get(id).unwrap().heap_slot(), 0);
    }

    #[test]
    fn test_delete_arbitrary_element() {
        let mut table = TextureTable::new();
        let mut heap = TextureHeap::with_capacity(8).unwrap();

        let mut ids = Vec::new();
        for (priority, tick) in [(1, 1), (2, 2), (3, 3), (4, 4), (5, 5), (2, 1)] {
            let id = add(&mut table, priority, tick);
            heap.insert(&mut table, id).unwrap();
            ids.push(id);
        }

        // Delete a middle element, then one that forces the cheap-last
        // replacement to sift upward.
        heap.delete(&mut table, ids[2]);
        assert_eq!(table.get(ids[2]).unwrap().heap_slot(), 0);
        assert_invariants(&heap, &table);

        heap.delete(&mut table, ids[4]);
        assert_invariants(&heap, &table);
        assert_eq!(heap.len(), 4);

        let drained = drain_min(&mut heap, &mut table);
        assert_eq!(drained.first(), Some(&Cost { priority: 1, tick: 1 }));
    }

    #[test]
    fn test_delete_last_slot_element() {
        let mut table = TextureTable::new();
        let mut heap = TextureHeap::with_capacity(4).unwrap();
        let a = add(&mut table, 1, 1);
        let b = add(&mut table, 2, 2);
        heap.insert(&mut table, a).unwrap();
        heap.insert(&mut table, b).unwrap();

        heap.delete(&mut table, b);
        assert_eq!(heap.len(), 1);
        assert_eq!(heap.peek_min(), Some(a));
        assert_eq!(table.get(b).unwrap().heap_slot(), 0);
        assert_invariants(&heap, &table);
    }

    #[test]
    fn test_update_key_moves_up_and_down() {
        let mut table = TextureTable::new();
        let mut heap = TextureHeap::with_capacity(8).unwrap();

        let mut ids = Vec::new();
        for (priority, tick) in [(1, 1), (2, 2), (3, 3), (4, 4)] {
            let id = add(&mut table, priority, tick);
            heap.insert(&mut table, id).unwrap();
            ids.push(id);
        }

        // Make the most expensive element the cheapest: must reach the root.
        heap.update_key(&mut table, ids[3], 0, 0);
        assert_invariants(&heap, &table);
        assert_eq!(heap.peek_min(), Some(ids[3]));

        // Make the root expensive: must sink below its children.
        heap.update_key(&mut table, ids[3], 9, 9);
        assert_invariants(&heap, &table);
        assert_ne!(heap.peek_min(), Some(ids[3]));

        let record = table.get(ids[3]).unwrap();
        assert_eq!(record.priority(), 9);
        assert_eq!(record.recency_tick(), 9);
    }

    #[test]
    fn test_growth_beyond_initial_capacity() {
        let mut table = TextureTable::new();
        let mut heap = TextureHeap::with_capacity(2).unwrap();
        assert_eq!(heap.capacity(), 2);

        for tick in 0..20 {
            let id = add(&mut table, 1, tick);
            heap.insert(&mut table, id).unwrap();
        }
        assert_eq!(heap.len(), 20);
        assert!(heap.capacity() >= 20);
        assert_invariants(&heap, &table);
    }

    #[test]
    fn test_randomized_operations_keep_invariants() {
        let mut rng = StdRng::seed_from_u64(0x7e87);
        let mut table = TextureTable::new();
        let mut heap = TextureHeap::with_capacity(4).unwrap();
        let mut live: Vec<TextureId> = Vec::new();
        let mut next_tick = 0u64;

        for _ in 0..500 {
            match rng.gen_range(0..4) {
                0 | 1 => {
                    next_tick += 1;
                    let id = add(&mut table, rng.gen_range(0..4), next_tick);
                    heap.insert(&mut table, id).unwrap();
                    live.push(id);
                }
                2 if !live.is_empty() => {
                    let id = live.swap_remove(rng.gen_range(0..live.len()));
                    heap.delete(&mut table, id);
                    assert_eq!(table.get(id).unwrap().heap_slot(), 0);
                }
                3 if !live.is_empty() => {
                    next_tick += 1;
                    let id = live[rng.gen_range(0..live.len())];
                    heap.update_key(&mut table, id, rng.gen_range(0..4), next_tick);
                }
                _ => {}
            }
            assert_invariants(&heap, &table);
        }

        let drained = drain_min(&mut heap, &mut table);
        let mut expected = drained.clone();
        expected.sort();
        assert_eq!(drained, expected);
        assert_eq!(drained.len(), live.len());
    }
}
