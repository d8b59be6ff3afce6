//! Resident-texture cache manager.
//!
//! Owns the eviction heap, the logical clock, and the usage statistics, and
//! turns the heap's cost ordering into a concrete make-room policy against
//! the driver's device-memory pool: when an allocation fails, the cheapest
//! resident textures are evicted and the allocation retried with an eviction
//! budget that doubles every failed round.

use tracing::{debug, trace, warn};

use crate::alloc::{BackingHandle, DeviceAllocator};
use crate::config::CacheConfig;
use crate::error::{CacheError, CacheResult};
use crate::heap::TextureHeap;
use crate::texture::{TextureId, TextureRecord, TextureTable};

/// Statistics about resident-texture cache usage.
///
/// Informational only; nothing in the eviction policy depends on them.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of textures currently resident.
    pub resident_count: usize,

    /// Total device memory held by resident textures (bytes).
    pub resident_bytes: u64,

    /// Number of textures evicted or explicitly removed so far.
    pub eviction_count: u64,

    /// Number of successful first-time backing allocations.
    pub allocation_count: u64,

    /// Priority of the most recently evicted texture, if any.
    pub last_evicted_priority: Option<u32>,
}

impl CacheStats {
    /// Average size in bytes of the currently resident textures.
    pub fn average_resident_bytes(&self) -> u64 {
        if self.resident_count == 0 {
            0
        } else {
            self.resident_bytes / self.resident_count as u64
        }
    }
}

/// Cache of driver-managed textures resident in a fixed device-memory pool.
///
/// One instance per device (or context group); all operations take `&mut
/// self` and run to completion under the caller's device lock; there is no
/// internal locking or blocking.
///
/// # Example
///
/// ```
/// use texcache::{BackingHandle, CacheConfig, DeviceAllocator, TextureCacheManager};
///
/// // A toy pool; a real driver wraps its video-memory allocator.
/// struct Pool { capacity: u64, used: u64, next: u64 }
///
/// impl DeviceAllocator for Pool {
///     fn alloc(&mut self, bytes: u64) -> Option<BackingHandle> {
///         if self.used + bytes > self.capacity {
///             return None;
///         }
///         self.used += bytes;
///         self.next += 1;
///         Some(BackingHandle(self.next))
///     }
///     fn free(&mut self, _handle: BackingHandle) {}
/// }
///
/// let pool = Pool { capacity: 1024, used: 0, next: 0 };
/// let mut cache = TextureCacheManager::new(CacheConfig::default(), pool).unwrap();
///
/// let tex = cache.register(1);
/// cache.alloc_backing(tex, 256).unwrap();
/// assert!(cache.is_resident(tex));
/// assert_eq!(cache.stats().resident_bytes, 256);
/// ```
#[derive(Debug)]
pub struct TextureCacheManager<A: DeviceAllocator> {
    allocator: A,
    table: TextureTable,
    heap: TextureHeap,
    clock: u64,
    tick_step: u64,
    stats: CacheStats,
}

impl<A: DeviceAllocator> TextureCacheManager<A> {
    /// Creates a manager over the given device-memory allocator.
    ///
    /// Fails only if the initial heap allocation fails.
    pub fn new(config: CacheConfig, allocator: A) -> CacheResult<Self> {
        Ok(Self {
            allocator,
            table: TextureTable::new(),
            heap: TextureHeap::with_capacity(config.initial_heap_capacity)?,
            clock: 0,
            tick_step: config.tick_step.max(1),
            stats: CacheStats::default(),
        })
    }

    /// Registers a driver-owned texture with the cache.
    ///
    /// The returned id stays valid until [`unregister`](Self::unregister).
    /// Registration does not allocate backing memory.
    pub fn register(&mut self, priority: u32) -> TextureId {
        self.table.insert(TextureRecord::new(priority))
    }

    /// Evicts the texture if resident and releases its id.
    pub fn unregister(&mut self, id: TextureId) -> CacheResult<()> {
        self.remove(id)?;
        self.table.remove(id);
        Ok(())
    }

    /// Makes a texture resident, evicting cheaper textures as needed.
    ///
    /// Already-resident textures succeed immediately without touching stats.
    /// On allocation failure the cheapest resident textures are evicted and
    /// the allocation retried; the amount targeted per round starts at
    /// `bytes` and doubles after every failed retry, which bounds the number
    /// of rounds logarithmically in the resident footprint. Returns
    /// [`CacheError::OutOfMemory`] only when the pool still refuses after
    /// everything evictable is gone.
    pub fn alloc_backing(&mut self, id: TextureId, bytes: u64) -> CacheResult<()> {
        let record = self.table.get(id).ok_or(CacheError::UnknownTexture)?;
        if record.is_resident() {
            return Ok(());
        }

        let mut budget = bytes;
        let mut rounds = 0u32;
        let handle = loop {
            if let Some(handle) = self.allocator.alloc(bytes) {
                break handle;
            }
            if !self.free_bytes(budget) {
                warn!(bytes, "device pool exhausted with nothing left to evict");
                return Err(CacheError::OutOfMemory);
            }
            budget = budget.saturating_mul(2);
            rounds += 1;
        };
        if rounds > 0 {
            debug!(rounds, bytes, "allocation satisfied after eviction");
        }

        let tick = self.advance_clock();
        let record = match self.table.get_mut(id) {
            Some(record) => record,
            None => {
                self.allocator.free(handle);
                return Err(CacheError::UnknownTexture);
            }
        };
        record.byte_size = bytes;
        record.backing = Some(handle);
        record.recency_tick = tick;

        if let Err(err) = self.heap.insert(&mut self.table, id) {
            // The pool allocation must not outlive a failed insert; the
            // cache would have no way to ever free it.
            if let Some(record) = self.table.get_mut(id) {
                record.backing = None;
            }
            self.allocator.free(handle);
            warn!("heap growth failed; rolling back device allocation");
            return Err(err);
        }

        self.stats.resident_count += 1;
        self.stats.resident_bytes += bytes;
        self.stats.allocation_count += 1;
        Ok(())
    }

    /// Marks a resident texture as just used.
    ///
    /// Advances the clock and re-keys the texture so it becomes the most
    /// recently used within its priority band.
    pub fn touch(&mut self, id: TextureId) -> CacheResult<()> {
        let record = self.table.get(id).ok_or(CacheError::UnknownTexture)?;
        if record.heap_slot() == 0 {
            return Err(CacheError::NotResident);
        }
        let priority = record.priority();
        let tick = self.advance_clock();
        self.heap.update_key(&mut self.table, id, priority, tick);
        trace!(?id, tick, "touched texture");
        Ok(())
    }

    /// Changes a texture's caller-assigned priority.
    ///
    /// If the texture is resident its heap position is corrected in place;
    /// the recency tick is left unchanged.
    pub fn set_priority(&mut self, id: TextureId, priority: u32) -> CacheResult<()> {
        let record = self.table.get_mut(id).ok_or(CacheError::UnknownTexture)?;
        if record.heap_slot() == 0 {
            record.priority = priority;
            return Ok(());
        }
        let tick = record.recency_tick();
        self.heap.update_key(&mut self.table, id, priority, tick);
        Ok(())
    }

    /// Explicitly evicts a specific texture.
    ///
    /// A no-op when the texture is not resident, so calling it twice is
    /// safe. The id itself stays registered.
    pub fn remove(&mut self, id: TextureId) -> CacheResult<()> {
        let record = self.table.get_mut(id).ok_or(CacheError::UnknownTexture)?;
        if record.heap_slot() == 0 {
            return Ok(());
        }

        let bytes = record.byte_size();
        let priority = record.priority();
        let handle = record.backing.take();
        self.heap.delete(&mut self.table, id);
        if let Some(handle) = handle {
            self.allocator.free(handle);
        }

        self.record_eviction(bytes, priority);
        debug!(priority, bytes, "removed texture");
        Ok(())
    }

    /// Evicts every resident texture and resets the clock to 0.
    ///
    /// A subsequent allocation behaves exactly as on a freshly created
    /// manager.
    pub fn evict_all(&mut self) {
        while self.evict_one().is_some() {}
        self.clock = 0;
    }

    /// Current usage statistics.
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Whether the texture currently has backing memory.
    pub fn is_resident(&self, id: TextureId) -> bool {
        self.table.get(id).is_some_and(|record| record.is_resident())
    }

    /// The residency record for a registered texture.
    pub fn texture(&self, id: TextureId) -> Option<&TextureRecord> {
        self.table.get(id)
    }

    /// Current value of the logical clock.
    pub fn clock(&self) -> u64 {
        self.clock
    }

    /// The device-memory allocator this cache allocates from.
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Mutable access to the allocator, for driver-side bookkeeping.
    pub fn allocator_mut(&mut self) -> &mut A {
        &mut self.allocator
    }

    fn advance_clock(&mut self) -> u64 {
        self.clock += self.tick_step;
        self.clock
    }

    /// Evicts the globally cheapest texture; returns the bytes it freed.
    fn evict_one(&mut self) -> Option<u64> {
        let id = self.heap.extract_min(&mut self.table)?;
        let record = self.table.get_mut(id)?;
        let bytes = record.byte_size();
        let priority = record.priority();
        let tick = record.recency_tick();
        if let Some(handle) = record.backing.take() {
            self.allocator.free(handle);
        }
        self.record_eviction(bytes, priority);
        debug!(priority, tick, bytes, "evicted texture");
        Some(bytes)
    }

    /// Evicts cheapest-first until at least `budget` bytes have been freed
    /// or nothing is left. Returns `false` only when there was nothing to
    /// evict in the first place.
    fn free_bytes(&mut self, budget: u64) -> bool {
        if self.heap.is_empty() {
            return false;
        }
        let mut freed = 0u64;
        while freed < budget {
            match self.evict_one() {
                Some(bytes) => freed += bytes,
                None => break,
            }
        }
        true
    }

    fn record_eviction(&mut self, bytes: u64, priority: u32) {
        self.stats.resident_count = self.stats.resident_count.saturating_sub(1);
        self.stats.resident_bytes = self.stats.resident_bytes.saturating_sub(bytes);
        self.stats.eviction_count += 1;
        self.stats.last_evicted_priority = Some(priority);
    }
}
