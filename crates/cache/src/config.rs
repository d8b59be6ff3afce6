//! Cache configuration.

/// Default number of heap slots reserved up front.
pub const DEFAULT_HEAP_CAPACITY: usize = 1024;

/// Default amount the logical clock advances per touch.
pub const DEFAULT_TICK_STEP: u64 = 2;

/// Configuration for a [`TextureCacheManager`](crate::TextureCacheManager).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheConfig {
    /// Initial capacity of the eviction heap's backing array. The heap grows
    /// by doubling when this is exhausted.
    pub initial_heap_capacity: usize,
    /// Amount the logical clock advances on every touch and first-time
    /// allocation. Must be positive.
    pub tick_step: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            initial_heap_capacity: DEFAULT_HEAP_CAPACITY,
            tick_step: DEFAULT_TICK_STEP,
        }
    }
}

impl CacheConfig {
    /// Creates a configuration with the given initial heap capacity.
    pub fn new(initial_heap_capacity: usize) -> Self {
        Self {
            initial_heap_capacity,
            ..Default::default()
        }
    }

    /// Sets the initial heap capacity.
    pub fn with_heap_capacity(mut self, capacity: usize) -> Self {
        self.initial_heap_capacity = capacity;
        self
    }

    /// Sets the clock step. Values below 1 are clamped to 1.
    pub fn with_tick_step(mut self, step: u64) -> Self {
        self.tick_step = step.max(1);
        self
    }
}
