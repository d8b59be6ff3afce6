//! Resident-Texture Cache Library
//!
//! Decides which driver-managed textures stay resident in a fixed pool of
//! device memory and which get evicted to make room for new allocations.
//! Built from an index-addressable binary min-heap (priority + recency cost)
//! and a cache manager that retries failed allocations with an escalating
//! eviction budget.

pub mod alloc;
pub mod config;
pub mod error;
pub mod heap;
pub mod manager;
pub mod texture;

pub use alloc::{BackingHandle, DeviceAllocator};
pub use config::CacheConfig;
pub use error::{CacheError, CacheResult};
pub use heap::{Cost, TextureHeap};
pub use manager::{CacheStats, TextureCacheManager};
pub use texture::{TextureId, TextureRecord, TextureTable};
