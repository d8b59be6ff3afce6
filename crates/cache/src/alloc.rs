//! Boundary with the external device-memory allocator.
//!
//! The cache never reserves device memory itself; it asks a
//! [`DeviceAllocator`] supplied by the driver and treats whatever handle it
//! gets back as fully opaque.

/// Opaque handle to a range of device memory.
///
/// The cache imposes no alignment or placement meaning on the value; it only
/// stores the handle while a texture is resident and returns it to the
/// allocator on eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BackingHandle(pub u64);

/// Device-memory allocator owned by the driver.
///
/// The cache calls [`free`](DeviceAllocator::free) exactly once for every
/// successful [`alloc`](DeviceAllocator::alloc); implementations do not need
/// to tolerate double frees.
pub trait DeviceAllocator {
    /// Reserve `bytes` of device memory, or `None` when the pool cannot
    /// satisfy the request.
    fn alloc(&mut self, bytes: u64) -> Option<BackingHandle>;

    /// Return a previously allocated range to the pool.
    fn free(&mut self, handle: BackingHandle);
}
