//! Error types for the resident-texture cache.

/// Errors surfaced by the cache.
///
/// Allocation failures that can be resolved by evicting resident textures are
/// retried internally and never reach the caller; only true exhaustion is
/// surfaced as [`CacheError::OutOfMemory`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    /// The device pool could not satisfy the request even after evicting
    /// every resident texture, or the heap's backing array could not grow.
    #[error("out of device memory")]
    OutOfMemory,

    /// The operation requires the texture to be resident and it is not.
    #[error("texture is not resident")]
    NotResident,

    /// The id does not refer to a registered texture.
    #[error("unknown texture id")]
    UnknownTexture,
}

pub type CacheResult<T> = Result<T, CacheError>;
