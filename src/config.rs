#[cfg(feature = "serde")]
use serde::Deserialize;

/// Settings shared by every [`ChildCache`](crate::ChildCache) a container creates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Deserialize), serde(default, deny_unknown_fields))]
pub struct CacheConfig {
    /// Number of parents each cache preallocates room for. Caches grow past it as needed; entries are never
    /// evicted to stay within it.
    pub initial_capacity: usize,
}

impl CacheConfig {
    pub fn with_initial_capacity(initial_capacity: usize) -> Self {
        Self { initial_capacity }
    }
}
