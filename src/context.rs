use std::fmt::Debug;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Context handle given to a [`ChildLoader`](crate::ChildLoader) for the duration of a single load.
pub struct LoadContext {
    cache_name: String,
    parent:     String,
    generation: u64,
    current:    Arc<AtomicU64>,
}

impl LoadContext {
    pub(crate) fn new(cache_name: impl ToString, parent: impl ToString, generation: u64, current: Arc<AtomicU64>) -> Self {
        Self {
            cache_name: cache_name.to_string(),
            parent: parent.to_string(),
            generation,
            current,
        }
    }

    pub fn cache_name(&self) -> &str {
        &self.cache_name
    }

    /// Label of the parent being loaded.
    pub fn parent(&self) -> &str {
        &self.parent
    }

    /// Generation of the entry at the moment the load started.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// True if the entry has been cleared or repopulated after this load started. The result of a stale load is
    /// never stored.
    pub fn is_stale(&self) -> bool {
        self.current.load(Ordering::Acquire) != self.generation
    }

    pub fn progress(&self, message: &str) {
        tracing::trace!(
            cache = %self.cache_name,
            parent = %self.parent,
            generation = self.generation,
            "{message}"
        );
    }
}

impl Debug for LoadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadContext")
            .field("cache_name", &self.cache_name)
            .field("parent", &self.parent)
            .field("generation", &self.generation)
            .field("stale", &self.is_stale())
            .finish()
    }
}
