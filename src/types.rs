use std::fmt::Display;

/// Observable state of a single parent's entry in a [`ChildCache`](crate::ChildCache).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryStatus {
    /// Never loaded, or invalidated since the last load.
    Unloaded,
    /// A loader is currently running for this parent.
    Loading,
    Loaded,
    /// The last load failed. The error is kept until the entry is cleared.
    Failed,
}

impl EntryStatus {
    #[inline]
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded)
    }

    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed)
    }
}

impl Display for EntryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryStatus::Unloaded => write!(f, "unloaded"),
            EntryStatus::Loading => write!(f, "loading"),
            EntryStatus::Loaded => write!(f, "loaded"),
            EntryStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Identifier used by [`ChildCache::get_child`](crate::ChildCache::get_child) to pick a child out of a loaded
/// collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ChildId {
    Name(String),
    ObjectId(i64),
}

impl ChildId {
    pub fn matches<C: crate::traits::MetaObject + ?Sized>(&self, child: &C) -> bool {
        match self {
            ChildId::Name(name) => child.name() == name,
            ChildId::ObjectId(id) => child.object_id() == *id,
        }
    }
}

impl Display for ChildId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChildId::Name(name) => write!(f, "'{name}'"),
            ChildId::ObjectId(id) => write!(f, "#{id}"),
        }
    }
}

impl From<&str> for ChildId {
    fn from(name: &str) -> Self {
        ChildId::Name(name.to_string())
    }
}

impl From<String> for ChildId {
    fn from(name: String) -> Self {
        ChildId::Name(name)
    }
}

impl From<i64> for ChildId {
    fn from(id: i64) -> Self {
        ChildId::ObjectId(id)
    }
}
