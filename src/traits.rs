use async_trait::async_trait;
use std::fmt::Debug;
use std::fmt::Display;
use std::hash::Hash;

use crate::context::LoadContext;

/// The capability a [`ChildCache`](crate::ChildCache) calls into to populate an entry.
///
/// Much like a data controller, the loader is the type that defines everything the cache is parameterized over:
/// the parent key, the child type and the error type. The cache makes no assumptions about where the children come
/// from; a remote metadata query, a file parse, or a fixture are all the same to it.
#[async_trait]
pub trait ChildLoader: Sized + Send + Sync + 'static {
    /// Identity of the owning entity. Used as the cache map key and must be stable for the lifetime of the parent.
    type Parent: Debug + Display + Hash + Clone + Eq + Sized + Send + Sync + 'static;
    type Child: Debug + Clone + Send + Sync + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    /// Produce the ordered children of `parent`. The order returned here is preserved by the cache.
    ///
    /// The loader can consult [`LoadContext::is_stale()`] to find out whether the entry has been invalidated since
    /// the load started. A stale result is discarded by the cache anyway, so bailing out early is allowed.
    async fn load_children(&self, parent: &Self::Parent, ctx: &LoadContext) -> Result<Vec<Self::Child>, Self::Error>;
}

/// Named metadata object with a numeric identity. Required for identifier lookups.
pub trait MetaObject {
    fn name(&self) -> &str;
    fn object_id(&self) -> i64;
}
