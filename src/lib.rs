//! # meta-cache
//!
//! Lazy, parent-scoped caching of child objects for database metadata models.
//!
//! Think of a table in a database client: its columns, indexes and constraints are each fetched by an expensive
//! metadata query. They should be fetched once, on demand, shared by everybody who asks, and thrown away only when
//! the table is refreshed or dropped.
//!
//! # The Basics
//!
//! The crate consists of two caches and a small model demonstrating how an owning entity coordinates them:
//!
//! - [`ChildCache`] maps a parent key to an ordered collection of children. It is populated lazily through an
//!   injected [`ChildLoader`] and is safe to use from many tasks at once.
//! - [`DerivedValue`] memoizes a single value, like generated DDL, on the entity that owns it.
//! - The [`model`] module implements a schema/table pair on top of both.
//!
//! The caches operate on the following principles:
//!
//! - Loader-agnostic. How the children are obtained is the loader's business.
//! - Key and value agnostic.
//! - Single-flight: for every parent at most one load runs at a time; all concurrent callers get its outcome.
//! - Loads of different parents never wait for each other.
//! - Failures are cached too. Nothing is retried until the entry is explicitly cleared.
//! - Invalidation is explicit and never waits for a load in progress. A load that started before its entry was
//!   cleared doesn't get to store its result.
//!
//! # Loader
//!
//! Similarly to the cache, the loader is parameterized over trait-associated types: `Parent`, `Child` and `Error`.
//! The cache passes a [`LoadContext`](context::LoadContext) to every load which lets the loader know whether its
//! result is still wanted.

pub mod cache;
pub mod config;
pub mod context;
pub mod derived;
pub(crate) mod entry;
pub mod error;
pub mod model;
pub mod traits;
pub mod types;

#[doc(inline)]
pub use cache::ChildCache;
#[doc(inline)]
pub use derived::DerivedValue;
#[doc(inline)]
pub use traits::ChildLoader;

pub mod prelude {
    pub use crate::cache::ChildCache;
    pub use crate::config::CacheConfig;
    pub use crate::context::LoadContext;
    pub use crate::derived::DerivedValue;
    pub use crate::error::ComputeError;
    pub use crate::error::LoadError;
    pub use crate::traits::ChildLoader;
    pub use crate::traits::MetaObject;
    pub use crate::types::*;
}
