//! Relational metadata model built on top of the caches.
//!
//! A [`Schema`] is the container: it owns the column, index and unique key caches, one entry per table, and
//! creates its [`Table`]s. A table owns its check constraint cache and its DDL text. Where a cache lives is a
//! placement decision; the table knows about all of them and invalidates each one explicitly on refresh.
//!
//! Everything dialect specific is behind [`MetadataSource`].

pub mod loaders;
pub mod objects;
pub mod schema;
pub mod source;
pub mod table;

use thiserror::Error;

use crate::error::LoadError;

pub use loaders::*;
pub use objects::*;
pub use schema::Schema;
pub use source::MetadataSource;
pub use source::SourceError;
pub use table::Table;

#[derive(Debug, Error)]
pub enum MetaError {
    #[error("schema of table {0} is no longer available")]
    SchemaGone(String),

    #[error("table {0} has been dropped")]
    TableDropped(String),

    #[error("object ID {object_id} is already taken by table {table}")]
    TableExists { object_id: i64, table: String },

    #[error(transparent)]
    Load(#[from] LoadError<SourceError>),

    #[error("failed to generate DDL of {table}: {source}")]
    Ddl {
        table:  String,
        #[source]
        source: SourceError,
    },
}
