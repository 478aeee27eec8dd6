use async_trait::async_trait;
use std::sync::Arc;

use super::objects::*;
use super::source::MetadataSource;
use super::source::SourceError;
use crate::context::LoadContext;
use crate::traits::ChildLoader;

macro_rules! source_loader {
    ($(#[$meta:meta])* $loader:ident, $child:ty, $method:ident) => {
        $(#[$meta])*
        pub struct $loader<S>
        where
            S: MetadataSource,
        {
            source: Arc<S>,
        }

        impl<S> $loader<S>
        where
            S: MetadataSource,
        {
            pub fn new(source: Arc<S>) -> Self {
                Self { source }
            }
        }

        #[async_trait]
        impl<S> ChildLoader for $loader<S>
        where
            S: MetadataSource,
        {
            type Child = $child;
            type Error = SourceError;
            type Parent = TableRef;

            async fn load_children(&self, parent: &TableRef, ctx: &LoadContext) -> Result<Vec<$child>, SourceError> {
                ctx.progress(concat!("calling ", stringify!($method)));
                self.source.$method(parent, ctx).await
            }
        }
    };
}

source_loader!(
    /// Loads table columns.
    ColumnLoader,
    TableColumn,
    load_columns
);
source_loader!(IndexLoader, TableIndex, load_indexes);
source_loader!(
    /// Loads primary keys and unique constraints.
    UniqueKeyLoader,
    UniqueKey,
    load_unique_keys
);
source_loader!(CheckConstraintLoader, CheckConstraint, load_check_constraints);
