use fieldx_plus::fx_plus;
use std::sync::Arc;
use tracing::error;
use tracing::instrument;

use super::loaders::CheckConstraintLoader;
use super::objects::*;
use super::schema::Schema;
use super::source::MetadataSource;
use super::MetaError;
use crate::cache::ChildCache;
use crate::derived::DerivedValue;
use crate::error::ComputeError;

/// A relational table of a [`Schema`].
///
/// Columns, indexes and unique keys are cached by the schema; check constraints and the DDL text are cached by the
/// table itself.
#[fx_plus(
    child(Schema<S>, unwrap(or_else(MetaError, schema_gone))),
    sync,
    rc,
    default(off)
)]
pub struct Table<S>
where
    S: MetadataSource,
{
    #[fieldx(get)]
    table_ref: TableRef,

    #[fieldx(get(clone))]
    source: Arc<S>,

    #[fieldx(lazy, get(clone), builder(off))]
    check_constraint_cache: Arc<ChildCache<CheckConstraintLoader<S>>>,

    #[fieldx(get, builder(off), default(DerivedValue::new()))]
    ddl: DerivedValue<String>,
}

impl<S> Table<S>
where
    S: MetadataSource,
{
    fn build_check_constraint_cache(&self) -> Arc<ChildCache<CheckConstraintLoader<S>>> {
        ChildCache::builder()
            .loader(CheckConstraintLoader::new(self.source()))
            .name(format!("{}.check_constraints", self.table_ref))
            .build()
            .unwrap()
    }

    fn schema_gone(&self) -> MetaError {
        MetaError::SchemaGone(self.table_ref.to_string())
    }

    // The owning schema, as long as this table is still registered with it. A dropped table must not put anything
    // back into the schema caches.
    fn schema(&self) -> Result<Arc<Schema<S>>, MetaError> {
        let schema = self.parent()?;
        if schema.is_registered(self) {
            Ok(schema)
        }
        else {
            Err(MetaError::TableDropped(self.table_ref.to_string()))
        }
    }

    pub fn is_view(&self) -> bool {
        false
    }

    /// Columns ordered by their ordinal position.
    pub async fn attributes(&self) -> Result<Vec<TableColumn>, MetaError> {
        let mut columns = self.schema()?.column_cache().get_children(&self.table_ref).await?.to_vec();
        columns.sort_by_key(|column| column.ordinal_position);
        Ok(columns)
    }

    pub async fn attribute(&self, name: &str) -> Result<Option<TableColumn>, MetaError> {
        Ok(self.schema()?.column_cache().get_child(&self.table_ref, name).await?)
    }

    pub async fn attribute_by_id(&self, column_id: i64) -> Result<Option<TableColumn>, MetaError> {
        let column = self.schema()?.column_cache().get_child(&self.table_ref, column_id).await?;
        if column.is_none() {
            error!("Column '{column_id}' not found in table '{}'", self.table_ref);
        }
        Ok(column)
    }

    pub async fn indexes(&self) -> Result<Arc<Vec<TableIndex>>, MetaError> {
        Ok(self.schema()?.index_cache().get_children(&self.table_ref).await?)
    }

    pub async fn index_by_id(&self, index_id: i64) -> Result<Option<TableIndex>, MetaError> {
        let index = self.schema()?.index_cache().get_child(&self.table_ref, index_id).await?;
        if index.is_none() {
            error!("Index '{index_id}' not found in table '{}'", self.table_ref);
        }
        Ok(index)
    }

    pub async fn index_by_name(&self, name: &str) -> Result<Option<TableIndex>, MetaError> {
        let index = self.schema()?.index_cache().get_child(&self.table_ref, name).await?;
        if index.is_none() {
            error!("Index '{name}' not found in table '{}'", self.table_ref);
        }
        Ok(index)
    }

    /// Primary key and unique constraints.
    pub async fn constraints(&self) -> Result<Arc<Vec<UniqueKey>>, MetaError> {
        Ok(self.schema()?.unique_key_cache().get_children(&self.table_ref).await?)
    }

    pub async fn check_constraints(&self) -> Result<Arc<Vec<CheckConstraint>>, MetaError> {
        self.schema()?;
        Ok(self.check_constraint_cache().get_children(&self.table_ref).await?)
    }

    /// DDL text of the table. Generated once and reused until requested with [`DdlOptions::refresh`] or until the
    /// table is refreshed.
    pub async fn object_definition_text(&self, options: &DdlOptions) -> Result<String, MetaError> {
        self.ddl
            .get_or_compute(options.refresh, move || async move {
                let columns = self.attributes().await?;
                self.source
                    .generate_ddl(&self.table_ref, &columns, options)
                    .await
                    .map_err(|source| MetaError::Ddl {
                        table: self.table_ref.to_string(),
                        source,
                    })
            })
            .await
            .map_err(ComputeError::into_inner)
    }

    /// Drop everything cached about this table and reload its columns.
    ///
    /// Invalidation isn't cascaded by any of the caches; the list below is the complete set of places the table's
    /// metadata is kept in.
    #[instrument(level = "debug", skip(self), fields(table = %self.table_ref))]
    pub async fn refresh(&self) -> Result<Vec<TableColumn>, MetaError> {
        let schema = self.schema()?;

        schema.index_cache().clear(&self.table_ref).await;
        schema.unique_key_cache().clear(&self.table_ref).await;
        schema.column_cache().clear(&self.table_ref).await;
        self.clear_own_caches().await;

        self.attributes().await
    }

    pub(crate) async fn clear_own_caches(&self) {
        self.check_constraint_cache().clear(&self.table_ref).await;
        self.ddl.invalidate().await;
    }
}
