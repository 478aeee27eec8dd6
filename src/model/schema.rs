use fieldx_plus::child_build;
use fieldx_plus::fx_plus;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;
use tracing::instrument;

use super::loaders::*;
use super::objects::TableRef;
use super::source::MetadataSource;
use super::table::Table;
use super::MetaError;
use crate::cache::ChildCache;
use crate::config::CacheConfig;

/// Container of tables. Column, index and unique key caches live here and are shared by all tables of the schema,
/// one entry per table.
///
/// ```ignore
/// let schema = Schema::builder()
///     .name("dbo")
///     .source(catalog)
///     .build()?;
///
/// let orders = schema.table("orders", 1077578877);
/// let columns = orders.attributes().await?;
/// ```
#[fx_plus(
    parent,
    sync,
    rc,
    no_new,
    default(off),
    builder(
        doc("Builder object of [`Schema`].", "", "See [`Schema::builder()`] method."),
        method_doc("Implement builder pattern for [`Schema`]."),
    )
)]
pub struct Schema<S>
where
    S: MetadataSource,
{
    #[fieldx(get, builder(required, into))]
    name: String,

    #[fieldx(get(clone), builder(required, into))]
    source: Arc<S>,

    #[fieldx(get, default(CacheConfig::default()))]
    cache_config: CacheConfig,

    #[fieldx(lazy, get(clone), builder(off))]
    column_cache: Arc<ChildCache<ColumnLoader<S>>>,

    #[fieldx(lazy, get(clone), builder(off))]
    index_cache: Arc<ChildCache<IndexLoader<S>>>,

    #[fieldx(lazy, get(clone), builder(off))]
    unique_key_cache: Arc<ChildCache<UniqueKeyLoader<S>>>,

    /// Tables by their object IDs.
    #[fieldx(lock, get, get_mut, builder(off), default(HashMap::new()))]
    tables: HashMap<i64, Arc<Table<S>>>,
}

impl<S> Schema<S>
where
    S: MetadataSource,
{
    fn build_column_cache(&self) -> Arc<ChildCache<ColumnLoader<S>>> {
        ChildCache::builder()
            .loader(ColumnLoader::new(self.source()))
            .name(format!("{}.columns", self.name()))
            .initial_capacity(self.cache_config().initial_capacity)
            .build()
            .unwrap()
    }

    fn build_index_cache(&self) -> Arc<ChildCache<IndexLoader<S>>> {
        ChildCache::builder()
            .loader(IndexLoader::new(self.source()))
            .name(format!("{}.indexes", self.name()))
            .initial_capacity(self.cache_config().initial_capacity)
            .build()
            .unwrap()
    }

    fn build_unique_key_cache(&self) -> Arc<ChildCache<UniqueKeyLoader<S>>> {
        ChildCache::builder()
            .loader(UniqueKeyLoader::new(self.source()))
            .name(format!("{}.unique_keys", self.name()))
            .initial_capacity(self.cache_config().initial_capacity)
            .build()
            .unwrap()
    }

    fn new_table(&self, table_ref: TableRef) -> Arc<Table<S>> {
        child_build!(
            self,
            Table<S> {
                table_ref: table_ref,
                source:    self.source(),
            }
        )
        .unwrap()
    }

    /// Get the table with the given object ID, registering it if it's not known yet.
    pub fn table(&self, name: impl Into<String>, object_id: i64) -> Arc<Table<S>> {
        if let Some(table) = self.tables().get(&object_id) {
            return Arc::clone(table);
        }

        let mut tables = self.tables_mut();
        Arc::clone(
            tables
                .entry(object_id)
                .or_insert_with(|| self.new_table(TableRef::new(self.name().as_str(), name, object_id))),
        )
    }

    pub fn find_table(&self, object_id: i64) -> Option<Arc<Table<S>>> {
        self.tables().get(&object_id).cloned()
    }

    pub fn find_table_by_name(&self, name: &str) -> Option<Arc<Table<S>>> {
        self.tables()
            .values()
            .find(|table| table.table_ref().name == name)
            .cloned()
    }

    /// Create a new table as a copy of `source`. Visible columns of the source are seeded into the column cache of
    /// the new table so that they're available without a load.
    ///
    /// Fails with [`MetaError::TableExists`] if `object_id` already belongs to a registered table.
    #[instrument(
        level = "debug",
        skip(self, name, source),
        fields(schema = %self.name(), source = %source.table_ref())
    )]
    pub async fn copy_table(
        &self,
        name: impl Into<String>,
        object_id: i64,
        source: &Table<S>,
    ) -> Result<Arc<Table<S>>, MetaError> {
        self.ensure_vacant(object_id)?;

        let columns = source
            .attributes()
            .await?
            .into_iter()
            .filter(|column| !column.hidden)
            .collect::<Vec<_>>();

        let table = {
            let mut tables = self.tables_mut();
            if let Some(existing) = tables.get(&object_id) {
                return Err(MetaError::TableExists {
                    object_id,
                    table: existing.table_ref().to_string(),
                });
            }
            let table = self.new_table(TableRef::new(self.name().as_str(), name, object_id));
            tables.insert(object_id, Arc::clone(&table));
            table
        };

        debug!(table = %table.table_ref(), count = columns.len(), "seeding copied columns");
        self.column_cache().cache_children(table.table_ref(), columns).await;
        Ok(table)
    }

    fn ensure_vacant(&self, object_id: i64) -> Result<(), MetaError> {
        match self.tables().get(&object_id) {
            Some(existing) => Err(MetaError::TableExists {
                object_id,
                table: existing.table_ref().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// True if `table` is the one registered under its object ID.
    pub(crate) fn is_registered(&self, table: &Table<S>) -> bool {
        self.tables()
            .get(&table.table_ref().object_id)
            .is_some_and(|registered| std::ptr::eq(Arc::as_ptr(registered), table))
    }

    /// Unregister a table and forget everything cached about it.
    pub async fn drop_table(&self, object_id: i64) -> Option<Arc<Table<S>>> {
        let table = self.tables_mut().remove(&object_id)?;
        let table_ref = table.table_ref();

        self.column_cache().evict(table_ref).await;
        self.index_cache().evict(table_ref).await;
        self.unique_key_cache().evict(table_ref).await;
        table.clear_own_caches().await;

        debug!(table = %table_ref, "table dropped");
        Some(table)
    }

    /// Invalidate all metadata of all tables of the schema.
    pub async fn refresh(&self) {
        debug!(schema = %self.name(), "refreshing schema");

        self.column_cache().clear_all();
        self.index_cache().clear_all();
        self.unique_key_cache().clear_all();

        let tables = self.tables().values().cloned().collect::<Vec<_>>();
        for table in tables {
            table.clear_own_caches().await;
        }
    }
}
