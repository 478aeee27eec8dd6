use async_trait::async_trait;
use thiserror::Error;

use super::objects::*;
use crate::context::LoadContext;

/// Errors a [`MetadataSource`] reports back.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("{0}")]
    ConnectionLost(String),
    #[error("metadata query failed: {0}")]
    Query(String),
    #[error("not supported: {0}")]
    Unsupported(String),
}

/// Dialect specific provider of table metadata. Usually backed by catalog queries over a live connection.
#[async_trait]
pub trait MetadataSource: Send + Sync + 'static {
    async fn load_columns(&self, table: &TableRef, ctx: &LoadContext) -> Result<Vec<TableColumn>, SourceError>;
    async fn load_indexes(&self, table: &TableRef, ctx: &LoadContext) -> Result<Vec<TableIndex>, SourceError>;
    async fn load_unique_keys(&self, table: &TableRef, ctx: &LoadContext) -> Result<Vec<UniqueKey>, SourceError>;
    async fn load_check_constraints(
        &self,
        table: &TableRef,
        ctx: &LoadContext,
    ) -> Result<Vec<CheckConstraint>, SourceError>;

    /// `columns` come ordered by their ordinal position.
    async fn generate_ddl(
        &self,
        table: &TableRef,
        columns: &[TableColumn],
        options: &DdlOptions,
    ) -> Result<String, SourceError>;
}
