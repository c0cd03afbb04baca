use crate::sql::base::{
    error::DbError,
    requests::{SplitAggregate, SplitQuery},
    sink::RowSink,
};
use async_trait::async_trait;
use model::core::{column::Column, identifiers::TableRef};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseKind {
    MySql,
    Postgres,
}

impl DatabaseKind {
    /// Schema used when none is configured: `public` on Postgres, the
    /// database itself on MySQL.
    pub fn default_schema(&self, database: &str) -> String {
        match self {
            DatabaseKind::Postgres => "public".to_string(),
            DatabaseKind::MySql => database.to_string(),
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            DatabaseKind::Postgres => 5432,
            DatabaseKind::MySql => 3306,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::MySql => "mysql",
        }
    }
}

impl FromStr for DatabaseKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(DatabaseKind::MySql),
            "pg" | "postgres" | "postgresql" => Ok(DatabaseKind::Postgres),
            other => Err(format!("Unknown database driver: {other}")),
        }
    }
}

/// Query surface of a source database needed for partitioned extraction.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> DatabaseKind;

    async fn row_count(&self, table: &TableRef) -> Result<u64, DbError>;

    /// Catalog columns in ordinal order with uppercased type names.
    async fn describe_columns(&self, table: &TableRef) -> Result<Vec<Column>, DbError>;

    /// Column names returned by selecting a single row, or `None` when the
    /// table has no rows to probe.
    async fn accessible_columns(&self, table: &TableRef) -> Result<Option<Vec<String>>, DbError>;

    async fn primary_keys(&self, table: &TableRef) -> Result<Vec<String>, DbError>;

    /// Runs the split aggregate query. Returns one entry per non-empty split,
    /// ordered by split id.
    async fn split_aggregates(&self, query: &SplitQuery) -> Result<Vec<SplitAggregate>, DbError>;

    /// Streams the rows of one split into `sink` in batches of at most
    /// `batch_size`, returning the number of rows delivered.
    async fn stream_split(
        &self,
        query: &SplitQuery,
        split_id: u64,
        batch_size: usize,
        sink: &mut dyn RowSink,
    ) -> Result<u64, DbError>;
}
