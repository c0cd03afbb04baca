use crate::{error::InspectError, retry::classify_db_error};
use connectors::sql::base::{adapter::SourceAdapter, error::DbError};
use engine_core::retry::RetryPolicy;
use model::core::{
    column::{Column, column_names},
    identifiers::TableRef,
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Source types excluded from export unless configured otherwise.
pub const DEFAULT_UNSUPPORTED_TYPES: [&str; 9] = [
    "BYTEA",
    "VARBINARY",
    "BINARY",
    "BLOB",
    "TINYBLOB",
    "MEDIUMBLOB",
    "LONGBLOB",
    "IMAGE",
    "GEOMETRY",
];

/// Columns and ranking keys of a table, after filtering.
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub columns: Vec<Column>,
    /// Fields rows are ranked by. The primary key unless overridden; may be
    /// empty, in which case the split query orders by every column.
    pub key_fields: Vec<String>,
}

pub struct SchemaInspector {
    source: Arc<dyn SourceAdapter>,
    retry: RetryPolicy,
    unsupported_types: Vec<String>,
}

impl SchemaInspector {
    pub fn new(source: Arc<dyn SourceAdapter>, retry: RetryPolicy) -> Self {
        Self {
            source,
            retry,
            unsupported_types: DEFAULT_UNSUPPORTED_TYPES
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }

    pub fn with_unsupported_types(mut self, types: Vec<String>) -> Self {
        self.unsupported_types = types.into_iter().map(|t| t.to_uppercase()).collect();
        self
    }

    /// Discovers the exportable columns of `table` and the fields its rows
    /// are ranked by. `key_override`, when not empty, replaces the primary key.
    pub async fn inspect(
        &self,
        table: &TableRef,
        key_override: &[String],
    ) -> Result<TableSchema, InspectError> {
        let catalog_err = |source: DbError| InspectError::Catalog {
            table: table.to_string(),
            source,
        };

        let accessible = self
            .retry
            .run(|| self.source.accessible_columns(table), classify_db_error)
            .await
            .map_err(|e| catalog_err(e.into_inner()))?;
        let discovered = self
            .retry
            .run(|| self.source.describe_columns(table), classify_db_error)
            .await
            .map_err(|e| catalog_err(e.into_inner()))?;
        let primary_keys = self
            .retry
            .run(|| self.source.primary_keys(table), classify_db_error)
            .await
            .map_err(|e| catalog_err(e.into_inner()))?;

        let mut columns = self.filter_columns(table, &discovered, accessible.as_deref());
        if columns.is_empty() {
            error!(table = %table, "No columns left after filtering");
            for column in &discovered {
                error!(table = %table, column = %column, "Discovered column");
            }
            return Err(InspectError::NoColumns {
                table: table.to_string(),
                discovered: column_names(&discovered),
            });
        }

        for column in columns.iter_mut() {
            column.is_primary_key = primary_keys.contains(&column.name);
        }

        let candidates = if key_override.is_empty() {
            primary_keys.as_slice()
        } else {
            key_override
        };
        let key_fields = candidates
            .iter()
            .filter(|k| {
                let known = columns.iter().any(|c| c == k.as_str());
                if !known {
                    warn!(table = %table, field = %k, "Key field is not an exported column, ignoring");
                }
                known
            })
            .cloned()
            .collect::<Vec<_>>();

        debug!(
            table = %table,
            columns = columns.len(),
            key_fields = ?key_fields,
            "Inspected table"
        );
        Ok(TableSchema {
            columns,
            key_fields,
        })
    }

    /// Drops columns the probe row did not return and columns of an
    /// unsupported type. A `None` probe (empty table) keeps everything.
    fn filter_columns(
        &self,
        table: &TableRef,
        discovered: &[Column],
        accessible: Option<&[String]>,
    ) -> Vec<Column> {
        discovered
            .iter()
            .filter(|column| {
                let readable = accessible.is_none_or(|names| names.contains(&column.name));
                if !readable {
                    warn!(
                        table = %table,
                        column = %column,
                        "Column is not returned by SELECT *, removing it from the column list"
                    );
                }
                readable && !self.unsupported_types.contains(&column.data_type)
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use connectors::sql::base::{
        adapter::DatabaseKind,
        requests::{SplitAggregate, SplitQuery},
        sink::RowSink,
    };

    struct CatalogOnly {
        columns: Vec<Column>,
        accessible: Option<Vec<String>>,
        keys: Vec<String>,
    }

    #[async_trait]
    impl SourceAdapter for CatalogOnly {
        fn kind(&self) -> DatabaseKind {
            DatabaseKind::Postgres
        }

        async fn row_count(&self, _table: &TableRef) -> Result<u64, DbError> {
            Ok(0)
        }

        async fn describe_columns(&self, _table: &TableRef) -> Result<Vec<Column>, DbError> {
            Ok(self.columns.clone())
        }

        async fn accessible_columns(
            &self,
            _table: &TableRef,
        ) -> Result<Option<Vec<String>>, DbError> {
            Ok(self.accessible.clone())
        }

        async fn primary_keys(&self, _table: &TableRef) -> Result<Vec<String>, DbError> {
            Ok(self.keys.clone())
        }

        async fn split_aggregates(&self, _q: &SplitQuery) -> Result<Vec<SplitAggregate>, DbError> {
            Ok(vec![])
        }

        async fn stream_split(
            &self,
            _q: &SplitQuery,
            _split_id: u64,
            _batch_size: usize,
            _sink: &mut dyn RowSink,
        ) -> Result<u64, DbError> {
            Ok(0)
        }
    }

    fn inspector(accessible: Option<Vec<&str>>, keys: Vec<&str>) -> SchemaInspector {
        let source = CatalogOnly {
            columns: vec![
                Column::new("id", "integer"),
                Column::new("secret", "text"),
                Column::new("photo", "bytea"),
                Column::new("name", "character"),
            ],
            accessible: accessible.map(|a| a.into_iter().map(String::from).collect()),
            keys: keys.into_iter().map(String::from).collect(),
        };
        SchemaInspector::new(Arc::new(source), RetryPolicy::none())
    }

    fn table() -> TableRef {
        TableRef::new("public", "people")
    }

    #[tokio::test]
    async fn drops_unreadable_and_unsupported_columns() {
        let schema = inspector(Some(vec!["id", "photo", "name"]), vec!["id"])
            .inspect(&table(), &[])
            .await
            .unwrap();

        assert_eq!(column_names(&schema.columns), vec!["id", "name"]);
        assert!(schema.columns[0].is_primary_key);
        assert!(!schema.columns[1].is_primary_key);
        assert_eq!(schema.key_fields, vec!["id"]);
    }

    #[tokio::test]
    async fn empty_table_keeps_every_supported_column() {
        let schema = inspector(None, vec![]).inspect(&table(), &[]).await.unwrap();
        assert_eq!(column_names(&schema.columns), vec!["id", "secret", "name"]);
        assert!(schema.key_fields.is_empty());
    }

    #[tokio::test]
    async fn key_override_replaces_primary_key() {
        let schema = inspector(None, vec!["id"])
            .inspect(&table(), &["name".to_string(), "gone".to_string()])
            .await
            .unwrap();
        assert_eq!(schema.key_fields, vec!["name"]);
        assert!(schema.columns[0].is_primary_key);
    }

    #[tokio::test]
    async fn no_columns_left_is_fatal() {
        let err = inspector(Some(vec!["photo"]), vec![])
            .inspect(&table(), &[])
            .await
            .unwrap_err();
        match err {
            InspectError::NoColumns { table, discovered } => {
                assert_eq!(table, "public.people");
                assert_eq!(discovered.len(), 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
