use crate::sql::base::{
    adapter::{DatabaseKind, SourceAdapter},
    connection::ConnectionSettings,
    error::{ConnectorError, DbError},
    query::{dialect, generator::QueryGenerator},
    requests::{SplitAggregate, SplitQuery},
    row::DbRow,
    sink::RowSink,
};
use async_trait::async_trait;
use model::core::{column::Column, identifiers::TableRef};
use mysql_async::{Pool, Row, prelude::*};
use tracing::debug;

const QUERY_TABLE_COLUMNS_SQL: &str = include_str!("sql/table_columns.sql");
const QUERY_PRIMARY_KEYS_SQL: &str = include_str!("sql/primary_keys.sql");

#[derive(Clone)]
pub struct MySqlAdapter {
    pool: Pool,
    dialect: dialect::MySql,
}

impl MySqlAdapter {
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self, ConnectorError> {
        let pool = Pool::new(settings.mysql_opts());
        // Fail fast on bad credentials instead of at the first query.
        drop(pool.get_conn().await?);
        Ok(MySqlAdapter {
            pool,
            dialect: dialect::MySql,
        })
    }

    pub async fn disconnect(self) -> Result<(), DbError> {
        self.pool.disconnect().await?;
        Ok(())
    }
}

#[async_trait]
impl SourceAdapter for MySqlAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::MySql
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64, DbError> {
        let sql = QueryGenerator::new(&self.dialect).row_count(table);
        let mut conn = self.pool.get_conn().await?;
        let count: Option<u64> = conn.query_first(sql).await?;
        Ok(count.unwrap_or(0))
    }

    async fn describe_columns(&self, table: &TableRef) -> Result<Vec<Column>, DbError> {
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<(String, String)> = conn
            .exec(
                QUERY_TABLE_COLUMNS_SQL,
                (table.schema.as_str(), table.table.as_str()),
            )
            .await?;

        Ok(rows
            .into_iter()
            .map(|(name, data_type)| Column::new(name, data_type))
            .collect())
    }

    async fn accessible_columns(&self, table: &TableRef) -> Result<Option<Vec<String>>, DbError> {
        let sql = QueryGenerator::new(&self.dialect).probe_row(table);
        let mut conn = self.pool.get_conn().await?;
        let row: Option<Row> = conn.query_first(sql).await?;
        Ok(row.map(|row| DbRow::MySqlRow(&row).column_names()))
    }

    async fn primary_keys(&self, table: &TableRef) -> Result<Vec<String>, DbError> {
        let mut conn = self.pool.get_conn().await?;
        let keys: Vec<String> = conn
            .exec(
                QUERY_PRIMARY_KEYS_SQL,
                (table.schema.as_str(), table.table.as_str()),
            )
            .await?;
        Ok(keys)
    }

    async fn split_aggregates(&self, query: &SplitQuery) -> Result<Vec<SplitAggregate>, DbError> {
        let sql = QueryGenerator::new(&self.dialect).split_aggregates(query);
        debug!(sql = %sql, "Generated split aggregate SQL");

        // Binary protocol, so numbers come back typed.
        let mut conn = self.pool.get_conn().await?;
        let rows: Vec<Row> = conn.exec(sql, ()).await?;
        rows.iter()
            .map(|row| SplitAggregate::from_row(&DbRow::MySqlRow(row), query))
            .collect()
    }

    async fn stream_split(
        &self,
        query: &SplitQuery,
        split_id: u64,
        batch_size: usize,
        sink: &mut dyn RowSink,
    ) -> Result<u64, DbError> {
        let sql = QueryGenerator::new(&self.dialect).split_rows(query);
        debug!(sql = %sql, split_id, "Generated split export SQL");

        let mut conn = self.pool.get_conn().await?;
        let mut result = conn.exec_iter(sql, (split_id,)).await?;

        let batch_size = batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);
        let mut total = 0u64;
        while let Some(row) = result.next().await? {
            batch.push(DbRow::MySqlRow(&row).to_row_data(&query.table.table, &query.columns)?);
            if batch.len() >= batch_size {
                sink.write_rows(&batch).await?;
                total += batch.len() as u64;
                batch.clear();
            }
        }
        if !batch.is_empty() {
            sink.write_rows(&batch).await?;
            total += batch.len() as u64;
        }

        Ok(total)
    }
}
