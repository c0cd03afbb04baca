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
use futures_util::{TryStreamExt, pin_mut};
use model::core::{column::Column, identifiers::TableRef};
use native_tls::TlsConnector;
use postgres_native_tls::MakeTlsConnector;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_postgres::{Client, Config, NoTls, config::SslMode, types::ToSql};
use tracing::{debug, error, warn};

const QUERY_TABLE_COLUMNS_SQL: &str = include_str!("sql/table_columns.sql");
const QUERY_PRIMARY_KEYS_SQL: &str = include_str!("sql/primary_keys.sql");

#[derive(Clone)]
pub struct PgAdapter {
    client: Arc<RwLock<Client>>,
    dialect: dialect::Postgres,
}

impl PgAdapter {
    /// TLS is used when the server offers it. `sslmode=prefer` (the default)
    /// falls back to a plain connection if the handshake fails.
    pub async fn connect(settings: &ConnectionSettings) -> Result<Self, ConnectorError> {
        let config = settings.pg_config();
        let client = match config.get_ssl_mode() {
            SslMode::Disable => open_plain(&config).await?,
            SslMode::Require => open_tls(&config).await?,
            _ => match open_tls(&config).await {
                Ok(client) => client,
                Err(e) => {
                    warn!(host = %settings.host, error = %e, "TLS handshake with the source failed, connecting without TLS");
                    open_plain(&config).await?
                }
            },
        };
        Ok(PgAdapter {
            client: Arc::new(RwLock::new(client)),
            dialect: dialect::Postgres,
        })
    }
}

async fn open_tls(config: &Config) -> Result<Client, ConnectorError> {
    let tls = MakeTlsConnector::new(TlsConnector::builder().build()?);
    let (client, connection) = config.connect(tls).await?;
    drive(connection);
    Ok(client)
}

async fn open_plain(config: &Config) -> Result<Client, ConnectorError> {
    let (client, connection) = config.connect(NoTls).await?;
    drive(connection);
    Ok(client)
}

/// The connection half does the socket I/O and must be polled for the
/// client to make progress.
fn drive<C>(connection: C)
where
    C: Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            error!(error = %e, "Source connection closed with an error");
        }
    });
}

fn slice_iter<'a>(
    s: &'a [&'a (dyn ToSql + Sync)],
) -> impl ExactSizeIterator<Item = &'a dyn ToSql> + 'a {
    s.iter().map(|s| *s as _)
}

#[async_trait]
impl SourceAdapter for PgAdapter {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Postgres
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64, DbError> {
        let sql = QueryGenerator::new(&self.dialect).row_count(table);
        let client = self.client.read().await;
        let row = client.query_one(&sql, &[]).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count.max(0) as u64)
    }

    async fn describe_columns(&self, table: &TableRef) -> Result<Vec<Column>, DbError> {
        let client = self.client.read().await;
        let rows = client
            .query(QUERY_TABLE_COLUMNS_SQL, &[&table.schema, &table.table])
            .await?;

        rows.iter()
            .map(|row| {
                let name: String = row.try_get(0)?;
                let data_type: String = row.try_get(1)?;
                Ok::<_, DbError>(Column::new(name, data_type))
            })
            .collect()
    }

    async fn accessible_columns(&self, table: &TableRef) -> Result<Option<Vec<String>>, DbError> {
        let sql = QueryGenerator::new(&self.dialect).probe_row(table);
        let client = self.client.read().await;
        let rows = client.query(&sql, &[]).await?;
        Ok(rows.first().map(|row| DbRow::PostgresRow(row).column_names()))
    }

    async fn primary_keys(&self, table: &TableRef) -> Result<Vec<String>, DbError> {
        let client = self.client.read().await;
        let rows = client
            .query(QUERY_PRIMARY_KEYS_SQL, &[&table.schema, &table.table])
            .await?;

        let keys = rows
            .iter()
            .map(|row| row.try_get::<_, String>(0))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(keys)
    }

    async fn split_aggregates(&self, query: &SplitQuery) -> Result<Vec<SplitAggregate>, DbError> {
        let sql = QueryGenerator::new(&self.dialect).split_aggregates(query);
        debug!(sql = %sql, "Generated split aggregate SQL");

        let client = self.client.read().await;
        let rows = client.query(&sql, &[]).await?;
        rows.iter()
            .map(|row| SplitAggregate::from_row(&DbRow::PostgresRow(row), query))
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

        let split_param = split_id as i64;
        let params: [&(dyn ToSql + Sync); 1] = [&split_param];

        let client = self.client.read().await;
        let stream = client.query_raw(&sql, slice_iter(&params)).await?;
        pin_mut!(stream);

        let batch_size = batch_size.max(1);
        let mut batch = Vec::with_capacity(batch_size);
        let mut total = 0u64;
        while let Some(row) = stream.try_next().await? {
            batch.push(DbRow::PostgresRow(&row).to_row_data(&query.table.table, &query.columns)?);
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
