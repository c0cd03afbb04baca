pub mod base;
pub mod mysql;
pub mod postgres;

use crate::sql::{
    base::{
        adapter::{DatabaseKind, SourceAdapter},
        connection::ConnectionSettings,
        error::ConnectorError,
    },
    mysql::adapter::MySqlAdapter,
    postgres::adapter::PgAdapter,
};
use std::sync::Arc;
use tracing::info;

/// Opens an adapter for the configured driver.
pub async fn connect_source(
    settings: &ConnectionSettings,
) -> Result<Arc<dyn SourceAdapter>, ConnectorError> {
    info!(
        driver = settings.kind.as_str(),
        host = %settings.host,
        port = settings.port,
        database = %settings.database,
        "Connecting to source database"
    );
    match settings.kind {
        DatabaseKind::Postgres => Ok(Arc::new(PgAdapter::connect(settings).await?)),
        DatabaseKind::MySql => Ok(Arc::new(MySqlAdapter::connect(settings).await?)),
    }
}
