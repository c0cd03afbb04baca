use crate::store::error::StoreError;
use thiserror::Error;

/// All errors coming from the database/query layer.
#[derive(Debug, Error)]
pub enum DbError {
    /// Low-level I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Postgres error: {0}")]
    PgError(#[from] tokio_postgres::Error),

    #[error("MySQL error: {0}")]
    MySqlError(#[from] mysql_async::Error),

    /// A value came back in a shape the decoder does not understand.
    #[error("Decode error on column `{column}`: {message}")]
    Decode { column: String, message: String },

    /// The consumer of a row stream rejected a batch.
    #[error("Row sink error: {0}")]
    Sink(#[from] SinkError),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Errors happening during adapter or connection setup.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Postgres connection failed: {0}")]
    Connection(#[from] tokio_postgres::Error),

    #[error("MySQL connection failed: {0}")]
    MySql(#[from] mysql_async::Error),

    #[error("Invalid connection settings: {0}")]
    InvalidUrl(String),

    #[error("TLS configuration error: {0}")]
    TlsConfig(#[from] native_tls::Error),

    #[error("Unsupported driver: {0}")]
    UnsupportedDriver(String),
}

/// Failure raised by a [`crate::sql::base::sink::RowSink`] while consuming rows.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Encoding failed: {0}")]
    Encode(String),
}
