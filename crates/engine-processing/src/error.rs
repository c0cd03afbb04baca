use connectors::{
    sql::base::error::DbError, store::error::StoreError, warehouse::error::WarehouseError,
};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InspectError {
    #[error("Failed to read the catalog of '{table}': {source}")]
    Catalog {
        table: String,
        #[source]
        source: DbError,
    },

    /// Nothing is left to export once unreadable and unsupported columns are
    /// removed. Never retried.
    #[error("No exportable columns on table '{table}' (discovered: {discovered:?})")]
    NoColumns {
        table: String,
        discovered: Vec<String>,
    },
}

#[derive(Error, Debug)]
pub enum PlanError {
    #[error("Split aggregate query failed for '{table}': {source}")]
    Aggregate {
        table: String,
        #[source]
        source: DbError,
    },

    #[error("Cannot plan splits for '{0}' without columns")]
    NoColumns(String),
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Failed to serialize fingerprint of split {split_id}: {source}")]
    Serialize {
        split_id: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write fingerprint: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Source query failed: {0}")]
    Source(#[from] DbError),

    #[error("Object store write failed: {0}")]
    Store(#[from] StoreError),

    #[error("CSV encoding failed: {0}")]
    Encode(String),
}

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Failed to write schema artifact: {0}")]
    Store(#[from] StoreError),

    #[error("Failed to serialize warehouse schema: {0}")]
    Schema(#[from] serde_json::Error),

    #[error("Warehouse load failed: {0}")]
    Warehouse(#[from] WarehouseError),
}
