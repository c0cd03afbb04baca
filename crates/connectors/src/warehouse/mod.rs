pub mod bigquery;
pub mod error;

use crate::warehouse::error::WarehouseError;
use async_trait::async_trait;
use model::core::identifiers::WarehouseTableId;
use serde::{Deserialize, Serialize};

/// One column of the warehouse schema artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    pub mode: String,
}

impl WarehouseField {
    pub fn nullable(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        WarehouseField {
            name: name.into(),
            field_type: field_type.into(),
            mode: "NULLABLE".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    WriteTruncate,
    WriteAppend,
}

/// A bulk load of CSV files into a warehouse table.
#[derive(Debug, Clone)]
pub struct LoadJobSpec {
    pub table_id: WarehouseTableId,
    /// URI or glob covering every content file.
    pub source_uri: String,
    pub schema: Vec<WarehouseField>,
    pub write_disposition: WriteDisposition,
    pub skip_leading_rows: u32,
    pub allow_quoted_newlines: bool,
}

impl LoadJobSpec {
    /// Full-table overwrite from headered CSV whose quoted fields may span lines.
    pub fn overwrite_csv(
        table_id: WarehouseTableId,
        source_uri: String,
        schema: Vec<WarehouseField>,
    ) -> Self {
        LoadJobSpec {
            table_id,
            source_uri,
            schema,
            write_disposition: WriteDisposition::WriteTruncate,
            skip_leading_rows: 1,
            allow_quoted_newlines: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadJobHandle {
    pub project: String,
    pub job_id: String,
    pub location: Option<String>,
}

/// Warehouse Loader API.
#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Current row count. Fails with [`WarehouseError::TableNotFound`] when
    /// the table does not exist.
    async fn table_row_count(&self, table: &WarehouseTableId) -> Result<u64, WarehouseError>;

    async fn submit_load(&self, spec: &LoadJobSpec) -> Result<LoadJobHandle, WarehouseError>;

    /// Blocks until the job is done, surfacing its error if it failed.
    async fn wait(&self, job: &LoadJobHandle) -> Result<(), WarehouseError>;
}
