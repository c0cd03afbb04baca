use connectors::sql::base::error::DbError;
use engine_processing::error::{CacheError, ExportError, InspectError, LoadError, PlanError};
use std::fmt;
use thiserror::Error;

/// Step of a table ingestion, reported with every failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    RowCount,
    Schema,
    Plan,
    Cache,
    Export,
    Fingerprint,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::RowCount => "row_count",
            Stage::Schema => "schema",
            Stage::Plan => "plan",
            Stage::Cache => "cache",
            Stage::Export => "export",
            Stage::Fingerprint => "fingerprint",
            Stage::Load => "load",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum StageError {
    #[error(transparent)]
    Source(#[from] DbError),

    #[error(transparent)]
    Inspect(#[from] InspectError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Load(#[from] LoadError),
}

/// A table ingestion aborted. Files already written stay in place.
#[derive(Debug, Error)]
#[error("Table '{table}' failed at stage '{stage}': {source}")]
pub struct IngestError {
    pub table: String,
    pub stage: Stage,
    #[source]
    pub source: StageError,
}

impl IngestError {
    pub fn new(table: impl Into<String>, stage: Stage, source: impl Into<StageError>) -> Self {
        Self {
            table: table.into(),
            stage,
            source: source.into(),
        }
    }
}

/// Failures of `copy_table` carry the same table and stage information.
pub type CopyError = IngestError;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_names_table_and_stage() {
        let err = IngestError::new(
            "shop.orders",
            Stage::Plan,
            PlanError::NoColumns("shop.orders".into()),
        );
        assert_eq!(
            err.to_string(),
            "Table 'shop.orders' failed at stage 'plan': Cannot plan splits for 'shop.orders' without columns"
        );
    }
}
