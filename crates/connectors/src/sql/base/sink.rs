use crate::sql::base::error::SinkError;
use async_trait::async_trait;
use model::records::row::RowData;

/// Consumer of a row stream. Adapters push bounded batches into it so the
/// full result set is never held in memory.
#[async_trait]
pub trait RowSink: Send {
    async fn write_rows(&mut self, rows: &[RowData]) -> Result<(), SinkError>;
}
