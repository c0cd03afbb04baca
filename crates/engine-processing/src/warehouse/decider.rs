use connectors::warehouse::WarehouseClient;
use model::{core::identifiers::WarehouseTableId, results::CopyResult};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadDecision {
    /// Every split was a cache hit and the warehouse already holds the
    /// source row count.
    Skip { warehouse_rows: u64 },
    Load(LoadReason),
}

impl LoadDecision {
    pub fn should_load(&self) -> bool {
        matches!(self, LoadDecision::Load(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadReason {
    Forced,
    SplitsReloaded,
    RowCountMismatch { warehouse: u64, source: u64 },
    /// The warehouse table could not be read; assumed absent.
    WarehouseUnavailable(String),
}

pub struct WarehouseLoadDecider {
    client: Arc<dyn WarehouseClient>,
    force: bool,
}

impl WarehouseLoadDecider {
    pub fn new(client: Arc<dyn WarehouseClient>) -> Self {
        Self {
            client,
            force: false,
        }
    }

    /// Always load, whatever the cache says.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub async fn decide(&self, copy: &CopyResult, table_id: &WarehouseTableId) -> LoadDecision {
        if self.force {
            debug!(table_id = %table_id, "Load forced");
            return LoadDecision::Load(LoadReason::Forced);
        }

        let warehouse_rows = match self.client.table_row_count(table_id).await {
            Ok(rows) => rows,
            Err(e) => {
                info!(table_id = %table_id, error = %e, "Cannot read warehouse table, loading");
                return LoadDecision::Load(LoadReason::WarehouseUnavailable(e.to_string()));
            }
        };

        if !copy.is_fully_cached() {
            return LoadDecision::Load(LoadReason::SplitsReloaded);
        }
        if warehouse_rows != copy.table_row_count {
            return LoadDecision::Load(LoadReason::RowCountMismatch {
                warehouse: warehouse_rows,
                source: copy.table_row_count,
            });
        }
        LoadDecision::Skip { warehouse_rows }
    }
}
