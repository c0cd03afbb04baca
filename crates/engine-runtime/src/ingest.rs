use crate::{
    capability::WarehouseTarget,
    error::{IngestError, Stage},
    orchestrator::CopyOrchestrator,
};
use engine_core::{layout::TableLayout, observer::SharedObserver};
use engine_processing::warehouse::decider::LoadDecision;
use model::{
    core::identifiers::{TableRef, WarehouseTableId},
    events::IngestEvent,
    results::IngestResult,
    split::SplitDirective,
};
use std::{
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::info;

/// Copies a table and brings the warehouse table up to date with it.
pub struct Ingestor {
    copier: CopyOrchestrator,
    target: Arc<dyn WarehouseTarget>,
    observer: SharedObserver,
}

impl Ingestor {
    pub fn new(
        copier: CopyOrchestrator,
        target: Arc<dyn WarehouseTarget>,
        observer: SharedObserver,
    ) -> Self {
        Self {
            copier,
            target,
            observer,
        }
    }

    pub async fn ingest_table(
        &self,
        table: &TableRef,
        destination: &str,
        directive: SplitDirective,
        table_id: &WarehouseTableId,
    ) -> Result<IngestResult, IngestError> {
        let started = Instant::now();
        let copy_result = self.copier.copy_table(table, destination, directive).await?;
        let layout = TableLayout::new(destination, &table.table, copy_result.split_size);
        let schema_artifact_path = layout.schema_path();

        if let LoadDecision::Skip { warehouse_rows } =
            self.target.decide_load(&copy_result, table_id).await
        {
            self.observer
                .on_event(&IngestEvent::LoadSkipped {
                    table_id: table_id.to_string(),
                    row_count: warehouse_rows,
                })
                .await;
            return Ok(IngestResult {
                copy_result,
                warehouse_row_count: warehouse_rows,
                table_id: table_id.clone(),
                elapsed_total: started.elapsed(),
                elapsed_warehouse: Duration::ZERO,
                schema_artifact_path,
                load_skipped: true,
            });
        }

        let load_started = Instant::now();
        info!(table_id = %table_id, uri = %layout.content_glob(), "Loading warehouse table");
        let fields = self.target.map_schema(&copy_result.columns);
        let warehouse_row_count = self
            .target
            .load(fields, &layout, table_id)
            .await
            .map_err(|e| IngestError::new(table.to_string(), Stage::Load, e))?;

        Ok(IngestResult {
            copy_result,
            warehouse_row_count,
            table_id: table_id.clone(),
            elapsed_total: started.elapsed(),
            elapsed_warehouse: load_started.elapsed(),
            schema_artifact_path,
            load_skipped: false,
        })
    }
}
