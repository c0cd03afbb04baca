use crate::{error::LoadError, retry::classify_store_error, warehouse::mapper::SchemaMapper};
use connectors::{
    store::SharedStore,
    warehouse::{LoadJobSpec, WarehouseClient, WarehouseField},
};
use engine_core::{layout::TableLayout, observer::SharedObserver, retry::RetryPolicy};
use model::{
    core::identifiers::WarehouseTableId,
    events::IngestEvent,
};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

/// Replaces the contents of a warehouse table with every content file of a
/// table layout.
pub struct WarehouseLoader {
    client: Arc<dyn WarehouseClient>,
    store: SharedStore,
    retry: RetryPolicy,
    observer: SharedObserver,
}

impl WarehouseLoader {
    pub fn new(
        client: Arc<dyn WarehouseClient>,
        store: SharedStore,
        retry: RetryPolicy,
        observer: SharedObserver,
    ) -> Self {
        Self {
            client,
            store,
            retry,
            observer,
        }
    }

    /// Writes the schema artifact, runs the load job to completion and
    /// returns the row count the warehouse reports afterwards.
    pub async fn load(
        &self,
        fields: Vec<WarehouseField>,
        layout: &TableLayout,
        table_id: &WarehouseTableId,
    ) -> Result<u64, LoadError> {
        let started = Instant::now();
        let schema_path = layout.schema_path();
        let artifact = SchemaMapper::schema_artifact(&fields)?;
        info!(path = %schema_path, "Writing warehouse schema");
        self.retry
            .run(
                || self.store.write(&schema_path, &artifact),
                classify_store_error,
            )
            .await
            .map_err(|e| e.into_inner())?;

        let uri = layout.content_glob();
        let spec = LoadJobSpec::overwrite_csv(table_id.clone(), uri.clone(), fields);
        let job = self.client.submit_load(&spec).await?;
        self.observer
            .on_event(&IngestEvent::LoadSubmitted {
                table_id: table_id.to_string(),
                uri,
            })
            .await;

        info!(job_id = %job.job_id, "Waiting for load job to finish");
        self.client.wait(&job).await?;

        let row_count = self.client.table_row_count(table_id).await?;
        self.observer
            .on_event(&IngestEvent::LoadCompleted {
                table_id: table_id.to_string(),
                row_count,
                elapsed_ms: started.elapsed().as_millis() as u64,
            })
            .await;
        Ok(row_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use connectors::{
        store::local::LocalObjectStore,
        warehouse::{LoadJobHandle, WriteDisposition, error::WarehouseError},
    };
    use engine_core::observer::NoopObserver;
    use model::{core::column::Column, split::SplitSize};
    use std::sync::Mutex;

    /// Accepts every job and reports the given row count afterwards.
    #[derive(Default)]
    struct RecordingWarehouse {
        submitted: Mutex<Vec<LoadJobSpec>>,
        waited: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl WarehouseClient for RecordingWarehouse {
        async fn table_row_count(&self, _table: &WarehouseTableId) -> Result<u64, WarehouseError> {
            Ok(42)
        }

        async fn submit_load(&self, spec: &LoadJobSpec) -> Result<LoadJobHandle, WarehouseError> {
            self.submitted.lock().unwrap().push(spec.clone());
            Ok(LoadJobHandle {
                project: "p".into(),
                job_id: "job-1".into(),
                location: None,
            })
        }

        async fn wait(&self, job: &LoadJobHandle) -> Result<(), WarehouseError> {
            self.waited.lock().unwrap().push(job.job_id.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn writes_schema_then_loads_every_content_file() {
        let dir = tempfile::tempdir().unwrap();
        let layout = TableLayout::new(dir.path().to_str().unwrap(), "orders", SplitSize::Rows(10));
        let store: SharedStore = Arc::new(LocalObjectStore::new());
        let warehouse = Arc::new(RecordingWarehouse::default());
        let loader = WarehouseLoader::new(
            warehouse.clone(),
            store.clone(),
            RetryPolicy::none(),
            Arc::new(NoopObserver),
        );

        let columns = vec![Column::new("id", "bigint"), Column::new("total", "numeric")];
        let rows = loader
            .load(SchemaMapper::map_columns(&columns), &layout, &WarehouseTableId::new("p", "d", "orders"))
            .await
            .unwrap();
        assert_eq!(rows, 42);

        let schema = store.read(&layout.schema_path()).await.unwrap();
        let schema: serde_json::Value = serde_json::from_slice(&schema).unwrap();
        assert_eq!(schema[1]["type"], "NUMERIC");

        let submitted = warehouse.submitted.lock().unwrap();
        assert_eq!(submitted.len(), 1);
        assert_eq!(submitted[0].source_uri, layout.content_glob());
        assert_eq!(submitted[0].write_disposition, WriteDisposition::WriteTruncate);
        assert_eq!(submitted[0].skip_leading_rows, 1);
        assert!(submitted[0].allow_quoted_newlines);
        assert_eq!(*warehouse.waited.lock().unwrap(), vec!["job-1".to_string()]);
    }
}
