use async_trait::async_trait;
use connectors::{
    sql::base::{adapter::SourceAdapter, error::DbError},
    store::SharedStore,
    warehouse::{WarehouseClient, WarehouseField},
};
use engine_core::{layout::TableLayout, observer::SharedObserver, retry::RetryPolicy};
use engine_processing::{
    cache::{CacheCheck, ChecksumCache},
    error::{CacheError, ExportError, InspectError, LoadError, PlanError},
    export::StreamingExporter,
    inspector::{SchemaInspector, TableSchema},
    planner::{SplitPlan, SplitPlanner},
    retry::classify_db_error,
    warehouse::{
        decider::{LoadDecision, WarehouseLoadDecider},
        loader::WarehouseLoader,
        mapper::SchemaMapper,
    },
};
use model::{
    core::{
        column::Column,
        identifiers::{TableRef, WarehouseTableId},
    },
    results::CopyResult,
    split::{SplitSize, SplitSpec},
};
use std::sync::Arc;

/// What a source must offer to be copied split by split.
#[async_trait]
pub trait ExtractionSource: Send + Sync {
    async fn count_rows(&self, table: &TableRef) -> Result<u64, DbError>;

    async fn discover_schema(&self, table: &TableRef) -> Result<TableSchema, InspectError>;

    async fn plan_splits(
        &self,
        table: &TableRef,
        schema: &TableSchema,
        split_size: SplitSize,
    ) -> Result<SplitPlan, PlanError>;

    async fn check_cache(
        &self,
        spec: &SplitSpec,
        layout: &TableLayout,
    ) -> Result<CacheCheck, CacheError>;

    /// Writes the content file of one split and returns its row count.
    async fn export(
        &self,
        plan: &SplitPlan,
        spec: &SplitSpec,
        layout: &TableLayout,
    ) -> Result<u64, ExportError>;

    /// Records the fingerprint of a split once its content is complete.
    async fn commit(&self, spec: &SplitSpec, layout: &TableLayout) -> Result<(), CacheError>;
}

/// What a warehouse must offer to receive the exported files.
#[async_trait]
pub trait WarehouseTarget: Send + Sync {
    fn map_schema(&self, columns: &[Column]) -> Vec<WarehouseField>;

    async fn decide_load(&self, copy: &CopyResult, table_id: &WarehouseTableId) -> LoadDecision;

    async fn load(
        &self,
        fields: Vec<WarehouseField>,
        layout: &TableLayout,
        table_id: &WarehouseTableId,
    ) -> Result<u64, LoadError>;
}

/// Extraction from a SQL database into an object store.
pub struct SqlExtraction {
    source: Arc<dyn SourceAdapter>,
    retry: RetryPolicy,
    inspector: SchemaInspector,
    planner: SplitPlanner,
    cache: ChecksumCache,
    exporter: StreamingExporter,
    key_override: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct ExtractionOptions {
    /// Ranking fields used instead of the primary key.
    pub key_fields: Vec<String>,
    /// Extra fields whose min/max go into every fingerprint.
    pub extra_fingerprint_fields: Vec<String>,
    /// Overrides the default unsupported source types when set.
    pub unsupported_types: Option<Vec<String>>,
}

impl SqlExtraction {
    pub fn new(
        source: Arc<dyn SourceAdapter>,
        store: SharedStore,
        retry: RetryPolicy,
        observer: SharedObserver,
        options: ExtractionOptions,
    ) -> Self {
        let mut inspector = SchemaInspector::new(source.clone(), retry.clone());
        if let Some(types) = options.unsupported_types {
            inspector = inspector.with_unsupported_types(types);
        }

        SqlExtraction {
            inspector,
            planner: SplitPlanner::new(source.clone(), retry.clone(), observer.clone())
                .with_extra_fields(options.extra_fingerprint_fields),
            cache: ChecksumCache::new(store.clone(), retry.clone()),
            exporter: StreamingExporter::new(source.clone(), store, retry.clone(), observer),
            key_override: options.key_fields,
            source,
            retry,
        }
    }
}

#[async_trait]
impl ExtractionSource for SqlExtraction {
    async fn count_rows(&self, table: &TableRef) -> Result<u64, DbError> {
        self.retry
            .run(|| self.source.row_count(table), classify_db_error)
            .await
            .map_err(|e| e.into_inner())
    }

    async fn discover_schema(&self, table: &TableRef) -> Result<TableSchema, InspectError> {
        self.inspector.inspect(table, &self.key_override).await
    }

    async fn plan_splits(
        &self,
        table: &TableRef,
        schema: &TableSchema,
        split_size: SplitSize,
    ) -> Result<SplitPlan, PlanError> {
        self.planner
            .plan(table, &schema.columns, &schema.key_fields, split_size)
            .await
    }

    async fn check_cache(
        &self,
        spec: &SplitSpec,
        layout: &TableLayout,
    ) -> Result<CacheCheck, CacheError> {
        self.cache.check(spec, layout).await
    }

    async fn export(
        &self,
        plan: &SplitPlan,
        spec: &SplitSpec,
        layout: &TableLayout,
    ) -> Result<u64, ExportError> {
        self.exporter.export(&plan.query, spec, layout).await
    }

    async fn commit(&self, spec: &SplitSpec, layout: &TableLayout) -> Result<(), CacheError> {
        self.cache.persist(spec, layout).await
    }
}

/// Bulk loads from the object store into a warehouse table.
pub struct BulkLoadTarget {
    decider: WarehouseLoadDecider,
    loader: WarehouseLoader,
}

impl BulkLoadTarget {
    pub fn new(
        client: Arc<dyn WarehouseClient>,
        store: SharedStore,
        retry: RetryPolicy,
        observer: SharedObserver,
        force_load: bool,
    ) -> Self {
        BulkLoadTarget {
            decider: WarehouseLoadDecider::new(client.clone()).force(force_load),
            loader: WarehouseLoader::new(client, store, retry, observer),
        }
    }
}

#[async_trait]
impl WarehouseTarget for BulkLoadTarget {
    fn map_schema(&self, columns: &[Column]) -> Vec<WarehouseField> {
        SchemaMapper::map_columns(columns)
    }

    async fn decide_load(&self, copy: &CopyResult, table_id: &WarehouseTableId) -> LoadDecision {
        self.decider.decide(copy, table_id).await
    }

    async fn load(
        &self,
        fields: Vec<WarehouseField>,
        layout: &TableLayout,
        table_id: &WarehouseTableId,
    ) -> Result<u64, LoadError> {
        self.loader.load(fields, layout, table_id).await
    }
}
