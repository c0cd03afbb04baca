#![allow(dead_code)]

use async_trait::async_trait;
use connectors::{
    sql::base::{
        adapter::{DatabaseKind, SourceAdapter},
        error::DbError,
        requests::{SplitAggregate, SplitQuery},
        sink::RowSink,
    },
    store::{ObjectStore, ObjectWriter, SharedStore, error::StoreError, local::LocalObjectStore},
    warehouse::{LoadJobHandle, LoadJobSpec, WarehouseClient, error::WarehouseError},
};
use engine_core::{
    observer::{ChannelObserver, SharedObserver},
    retry::RetryPolicy,
};
use engine_runtime::{
    capability::{BulkLoadTarget, ExtractionOptions, SqlExtraction},
    ingest::Ingestor,
    orchestrator::CopyOrchestrator,
};
use model::{
    core::{
        column::Column,
        identifiers::{TableRef, WarehouseTableId},
        value::{FieldValue, Value},
    },
    events::IngestEvent,
    records::row::RowData,
    split::{KeyBound, SplitSize},
};
use std::{
    cmp::Ordering,
    collections::{BTreeMap, HashMap},
    io,
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering as AtomicOrdering},
    },
    time::Duration,
};
use tokio::sync::{RwLock, mpsc};

/// Contents of one in-memory table.
#[derive(Debug, Clone, Default)]
pub struct MemoryTable {
    pub columns: Vec<Column>,
    pub primary_keys: Vec<String>,
    pub rows: Vec<RowData>,
}

/// Source adapter over in-memory tables. Splits are formed the way the SQL
/// dialects form them: rows ranked by the order fields, split id
/// `rank / split_size + 1`, and an order-independent hash of every row.
#[derive(Default)]
pub struct MemorySource {
    tables: RwLock<HashMap<TableRef, MemoryTable>>,
    stream_timeouts: AtomicUsize,
    streamed_splits: RwLock<Vec<u64>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_table(&self, table: TableRef, contents: MemoryTable) {
        self.tables.write().await.insert(table, contents);
    }

    /// Replaces one field of the row at `index` (insertion order).
    pub async fn update_row(&self, table: &TableRef, index: usize, field: &str, value: Value) {
        let mut tables = self.tables.write().await;
        let row = &mut tables.get_mut(table).expect("table exists").rows[index];
        match row.field_values.iter_mut().find(|f| f.name == field) {
            Some(field_value) => field_value.value = Some(value),
            None => row.field_values.push(FieldValue::new(field, Some(value))),
        }
    }

    pub async fn push_row(&self, table: &TableRef, row: RowData) {
        let mut tables = self.tables.write().await;
        tables.get_mut(table).expect("table exists").rows.push(row);
    }

    /// The next `count` calls to `stream_split` time out before delivering
    /// any rows.
    pub fn fail_next_streams(&self, count: usize) {
        self.stream_timeouts.store(count, AtomicOrdering::SeqCst);
    }

    /// Split ids streamed so far, in call order.
    pub async fn streamed_splits(&self) -> Vec<u64> {
        self.streamed_splits.read().await.clone()
    }

    async fn table(&self, table: &TableRef) -> Result<MemoryTable, DbError> {
        self.tables
            .read()
            .await
            .get(table)
            .cloned()
            .ok_or_else(|| DbError::Unknown(format!("relation {table} does not exist")))
    }

    fn ranked(rows: &[RowData], query: &SplitQuery) -> Vec<(u64, RowData)> {
        let mut rows = rows.to_vec();
        rows.sort_by(|a, b| {
            query
                .order_by
                .iter()
                .map(|field| {
                    a.get_value(field)
                        .compare(&b.get_value(field))
                        .unwrap_or(Ordering::Equal)
                })
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });

        let names: Vec<String> = query.columns.iter().map(|c| c.name.clone()).collect();
        rows.into_iter()
            .enumerate()
            .map(|(i, mut row)| {
                let split_id = match query.split_size {
                    SplitSize::Unsplit => 1,
                    SplitSize::Rows(size) => (i as u64 + 1) / size + 1,
                };
                row.retain_fields(&names);
                (split_id, row)
            })
            .collect()
    }
}

fn row_hash(row: &RowData, columns: &[Column]) -> String {
    let mut hasher = blake3::Hasher::new();
    for column in columns {
        let rendered = match row.get_value(&column.name) {
            Value::Null => "\u{0}NULL".to_string(),
            value => value.to_string(),
        };
        hasher.update(rendered.as_bytes());
        hasher.update(b"\x1f");
    }
    hasher.finalize().to_hex().to_string()
}

fn extreme(rows: &[&RowData], field: &str, wanted: Ordering) -> Value {
    rows.iter()
        .map(|row| row.get_value(field))
        .filter(|v| !v.is_null())
        .reduce(|best, v| {
            if v.compare(&best) == Some(wanted) {
                v
            } else {
                best
            }
        })
        .unwrap_or(Value::Null)
}

#[async_trait]
impl SourceAdapter for MemorySource {
    fn kind(&self) -> DatabaseKind {
        DatabaseKind::Postgres
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64, DbError> {
        Ok(self.table(table).await?.rows.len() as u64)
    }

    async fn describe_columns(&self, table: &TableRef) -> Result<Vec<Column>, DbError> {
        Ok(self.table(table).await?.columns)
    }

    async fn accessible_columns(&self, table: &TableRef) -> Result<Option<Vec<String>>, DbError> {
        let contents = self.table(table).await?;
        Ok(contents.rows.first().map(|row| {
            row.field_values
                .iter()
                .map(|f| f.name.clone())
                .collect()
        }))
    }

    async fn primary_keys(&self, table: &TableRef) -> Result<Vec<String>, DbError> {
        Ok(self.table(table).await?.primary_keys)
    }

    async fn split_aggregates(&self, query: &SplitQuery) -> Result<Vec<SplitAggregate>, DbError> {
        let contents = self.table(&query.table).await?;
        let mut groups: BTreeMap<u64, Vec<RowData>> = BTreeMap::new();
        for (split_id, row) in Self::ranked(&contents.rows, query) {
            groups.entry(split_id).or_default().push(row);
        }

        Ok(groups
            .into_iter()
            .map(|(split_id, rows)| {
                let mut hashes: Vec<String> =
                    rows.iter().map(|r| row_hash(r, &query.columns)).collect();
                hashes.sort();
                let checksum = blake3::hash(hashes.concat().as_bytes()).to_hex().to_string();

                let refs: Vec<&RowData> = rows.iter().collect();
                let bounds = query
                    .bound_columns()
                    .into_iter()
                    .map(|column| {
                        let bound = KeyBound {
                            min: extreme(&refs, &column.name, Ordering::Less),
                            max: extreme(&refs, &column.name, Ordering::Greater),
                        };
                        (column.name.clone(), bound)
                    })
                    .collect();

                SplitAggregate {
                    split_id,
                    row_count: rows.len() as u64,
                    checksum: Some(checksum),
                    bounds,
                }
            })
            .collect())
    }

    async fn stream_split(
        &self,
        query: &SplitQuery,
        split_id: u64,
        batch_size: usize,
        sink: &mut dyn RowSink,
    ) -> Result<u64, DbError> {
        self.streamed_splits.write().await.push(split_id);
        let pending = self.stream_timeouts.load(AtomicOrdering::SeqCst);
        if pending > 0 {
            self.stream_timeouts.store(pending - 1, AtomicOrdering::SeqCst);
            return Err(DbError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "statement timed out",
            )));
        }

        let contents = self.table(&query.table).await?;
        let rows: Vec<RowData> = Self::ranked(&contents.rows, query)
            .into_iter()
            .filter(|(id, _)| *id == split_id)
            .map(|(_, row)| row)
            .collect();

        for batch in rows.chunks(batch_size.max(1)) {
            sink.write_rows(batch).await?;
        }
        Ok(rows.len() as u64)
    }
}

/// Warehouse whose load jobs read the local content files, so the row count
/// after a load is whatever the exported files really hold.
#[derive(Default)]
pub struct MemoryWarehouse {
    tables: RwLock<HashMap<String, u64>>,
    pending: RwLock<HashMap<String, LoadJobSpec>>,
    loads: RwLock<Vec<LoadJobSpec>>,
    unavailable: RwLock<bool>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_row_count(&self, table: &WarehouseTableId, rows: u64) {
        self.tables.write().await.insert(table.to_string(), rows);
    }

    pub async fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.write().await = unavailable;
    }

    pub async fn loads(&self) -> Vec<LoadJobSpec> {
        self.loads.read().await.clone()
    }
}

#[async_trait]
impl WarehouseClient for MemoryWarehouse {
    async fn table_row_count(&self, table: &WarehouseTableId) -> Result<u64, WarehouseError> {
        if *self.unavailable.read().await {
            return Err(WarehouseError::Http {
                status: 500,
                message: "backend error".into(),
            });
        }
        self.tables
            .read()
            .await
            .get(table.as_str())
            .copied()
            .ok_or_else(|| WarehouseError::TableNotFound(table.to_string()))
    }

    async fn submit_load(&self, spec: &LoadJobSpec) -> Result<LoadJobHandle, WarehouseError> {
        let mut loads = self.loads.write().await;
        loads.push(spec.clone());
        let job_id = format!("job_{}", loads.len());
        self.pending
            .write()
            .await
            .insert(job_id.clone(), spec.clone());
        Ok(LoadJobHandle {
            project: "test".into(),
            job_id,
            location: None,
        })
    }

    async fn wait(&self, job: &LoadJobHandle) -> Result<(), WarehouseError> {
        let spec = self
            .pending
            .write()
            .await
            .remove(&job.job_id)
            .ok_or_else(|| WarehouseError::InvalidResponse(format!("unknown job {}", job.job_id)))?;

        let rows = count_glob_rows(&spec.source_uri).map_err(|e| WarehouseError::JobFailed {
            job_id: job.job_id.clone(),
            message: e.to_string(),
        })?;
        self.tables
            .write()
            .await
            .insert(spec.table_id.to_string(), rows);
        Ok(())
    }
}

/// Counts CSV records (header skipped) across every local file matching a
/// `{prefix}*.csv` glob.
pub fn count_glob_rows(glob: &str) -> io::Result<u64> {
    let prefix = glob.trim_end_matches("*.csv");
    let dir = Path::new(prefix).parent().unwrap_or(Path::new("."));
    let mut rows = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let name = path.to_string_lossy();
        if name.starts_with(prefix) && name.ends_with(".csv") {
            let mut reader = csv::Reader::from_path(&path)?;
            for record in reader.records() {
                record?;
                rows += 1;
            }
        }
    }
    Ok(rows)
}

/// Local store whose uploads fail with the given HTTP status a set number
/// of times before succeeding.
pub struct FlakyStore {
    inner: LocalObjectStore,
    status: u16,
    failures: Arc<AtomicUsize>,
}

impl FlakyStore {
    pub fn new(status: u16, failures: usize) -> Self {
        FlakyStore {
            inner: LocalObjectStore::new(),
            status,
            failures: Arc::new(AtomicUsize::new(failures)),
        }
    }

    pub fn remaining_failures(&self) -> usize {
        self.failures.load(AtomicOrdering::SeqCst)
    }
}

struct FlakyWriter {
    inner: Box<dyn ObjectWriter>,
    path: String,
    status: u16,
    failures: Arc<AtomicUsize>,
}

#[async_trait]
impl ObjectWriter for FlakyWriter {
    async fn write_all(&mut self, bytes: &[u8]) -> Result<(), StoreError> {
        self.inner.write_all(bytes).await
    }

    async fn finish(self: Box<Self>) -> Result<(), StoreError> {
        let FlakyWriter {
            inner,
            path,
            status,
            failures,
        } = *self;
        let left = failures.load(AtomicOrdering::SeqCst);
        if left > 0 {
            failures.store(left - 1, AtomicOrdering::SeqCst);
            return Err(StoreError::Http {
                path,
                status,
                message: "injected upload failure".into(),
            });
        }
        inner.finish().await
    }
}

#[async_trait]
impl ObjectStore for FlakyStore {
    async fn read(&self, path: &str) -> Result<Vec<u8>, StoreError> {
        self.inner.read(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool, StoreError> {
        self.inner.exists(path).await
    }

    async fn create(&self, path: &str) -> Result<Box<dyn ObjectWriter>, StoreError> {
        Ok(Box::new(FlakyWriter {
            inner: self.inner.create(path).await?,
            path: path.to_string(),
            status: self.status,
            failures: self.failures.clone(),
        }))
    }

    fn name(&self) -> &'static str {
        "flaky"
    }
}

pub fn orders_table() -> TableRef {
    TableRef::new("public", "orders")
}

pub fn orders_columns() -> Vec<Column> {
    vec![
        Column::new("id", "integer"),
        Column::new("amount", "numeric"),
        Column::new("status", "character varying"),
        Column::new("updated_at", "timestamp"),
    ]
}

pub fn order_row(id: i64, amount: &str, status: &str) -> RowData {
    let amount = amount.parse().expect("valid decimal");
    RowData::new(
        "orders",
        vec![
            FieldValue::new("id", Some(Value::Int(id))),
            FieldValue::new("amount", Some(Value::Decimal(amount))),
            FieldValue::new("status", Some(Value::String(status.into()))),
            FieldValue::new("updated_at", None),
        ],
    )
}

pub async fn seeded_source(rows: i64) -> Arc<MemorySource> {
    let source = Arc::new(MemorySource::new());
    source
        .insert_table(
            orders_table(),
            MemoryTable {
                columns: orders_columns(),
                primary_keys: vec!["id".into()],
                rows: (1..=rows)
                    .map(|id| order_row(id, &format!("{id}.25"), "open"))
                    .collect(),
            },
        )
        .await;
    source
}

/// Retries quickly so transient-failure scenarios stay fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(4, Duration::from_millis(1), Duration::from_secs(5))
}

/// Everything a scenario needs, wired the way the binary wires it.
pub struct Harness {
    pub source: Arc<MemorySource>,
    pub store: SharedStore,
    pub warehouse: Arc<MemoryWarehouse>,
    pub observer: Arc<ChannelObserver>,
    pub events: mpsc::Receiver<Arc<IngestEvent>>,
    pub dir: tempfile::TempDir,
}

impl Harness {
    pub async fn new(source: Arc<MemorySource>) -> Self {
        Self::with_store(source, Arc::new(LocalObjectStore::new())).await
    }

    pub async fn with_store(source: Arc<MemorySource>, store: SharedStore) -> Self {
        let observer = Arc::new(ChannelObserver::new());
        let (tx, events) = mpsc::channel(4096);
        observer.subscribe(tx).await;
        Harness {
            source,
            store,
            warehouse: Arc::new(MemoryWarehouse::new()),
            observer,
            events,
            dir: tempfile::tempdir().expect("temp dir"),
        }
    }

    pub fn destination(&self) -> String {
        self.dir.path().to_string_lossy().to_string()
    }

    pub fn copier(&self, options: ExtractionOptions) -> CopyOrchestrator {
        let observer: SharedObserver = self.observer.clone();
        let extraction = SqlExtraction::new(
            self.source.clone(),
            self.store.clone(),
            fast_retry(),
            observer.clone(),
            options,
        );
        CopyOrchestrator::new(Arc::new(extraction), observer)
    }

    pub fn ingestor(&self, force_load: bool) -> Ingestor {
        let observer: SharedObserver = self.observer.clone();
        let target = BulkLoadTarget::new(
            self.warehouse.clone(),
            self.store.clone(),
            fast_retry(),
            observer.clone(),
            force_load,
        );
        Ingestor::new(
            self.copier(ExtractionOptions::default()),
            Arc::new(target),
            observer,
        )
    }

    /// Events received since the last call.
    pub fn drain_events(&mut self) -> Vec<IngestEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push((*event).clone());
        }
        events
    }
}
