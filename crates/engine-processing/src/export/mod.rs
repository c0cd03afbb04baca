pub mod coercion;
pub mod csv_sink;

use crate::{error::ExportError, export::csv_sink::CsvSink, retry::classify_export_error};
use connectors::{
    sql::base::{adapter::SourceAdapter, error::SinkError, requests::SplitQuery},
    store::SharedStore,
};
use engine_core::{layout::TableLayout, observer::SharedObserver, retry::RetryPolicy};
use model::{events::IngestEvent, split::SplitSpec};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::info;

/// Rows fetched from the source per round trip.
const BATCH_SIZE: usize = 500;

/// Streams the rows of one split from the source into its content file.
pub struct StreamingExporter {
    source: Arc<dyn SourceAdapter>,
    store: SharedStore,
    retry: RetryPolicy,
    observer: SharedObserver,
}

impl StreamingExporter {
    pub fn new(
        source: Arc<dyn SourceAdapter>,
        store: SharedStore,
        retry: RetryPolicy,
        observer: SharedObserver,
    ) -> Self {
        Self {
            source,
            store,
            retry,
            observer,
        }
    }

    /// Writes the content file of `spec` and returns the number of data rows.
    /// A failed attempt leaves nothing behind and is retried as a whole.
    pub async fn export(
        &self,
        query: &SplitQuery,
        spec: &SplitSpec,
        layout: &TableLayout,
    ) -> Result<u64, ExportError> {
        let started = Instant::now();
        let path = layout.content_path(spec.split_id);
        info!(
            table = %query.table,
            split_id = spec.split_id,
            expected = spec.row_count,
            path = %path,
            "Exporting split"
        );

        let rows = self
            .retry
            .run(
                || self.export_once(query, spec, &path),
                classify_export_error,
            )
            .await
            .map_err(|e| e.into_inner())?;

        self.observer
            .on_event(&IngestEvent::SplitExported {
                table: query.table.table.clone(),
                split_id: spec.split_id,
                rows,
                elapsed_ms: started.elapsed().as_millis() as u64,
            })
            .await;
        Ok(rows)
    }

    async fn export_once(
        &self,
        query: &SplitQuery,
        spec: &SplitSpec,
        path: &str,
    ) -> Result<u64, ExportError> {
        let writer = self.store.create(path).await?;
        let mut sink = CsvSink::new(
            writer,
            &query.columns,
            spec.row_count,
            self.observer.clone(),
            &query.table.table,
            spec.split_id,
        )
        .map_err(sink_err)?;

        self.source
            .stream_split(query, spec.split_id, BATCH_SIZE, &mut sink)
            .await?;
        sink.finish().await.map_err(sink_err)
    }
}

fn sink_err(err: SinkError) -> ExportError {
    match err {
        SinkError::Store(e) => ExportError::Store(e),
        SinkError::Encode(message) => ExportError::Encode(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bigdecimal::BigDecimal;
    use connectors::{
        sql::base::{
            adapter::DatabaseKind,
            error::DbError,
            requests::{SplitAggregate, SplitQueryBuilder},
            sink::RowSink,
        },
        store::local::LocalObjectStore,
    };
    use engine_core::observer::ChannelObserver;
    use model::{
        core::{
            column::Column,
            identifiers::TableRef,
            value::{FieldValue, Value},
        },
        records::row::RowData,
        split::SplitSize,
    };
    use std::str::FromStr;
    use tokio::sync::mpsc;

    /// Streams a fixed row set in batches of the requested size.
    struct FixedRows(Vec<RowData>);

    #[async_trait]
    impl SourceAdapter for FixedRows {
        fn kind(&self) -> DatabaseKind {
            DatabaseKind::Postgres
        }

        async fn row_count(&self, _table: &TableRef) -> Result<u64, DbError> {
            Ok(self.0.len() as u64)
        }

        async fn describe_columns(&self, _table: &TableRef) -> Result<Vec<Column>, DbError> {
            Ok(vec![])
        }

        async fn accessible_columns(
            &self,
            _table: &TableRef,
        ) -> Result<Option<Vec<String>>, DbError> {
            Ok(None)
        }

        async fn primary_keys(&self, _table: &TableRef) -> Result<Vec<String>, DbError> {
            Ok(vec![])
        }

        async fn split_aggregates(&self, _q: &SplitQuery) -> Result<Vec<SplitAggregate>, DbError> {
            Ok(vec![])
        }

        async fn stream_split(
            &self,
            _q: &SplitQuery,
            _split_id: u64,
            batch_size: usize,
            sink: &mut dyn RowSink,
        ) -> Result<u64, DbError> {
            for batch in self.0.chunks(batch_size) {
                sink.write_rows(batch).await?;
            }
            Ok(self.0.len() as u64)
        }
    }

    fn row(id: i64, amount: &str, code: &str, note: &str) -> RowData {
        RowData::new(
            "orders",
            vec![
                FieldValue::new("id", Some(Value::Int(id))),
                FieldValue::new(
                    "amount",
                    Some(Value::Decimal(BigDecimal::from_str(amount).unwrap())),
                ),
                FieldValue::new("code", Some(Value::String(code.into()))),
                FieldValue::new("note", Some(Value::String(note.into()))),
            ],
        )
    }

    fn query() -> SplitQuery {
        SplitQueryBuilder::new(TableRef::new("shop", "orders"))
            .columns(vec![
                Column::new("id", "integer"),
                Column::new("amount", "numeric"),
                Column::new("code", "character"),
                Column::new("note", "text"),
            ])
            .order_by(vec!["id".into()])
            .split_size(SplitSize::Unsplit)
            .build()
    }

    async fn run(rows: Vec<RowData>, spec: SplitSpec) -> (String, u64, Vec<IngestEvent>) {
        let dir = tempfile::tempdir().unwrap();
        let layout = TableLayout::new(dir.path().to_str().unwrap(), "orders", SplitSize::Unsplit);
        let store: SharedStore = Arc::new(LocalObjectStore::new());
        let observer = ChannelObserver::new();
        let (tx, mut rx) = mpsc::channel(64);
        observer.subscribe(tx).await;

        let exporter = StreamingExporter::new(
            Arc::new(FixedRows(rows)),
            store.clone(),
            RetryPolicy::none(),
            Arc::new(observer),
        );
        let written = exporter.export(&query(), &spec, &layout).await.unwrap();

        let bytes = store.read(&layout.content_path(spec.split_id)).await.unwrap();
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push((*event).clone());
        }
        (String::from_utf8(bytes).unwrap(), written, events)
    }

    #[tokio::test]
    async fn empty_split_writes_only_the_header() {
        let (content, rows, events) = run(vec![], SplitSpec::empty(SplitSize::Unsplit)).await;
        assert_eq!(content, "\"id\",\"amount\",\"code\",\"note\"\n");
        assert_eq!(rows, 0);
        assert!(matches!(
            events.last(),
            Some(IngestEvent::SplitExported { rows: 0, .. })
        ));
    }

    #[tokio::test]
    async fn rows_are_coerced_and_quoted() {
        let spec = SplitSpec {
            row_count: 2,
            ..SplitSpec::empty(SplitSize::Unsplit)
        };
        let rows = vec![
            row(1, "10.50", "AB  ", "multi\nline, \"quoted\""),
            row(2, "0.000000000000000001", "   ", "nul\0byte"),
        ];
        let (content, written, _) = run(rows, spec).await;

        assert_eq!(written, 2);
        assert_eq!(
            content,
            "\"id\",\"amount\",\"code\",\"note\"\n\
             \"1\",\"10.50\",\"AB\",\"multi\nline, \"\"quoted\"\"\"\n\
             \"2\",\"0.000000000000000001\",,\"nulbyte\"\n"
        );
    }

    #[tokio::test]
    async fn empty_text_is_not_written_as_null() {
        let spec = SplitSpec {
            row_count: 2,
            ..SplitSpec::empty(SplitSize::Unsplit)
        };
        let mut null_note = row(2, "1", "X", "");
        null_note.field_values[3].value = None;
        let (content, _, _) = run(vec![row(1, "1", "X", ""), null_note], spec).await;

        let lines: Vec<_> = content.lines().skip(1).collect();
        assert_eq!(lines, vec![r#""1","1","X","""#, r#""2","1","X","#]);
    }

    #[tokio::test]
    async fn decimals_read_back_exactly() {
        let raw = "123456789012345678901234567890.123456789";
        let spec = SplitSpec {
            row_count: 1,
            ..SplitSpec::empty(SplitSize::Unsplit)
        };
        let (content, _, _) = run(vec![row(1, raw, "X", "")], spec).await;

        let mut reader = csv::Reader::from_reader(content.as_bytes());
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(
            BigDecimal::from_str(&record[1]).unwrap(),
            BigDecimal::from_str(raw).unwrap()
        );
    }

    #[tokio::test]
    async fn progress_is_reported_in_ten_percent_steps() {
        let rows: Vec<_> = (0..1_000).map(|i| row(i, "1", "A", "n")).collect();
        let spec = SplitSpec {
            row_count: 1_000,
            ..SplitSpec::empty(SplitSize::Unsplit)
        };
        let (_, written, events) = run(rows, spec).await;

        assert_eq!(written, 1_000);
        let percents: Vec<u8> = events
            .iter()
            .filter_map(|e| match e {
                IngestEvent::ExportProgress { percent, .. } => Some(*percent),
                _ => None,
            })
            .collect();
        assert_eq!(percents, vec![10, 20, 30, 40, 50, 60, 70, 80, 90, 100]);
    }
}
