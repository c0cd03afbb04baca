use crate::{
    capability::ExtractionSource,
    error::{CopyError, Stage},
    sizing::resolve_split_size,
};
use engine_core::{layout::TableLayout, observer::SharedObserver};
use engine_processing::{cache::CacheCheck, planner::SplitPlan};
use model::{
    core::{identifiers::TableRef, utils::format_elapsed},
    events::IngestEvent,
    results::{CopyResult, SplitResult},
    split::{SplitDirective, SplitSpec},
};
use std::{sync::Arc, time::Instant};
use tracing::info;

/// Copies one table into per-split content files, re-exporting only the
/// splits whose fingerprint changed.
pub struct CopyOrchestrator {
    source: Arc<dyn ExtractionSource>,
    observer: SharedObserver,
}

impl CopyOrchestrator {
    pub fn new(source: Arc<dyn ExtractionSource>, observer: SharedObserver) -> Self {
        Self { source, observer }
    }

    pub async fn copy_table(
        &self,
        table: &TableRef,
        destination: &str,
        directive: SplitDirective,
    ) -> Result<CopyResult, CopyError> {
        let started = Instant::now();
        let name = table.to_string();

        let table_rows = self
            .source
            .count_rows(table)
            .await
            .map_err(|e| CopyError::new(&name, Stage::RowCount, e))?;
        let split_size = resolve_split_size(&name, directive, table_rows);
        let layout = TableLayout::new(destination, &table.table, split_size);

        let schema = self
            .source
            .discover_schema(table)
            .await
            .map_err(|e| CopyError::new(&name, Stage::Schema, e))?;
        let plan = self
            .source
            .plan_splits(table, &schema, split_size)
            .await
            .map_err(|e| CopyError::new(&name, Stage::Plan, e))?;

        let total = plan.splits.len();
        let mut splits = Vec::with_capacity(total);
        for (done, spec) in plan.splits.values().enumerate() {
            let result = self.process_split(&name, &plan, spec, &layout).await?;
            info!(table = %name, "Split {} / {total} done: {result}", done + 1);
            splits.push(result);
        }

        let result = CopyResult {
            table_name: table.table.clone(),
            schema_name: table.schema.clone(),
            table_row_count: table_rows,
            split_size,
            base_path: layout.base().to_string(),
            elapsed: started.elapsed(),
            splits,
            columns: schema.columns,
        };
        info!(table = %name, "Copied {result}");
        Ok(result)
    }

    /// Reuses the split when its fingerprint still matches, otherwise exports
    /// it and then records the new fingerprint.
    async fn process_split(
        &self,
        name: &str,
        plan: &SplitPlan,
        spec: &SplitSpec,
        layout: &TableLayout,
    ) -> Result<SplitResult, CopyError> {
        let started = Instant::now();
        let check = self
            .source
            .check_cache(spec, layout)
            .await
            .map_err(|e| CopyError::new(name, Stage::Cache, e))?;

        let row_count = match check {
            CacheCheck::Hit => {
                self.observer
                    .on_event(&IngestEvent::CacheHit {
                        table: plan.query.table.table.clone(),
                        split_id: spec.split_id,
                    })
                    .await;
                None
            }
            CacheCheck::Miss(reason) => {
                self.observer
                    .on_event(&IngestEvent::CacheMiss {
                        table: plan.query.table.table.clone(),
                        split_id: spec.split_id,
                        reason,
                    })
                    .await;

                let rows = self
                    .source
                    .export(plan, spec, layout)
                    .await
                    .map_err(|e| CopyError::new(name, Stage::Export, e))?;
                self.source
                    .commit(spec, layout)
                    .await
                    .map_err(|e| CopyError::new(name, Stage::Fingerprint, e))?;
                Some(rows)
            }
        };

        let elapsed = started.elapsed();
        info!(
            table = %name,
            split_id = spec.split_id,
            "Processing of split took {}",
            format_elapsed(elapsed)
        );
        Ok(SplitResult {
            split_id: spec.split_id,
            content_path: layout.content_path(spec.split_id),
            fingerprint_path: layout.fingerprint_path(spec.split_id),
            elapsed,
            cache_hit: check.is_hit(),
            row_count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use connectors::sql::base::{error::DbError, requests::SplitQueryBuilder};
    use engine_core::observer::NoopObserver;
    use engine_processing::{
        error::{CacheError, ExportError, InspectError, PlanError},
        inspector::TableSchema,
    };
    use model::{core::column::Column, events::MissReason, split::SplitSize};
    use std::{collections::BTreeMap, sync::Mutex};

    /// Split 1 is cached, split 2 is not. Records every export and commit.
    struct Scripted {
        calls: Mutex<Vec<String>>,
        fail_export: bool,
    }

    impl Scripted {
        fn new(fail_export: bool) -> Self {
            Scripted {
                calls: Mutex::new(Vec::new()),
                fail_export,
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    fn spec(split_id: u64, row_count: u64) -> SplitSpec {
        SplitSpec {
            split_id,
            row_count,
            checksum: Some(format!("c{split_id}")),
            ..SplitSpec::empty(SplitSize::Rows(3))
        }
    }

    #[async_trait]
    impl ExtractionSource for Scripted {
        async fn count_rows(&self, _table: &TableRef) -> Result<u64, DbError> {
            Ok(5)
        }

        async fn discover_schema(&self, _table: &TableRef) -> Result<TableSchema, InspectError> {
            Ok(TableSchema {
                columns: vec![Column::new("id", "integer")],
                key_fields: vec!["id".into()],
            })
        }

        async fn plan_splits(
            &self,
            table: &TableRef,
            schema: &TableSchema,
            split_size: SplitSize,
        ) -> Result<SplitPlan, PlanError> {
            let query = SplitQueryBuilder::new(table.clone())
                .columns(schema.columns.clone())
                .order_by(schema.key_fields.clone())
                .split_size(split_size)
                .build();
            let splits = BTreeMap::from([(1, spec(1, 2)), (2, spec(2, 3))]);
            Ok(SplitPlan { query, splits })
        }

        async fn check_cache(
            &self,
            spec: &SplitSpec,
            _layout: &TableLayout,
        ) -> Result<CacheCheck, CacheError> {
            Ok(match spec.split_id {
                1 => CacheCheck::Hit,
                _ => CacheCheck::Miss(MissReason::FingerprintMissing),
            })
        }

        async fn export(
            &self,
            _plan: &SplitPlan,
            spec: &SplitSpec,
            _layout: &TableLayout,
        ) -> Result<u64, ExportError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("export {}", spec.split_id));
            if self.fail_export {
                return Err(ExportError::Encode("boom".into()));
            }
            Ok(spec.row_count)
        }

        async fn commit(&self, spec: &SplitSpec, _layout: &TableLayout) -> Result<(), CacheError> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("commit {}", spec.split_id));
            Ok(())
        }
    }

    fn orchestrator(source: Arc<Scripted>) -> CopyOrchestrator {
        CopyOrchestrator::new(source, Arc::new(NoopObserver))
    }

    #[tokio::test]
    async fn only_missed_splits_are_exported_then_committed() {
        let source = Arc::new(Scripted::new(false));
        let result = orchestrator(source.clone())
            .copy_table(
                &TableRef::new("public", "orders"),
                "/data",
                SplitDirective::Fixed(3),
            )
            .await
            .unwrap();

        assert_eq!(source.calls(), vec!["export 2", "commit 2"]);
        assert_eq!(result.table_row_count, 5);
        assert_eq!(result.base_path, "/data/orders/3/orders");
        let outcome: Vec<_> = result
            .splits
            .iter()
            .map(|s| (s.cache_hit, s.row_count))
            .collect();
        assert_eq!(outcome, vec![(true, None), (false, Some(3))]);
        assert_eq!(result.splits[1].content_path, "/data/orders/3/orders-content-2.csv");
    }

    #[tokio::test]
    async fn failed_export_is_never_committed() {
        let source = Arc::new(Scripted::new(true));
        let err = orchestrator(source.clone())
            .copy_table(
                &TableRef::new("public", "orders"),
                "/data",
                SplitDirective::Fixed(3),
            )
            .await
            .unwrap_err();

        assert_eq!(err.stage, Stage::Export);
        assert_eq!(err.table, "public.orders");
        assert_eq!(source.calls(), vec!["export 2"]);
    }
}
