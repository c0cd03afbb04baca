use crate::{error::PlanError, retry::classify_db_error};
use connectors::sql::base::{
    adapter::SourceAdapter,
    requests::{SplitQuery, SplitQueryBuilder},
};
use engine_core::{observer::SharedObserver, retry::RetryPolicy};
use model::{
    core::{column::Column, identifiers::TableRef},
    events::IngestEvent,
    split::{SplitSize, SplitSpec},
};
use std::{collections::BTreeMap, sync::Arc};
use tracing::warn;

/// The split map of a table together with the query that produced it. The
/// exporter reuses `query` so rows are grouped exactly as they were planned.
#[derive(Debug, Clone)]
pub struct SplitPlan {
    pub query: SplitQuery,
    pub splits: BTreeMap<u64, SplitSpec>,
}

pub struct SplitPlanner {
    source: Arc<dyn SourceAdapter>,
    retry: RetryPolicy,
    observer: SharedObserver,
    extra_fields: Vec<String>,
}

impl SplitPlanner {
    pub fn new(source: Arc<dyn SourceAdapter>, retry: RetryPolicy, observer: SharedObserver) -> Self {
        Self {
            source,
            retry,
            observer,
            extra_fields: Vec::new(),
        }
    }

    /// Fields whose min/max join the key bounds in every fingerprint. Fields
    /// missing from the column list are ignored.
    pub fn with_extra_fields(mut self, extra_fields: Vec<String>) -> Self {
        self.extra_fields = extra_fields;
        self
    }

    pub fn query(
        &self,
        table: &TableRef,
        columns: &[Column],
        key_fields: &[String],
        split_size: SplitSize,
    ) -> SplitQuery {
        let mut bound_fields = key_fields.to_vec();
        for field in &self.extra_fields {
            if !bound_fields.contains(field) {
                bound_fields.push(field.clone());
            }
        }

        SplitQueryBuilder::new(table.clone())
            .columns(columns.to_vec())
            .order_by(key_fields.to_vec())
            .bound_fields(bound_fields)
            .split_size(split_size)
            .build()
    }

    /// Runs the aggregate query and returns one spec per split, keyed by
    /// split id. A table without rows yields a single empty split.
    pub async fn plan(
        &self,
        table: &TableRef,
        columns: &[Column],
        key_fields: &[String],
        split_size: SplitSize,
    ) -> Result<SplitPlan, PlanError> {
        if columns.is_empty() {
            return Err(PlanError::NoColumns(table.to_string()));
        }

        let query = self.query(table, columns, key_fields, split_size);
        let aggregates = self
            .retry
            .run(|| self.source.split_aggregates(&query), classify_db_error)
            .await
            .map_err(|e| PlanError::Aggregate {
                table: table.to_string(),
                source: e.into_inner(),
            })?;

        let mut splits = BTreeMap::new();
        for aggregate in aggregates {
            splits.insert(
                aggregate.split_id,
                SplitSpec {
                    split_id: aggregate.split_id,
                    split_size,
                    row_count: aggregate.row_count,
                    key_bounds: aggregate.bounds,
                    checksum: aggregate.checksum,
                },
            );
        }

        if splits.is_empty() {
            warn!(table = %table, "Source table is empty, planning a single empty split");
            let empty = SplitSpec::empty(split_size);
            splits.insert(empty.split_id, empty);
        }

        for spec in splits.values() {
            self.observer
                .on_event(&IngestEvent::SplitPlanned {
                    table: table.table.clone(),
                    split_id: spec.split_id,
                    row_count: spec.row_count,
                    checksum: spec.checksum.clone(),
                })
                .await;
        }
        self.observer
            .on_event(&IngestEvent::TablePlanned {
                table: table.table.clone(),
                split_size: split_size.as_i64(),
                splits: splits.len(),
                row_count: splits.values().map(|s| s.row_count).sum(),
            })
            .await;

        Ok(SplitPlan { query, splits })
    }
}
