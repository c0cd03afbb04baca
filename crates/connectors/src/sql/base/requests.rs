use crate::sql::base::{
    error::DbError,
    query::generator::{COL_CHECKSUM, COL_FIRST_BOUND, COL_ROW_COUNT, COL_SPLIT_ID},
    row::DbRow,
};
use model::{
    core::{column::Column, identifiers::TableRef},
    split::{KeyBound, SplitSize},
};
use std::collections::BTreeMap;

/// Everything needed to render the split queries for a table. Planning and
/// export are both driven from the same request, so they group rows the same
/// way.
#[derive(Debug, Clone)]
pub struct SplitQuery {
    pub table: TableRef,
    /// Exported columns, already filtered for access and unsupported types.
    pub columns: Vec<Column>,
    /// Ranking order. Never empty.
    pub order_by: Vec<String>,
    /// Fields whose per-split min/max are part of the fingerprint.
    pub bound_fields: Vec<String>,
    pub split_size: SplitSize,
}

impl SplitQuery {
    pub fn bound_columns(&self) -> Vec<&Column> {
        self.bound_fields
            .iter()
            .filter_map(|f| self.columns.iter().find(|c| c.name == *f))
            .collect()
    }
}

/// One row of the split aggregate query.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitAggregate {
    pub split_id: u64,
    pub row_count: u64,
    pub checksum: Option<String>,
    pub bounds: BTreeMap<String, KeyBound>,
}

impl SplitAggregate {
    /// Reads one row produced by `QueryGenerator::split_aggregates`.
    pub fn from_row(row: &DbRow<'_>, query: &SplitQuery) -> Result<Self, DbError> {
        let split_id = non_negative(row.try_get_i64(COL_SPLIT_ID)?, "__split_id")?;
        let row_count = non_negative(row.try_get_i64(COL_ROW_COUNT)?, "__row_count")?;
        let checksum = row.try_get_string(COL_CHECKSUM)?;

        let mut bounds = BTreeMap::new();
        for (i, column) in query.bound_columns().into_iter().enumerate() {
            let min = row.bound_at(COL_FIRST_BOUND + 2 * i, column)?;
            let max = row.bound_at(COL_FIRST_BOUND + 2 * i + 1, column)?;
            bounds.insert(column.name.clone(), KeyBound { min, max });
        }

        Ok(SplitAggregate {
            split_id,
            row_count,
            checksum,
            bounds,
        })
    }
}

fn non_negative(value: Option<i64>, column: &str) -> Result<u64, DbError> {
    value
        .and_then(|v| u64::try_from(v).ok())
        .ok_or_else(|| DbError::Decode {
            column: column.to_string(),
            message: format!("expected a non-negative integer, got {value:?}"),
        })
}

pub struct SplitQueryBuilder {
    table: TableRef,
    columns: Vec<Column>,
    order_by: Vec<String>,
    bound_fields: Vec<String>,
    split_size: SplitSize,
}

impl SplitQueryBuilder {
    pub fn new(table: TableRef) -> Self {
        SplitQueryBuilder {
            table,
            columns: Vec::new(),
            order_by: Vec::new(),
            bound_fields: Vec::new(),
            split_size: SplitSize::Unsplit,
        }
    }

    pub fn columns(mut self, columns: Vec<Column>) -> Self {
        self.columns = columns;
        self
    }

    pub fn order_by(mut self, order_by: Vec<String>) -> Self {
        self.order_by = order_by;
        self
    }

    pub fn bound_fields(mut self, bound_fields: Vec<String>) -> Self {
        self.bound_fields = bound_fields;
        self
    }

    pub fn split_size(mut self, split_size: SplitSize) -> Self {
        self.split_size = split_size;
        self
    }

    /// Falls back to ordering by every column when no key was given.
    pub fn build(self) -> SplitQuery {
        let order_by = if self.order_by.is_empty() {
            self.columns.iter().map(|c| c.name.clone()).collect()
        } else {
            self.order_by
        };

        SplitQuery {
            table: self.table,
            columns: self.columns,
            order_by,
            bound_fields: self.bound_fields,
            split_size: self.split_size,
        }
    }
}
