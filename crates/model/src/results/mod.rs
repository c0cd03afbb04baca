use crate::{
    core::{column::Column, identifiers::WarehouseTableId, utils::format_elapsed},
    split::SplitSize,
};
use serde::Serialize;
use std::{fmt, time::Duration};

/// Outcome of processing one split.
#[derive(Debug, Clone, Serialize)]
pub struct SplitResult {
    pub split_id: u64,
    pub content_path: String,
    pub fingerprint_path: String,
    pub elapsed: Duration,
    pub cache_hit: bool,
    /// Rows written. `None` on a cache hit, where the rows were not read.
    pub row_count: Option<u64>,
}

impl fmt::Display for SplitResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = if self.cache_hit { "CACHE" } else { "RELOAD" };
        let rows = match self.row_count {
            Some(n) => n.to_string(),
            None => "unknown".to_string(),
        };
        write!(
            f,
            "[{tag}] {} {} ({rows} rows)",
            self.content_path,
            format_elapsed(self.elapsed)
        )
    }
}

/// Table-level outcome of a copy.
#[derive(Debug, Clone, Serialize)]
pub struct CopyResult {
    pub table_name: String,
    pub schema_name: String,
    pub table_row_count: u64,
    pub split_size: SplitSize,
    pub base_path: String,
    pub elapsed: Duration,
    pub splits: Vec<SplitResult>,
    pub columns: Vec<Column>,
}

impl CopyResult {
    pub fn is_fully_cached(&self) -> bool {
        self.splits.iter().all(|s| s.cache_hit)
    }

    pub fn rows_exported(&self) -> u64 {
        self.splits.iter().filter_map(|s| s.row_count).sum()
    }
}

impl fmt::Display for CopyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} ({}) -> {} - {}, {} splits",
            self.schema_name,
            self.table_name,
            self.table_row_count,
            self.base_path,
            format_elapsed(self.elapsed),
            self.splits.len()
        )
    }
}

/// Outcome of copy plus warehouse load for one table.
#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub copy_result: CopyResult,
    pub warehouse_row_count: u64,
    pub table_id: WarehouseTableId,
    pub elapsed_total: Duration,
    pub elapsed_warehouse: Duration,
    pub schema_artifact_path: String,
    pub load_skipped: bool,
}

impl IngestResult {
    /// Multi-line report with per-split outcomes and timings.
    pub fn full_report(&self) -> String {
        let copy = &self.copy_result;
        let mut lines = vec![
            format!("{} - {}", self.table_id, format_elapsed(self.elapsed_total)),
            "\tSource -> CSV".to_string(),
            format!("\t\tWarehouse schema: {}", self.schema_artifact_path),
            format!("\t\t{copy}"),
            "\t\tSplits:".to_string(),
        ];
        for split in &copy.splits {
            lines.push(format!("\t\t\t{split}"));
        }
        lines.push(format!("\t\tElapsed: {}", format_elapsed(copy.elapsed)));
        lines.push("\tWarehouse:".to_string());
        let load = if self.load_skipped { " [SKIPPED]" } else { "" };
        lines.push(format!(
            "\t\t{} ({}){load}",
            self.table_id, self.warehouse_row_count
        ));
        lines.push(format!(
            "\t\tElapsed: {}",
            format_elapsed(self.elapsed_warehouse)
        ));
        lines.push("\tTotal:".to_string());
        lines.push(format!("\t\tElapsed: {}", format_elapsed(self.elapsed_total)));
        lines.join("\n")
    }
}

impl fmt::Display for IngestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) - {}",
            self.table_id,
            self.warehouse_row_count,
            format_elapsed(self.elapsed_total)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(id: u64, cache_hit: bool) -> SplitResult {
        SplitResult {
            split_id: id,
            content_path: format!("/data/t/t-content-{id}.csv"),
            fingerprint_path: format!("/data/t/t-{id}.crc"),
            elapsed: Duration::from_secs(2),
            cache_hit,
            row_count: if cache_hit { None } else { Some(5) },
        }
    }

    fn copy(splits: Vec<SplitResult>) -> CopyResult {
        CopyResult {
            table_name: "t".into(),
            schema_name: "public".into(),
            table_row_count: 5,
            split_size: SplitSize::Unsplit,
            base_path: "/data/t/t".into(),
            elapsed: Duration::from_secs(3),
            splits,
            columns: vec![Column::new("id", "INT")],
        }
    }

    #[test]
    fn fully_cached_requires_every_split_hit() {
        assert!(copy(vec![split(1, true), split(2, true)]).is_fully_cached());
        assert!(!copy(vec![split(1, true), split(2, false)]).is_fully_cached());
        assert!(copy(vec![]).is_fully_cached());
    }

    #[test]
    fn split_display_marks_cache_state() {
        assert_eq!(
            split(1, true).to_string(),
            "[CACHE] /data/t/t-content-1.csv 0:00:02 (unknown rows)"
        );
        assert_eq!(
            split(2, false).to_string(),
            "[RELOAD] /data/t/t-content-2.csv 0:00:02 (5 rows)"
        );
    }

    #[test]
    fn report_lists_every_split() {
        let result = IngestResult {
            copy_result: copy(vec![split(1, true), split(2, false)]),
            warehouse_row_count: 5,
            table_id: WarehouseTableId::new("p", "d", "t"),
            elapsed_total: Duration::from_secs(10),
            elapsed_warehouse: Duration::from_secs(7),
            schema_artifact_path: "/data/t/t-schema.json".into(),
            load_skipped: false,
        };
        let report = result.full_report();
        assert!(report.starts_with("p.d.t - 0:00:10"));
        assert!(report.contains("\t\t\t[CACHE] /data/t/t-content-1.csv"));
        assert!(report.contains("\t\t\t[RELOAD] /data/t/t-content-2.csv"));
        assert!(report.contains("\t\tp.d.t (5)"));
    }
}
