use serde::{Deserialize, Serialize};

/// Structured events emitted while a table is copied and loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IngestEvent {
    /// The split map for a table has been computed.
    TablePlanned {
        table: String,
        split_size: i64,
        splits: usize,
        row_count: u64,
    },

    SplitPlanned {
        table: String,
        split_id: u64,
        row_count: u64,
        checksum: Option<String>,
    },

    CacheHit {
        table: String,
        split_id: u64,
    },

    CacheMiss {
        table: String,
        split_id: u64,
        reason: MissReason,
    },

    /// Emitted every 10% of the expected rows of a split.
    ExportProgress {
        table: String,
        split_id: u64,
        rows: u64,
        expected: u64,
        percent: u8,
    },

    SplitExported {
        table: String,
        split_id: u64,
        rows: u64,
        elapsed_ms: u64,
    },

    LoadSkipped {
        table_id: String,
        row_count: u64,
    },

    LoadSubmitted {
        table_id: String,
        uri: String,
    },

    LoadCompleted {
        table_id: String,
        row_count: u64,
        elapsed_ms: u64,
    },
}

impl IngestEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            IngestEvent::TablePlanned { .. } => "table.planned",
            IngestEvent::SplitPlanned { .. } => "split.planned",
            IngestEvent::CacheHit { .. } => "cache.hit",
            IngestEvent::CacheMiss { .. } => "cache.miss",
            IngestEvent::ExportProgress { .. } => "export.progress",
            IngestEvent::SplitExported { .. } => "split.exported",
            IngestEvent::LoadSkipped { .. } => "load.skipped",
            IngestEvent::LoadSubmitted { .. } => "load.submitted",
            IngestEvent::LoadCompleted { .. } => "load.completed",
        }
    }
}

/// Why a cached split could not be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissReason {
    FingerprintMissing,
    FingerprintUnreadable,
    FingerprintChanged,
    ContentMissing,
}
