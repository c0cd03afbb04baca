use crate::core::value::Value;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fmt};

/// What the caller asked for: no partitioning, a size derived from the row
/// count, or a fixed number of rows per split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SplitDirective {
    NoSplit,
    Dynamic,
    Fixed(u64),
}

impl SplitDirective {
    /// `-1` (or any negative) disables splitting, `0` is dynamic, and a
    /// positive value is a fixed split size.
    pub fn from_i64(raw: i64) -> Self {
        match raw {
            n if n < 0 => SplitDirective::NoSplit,
            0 => SplitDirective::Dynamic,
            n => SplitDirective::Fixed(n as u64),
        }
    }
}

/// Resolved partition size used for planning, export and path layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SplitSize {
    /// One split covers the whole table.
    Unsplit,
    Rows(u64),
}

impl SplitSize {
    pub fn rows(&self) -> Option<u64> {
        match self {
            SplitSize::Unsplit => None,
            SplitSize::Rows(n) => Some(*n),
        }
    }

    /// Integer form stored in fingerprints; `-1` means unsplit.
    pub fn as_i64(&self) -> i64 {
        match self {
            SplitSize::Unsplit => -1,
            SplitSize::Rows(n) => *n as i64,
        }
    }

    pub fn from_i64(raw: i64) -> Self {
        if raw > 0 {
            SplitSize::Rows(raw as u64)
        } else {
            SplitSize::Unsplit
        }
    }
}

impl fmt::Display for SplitSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SplitSize::Unsplit => f.write_str("NO_SPLIT"),
            SplitSize::Rows(n) => write!(f, "{n}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyBound {
    pub min: Value,
    pub max: Value,
}

/// One planned partition of a table. Immutable once planned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitSpec {
    pub split_id: u64,
    pub split_size: SplitSize,
    pub row_count: u64,
    pub key_bounds: BTreeMap<String, KeyBound>,
    /// Opaque server-side aggregate over every row and column of the split.
    /// Absent only for the synthetic split of an empty table.
    pub checksum: Option<String>,
}

impl SplitSpec {
    /// The placeholder split planned for a table with no rows.
    pub fn empty(split_size: SplitSize) -> Self {
        SplitSpec {
            split_id: 1,
            split_size,
            row_count: 0,
            key_bounds: BTreeMap::new(),
            checksum: None,
        }
    }

    pub fn fingerprint(&self) -> Fingerprint<'_> {
        Fingerprint {
            split_size: self.split_size.as_i64(),
            split_id: self.split_id,
            row_count: self.row_count,
            checksum: self.checksum.as_deref(),
            bounds: &self.key_bounds,
        }
    }
}

/// Serializable summary of a split used for cache comparison.
///
/// Field order is fixed by the struct and the bounds are a `BTreeMap`, so the
/// canonical form is identical for identical splits.
#[derive(Debug, Serialize)]
pub struct Fingerprint<'a> {
    pub split_size: i64,
    pub split_id: u64,
    pub row_count: u64,
    pub checksum: Option<&'a str>,
    pub bounds: &'a BTreeMap<String, KeyBound>,
}

impl Fingerprint<'_> {
    pub fn canonical(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}
