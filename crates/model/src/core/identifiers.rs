use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};

/// A source table qualified by its schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: String,
    pub table: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table: table.into(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.table)
    }
}

/// Fully qualified warehouse table id: `project.dataset.table`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WarehouseTableId(Arc<str>);

impl WarehouseTableId {
    pub fn new(project: &str, dataset: &str, table: &str) -> Self {
        Self(Arc::from(format!("{project}.{dataset}.{table}")))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Splits the id back into `(project, dataset, table)`.
    pub fn parts(&self) -> Option<(&str, &str, &str)> {
        let mut it = self.0.splitn(3, '.');
        match (it.next(), it.next(), it.next()) {
            (Some(p), Some(d), Some(t)) if !p.is_empty() && !d.is_empty() && !t.is_empty() => {
                Some((p, d, t))
            }
            _ => None,
        }
    }
}

impl From<&str> for WarehouseTableId {
    fn from(s: &str) -> Self {
        Self(Arc::from(s))
    }
}

impl fmt::Display for WarehouseTableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
