use crate::core::value::{FieldValue, Value};
use serde::{Deserialize, Serialize};

/// One source row as named fields, in select-list order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowData {
    pub table: String,
    pub field_values: Vec<FieldValue>,
}

impl RowData {
    pub fn new(table: &str, field_values: Vec<FieldValue>) -> Self {
        RowData {
            table: table.to_string(),
            field_values,
        }
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.field_values.iter().find(|f| f.name == field)
    }

    /// Missing fields and SQL NULLs both read as [`Value::Null`].
    pub fn get_value(&self, field: &str) -> Value {
        self.get(field)
            .and_then(|f| f.value.clone())
            .unwrap_or(Value::Null)
    }

    /// Drops every field that is not in `keep`.
    pub fn retain_fields(&mut self, keep: &[String]) {
        self.field_values.retain(|f| keep.contains(&f.name));
    }
}
