use serde::{Deserialize, Serialize};
use std::fmt;

/// A source column as discovered by schema inspection.
///
/// Equality is by name only (case-sensitive); the type and key flag do not
/// participate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Uppercased source type name, e.g. `NUMERIC` or `CHARACTER VARYING`.
    pub data_type: String,
    pub is_primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl AsRef<str>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.as_ref().to_uppercase(),
            is_primary_key: false,
        }
    }

    /// Fixed-length character columns are padded by the database and need
    /// their trailing blanks removed on export.
    pub fn is_fixed_char(&self) -> bool {
        matches!(
            self.data_type.as_str(),
            "CHAR" | "CHARACTER" | "NCHAR" | "BPCHAR"
        )
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Column {}

impl PartialEq<str> for Column {
    fn eq(&self, other: &str) -> bool {
        self.name == other
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} [{}]", self.name, self.data_type, self.is_primary_key)
    }
}

/// Returns the column names in order.
pub fn column_names(columns: &[Column]) -> Vec<String> {
    columns.iter().map(|c| c.name.clone()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_ignores_type_and_key_flag() {
        let mut a = Column::new("id", "int");
        let b = Column::new("id", "BIGINT");
        a.is_primary_key = true;
        assert_eq!(a, b);
        assert_ne!(a, Column::new("ID", "int"));
        assert!(a == *"id");
    }

    #[test]
    fn type_name_is_uppercased() {
        let col = Column::new("name", "character");
        assert_eq!(col.data_type, "CHARACTER");
        assert!(col.is_fixed_char());
        assert!(!Column::new("name", "varchar").is_fixed_char());
    }
}
