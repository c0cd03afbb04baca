use connectors::warehouse::WarehouseField;
use model::core::column::Column;

/// Ordered substring rules from source type to warehouse type. The first
/// match wins, so composite names (`DATERANGE`, `DATETIME`, `INTERVAL`,
/// `POINT`) come before the shorter names they contain.
const TYPE_RULES: &[(&str, &str)] = &[
    ("RANGE", "STRING"),
    ("DATETIME", "TIMESTAMP"),
    ("TIMESTAMP", "TIMESTAMP"),
    ("DATE", "DATE"),
    ("INTERVAL", "STRING"),
    ("POINT", "STRING"),
    ("NUMBER", "NUMERIC"),
    ("NUMERIC", "NUMERIC"),
    ("DECIMAL", "NUMERIC"),
    ("FLOAT", "FLOAT64"),
    ("REAL", "FLOAT64"),
    ("DOUBLE", "FLOAT64"),
    ("INT", "INT64"),
    ("BOOL", "BOOL"),
];

const DEFAULT_TYPE: &str = "STRING";

pub struct SchemaMapper;

impl SchemaMapper {
    pub fn map_type(source_type: &str) -> &'static str {
        let source_type = source_type.to_uppercase();
        TYPE_RULES
            .iter()
            .find(|(pattern, _)| source_type.contains(pattern))
            .map(|(_, target)| *target)
            .unwrap_or(DEFAULT_TYPE)
    }

    pub fn map_columns(columns: &[Column]) -> Vec<WarehouseField> {
        columns
            .iter()
            .map(|c| WarehouseField::nullable(c.name.clone(), Self::map_type(&c.data_type)))
            .collect()
    }

    /// The schema artifact stored next to the content files: a pretty JSON
    /// list of `{name, type, mode}`.
    pub fn schema_artifact(fields: &[WarehouseField]) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_rule_wins() {
        assert_eq!(SchemaMapper::map_type("DATETIME2"), "TIMESTAMP");
        assert_eq!(SchemaMapper::map_type("TIMESTAMP WITH TIME ZONE"), "TIMESTAMP");
        assert_eq!(SchemaMapper::map_type("DATE"), "DATE");
        assert_eq!(SchemaMapper::map_type("INTERVAL"), "STRING");
        assert_eq!(SchemaMapper::map_type("NUMERIC"), "NUMERIC");
        assert_eq!(SchemaMapper::map_type("decimal"), "NUMERIC");
        assert_eq!(SchemaMapper::map_type("DOUBLE PRECISION"), "FLOAT64");
        assert_eq!(SchemaMapper::map_type("BIGINT"), "INT64");
        assert_eq!(SchemaMapper::map_type("BOOLEAN"), "BOOL");
    }

    #[test]
    fn unknown_types_become_strings() {
        assert_eq!(SchemaMapper::map_type("CHARACTER VARYING"), "STRING");
        assert_eq!(SchemaMapper::map_type("UUID"), "STRING");
        assert_eq!(SchemaMapper::map_type("MONEY"), "STRING");
        assert_eq!(SchemaMapper::map_type("POINT"), "STRING");
    }

    #[test]
    fn range_types_load_as_text() {
        let ranges = [
            "daterange",
            "TSTZRANGE",
            "INT4RANGE",
            "int8range",
            "NUMRANGE",
            "INT4MULTIRANGE",
        ];
        for range in ranges {
            assert_eq!(SchemaMapper::map_type(range), "STRING", "{range}");
        }
    }

    #[test]
    fn artifact_lists_nullable_fields_in_order() {
        let fields = SchemaMapper::map_columns(&[
            Column::new("id", "integer"),
            Column::new("name", "text"),
        ]);
        let json: serde_json::Value =
            serde_json::from_slice(&SchemaMapper::schema_artifact(&fields).unwrap()).unwrap();
        assert_eq!(
            json,
            serde_json::json!([
                {"name": "id", "type": "INT64", "mode": "NULLABLE"},
                {"name": "name", "type": "STRING", "mode": "NULLABLE"}
            ])
        );
    }
}
