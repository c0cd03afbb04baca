use crate::sql::base::error::DbError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use model::core::value::Value;
use std::str::FromStr;
use tokio_postgres::{Row as PgRow, types::Json as PgJson};
use uuid::Uuid;

/// How a Postgres column is fetched and decoded, derived from the
/// `information_schema.columns.data_type` name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PgKind {
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    /// Read as text so arbitrary precision survives.
    Numeric,
    Bool,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    Uuid,
    Json,
    /// Character types and anything without a native decoder, read as text.
    Text,
}

impl PgKind {
    pub fn from_data_type(data_type: &str) -> Self {
        match data_type.to_uppercase().as_str() {
            "SMALLINT" | "INT2" => PgKind::Int2,
            "INTEGER" | "INT" | "INT4" => PgKind::Int4,
            "BIGINT" | "INT8" => PgKind::Int8,
            "REAL" | "FLOAT4" => PgKind::Float4,
            "DOUBLE PRECISION" | "FLOAT8" => PgKind::Float8,
            "NUMERIC" | "DECIMAL" | "MONEY" => PgKind::Numeric,
            "BOOLEAN" | "BOOL" => PgKind::Bool,
            "DATE" => PgKind::Date,
            "TIME WITHOUT TIME ZONE" | "TIME" => PgKind::Time,
            "TIMESTAMP WITHOUT TIME ZONE" | "TIMESTAMP" => PgKind::Timestamp,
            "TIMESTAMP WITH TIME ZONE" | "TIMESTAMPTZ" => PgKind::TimestampTz,
            "UUID" => PgKind::Uuid,
            "JSON" | "JSONB" => PgKind::Json,
            _ => PgKind::Text,
        }
    }

    /// Whether `MIN`/`MAX` can run on the native type and decode as this
    /// kind. `Text` also stands for types with no native decoder (`inet`,
    /// enums, arrays), so its bounds are taken over the text cast.
    pub fn is_orderable(&self) -> bool {
        !matches!(
            self,
            PgKind::Bool | PgKind::Uuid | PgKind::Json | PgKind::Text
        )
    }

    pub fn needs_text_cast(&self) -> bool {
        matches!(self, PgKind::Numeric | PgKind::Text)
    }

    /// Kind of the value produced by the bound aggregate for this column.
    pub fn bound_kind(&self) -> PgKind {
        if self.is_orderable() { *self } else { PgKind::Text }
    }

    pub fn decode(&self, row: &PgRow, idx: usize) -> Result<Option<Value>, DbError> {
        let value = match self {
            PgKind::Int2 => row.try_get::<_, Option<i16>>(idx)?.map(|v| Value::Int(v as i64)),
            PgKind::Int4 => row.try_get::<_, Option<i32>>(idx)?.map(|v| Value::Int(v as i64)),
            PgKind::Int8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
            PgKind::Float4 => row
                .try_get::<_, Option<f32>>(idx)?
                .map(|v| Value::Float(v as f64)),
            PgKind::Float8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
            PgKind::Numeric => row
                .try_get::<_, Option<String>>(idx)?
                .map(|text| parse_numeric(&text)),
            PgKind::Bool => row.try_get::<_, Option<bool>>(idx)?.map(Value::Boolean),
            PgKind::Date => row.try_get::<_, Option<NaiveDate>>(idx)?.map(Value::Date),
            PgKind::Time => row.try_get::<_, Option<NaiveTime>>(idx)?.map(Value::Time),
            PgKind::Timestamp => row
                .try_get::<_, Option<NaiveDateTime>>(idx)?
                .map(Value::DateTime),
            PgKind::TimestampTz => row
                .try_get::<_, Option<DateTime<Utc>>>(idx)?
                .map(Value::Timestamp),
            PgKind::Uuid => row.try_get::<_, Option<Uuid>>(idx)?.map(Value::Uuid),
            PgKind::Json => row
                .try_get::<_, Option<PgJson<serde_json::Value>>>(idx)?
                .map(|json| Value::Json(json.0)),
            PgKind::Text => row.try_get::<_, Option<String>>(idx)?.map(Value::String),
        };
        Ok(value)
    }
}

/// `NaN` and other non-finite numerics have no decimal form and stay text.
fn parse_numeric(text: &str) -> Value {
    match BigDecimal::from_str(text) {
        Ok(decimal) => Value::Decimal(decimal),
        Err(_) => Value::String(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn information_schema_names_map_to_kinds() {
        assert_eq!(PgKind::from_data_type("integer"), PgKind::Int4);
        assert_eq!(PgKind::from_data_type("NUMERIC"), PgKind::Numeric);
        assert_eq!(
            PgKind::from_data_type("timestamp with time zone"),
            PgKind::TimestampTz
        );
        assert_eq!(PgKind::from_data_type("character varying"), PgKind::Text);
        assert_eq!(PgKind::from_data_type("USER-DEFINED"), PgKind::Text);
    }

    #[test]
    fn numeric_text_keeps_every_digit() {
        let raw = "123456789012345678901234567890.123456789";
        assert_eq!(
            parse_numeric(raw),
            Value::Decimal(BigDecimal::from_str(raw).unwrap())
        );
        assert_eq!(parse_numeric("NaN"), Value::String("NaN".into()));
    }
}
