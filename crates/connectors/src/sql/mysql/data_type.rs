use bigdecimal::BigDecimal;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use model::core::{column::Column, value::Value};
use mysql_async::{Row as MySqlRow, Value as MySqlValue};
use std::str::FromStr;

pub trait MySqlColumnDataType {
    fn is_exact_numeric(&self) -> bool;
    fn is_date_only(&self) -> bool;
}

impl MySqlColumnDataType for Column {
    fn is_exact_numeric(&self) -> bool {
        matches!(self.data_type.as_str(), "DECIMAL" | "NUMERIC")
    }

    fn is_date_only(&self) -> bool {
        self.data_type == "DATE"
    }
}

/// Decodes a binary-protocol cell, using the catalog type to tell decimals
/// from text and dates from datetimes.
pub fn decode(row: &MySqlRow, idx: usize, column: &Column) -> Option<Value> {
    match row.as_ref(idx)? {
        MySqlValue::NULL => None,
        MySqlValue::Int(v) => Some(Value::Int(*v)),
        MySqlValue::UInt(v) => Some(Value::Uint(*v)),
        MySqlValue::Float(v) => Some(Value::Float(*v as f64)),
        MySqlValue::Double(v) => Some(Value::Float(*v)),
        MySqlValue::Bytes(bytes) => {
            let text = String::from_utf8_lossy(bytes).into_owned();
            if column.is_exact_numeric()
                && let Ok(decimal) = BigDecimal::from_str(&text)
            {
                return Some(Value::Decimal(decimal));
            }
            Some(Value::String(text))
        }
        MySqlValue::Date(y, m, d, h, mi, s, us) => {
            let date = NaiveDate::from_ymd_opt(*y as i32, *m as u32, *d as u32)?;
            if column.is_date_only() {
                return Some(Value::Date(date));
            }
            let time = NaiveTime::from_hms_micro_opt(*h as u32, *mi as u32, *s as u32, *us)?;
            Some(Value::DateTime(NaiveDateTime::new(date, time)))
        }
        MySqlValue::Time(negative, days, h, mi, s, us) => {
            // TIME can exceed 24 hours, so it is rendered rather than mapped to NaiveTime.
            let hours = *days * 24 + *h as u32;
            let sign = if *negative { "-" } else { "" };
            let text = if *us > 0 {
                format!("{sign}{hours:02}:{mi:02}:{s:02}.{us:06}")
            } else {
                format!("{sign}{hours:02}:{mi:02}:{s:02}")
            };
            Some(Value::String(text))
        }
    }
}
