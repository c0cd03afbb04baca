use crate::sql::{base::error::DbError, mysql::data_type as mysql_type, postgres::data_type::PgKind};
use core::fmt;
use model::{
    core::{
        column::Column,
        value::{FieldValue, Value},
    },
    records::row::RowData,
};
use mysql_async::Row as MySqlRow;
use std::fmt::Formatter;
use tokio_postgres::Row as PgRow;

/// A row borrowed from one of the supported drivers.
pub enum DbRow<'a> {
    MySqlRow(&'a MySqlRow),
    PostgresRow(&'a PgRow),
}

impl DbRow<'_> {
    /// Decodes a row whose cells line up with `columns`.
    pub fn to_row_data(&self, table: &str, columns: &[Column]) -> Result<RowData, DbError> {
        let field_values = columns
            .iter()
            .enumerate()
            .map(|(idx, column)| Ok(FieldValue::new(&column.name, self.value_at(idx, column)?)))
            .collect::<Result<Vec<_>, DbError>>()?;

        Ok(RowData::new(table, field_values))
    }

    pub fn value_at(&self, idx: usize, column: &Column) -> Result<Option<Value>, DbError> {
        match self {
            DbRow::MySqlRow(row) => Ok(mysql_type::decode(row, idx, column)),
            DbRow::PostgresRow(row) => PgKind::from_data_type(&column.data_type).decode(row, idx),
        }
    }

    /// Decodes the result of a `MIN`/`MAX` over `column`.
    pub fn bound_at(&self, idx: usize, column: &Column) -> Result<Value, DbError> {
        let value = match self {
            DbRow::MySqlRow(row) => mysql_type::decode(row, idx, column),
            DbRow::PostgresRow(row) => PgKind::from_data_type(&column.data_type)
                .bound_kind()
                .decode(row, idx)?,
        };
        Ok(value.unwrap_or(Value::Null))
    }

    pub fn try_get_i64(&self, idx: usize) -> Result<Option<i64>, DbError> {
        match self {
            DbRow::MySqlRow(row) => match row.get_opt::<Option<i64>, _>(idx) {
                Some(Ok(v)) => Ok(v),
                Some(Err(e)) => Err(DbError::Decode {
                    column: idx.to_string(),
                    message: e.to_string(),
                }),
                None => Ok(None),
            },
            DbRow::PostgresRow(row) => Ok(row.try_get::<_, Option<i64>>(idx)?),
        }
    }

    pub fn try_get_string(&self, idx: usize) -> Result<Option<String>, DbError> {
        match self {
            DbRow::MySqlRow(row) => match row.get_opt::<Option<String>, _>(idx) {
                Some(Ok(v)) => Ok(v),
                Some(Err(e)) => Err(DbError::Decode {
                    column: idx.to_string(),
                    message: e.to_string(),
                }),
                None => Ok(None),
            },
            DbRow::PostgresRow(row) => Ok(row.try_get::<_, Option<String>>(idx)?),
        }
    }

    pub fn column_names(&self) -> Vec<String> {
        match self {
            DbRow::MySqlRow(row) => row
                .columns_ref()
                .iter()
                .map(|c| c.name_str().into_owned())
                .collect(),
            DbRow::PostgresRow(row) => row.columns().iter().map(|c| c.name().to_string()).collect(),
        }
    }
}

impl fmt::Debug for DbRow<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DbRow::MySqlRow(row) => write!(f, "{row:?}"),
            DbRow::PostgresRow(row) => write!(f, "{row:?}"),
        }
    }
}
