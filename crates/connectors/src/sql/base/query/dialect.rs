//! Database-specific pieces of the split queries.

use crate::sql::postgres::data_type::PgKind;
use model::core::{column::Column, identifiers::TableRef};

pub trait Dialect: Send + Sync {
    /// Wraps an identifier in the dialect's quotation marks, doubling any
    /// embedded quote character.
    fn quote_identifier(&self, ident: &str) -> String;

    /// Returns the placeholder for a parameterized query.
    ///
    /// - PostgreSQL uses `$1`, `$2`, etc.
    /// - MySQL uses `?`
    fn get_placeholder(&self, index: usize) -> String;

    fn name(&self) -> String;

    fn quote_table(&self, table: &TableRef) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(&table.schema),
            self.quote_identifier(&table.table)
        )
    }

    /// Ranks rows by `order_by` and integer-divides the rank into groups
    /// numbered from 1.
    fn split_id_expr(&self, order_by: &str, split_size: u64) -> String;

    /// Group id used when the table is not split.
    fn unsplit_id_expr(&self) -> String;

    /// Per-row hash over every exported column.
    fn row_hash_expr(&self, columns: &[Column]) -> String;

    /// Order-independent aggregate over the per-row hashes of one group.
    fn checksum_agg(&self, row_hash: &str) -> String;

    /// `MIN`/`MAX` of a key bound column, shaped so the result can be decoded.
    fn bound_agg(&self, func: &str, expr: &str, column: &Column) -> String;

    /// Projection of a column in the export query.
    fn select_expr(&self, column: &Column) -> String;
}

#[derive(Debug, Clone, Copy)]
pub struct Postgres;

impl Dialect for Postgres {
    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#""{}""#, ident.replace('"', r#""""#))
    }

    fn get_placeholder(&self, index: usize) -> String {
        format!("${}", index + 1)
    }

    fn name(&self) -> String {
        "PostgreSQL".into()
    }

    fn split_id_expr(&self, order_by: &str, split_size: u64) -> String {
        format!("ROW_NUMBER() OVER (ORDER BY {order_by}) / {split_size} + 1")
    }

    fn unsplit_id_expr(&self) -> String {
        // Bigint so the split id parameter binds as i64 in both cases.
        "1::bigint".into()
    }

    fn row_hash_expr(&self, columns: &[Column]) -> String {
        let cols = columns
            .iter()
            .map(|c| self.quote_identifier(&c.name))
            .collect::<Vec<_>>()
            .join(", ");
        format!("md5(ROW({cols})::text)")
    }

    fn checksum_agg(&self, row_hash: &str) -> String {
        format!("md5(string_agg({row_hash}, '' ORDER BY {row_hash}))")
    }

    fn bound_agg(&self, func: &str, expr: &str, column: &Column) -> String {
        match PgKind::from_data_type(&column.data_type) {
            PgKind::Numeric => format!("{func}({expr})::text"),
            kind if kind.is_orderable() => format!("{func}({expr})"),
            _ => format!("{func}({expr}::text)"),
        }
    }

    fn select_expr(&self, column: &Column) -> String {
        let ident = self.quote_identifier(&column.name);
        if PgKind::from_data_type(&column.data_type).needs_text_cast() {
            format!("{ident}::text AS {ident}")
        } else {
            ident
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MySql;

/// Hex digits taken from each half of the per-row MD5. Fifteen digits are
/// 60 bits, so a `SUM` over any realistic row count stays exact.
const MYSQL_HASH_CHUNK: usize = 15;

impl Dialect for MySql {
    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn get_placeholder(&self, _index: usize) -> String {
        "?".into()
    }

    fn name(&self) -> String {
        "MySQL".into()
    }

    fn split_id_expr(&self, order_by: &str, split_size: u64) -> String {
        format!("ROW_NUMBER() OVER (ORDER BY {order_by}) DIV {split_size} + 1")
    }

    fn unsplit_id_expr(&self) -> String {
        "1".into()
    }

    fn row_hash_expr(&self, columns: &[Column]) -> String {
        // CONCAT_WS skips NULLs, so they get an explicit marker.
        let cols = columns
            .iter()
            .map(|c| {
                format!(
                    "IFNULL(CAST({} AS CHAR), CHAR(0))",
                    self.quote_identifier(&c.name)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("MD5(CONCAT_WS(CHAR(31), {cols}))")
    }

    fn checksum_agg(&self, row_hash: &str) -> String {
        let n = MYSQL_HASH_CHUNK;
        format!(
            "CONCAT(SUM(CAST(CONV(SUBSTRING({row_hash}, 1, {n}), 16, 10) AS UNSIGNED)), '-', \
             SUM(CAST(CONV(SUBSTRING({row_hash}, {start}, {n}), 16, 10) AS UNSIGNED)))",
            start = n + 1
        )
    }

    fn bound_agg(&self, func: &str, expr: &str, _column: &Column) -> String {
        format!("{func}({expr})")
    }

    fn select_expr(&self, column: &Column) -> String {
        self.quote_identifier(&column.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers_escape_quotes() {
        assert_eq!(Postgres.quote_identifier(r#"we"ird"#), r#""we""ird""#);
        assert_eq!(MySql.quote_identifier("we`ird"), "`we``ird`");
    }

    #[test]
    fn numeric_columns_are_read_as_text() {
        let amount = Column::new("amount", "numeric");
        assert_eq!(Postgres.select_expr(&amount), r#""amount"::text AS "amount""#);
        assert_eq!(Postgres.bound_agg("MIN", "__b0", &amount), "MIN(__b0)::text");
        assert_eq!(MySql.select_expr(&amount), "`amount`");
    }

    #[test]
    fn unorderable_bounds_compare_as_text() {
        let flag = Column::new("flag", "boolean");
        assert_eq!(Postgres.bound_agg("MAX", "__b1", &flag), "MAX(__b1::text)");
        let id = Column::new("id", "integer");
        assert_eq!(Postgres.bound_agg("MAX", "__b1", &id), "MAX(__b1)");
    }

    #[test]
    fn types_without_a_decoder_bound_over_text() {
        for data_type in ["inet", "USER-DEFINED", "ARRAY", "interval", "character varying"] {
            let column = Column::new("key", data_type);
            assert_eq!(
                Postgres.bound_agg("MIN", "__b0", &column),
                "MIN(__b0::text)",
                "{data_type}"
            );
        }
    }
}
