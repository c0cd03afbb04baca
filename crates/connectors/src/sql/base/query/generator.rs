use crate::sql::base::{query::dialect::Dialect, requests::SplitQuery};
use model::core::identifiers::TableRef;

pub const COL_SPLIT_ID: usize = 0;
pub const COL_ROW_COUNT: usize = 1;
pub const COL_CHECKSUM: usize = 2;
/// Index of the first `MIN` bound; each bound field adds a `MIN`/`MAX` pair.
pub const COL_FIRST_BOUND: usize = 3;

pub struct QueryGenerator<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> QueryGenerator<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    /// Expression assigning each row its split id. Shared by the aggregate and
    /// the export query so that both see the same partitioning.
    pub fn split_id_expr(&self, query: &SplitQuery) -> String {
        match query.split_size.rows() {
            Some(size) => {
                let order_by = query
                    .order_by
                    .iter()
                    .map(|k| self.dialect.quote_identifier(k))
                    .collect::<Vec<_>>()
                    .join(", ");
                self.dialect.split_id_expr(&order_by, size)
            }
            None => self.dialect.unsplit_id_expr(),
        }
    }

    /// One row per split: id, row count, content checksum, then min/max of
    /// every bound field.
    pub fn split_aggregates(&self, query: &SplitQuery) -> String {
        let table = self.dialect.quote_table(&query.table);
        let bounds = query.bound_columns();

        let mut inner = vec![format!(
            "{} AS __row_hash",
            self.dialect.row_hash_expr(&query.columns)
        )];
        let mut outer = vec![
            "__split_id".to_string(),
            "COUNT(*) AS __row_count".to_string(),
            format!("{} AS __checksum", self.dialect.checksum_agg("__row_hash")),
        ];

        for (i, column) in bounds.iter().enumerate() {
            let alias = format!("__b{i}");
            inner.push(format!(
                "{} AS {alias}",
                self.dialect.quote_identifier(&column.name)
            ));
            outer.push(format!(
                "{} AS __min_{i}",
                self.dialect.bound_agg("MIN", &alias, column)
            ));
            outer.push(format!(
                "{} AS __max_{i}",
                self.dialect.bound_agg("MAX", &alias, column)
            ));
        }
        inner.push(format!("{} AS __split_id", self.split_id_expr(query)));

        format!(
            "SELECT {} FROM (SELECT {} FROM {table} AS t) AS ranked GROUP BY __split_id ORDER BY __split_id",
            outer.join(", "),
            inner.join(", ")
        )
    }

    /// Rows of a single split in key order. Binds the split id as the only
    /// parameter.
    pub fn split_rows(&self, query: &SplitQuery) -> String {
        let table = self.dialect.quote_table(&query.table);
        let select = query
            .columns
            .iter()
            .map(|c| self.dialect.select_expr(c))
            .collect::<Vec<_>>()
            .join(", ");
        let order_by = query
            .order_by
            .iter()
            .map(|k| self.dialect.quote_identifier(k))
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            "SELECT {select} FROM (SELECT t.*, {} AS __split_id FROM {table} AS t) AS ranked \
             WHERE __split_id = {} ORDER BY {order_by}",
            self.split_id_expr(query),
            self.dialect.get_placeholder(0)
        )
    }

    pub fn row_count(&self, table: &TableRef) -> String {
        format!("SELECT COUNT(*) FROM {}", self.dialect.quote_table(table))
    }

    /// Fetches one row to learn which columns the current user can read.
    pub fn probe_row(&self, table: &TableRef) -> String {
        format!("SELECT * FROM {} LIMIT 1", self.dialect.quote_table(table))
    }
}
