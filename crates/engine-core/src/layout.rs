use model::split::SplitSize;

/// Addresses of every artifact produced for one table under a destination root.
///
/// Paths are plain strings so the same layout works for a local directory,
/// a `file://` URI or a `gs://bucket/prefix` root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableLayout {
    base: String,
}

impl TableLayout {
    /// `{destination}/{table}/{split_size}/{table}`, with the split size
    /// segment left out when the table is not split.
    pub fn new(destination: &str, table: &str, split_size: SplitSize) -> Self {
        let root = destination.trim_end_matches('/');
        let base = match split_size {
            SplitSize::Unsplit => format!("{root}/{table}/{table}"),
            SplitSize::Rows(n) => format!("{root}/{table}/{n}/{table}"),
        };
        TableLayout { base }
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    pub fn content_path(&self, split_id: u64) -> String {
        format!("{}-content-{split_id}.csv", self.base)
    }

    pub fn fingerprint_path(&self, split_id: u64) -> String {
        format!("{}-{split_id}.crc", self.base)
    }

    pub fn schema_path(&self) -> String {
        format!("{}-schema.json", self.base)
    }

    /// Glob matching the content file of every split, used as the load URI.
    pub fn content_glob(&self) -> String {
        format!("{}-content*.csv", self.base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_size_segment_is_included_when_split() {
        let layout = TableLayout::new("gs://bucket/postgres/sales", "orders", SplitSize::Rows(2_000_000));
        assert_eq!(layout.base(), "gs://bucket/postgres/sales/orders/2000000/orders");
        assert_eq!(
            layout.content_path(3),
            "gs://bucket/postgres/sales/orders/2000000/orders-content-3.csv"
        );
        assert_eq!(
            layout.fingerprint_path(3),
            "gs://bucket/postgres/sales/orders/2000000/orders-3.crc"
        );
    }

    #[test]
    fn split_size_segment_is_omitted_when_unsplit() {
        let layout = TableLayout::new("/data/", "orders", SplitSize::Unsplit);
        assert_eq!(layout.base(), "/data/orders/orders");
        assert_eq!(layout.schema_path(), "/data/orders/orders-schema.json");
        assert_eq!(layout.content_glob(), "/data/orders/orders-content*.csv");
    }
}
