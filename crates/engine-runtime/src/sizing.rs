use model::split::{SplitDirective, SplitSize};
use tracing::{info, warn};

/// Smallest split size worth the overhead of a partition.
pub const SPLIT_MIN_SIZE: u64 = 1_000_000;

/// Dynamic split sizes are multiples of this.
pub const SPLIT_INCREMENT: u64 = 1_000_000;

const WANTED_SPLITS: u64 = 10;

/// Derives a split size from the row count. Sizes move in whole increments,
/// so a table growing slowly keeps the same partition boundaries (and its
/// cached splits) across runs.
pub fn calculate_dynamic_split(row_count: u64) -> SplitSize {
    if row_count.saturating_mul(2) < SPLIT_MIN_SIZE * 3 {
        return SplitSize::Unsplit;
    }
    let size = (row_count / (WANTED_SPLITS * SPLIT_INCREMENT)) * SPLIT_INCREMENT;
    SplitSize::Rows(size.max(SPLIT_MIN_SIZE))
}

pub fn resolve_split_size(table: &str, directive: SplitDirective, row_count: u64) -> SplitSize {
    match directive {
        SplitDirective::NoSplit => SplitSize::Unsplit,
        SplitDirective::Fixed(size) => {
            if size < SPLIT_MIN_SIZE {
                warn!(
                    table = %table,
                    split_size = size,
                    suggested_minimum = SPLIT_MIN_SIZE,
                    "Split size is below the suggested minimum"
                );
            }
            SplitSize::Rows(size)
        }
        SplitDirective::Dynamic => {
            let size = calculate_dynamic_split(row_count);
            info!(table = %table, row_count, split_size = %size, "Dynamic split size chosen");
            size
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(size: SplitSize) -> u64 {
        size.rows().unwrap_or(0)
    }

    #[test]
    fn small_tables_are_not_split() {
        assert_eq!(calculate_dynamic_split(0), SplitSize::Unsplit);
        assert_eq!(calculate_dynamic_split(1_499_999), SplitSize::Unsplit);
        assert_eq!(calculate_dynamic_split(1_500_000), SplitSize::Rows(1_000_000));
    }

    #[test]
    fn roughly_ten_splits() {
        assert_eq!(calculate_dynamic_split(15_000_000), SplitSize::Rows(1_000_000));
        assert_eq!(calculate_dynamic_split(20_000_000), SplitSize::Rows(2_000_000));
        assert_eq!(calculate_dynamic_split(29_999_999), SplitSize::Rows(2_000_000));
        assert_eq!(calculate_dynamic_split(1_234_567_890), SplitSize::Rows(123_000_000));
    }

    #[test]
    fn sizes_are_whole_increments_at_least_the_minimum_and_monotonic() {
        let mut previous = 0;
        let mut row_count = 1_500_000u64;
        while row_count < 5_000_000_000 {
            let size = rows(calculate_dynamic_split(row_count));
            assert_eq!(size % SPLIT_INCREMENT, 0, "row_count {row_count}");
            assert!(size >= SPLIT_MIN_SIZE, "row_count {row_count}");
            assert!(size >= previous, "row_count {row_count}");
            previous = size;
            row_count += row_count / 7 + 12_345;
        }
    }

    #[test]
    fn directive_resolution() {
        assert_eq!(
            resolve_split_size("t", SplitDirective::NoSplit, 50_000_000),
            SplitSize::Unsplit
        );
        assert_eq!(
            resolve_split_size("t", SplitDirective::Fixed(10), 50_000_000),
            SplitSize::Rows(10)
        );
        assert_eq!(
            resolve_split_size("t", SplitDirective::Dynamic, 50_000_000),
            SplitSize::Rows(5_000_000)
        );
    }
}
