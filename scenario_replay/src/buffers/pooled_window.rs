//! Pooled index over per-scenario windows.
//!
//! Windows are laid out scenario by scenario, oldest to newest inside each:
//!
//! ```text
//! pooled:   0 1 2 | 3 4 | 5 6 7 8
//! scenario: 0     | 1   | 2
//! ```
//!
//! A uniform draw over the pooled range therefore weights each scenario by
//! its current occupancy, exactly like concatenating the windows.

use crate::core::ScenarioId;

#[derive(Debug, Clone)]
pub(crate) struct PooledWindow {
    /// Prefix sums: `offsets[s]` is the pooled index of scenario `s`'s oldest row.
    offsets: Vec<usize>,
}

impl PooledWindow {
    pub fn new(lens: impl IntoIterator<Item = usize>) -> Self {
        let mut offsets = vec![0];
        let mut total = 0;
        for len in lens {
            total += len;
            offsets.push(total);
        }
        Self { offsets }
    }

    /// Total pooled rows.
    pub fn total(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Map a pooled index to `(scenario, row inside that scenario's window)`.
    pub fn locate(&self, pooled: usize) -> (ScenarioId, usize) {
        debug_assert!(pooled < self.total(), "pooled index out of range");
        let scenario = self.offsets.partition_point(|&offset| offset <= pooled) - 1;
        (scenario, pooled - self.offsets[scenario])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_locate_follows_scenario_then_time() {
        let pool = PooledWindow::new([3, 2, 4]);
        assert_eq!(pool.total(), 9);

        let located: Vec<_> = (0..9).map(|i| pool.locate(i)).collect();
        assert_eq!(
            located,
            vec![(0, 0), (0, 1), (0, 2), (1, 0), (1, 1), (2, 0), (2, 1), (2, 2), (2, 3)]
        );
    }

    #[test]
    fn test_locate_skips_empty_windows() {
        let pool = PooledWindow::new([0, 2, 0, 1]);
        assert_eq!(pool.locate(0), (1, 0));
        assert_eq!(pool.locate(1), (1, 1));
        assert_eq!(pool.locate(2), (3, 0));
    }

    #[test]
    fn test_empty_pool() {
        let pool = PooledWindow::new([0, 0]);
        assert_eq!(pool.total(), 0);
    }
}
