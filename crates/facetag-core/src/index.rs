//! Brute-force Euclidean matching index.
//!
//! Engines without a native nearest-neighbour structure can embed
//! [`LinearIndex`] to implement [`FaceEngine::build_index`] and
//! [`FaceEngine::match_within_tolerance`].
//!
//! [`FaceEngine::build_index`]: crate::engine::FaceEngine::build_index
//! [`FaceEngine::match_within_tolerance`]: crate::engine::FaceEngine::match_within_tolerance

use crate::types::{Descriptor, RowId};

#[derive(Debug, Clone, Default)]
pub struct LinearIndex {
    rows: Vec<(RowId, Descriptor)>,
}

impl LinearIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(rows: Vec<(RowId, Descriptor)>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Closest row and its distance, regardless of tolerance.
    ///
    /// Always traverses every row. Ties keep the earliest row.
    pub fn nearest(&self, probe: &Descriptor) -> Option<(RowId, f32)> {
        let mut best: Option<(RowId, f32)> = None;

        for (row, descriptor) in &self.rows {
            if descriptor.len() != probe.len() {
                continue;
            }
            let dist = probe.distance(descriptor);
            match best {
                Some((_, best_dist)) if dist >= best_dist => {}
                _ => best = Some((*row, dist)),
            }
        }

        best
    }

    /// Closest row if its distance is `<= tolerance`.
    pub fn nearest_within(&self, probe: &Descriptor, tolerance: f32) -> Option<RowId> {
        match self.nearest(probe) {
            Some((row, dist)) if dist <= tolerance => Some(row),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(values: &[f32]) -> Descriptor {
        Descriptor::new(values.to_vec())
    }

    fn index() -> LinearIndex {
        LinearIndex::build(vec![
            (0, d(&[0.0, 1.0])),
            (1, d(&[1.0, 0.0])),
            (2, d(&[0.9, 0.1])),
        ])
    }

    #[test]
    fn test_nearest_traverses_all_rows() {
        // Best match is the last row.
        let (row, dist) = index().nearest(&d(&[0.9, 0.1])).unwrap();
        assert_eq!(row, 2);
        assert!(dist.abs() < 1e-6);
    }

    #[test]
    fn test_nearest_within_rejects_far_probe() {
        assert_eq!(index().nearest_within(&d(&[-5.0, -5.0]), 0.4), None);
    }

    #[test]
    fn test_nearest_within_boundary_is_inclusive() {
        let idx = LinearIndex::build(vec![(0, d(&[0.0, 0.0]))]);
        assert_eq!(idx.nearest_within(&d(&[0.0, 0.5]), 0.5), Some(0));
        assert_eq!(idx.nearest_within(&d(&[0.0, 0.5]), 0.49), None);
    }

    #[test]
    fn test_tie_keeps_earliest_row() {
        let idx = LinearIndex::build(vec![
            (0, d(&[1.0, 0.0])),
            (1, d(&[-1.0, 0.0])),
            (2, d(&[1.0, 0.0])),
        ]);
        assert_eq!(idx.nearest_within(&d(&[0.0, 0.0]), 2.0), Some(0));
    }

    #[test]
    fn test_empty_index() {
        let idx = LinearIndex::new();
        assert!(idx.is_empty());
        assert_eq!(idx.nearest(&d(&[1.0])), None);
        assert_eq!(idx.nearest_within(&d(&[1.0]), 10.0), None);
    }

    #[test]
    fn test_skips_rows_of_other_dimension() {
        let idx = LinearIndex::build(vec![(0, d(&[0.0])), (1, d(&[0.0, 0.0]))]);
        assert_eq!(idx.nearest(&d(&[0.0, 0.1])).map(|(r, _)| r), Some(1));
    }

    #[test]
    fn test_tolerance_monotonicity() {
        let idx = index();
        let probes = [d(&[0.5, 0.5]), d(&[0.0, 0.8]), d(&[2.0, 2.0]), d(&[0.95, 0.05])];
        let tolerances = [0.05f32, 0.1, 0.2, 0.4, 0.6, 0.8, 1.0, 2.0, 4.0];

        for probe in &probes {
            let mut matched_before = false;
            for &tol in &tolerances {
                let matched = idx.nearest_within(probe, tol).is_some();
                // Once accepted, a larger tolerance never rejects.
                assert!(!matched_before || matched, "probe {probe:?} lost match at {tol}");
                matched_before = matched;
            }
        }
    }
}
