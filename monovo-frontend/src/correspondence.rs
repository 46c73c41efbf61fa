//! Index-aligned correspondences between two successive frames
//!
//! [`filter_correspondences`] turns raw tracker output (two point sequences
//! plus a status per index) into a [`FramePair`] holding only entries that
//! were tracked and carry no zero-coordinate sentinel. It is a single forward
//! pass that appends survivors to two fresh vectors, so the k-th previous
//! point always pairs with the k-th current point.

use nalgebra::Point2;

use crate::error::{FrontendError, Result};
use crate::lk_tracker::TrackStatus;

/// Two equally long point sequences; index i names the same scene point in
/// the previous and the current frame
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FramePair {
    previous: Vec<Point2<f32>>,
    current: Vec<Point2<f32>>,
}

impl FramePair {
    pub fn new(previous: Vec<Point2<f32>>, current: Vec<Point2<f32>>) -> Result<Self> {
        if previous.len() != current.len() {
            return Err(FrontendError::InvariantViolation(format!(
                "frame pair sequences differ in length: {} previous vs {} current",
                previous.len(),
                current.len()
            )));
        }
        Ok(Self { previous, current })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn previous(&self) -> &[Point2<f32>] {
        &self.previous
    }

    pub fn current(&self) -> &[Point2<f32>] {
        &self.current
    }

    pub fn len(&self) -> usize {
        self.previous.len()
    }

    pub fn is_empty(&self) -> bool {
        self.previous.is_empty()
    }

    /// (previous, current) pairs in order
    pub fn iter(&self) -> impl Iterator<Item = (&Point2<f32>, &Point2<f32>)> {
        self.previous.iter().zip(self.current.iter())
    }

    pub fn into_parts(self) -> (Vec<Point2<f32>>, Vec<Point2<f32>>) {
        (self.previous, self.current)
    }
}

/// A coordinate of exactly zero marks an off-screen / invalid point
pub fn is_sentinel(point: &Point2<f32>) -> bool {
    point.x == 0.0 || point.y == 0.0
}

/// Keep the entries that were tracked and carry no sentinel coordinate.
///
/// Entries whose status is `Tracked` but that are rejected because of the
/// sentinel get their status rewritten to `OffScreen`, so `status` agrees
/// with the geometry afterwards.
pub fn filter_correspondences(
    previous: &[Point2<f32>],
    current: &[Point2<f32>],
    status: &mut [TrackStatus],
) -> Result<FramePair> {
    if previous.len() != current.len() || previous.len() != status.len() {
        return Err(FrontendError::InvariantViolation(format!(
            "tracker output is not index-aligned: {} previous, {} current, {} status",
            previous.len(),
            current.len(),
            status.len()
        )));
    }

    let mut kept_previous = Vec::with_capacity(previous.len());
    let mut kept_current = Vec::with_capacity(current.len());

    for ((prev, curr), flag) in previous.iter().zip(current).zip(status.iter_mut()) {
        let sentinel = is_sentinel(prev) || is_sentinel(curr);
        if sentinel && flag.is_tracked() {
            *flag = TrackStatus::OffScreen;
        }
        if flag.is_tracked() {
            kept_previous.push(*prev);
            kept_current.push(*curr);
        }
    }

    FramePair::new(kept_previous, kept_current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn pts(coords: &[(f32, f32)]) -> Vec<Point2<f32>> {
        coords.iter().map(|&(x, y)| Point2::new(x, y)).collect()
    }

    fn flags(bits: &[u8]) -> Vec<TrackStatus> {
        bits.iter().copied().map(TrackStatus::from_flag).collect()
    }

    #[test]
    fn test_failed_and_sentinel_entries_removed_in_lockstep() {
        let previous = pts(&[(5.0, 5.0), (10.0, 10.0), (0.0, 0.0), (20.0, 20.0)]);
        let current = pts(&[(6.0, 5.5), (11.0, 10.0), (1.0, 1.0), (21.0, 19.0)]);
        let mut status = flags(&[1, 0, 1, 1]);

        let pair = filter_correspondences(&previous, &current, &mut status).unwrap();

        assert_eq!(pair.len(), 2);
        assert_eq!(pair.previous(), pts(&[(5.0, 5.0), (20.0, 20.0)]).as_slice());
        assert_eq!(pair.current(), pts(&[(6.0, 5.5), (21.0, 19.0)]).as_slice());
        assert_eq!(
            status,
            vec![
                TrackStatus::Tracked,
                TrackStatus::Lost,
                TrackStatus::OffScreen,
                TrackStatus::Tracked
            ]
        );
    }

    #[test]
    fn test_zero_x_overrides_reported_success() {
        let previous = pts(&[(30.0, 7.0), (40.0, 8.0)]);
        let current = pts(&[(0.0, 7.0), (41.0, 8.0)]);
        let mut status = flags(&[1, 1]);

        let pair = filter_correspondences(&previous, &current, &mut status).unwrap();

        assert_eq!(pair.len(), 1);
        assert_eq!(pair.previous()[0], Point2::new(40.0, 8.0));
        assert_eq!(status[0], TrackStatus::OffScreen);
        assert_eq!(status[1], TrackStatus::Tracked);
    }

    #[test]
    fn test_all_pass_keeps_order() {
        let previous: Vec<_> = (1..=10).map(|i| Point2::new(i as f32, 2.0 * i as f32)).collect();
        let current: Vec<_> = previous.iter().map(|p| Point2::new(p.x + 0.5, p.y - 0.5)).collect();
        let mut status = vec![TrackStatus::Tracked; 10];

        let pair = filter_correspondences(&previous, &current, &mut status).unwrap();

        assert_eq!(pair.len(), 10);
        assert_eq!(pair.previous(), previous.as_slice());
        assert_eq!(pair.current(), current.as_slice());
    }

    #[test]
    fn test_all_fail_yields_empty() {
        let previous = pts(&[(1.0, 1.0), (2.0, 2.0), (3.0, 3.0)]);
        let current = previous.clone();
        let mut status = vec![TrackStatus::Lost, TrackStatus::OffScreen, TrackStatus::Lost];

        let pair = filter_correspondences(&previous, &current, &mut status).unwrap();
        assert!(pair.is_empty());
        assert_eq!(pair.previous().len(), pair.current().len());
    }

    #[test]
    fn test_consecutive_and_alternating_failures() {
        let previous: Vec<_> = (1..=8).map(|i| Point2::new(i as f32, 1.0)).collect();
        let current = previous.clone();

        let mut consecutive = flags(&[0, 0, 0, 1, 1, 0, 0, 1]);
        let pair = filter_correspondences(&previous, &current, &mut consecutive).unwrap();
        assert_eq!(pair.previous(), pts(&[(4.0, 1.0), (5.0, 1.0), (8.0, 1.0)]).as_slice());

        let mut alternating = flags(&[1, 0, 1, 0, 1, 0, 1, 0]);
        let pair = filter_correspondences(&previous, &current, &mut alternating).unwrap();
        assert_eq!(
            pair.previous(),
            pts(&[(1.0, 1.0), (3.0, 1.0), (5.0, 1.0), (7.0, 1.0)]).as_slice()
        );
    }

    #[test]
    fn test_empty_input() {
        let pair = filter_correspondences(&[], &[], &mut []).unwrap();
        assert!(pair.is_empty());
    }

    #[test]
    fn test_misaligned_input_is_invariant_violation() {
        let previous = pts(&[(1.0, 1.0), (2.0, 2.0)]);
        let current = pts(&[(1.0, 1.0)]);
        let mut status = flags(&[1, 1]);
        let err = filter_correspondences(&previous, &current, &mut status).unwrap_err();
        assert!(matches!(err, FrontendError::InvariantViolation(_)));
    }

    #[test]
    fn test_frame_pair_rejects_unequal_lengths() {
        let err = FramePair::new(pts(&[(1.0, 1.0)]), Vec::new()).unwrap_err();
        assert!(matches!(err, FrontendError::InvariantViolation(_)));
    }

    /// Random status/sentinel patterns checked against an index-based oracle
    #[test]
    fn test_random_patterns_match_reference() {
        let mut rng = ChaCha8Rng::seed_from_u64(17);

        for _ in 0..500 {
            let n = rng.gen_range(0..40);
            let mut previous = Vec::with_capacity(n);
            let mut current = Vec::with_capacity(n);
            let mut status = Vec::with_capacity(n);

            for i in 0..n {
                // The index is encoded in the previous point so survivors can be traced back
                let prev = Point2::new(i as f32 + 1.0, rng.gen_range(1.0..100.0));
                let curr = match rng.gen_range(0..6) {
                    0 => Point2::new(0.0, rng.gen_range(1.0..100.0)),
                    1 => Point2::new(rng.gen_range(1.0..100.0), 0.0),
                    _ => Point2::new(rng.gen_range(1.0..100.0), rng.gen_range(1.0..100.0)),
                };
                previous.push(prev);
                current.push(curr);
                status.push(match rng.gen_range(0..4) {
                    0 => TrackStatus::Lost,
                    1 => TrackStatus::OffScreen,
                    _ => TrackStatus::Tracked,
                });
            }

            let expected: Vec<usize> = (0..n)
                .filter(|&i| status[i].is_tracked() && !is_sentinel(&current[i]))
                .collect();

            let pair = filter_correspondences(&previous, &current, &mut status).unwrap();

            assert_eq!(pair.previous().len(), pair.current().len());
            assert!(pair.len() <= n);
            let survivors: Vec<usize> = pair.previous().iter().map(|p| p.x as usize - 1).collect();
            assert_eq!(survivors, expected);
            for (k, &i) in expected.iter().enumerate() {
                assert_eq!(pair.current()[k], current[i]);
            }
            assert!(pair.iter().all(|(p, c)| !is_sentinel(p) && !is_sentinel(c)));
            for i in 0..n {
                if is_sentinel(&current[i]) {
                    assert!(!status[i].is_tracked());
                }
            }
        }
    }
}
