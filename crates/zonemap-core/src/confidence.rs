//! Confidence scoring for adapted zones.
//!
//! Four independent axes, each in `[0,1]`, combined by fixed weights.
//! Every axis is always emitted, even at 0, so consumers can tell "low
//! confidence" apart from "missing data."

use serde::{Deserialize, Serialize};

use crate::geometry::{canonical_diagonal, Point, Polygon};
use crate::landmarks::LandmarkSet;
use crate::tuning::Tuning;

pub const WEIGHT_GEOMETRIC_MATCH: f64 = 0.3;
pub const WEIGHT_LANDMARK_COVERAGE: f64 = 0.3;
pub const WEIGHT_SIZE_RATIO: f64 = 0.2;
pub const WEIGHT_POSITION_ACCURACY: f64 = 0.2;

/// Per-zone confidence breakdown.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceDetails {
    /// Area agreement between the adapted polygon and its template shape.
    pub geometric_match: f64,
    /// Fraction of the zone's anchor landmarks inside the adapted polygon.
    pub landmark_coverage: f64,
    /// Area agreement between the adapted polygon and the size the
    /// template expects at the detected face dimensions.
    pub size_ratio: f64,
    /// How close the adapted centroid sits to the zone's expected center.
    pub position_accuracy: f64,
    /// Weighted sum of the four axes. Exactly the weighted sum — no
    /// smoothing on top.
    pub overall: f64,
}

impl ConfidenceDetails {
    fn combine(
        geometric_match: f64,
        landmark_coverage: f64,
        size_ratio: f64,
        position_accuracy: f64,
    ) -> Self {
        let overall = WEIGHT_GEOMETRIC_MATCH * geometric_match
            + WEIGHT_LANDMARK_COVERAGE * landmark_coverage
            + WEIGHT_SIZE_RATIO * size_ratio
            + WEIGHT_POSITION_ACCURACY * position_accuracy;
        Self {
            geometric_match,
            landmark_coverage,
            size_ratio,
            position_accuracy,
            overall,
        }
    }
}

/// `min/max` ratio of two non-negative quantities. Symmetric by
/// construction; 0 when either (or both) is 0.
fn bounded_ratio(a: f64, b: f64) -> f64 {
    let lo = a.min(b);
    let hi = a.max(b);
    if hi <= 0.0 {
        0.0
    } else {
        lo / hi
    }
}

/// Shoelace-area agreement between two polygons, in `[0,1]`.
///
/// Degenerate polygons have area 0 and score 0 — a value, never an
/// error, so a collapsed zone still produces a full score record.
pub fn geometric_match(a: &Polygon, b: &Polygon) -> f64 {
    bounded_ratio(a.area(), b.area())
}

/// Fraction of anchor landmarks contained in the polygon.
///
/// An empty anchor list scores 1.0 by convention (nothing to violate).
/// Indices outside the landmark set count as not covered.
pub fn landmark_coverage(polygon: &Polygon, landmarks: &LandmarkSet, anchors: &[usize]) -> f64 {
    if anchors.is_empty() {
        return 1.0;
    }
    let inside = anchors
        .iter()
        .filter(|&&idx| {
            landmarks
                .point(idx)
                .map(|p| polygon.contains(&p))
                .unwrap_or(false)
        })
        .count();
    inside as f64 / anchors.len() as f64
}

/// Centroid drift score: `max(0, 1 − gain · distance / diagonal)`.
///
/// The gain amplifies small drifts so they stay visible in the overall
/// score; it lives in [`Tuning`] rather than inline.
pub fn position_accuracy(polygon: &Polygon, expected_center: Point, tuning: &Tuning) -> f64 {
    let Some(centroid) = polygon.centroid() else {
        return 0.0;
    };
    let drift = centroid.distance(&expected_center) / canonical_diagonal();
    (1.0 - tuning.position_drift_gain * drift).clamp(0.0, 1.0)
}

/// Score one adapted zone against its template shape and expectations.
pub fn score_zone(
    adapted: &Polygon,
    template_polygon: &Polygon,
    landmarks: &LandmarkSet,
    anchors: &[usize],
    expected_area: f64,
    expected_center: Point,
    tuning: &Tuning,
) -> ConfidenceDetails {
    ConfidenceDetails::combine(
        geometric_match(adapted, template_polygon),
        landmark_coverage(adapted, landmarks, anchors),
        bounded_ratio(adapted.area(), expected_area),
        position_accuracy(adapted, expected_center, tuning),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::test_support::synthetic_set;
    use crate::topology;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn square(x0: f64, y0: f64, side: f64) -> Polygon {
        Polygon::new(vec![
            Point::new(x0, y0),
            Point::new(x0 + side, y0),
            Point::new(x0 + side, y0 + side),
            Point::new(x0, y0 + side),
        ])
    }

    #[test]
    fn test_geometric_match_identical() {
        let a = square(10.0, 10.0, 20.0);
        assert!((geometric_match(&a, &a) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_geometric_match_half_area() {
        let a = square(0.0, 0.0, 10.0);
        let b = square(0.0, 0.0, 10.0 * std::f64::consts::SQRT_2);
        assert!((geometric_match(&a, &b) - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_geometric_match_degenerate_scores_zero() {
        let a = square(0.0, 0.0, 10.0);
        let line = Polygon::new(vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)]);
        assert_eq!(geometric_match(&a, &line), 0.0);
        assert_eq!(geometric_match(&line, &line), 0.0);
    }

    #[test]
    fn test_geometric_match_symmetry_random_sweep() {
        let mut rng = StdRng::seed_from_u64(0x5eed);
        for _ in 0..200 {
            let n = rng.gen_range(3..9);
            let mk = |rng: &mut StdRng| {
                Polygon::new(
                    (0..n)
                        .map(|_| Point::new(rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)))
                        .collect(),
                )
            };
            let a = mk(&mut rng);
            let b = mk(&mut rng);
            assert_eq!(geometric_match(&a, &b), geometric_match(&b, &a));
        }
    }

    #[test]
    fn test_landmark_coverage_empty_anchors_is_one() {
        let set = synthetic_set();
        assert_eq!(landmark_coverage(&square(0.0, 0.0, 1.0), &set, &[]), 1.0);
    }

    #[test]
    fn test_landmark_coverage_counts_inside() {
        let set = synthetic_set();
        // Nose tip (50,52) inside, chin (50,92) outside.
        let poly = square(40.0, 40.0, 20.0);
        let cov = landmark_coverage(&poly, &set, &[topology::NOSE_TIP, topology::CHIN]);
        assert!((cov - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_landmark_coverage_out_of_range_not_covered() {
        let set = synthetic_set();
        let poly = square(0.0, 0.0, 100.0);
        let cov = landmark_coverage(&poly, &set, &[topology::NOSE_TIP, 9999]);
        assert!((cov - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_position_accuracy_exact_center() {
        let poly = square(40.0, 40.0, 20.0);
        let score = position_accuracy(&poly, Point::new(50.0, 50.0), &Tuning::default());
        assert!((score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_position_accuracy_drift_amplified() {
        let poly = square(40.0, 40.0, 20.0);
        // Drift of diagonal/10 zeroes the score at the default gain.
        let far = Point::new(50.0 + canonical_diagonal() / 10.0, 50.0);
        assert_eq!(position_accuracy(&poly, far, &Tuning::default()), 0.0);
        // A small drift costs proportionally: 1.4142 canonical units ≈ 0.1.
        let near = Point::new(51.0, 51.0);
        let score = position_accuracy(&poly, near, &Tuning::default());
        assert!((score - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_overall_is_exact_weighted_sum() {
        let set = synthetic_set();
        let adapted = square(40.0, 44.0, 14.0);
        let template = square(42.0, 42.0, 12.0);
        let details = score_zone(
            &adapted,
            &template,
            &set,
            &[topology::NOSE_TIP],
            180.0,
            Point::new(48.0, 50.0),
            &Tuning::default(),
        );
        let expected = 0.3 * details.geometric_match
            + 0.3 * details.landmark_coverage
            + 0.2 * details.size_ratio
            + 0.2 * details.position_accuracy;
        assert_eq!(details.overall, expected);
        assert!(details.overall >= 0.0 && details.overall <= 1.0);
    }

    #[test]
    fn test_overall_range_random_sweep() {
        let set = synthetic_set();
        let tuning = Tuning::default();
        let mut rng = StdRng::seed_from_u64(42);
        for _ in 0..200 {
            let n = rng.gen_range(3..10);
            let poly = Polygon::new(
                (0..n)
                    .map(|_| Point::new(rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)))
                    .collect(),
            );
            let template = square(rng.gen_range(0.0..80.0), rng.gen_range(0.0..80.0), 15.0);
            let details = score_zone(
                &poly,
                &template,
                &set,
                &[topology::NOSE_TIP, topology::CHIN],
                rng.gen_range(1.0..500.0),
                Point::new(rng.gen_range(0.0..100.0), rng.gen_range(0.0..100.0)),
                &tuning,
            );
            for axis in [
                details.geometric_match,
                details.landmark_coverage,
                details.size_ratio,
                details.position_accuracy,
                details.overall,
            ] {
                assert!((0.0..=1.0).contains(&axis), "axis out of range: {axis}");
            }
        }
    }
}
