//! Five-pose calibration state machine.
//!
//! Before the frontal capture is allowed, the patient sweeps their head
//! through five directions: center, left, right, up, down. Each
//! direction is a latch — once observed it never clears — and the set
//! resets only when the surrounding session selection changes. Order is
//! free; the machine just watches the normalized nose offset on every
//! frontal-pose frame.

use serde::{Deserialize, Serialize};

use crate::landmarks::LandmarkSet;
use crate::topology;

/// Nose-offset thresholds, in units of inter-eye distance. Fixed
/// constants — unlike the tuning values these define the guided
/// gesture itself and are not meant to drift per deployment.
pub const CENTER_TOLERANCE: f64 = 0.06;
pub const LEFT_THRESHOLD: f64 = -0.16;
pub const RIGHT_THRESHOLD: f64 = 0.16;
pub const UP_THRESHOLD: f64 = -0.14;
pub const DOWN_THRESHOLD: f64 = 0.16;

/// One of the five guided directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Center,
    Left,
    Right,
    Up,
    Down,
}

/// Monotonic flag set for the five directions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationState {
    pub center: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
}

impl CalibrationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// All five directions observed; the frontal capture is unlocked.
    pub fn is_complete(&self) -> bool {
        self.center && self.left && self.right && self.up && self.down
    }

    pub fn completed_count(&self) -> usize {
        [self.center, self.left, self.right, self.up, self.down]
            .iter()
            .filter(|&&f| f)
            .count()
    }

    /// Feed one landmark frame. Returns the directions newly latched by
    /// this frame (empty when nothing changed).
    ///
    /// The nose offset is `(noseTip − eyeCenter) / interEyeDistance`;
    /// a frame with zero inter-eye distance is ignored.
    pub fn observe(&mut self, landmarks: &LandmarkSet) -> Vec<Direction> {
        let d = landmarks.inter_eye_distance;
        if d <= 0.0 {
            return Vec::new();
        }
        let Some(nose) = landmarks.point(topology::NOSE_TIP) else {
            return Vec::new();
        };
        let eye_center = landmarks.eye_center();
        let nx = (nose.x - eye_center.x) / d;
        let ny = (nose.y - eye_center.y) / d;
        self.observe_offset(nx, ny)
    }

    /// Threshold logic on an already-normalized nose offset. Latches
    /// are set-only; a frame can satisfy at most one direction except
    /// that diagonal sweeps may latch a horizontal and a vertical
    /// direction together.
    pub fn observe_offset(&mut self, nx: f64, ny: f64) -> Vec<Direction> {
        let mut newly = Vec::new();
        let mut latch = |flag: &mut bool, dir: Direction| {
            if !*flag {
                *flag = true;
                newly.push(dir);
            }
        };

        if nx.abs() < CENTER_TOLERANCE && ny.abs() < CENTER_TOLERANCE {
            latch(&mut self.center, Direction::Center);
        }
        if nx < LEFT_THRESHOLD {
            latch(&mut self.left, Direction::Left);
        }
        if nx > RIGHT_THRESHOLD {
            latch(&mut self.right, Direction::Right);
        }
        if ny < UP_THRESHOLD {
            latch(&mut self.up, Direction::Up);
        }
        if ny > DOWN_THRESHOLD {
            latch(&mut self.down, Direction::Down);
        }

        if !newly.is_empty() {
            tracing::debug!(
                directions = ?newly,
                completed = self.completed_count(),
                "calibration progress"
            );
        }
        newly
    }

    /// Start over (new patient or photo flow selected).
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmarks::test_support::synthetic_raw;
    use crate::landmarks::LandmarkSet;

    /// Synthetic frame with the nose tip displaced by `(nx, ny)` times
    /// the inter-eye distance.
    fn frame(nx: f64, ny: f64) -> LandmarkSet {
        let mut raw = synthetic_raw();
        // Eye center (0.5, 0.40), inter-eye 0.36 in raw units.
        raw[crate::topology::NOSE_TIP].x = 0.5 + nx * 0.36;
        raw[crate::topology::NOSE_TIP].y = 0.40 + ny * 0.36;
        LandmarkSet::normalize(&raw).unwrap()
    }

    #[test]
    fn test_any_order_reaches_complete() {
        let mut s = CalibrationState::new();
        for (nx, ny) in [(0.0, -0.2), (-0.3, 0.0), (0.0, 0.0), (0.3, 0.0), (0.0, 0.2)] {
            s.observe(&frame(nx, ny));
        }
        assert!(s.is_complete());
    }

    #[test]
    fn test_four_of_five_is_not_complete() {
        let mut s = CalibrationState::new();
        // Everything except down.
        for (nx, ny) in [(0.0, 0.0), (-0.3, 0.0), (0.3, 0.0), (0.0, -0.2)] {
            s.observe(&frame(nx, ny));
        }
        assert_eq!(s.completed_count(), 4);
        assert!(!s.is_complete());
    }

    #[test]
    fn test_flags_are_monotonic() {
        let mut s = CalibrationState::new();
        s.observe_offset(-0.3, 0.0);
        assert!(s.left);
        // Returning to center must not clear the left latch.
        s.observe_offset(0.0, 0.0);
        assert!(s.left);
        assert!(s.center);
    }

    #[test]
    fn test_thresholds_exclusive() {
        let mut s = CalibrationState::new();
        // Just inside the dead band: nothing latches except center.
        s.observe_offset(0.059, 0.059);
        assert_eq!(s.completed_count(), 1);
        assert!(s.center);
        // Exactly at a threshold does not latch (strict inequality).
        let mut s = CalibrationState::new();
        s.observe_offset(0.16, 0.0);
        assert!(!s.right);
        s.observe_offset(0.161, 0.0);
        assert!(s.right);
    }

    #[test]
    fn test_up_down_asymmetric_thresholds() {
        let mut s = CalibrationState::new();
        s.observe_offset(0.0, -0.15);
        assert!(s.up);
        let mut s = CalibrationState::new();
        s.observe_offset(0.0, 0.15);
        assert!(!s.down);
        s.observe_offset(0.0, 0.17);
        assert!(s.down);
    }

    #[test]
    fn test_observe_reports_only_new_latches() {
        let mut s = CalibrationState::new();
        assert_eq!(s.observe_offset(-0.3, 0.0), vec![Direction::Left]);
        assert!(s.observe_offset(-0.3, 0.0).is_empty());
    }

    #[test]
    fn test_diagonal_latches_both_axes() {
        let mut s = CalibrationState::new();
        let newly = s.observe_offset(0.3, 0.3);
        assert_eq!(newly, vec![Direction::Right, Direction::Down]);
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut s = CalibrationState::new();
        s.observe_offset(0.0, 0.0);
        s.observe_offset(-0.3, 0.0);
        s.reset();
        assert_eq!(s, CalibrationState::default());
    }

    #[test]
    fn test_zero_inter_eye_ignored() {
        let raw = vec![
            crate::landmarks::RawLandmark::new(0.5, 0.5);
            crate::topology::MESH_LANDMARK_COUNT
        ];
        let set = LandmarkSet::normalize(&raw).unwrap();
        let mut s = CalibrationState::new();
        assert!(s.observe(&set).is_empty());
        assert_eq!(s, CalibrationState::default());
    }
}
