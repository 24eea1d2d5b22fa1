//! MediaPipe Face Mesh landmark topology.
//!
//! Every landmark index the engine relies on is named here; templates
//! reference these indices in their anchor tables. The dense 468-point
//! mesh is the single canonical topology for this engine — anchor
//! tables from other detectors are not interchangeable with it.

/// Number of points in the MediaPipe Face Mesh topology.
pub const MESH_LANDMARK_COUNT: usize = 468;

// === Eyes ===
pub const LEFT_EYE_OUTER: usize = 33;
pub const LEFT_EYE_INNER: usize = 133;
pub const RIGHT_EYE_INNER: usize = 362;
pub const RIGHT_EYE_OUTER: usize = 263;

// === Face contour ===
pub const FOREHEAD_TOP: usize = 10;
pub const FOREHEAD_CENTER: usize = 151;
pub const LEFT_TEMPLE: usize = 54;
pub const RIGHT_TEMPLE: usize = 284;
pub const LEFT_CHEEKBONE: usize = 234;
pub const RIGHT_CHEEKBONE: usize = 454;
pub const LEFT_JAW_ANGLE: usize = 136;
pub const RIGHT_JAW_ANGLE: usize = 365;
pub const LEFT_JAW: usize = 172;
pub const RIGHT_JAW: usize = 397;
pub const CHIN: usize = 152;
pub const CHIN_LEFT: usize = 175;
pub const CHIN_RIGHT: usize = 396;

// === Nose ===
pub const NOSE_TIP: usize = 4;
pub const NOSE_BRIDGE: usize = 6;
pub const NOSE_LEFT_ALAR: usize = 115;
pub const NOSE_RIGHT_ALAR: usize = 344;

// === Lips ===
pub const UPPER_LIP_CENTER: usize = 0;
pub const LOWER_LIP_CENTER: usize = 17;
pub const LEFT_MOUTH_CORNER: usize = 61;
pub const RIGHT_MOUTH_CORNER: usize = 291;

// === Eyebrows ===
pub const LEFT_BROW_OUTER: usize = 70;
pub const LEFT_BROW_ARCH: usize = 105;
pub const LEFT_BROW_INNER: usize = 107;
pub const RIGHT_BROW_OUTER: usize = 300;
pub const RIGHT_BROW_ARCH: usize = 334;
pub const RIGHT_BROW_INNER: usize = 336;

/// The six stable key points driving the global mask auto-fit:
/// eye outer corners, nose tip, mouth corners, chin.
pub const AUTOFIT_KEY_POINTS: [usize; 6] = [
    LEFT_EYE_OUTER,
    RIGHT_EYE_OUTER,
    NOSE_TIP,
    LEFT_MOUTH_CORNER,
    RIGHT_MOUTH_CORNER,
    CHIN,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_named_indices_within_mesh() {
        let named = [
            LEFT_EYE_OUTER, LEFT_EYE_INNER, RIGHT_EYE_INNER, RIGHT_EYE_OUTER,
            FOREHEAD_TOP, FOREHEAD_CENTER, LEFT_TEMPLE, RIGHT_TEMPLE,
            LEFT_CHEEKBONE, RIGHT_CHEEKBONE, LEFT_JAW_ANGLE, RIGHT_JAW_ANGLE,
            LEFT_JAW, RIGHT_JAW, CHIN, CHIN_LEFT, CHIN_RIGHT,
            NOSE_TIP, NOSE_BRIDGE, NOSE_LEFT_ALAR, NOSE_RIGHT_ALAR,
            UPPER_LIP_CENTER, LOWER_LIP_CENTER, LEFT_MOUTH_CORNER, RIGHT_MOUTH_CORNER,
            LEFT_BROW_OUTER, LEFT_BROW_ARCH, LEFT_BROW_INNER,
            RIGHT_BROW_OUTER, RIGHT_BROW_ARCH, RIGHT_BROW_INNER,
        ];
        for idx in named {
            assert!(idx < MESH_LANDMARK_COUNT, "index {idx} outside mesh");
        }
    }

    #[test]
    fn test_autofit_key_points() {
        assert_eq!(AUTOFIT_KEY_POINTS, [33, 263, 4, 61, 291, 152]);
    }
}
