//! Pose-based zone visibility.
//!
//! A pure membership filter: given a capture pose, which zones are
//! anatomically visible. Midline zones survive every pose; bilateral
//! zones (ids suffixed `_left`/`_right`) drop out as their side turns
//! away from the camera. Filtering is idempotent — membership depends
//! only on the zone id and the pose.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The five guided capture poses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Pose {
    Face,
    ThreeQuarterLeft,
    ThreeQuarterRight,
    ProfileLeft,
    ProfileRight,
}

impl fmt::Display for Pose {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Pose::Face => "face",
            Pose::ThreeQuarterLeft => "three_quarter_left",
            Pose::ThreeQuarterRight => "three_quarter_right",
            Pose::ProfileLeft => "profile_left",
            Pose::ProfileRight => "profile_right",
        })
    }
}

impl FromStr for Pose {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "face" => Ok(Pose::Face),
            "three_quarter_left" => Ok(Pose::ThreeQuarterLeft),
            "three_quarter_right" => Ok(Pose::ThreeQuarterRight),
            "profile_left" => Ok(Pose::ProfileLeft),
            "profile_right" => Ok(Pose::ProfileRight),
            other => Err(format!("unknown pose `{other}`")),
        }
    }
}

/// Which side of the face a zone belongs to, derived from its id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Left,
    Right,
    Midline,
}

fn side_of(zone_id: &str) -> Side {
    if zone_id.ends_with("_left") {
        Side::Left
    } else if zone_id.ends_with("_right") {
        Side::Right
    } else {
        Side::Midline
    }
}

/// Away-side zones that sit deep against the far silhouette and vanish
/// already at three-quarter rotation. Everything else on the away side
/// survives until full profile.
const DEEP_SILHOUETTE_PREFIXES: [&str; 3] = ["periorbital", "temple", "tear_trough"];

fn is_deep_silhouette(zone_id: &str) -> bool {
    DEEP_SILHOUETTE_PREFIXES
        .iter()
        .any(|p| zone_id.starts_with(p))
}

/// Is `zone_id` anatomically visible at `pose`?
///
/// Pose names describe which side of the face is presented to the
/// camera: at `profile_left` the left side faces the camera and every
/// right-side zone is hidden.
pub fn is_visible(zone_id: &str, pose: Pose) -> bool {
    let side = side_of(zone_id);
    match (pose, side) {
        (_, Side::Midline) => true,
        (Pose::Face, _) => true,
        (Pose::ThreeQuarterLeft, Side::Left) => true,
        (Pose::ThreeQuarterLeft, Side::Right) => !is_deep_silhouette(zone_id),
        (Pose::ThreeQuarterRight, Side::Right) => true,
        (Pose::ThreeQuarterRight, Side::Left) => !is_deep_silhouette(zone_id),
        (Pose::ProfileLeft, Side::Left) => true,
        (Pose::ProfileLeft, Side::Right) => false,
        (Pose::ProfileRight, Side::Right) => true,
        (Pose::ProfileRight, Side::Left) => false,
    }
}

/// Filter a zone-id list down to what `pose` shows. Order is preserved.
pub fn filter_ids<'a>(zone_ids: &[&'a str], pose: Pose) -> Vec<&'a str> {
    zone_ids
        .iter()
        .copied()
        .filter(|id| is_visible(id, pose))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_POSES: [Pose; 5] = [
        Pose::Face,
        Pose::ThreeQuarterLeft,
        Pose::ThreeQuarterRight,
        Pose::ProfileLeft,
        Pose::ProfileRight,
    ];

    fn all_zones() -> Vec<&'static str> {
        vec![
            "forehead", "glabella", "nose", "perioral", "chin",
            "temple_left", "temple_right",
            "periorbital_left", "periorbital_right",
            "tear_trough_left", "tear_trough_right",
            "cheek_left", "cheek_right",
            "nasolabial_left", "nasolabial_right",
            "jawline_left", "jawline_right",
        ]
    }

    #[test]
    fn test_frontal_shows_everything() {
        assert_eq!(filter_ids(&all_zones(), Pose::Face).len(), all_zones().len());
    }

    #[test]
    fn test_midline_survives_every_pose() {
        for pose in ALL_POSES {
            for zone in ["forehead", "glabella", "nose", "perioral", "chin"] {
                assert!(is_visible(zone, pose), "{zone} hidden at {pose}");
            }
        }
    }

    #[test]
    fn test_profile_left_hides_all_right_zones() {
        let visible = filter_ids(&all_zones(), Pose::ProfileLeft);
        assert!(visible.iter().all(|id| !id.ends_with("_right")));
        // The near-side cheek stays.
        assert!(visible.contains(&"cheek_left"));
    }

    #[test]
    fn test_profile_right_hides_all_left_zones() {
        let visible = filter_ids(&all_zones(), Pose::ProfileRight);
        assert!(visible.iter().all(|id| !id.ends_with("_left")));
    }

    #[test]
    fn test_three_quarter_hides_only_deep_silhouette() {
        let visible = filter_ids(&all_zones(), Pose::ThreeQuarterLeft);
        // Away-side deep zones gone.
        assert!(!visible.contains(&"periorbital_right"));
        assert!(!visible.contains(&"temple_right"));
        assert!(!visible.contains(&"tear_trough_right"));
        // Away-side shallow zones still visible at three-quarter.
        assert!(visible.contains(&"cheek_right"));
        assert!(visible.contains(&"jawline_right"));
        assert!(visible.contains(&"nasolabial_right"));
        // The presented side is untouched.
        assert!(visible.contains(&"periorbital_left"));
    }

    #[test]
    fn test_filter_is_idempotent() {
        for pose in ALL_POSES {
            let once = filter_ids(&all_zones(), pose);
            let twice = filter_ids(&once, pose);
            assert_eq!(once, twice, "filter not idempotent at {pose}");
        }
    }

    #[test]
    fn test_filter_preserves_order() {
        let visible = filter_ids(&all_zones(), Pose::ProfileLeft);
        let mut last_index = 0;
        for id in &visible {
            let idx = all_zones().iter().position(|z| z == id).unwrap();
            assert!(idx >= last_index);
            last_index = idx;
        }
    }

    #[test]
    fn test_pose_serde_snake_case() {
        let json = serde_json::to_string(&Pose::ThreeQuarterLeft).unwrap();
        assert_eq!(json, "\"three_quarter_left\"");
        let back: Pose = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Pose::ThreeQuarterLeft);
    }

    #[test]
    fn test_pose_from_str_roundtrip() {
        for pose in ALL_POSES {
            assert_eq!(pose.to_string().parse::<Pose>().unwrap(), pose);
        }
    }
}
