//! Landmark normalization.
//!
//! Converts a raw detector result (468 points with `x,y ∈ [0,1]`) into
//! the canonical 0–100 space and derives the anthropometric reference
//! distances the adapter, auto-fit and calibration machine consume.

use serde::de::{SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::geometry::{Point, Rect, CANONICAL_EXTENT};
use crate::topology;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("no face detected: {0}")]
    NoFaceDetected(&'static str),
}

/// One raw detector point, `x,y ∈ [0,1]`, `z` optional depth.
///
/// Serializes as `[x, y]` or `[x, y, z]` to match the detector's wire
/// format.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawLandmark {
    pub x: f64,
    pub y: f64,
    pub z: Option<f64>,
}

impl RawLandmark {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y, z: None }
    }
}

impl Serialize for RawLandmark {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.z.is_some() { 3 } else { 2 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.x)?;
        seq.serialize_element(&self.y)?;
        if let Some(z) = self.z {
            seq.serialize_element(&z)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for RawLandmark {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RawLandmarkVisitor;

        impl<'de> Visitor<'de> for RawLandmarkVisitor {
            type Value = RawLandmark;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a sequence [x, y] or [x, y, z]")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
                let x = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
                let y = seq
                    .next_element()?
                    .ok_or_else(|| serde::de::Error::invalid_length(1, &self))?;
                let z = seq.next_element()?;
                Ok(RawLandmark { x, y, z })
            }
        }

        deserializer.deserialize_seq(RawLandmarkVisitor)
    }
}

/// A normalized landmark snapshot in canonical 0–100 space, with the
/// derived distances precomputed at construction.
///
/// Immutable once built; every per-frame computation is a pure function
/// of the latest snapshot, so holding on to the last successful one is
/// how callers survive frames where detection fails.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LandmarkSet {
    pub points: Vec<Point>,
    pub inter_eye_distance: f64,
    pub face_width: f64,
    pub face_height: f64,
    pub nose_width: f64,
    pub mouth_width: f64,
    pub bounding_box: Rect,
}

impl LandmarkSet {
    /// Normalize a raw detection into canonical space.
    ///
    /// Rejects anything short of the full 468-point topology: a partial
    /// set means the anchor indices cannot be trusted.
    pub fn normalize(raw: &[RawLandmark]) -> Result<Self, NormalizeError> {
        if raw.is_empty() {
            return Err(NormalizeError::NoFaceDetected("empty landmark set"));
        }
        if raw.len() < topology::MESH_LANDMARK_COUNT {
            return Err(NormalizeError::NoFaceDetected(
                "landmark set smaller than the mesh topology",
            ));
        }

        let points: Vec<Point> = raw
            .iter()
            .map(|l| Point::new(l.x * CANONICAL_EXTENT, l.y * CANONICAL_EXTENT))
            .collect();

        let dist = |a: usize, b: usize| points[a].distance(&points[b]);

        let inter_eye_distance = dist(topology::LEFT_EYE_OUTER, topology::RIGHT_EYE_OUTER);
        let cheek_width = dist(topology::LEFT_CHEEKBONE, topology::RIGHT_CHEEKBONE);
        let temple_width = dist(topology::LEFT_TEMPLE, topology::RIGHT_TEMPLE);
        let jaw_width = dist(topology::LEFT_JAW_ANGLE, topology::RIGHT_JAW_ANGLE);
        let face_width = cheek_width.max(temple_width).max(jaw_width);
        let face_height = dist(topology::CHIN, topology::FOREHEAD_TOP);
        let nose_width = dist(topology::NOSE_LEFT_ALAR, topology::NOSE_RIGHT_ALAR);
        let mouth_width = dist(topology::LEFT_MOUTH_CORNER, topology::RIGHT_MOUTH_CORNER);

        // Non-empty by the check above, so the bbox always exists.
        let bounding_box = Rect::of_points(&points)
            .ok_or(NormalizeError::NoFaceDetected("empty landmark set"))?;

        Ok(Self {
            points,
            inter_eye_distance,
            face_width,
            face_height,
            nose_width,
            mouth_width,
            bounding_box,
        })
    }

    /// Canonical-space point at a topology index, if in range.
    pub fn point(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }

    /// Midpoint of the outer eye corners.
    pub fn eye_center(&self) -> Point {
        let l = self.points[topology::LEFT_EYE_OUTER];
        let r = self.points[topology::RIGHT_EYE_OUTER];
        Point::new((l.x + r.x) / 2.0, (l.y + r.y) / 2.0)
    }

    /// Centroid of the points at `indices`. `None` if any index is out
    /// of range or the list is empty.
    pub fn centroid_of(&self, indices: &[usize]) -> Option<Point> {
        if indices.is_empty() {
            return None;
        }
        let mut sx = 0.0;
        let mut sy = 0.0;
        for &i in indices {
            let p = self.point(i)?;
            sx += p.x;
            sy += p.y;
        }
        let n = indices.len() as f64;
        Some(Point::new(sx / n, sy / n))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A frontal synthetic face: every point at the face center, with
    /// the measurement landmarks placed to give round-number metrics.
    pub fn synthetic_raw() -> Vec<RawLandmark> {
        let mut raw = vec![RawLandmark::new(0.5, 0.5); topology::MESH_LANDMARK_COUNT];
        raw[topology::LEFT_EYE_OUTER] = RawLandmark::new(0.32, 0.40);
        raw[topology::RIGHT_EYE_OUTER] = RawLandmark::new(0.68, 0.40);
        raw[topology::LEFT_EYE_INNER] = RawLandmark::new(0.43, 0.40);
        raw[topology::RIGHT_EYE_INNER] = RawLandmark::new(0.57, 0.40);
        raw[topology::LEFT_CHEEKBONE] = RawLandmark::new(0.20, 0.52);
        raw[topology::RIGHT_CHEEKBONE] = RawLandmark::new(0.80, 0.52);
        raw[topology::LEFT_TEMPLE] = RawLandmark::new(0.24, 0.30);
        raw[topology::RIGHT_TEMPLE] = RawLandmark::new(0.76, 0.30);
        raw[topology::LEFT_JAW_ANGLE] = RawLandmark::new(0.26, 0.72);
        raw[topology::RIGHT_JAW_ANGLE] = RawLandmark::new(0.74, 0.72);
        raw[topology::FOREHEAD_TOP] = RawLandmark::new(0.50, 0.08);
        raw[topology::FOREHEAD_CENTER] = RawLandmark::new(0.50, 0.20);
        raw[topology::CHIN] = RawLandmark::new(0.50, 0.92);
        raw[topology::CHIN_LEFT] = RawLandmark::new(0.44, 0.90);
        raw[topology::CHIN_RIGHT] = RawLandmark::new(0.56, 0.90);
        raw[topology::NOSE_TIP] = RawLandmark::new(0.50, 0.52);
        raw[topology::NOSE_BRIDGE] = RawLandmark::new(0.50, 0.38);
        raw[topology::NOSE_LEFT_ALAR] = RawLandmark::new(0.44, 0.54);
        raw[topology::NOSE_RIGHT_ALAR] = RawLandmark::new(0.56, 0.54);
        raw[topology::LEFT_MOUTH_CORNER] = RawLandmark::new(0.40, 0.70);
        raw[topology::RIGHT_MOUTH_CORNER] = RawLandmark::new(0.60, 0.70);
        raw[topology::UPPER_LIP_CENTER] = RawLandmark::new(0.50, 0.67);
        raw[topology::LOWER_LIP_CENTER] = RawLandmark::new(0.50, 0.74);
        raw[topology::LEFT_BROW_OUTER] = RawLandmark::new(0.30, 0.33);
        raw[topology::LEFT_BROW_ARCH] = RawLandmark::new(0.36, 0.32);
        raw[topology::LEFT_BROW_INNER] = RawLandmark::new(0.43, 0.34);
        raw[topology::RIGHT_BROW_OUTER] = RawLandmark::new(0.70, 0.33);
        raw[topology::RIGHT_BROW_ARCH] = RawLandmark::new(0.64, 0.32);
        raw[topology::RIGHT_BROW_INNER] = RawLandmark::new(0.57, 0.34);
        raw
    }

    pub fn synthetic_set() -> LandmarkSet {
        LandmarkSet::normalize(&synthetic_raw()).unwrap()
    }
}
