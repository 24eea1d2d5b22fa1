//! Global mask auto-fit.
//!
//! Computes a single uniform scale plus offset aligning the whole
//! face-mask polygon to a detected face, from six stable key points.
//! Independent of per-zone adaptation and deliberately simpler: one
//! scalar scale, not per-axis, so a user can nudge the result by hand.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{Point, Polygon, Rect};
use crate::landmarks::LandmarkSet;
use crate::topology;
use crate::tuning::Tuning;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("{which} bounding box has zero width or height")]
    ZeroScaleDimension { which: &'static str },
    #[error("key landmark index {0} missing from the landmark set")]
    MissingKeyPoint(usize),
}

/// A global scale+offset aligning the mask to one photo's face.
/// Persisted per `(session, photo, morphology)`; the latest save wins.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaskFit {
    pub scale: f64,
    pub offset_x: f64,
    pub offset_y: f64,
}

/// The six auto-fit key points, pulled out of a landmark set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyPoints {
    pub left_eye_outer: Point,
    pub right_eye_outer: Point,
    pub nose_tip: Point,
    pub mouth_left: Point,
    pub mouth_right: Point,
    pub chin: Point,
}

impl KeyPoints {
    pub fn from_landmarks(landmarks: &LandmarkSet) -> Result<Self, FitError> {
        let get = |idx: usize| landmarks.point(idx).ok_or(FitError::MissingKeyPoint(idx));
        Ok(Self {
            left_eye_outer: get(topology::LEFT_EYE_OUTER)?,
            right_eye_outer: get(topology::RIGHT_EYE_OUTER)?,
            nose_tip: get(topology::NOSE_TIP)?,
            mouth_left: get(topology::LEFT_MOUTH_CORNER)?,
            mouth_right: get(topology::RIGHT_MOUTH_CORNER)?,
            chin: get(topology::CHIN)?,
        })
    }

    fn inter_eye_distance(&self) -> f64 {
        self.left_eye_outer.distance(&self.right_eye_outer)
    }

    /// Bounding box of the nose/mouth/chin cluster. The eye corners
    /// contribute only the inter-eye distance, which sets the margins.
    fn cluster_box(&self) -> Option<Rect> {
        Rect::of_points(&[self.nose_tip, self.mouth_left, self.mouth_right, self.chin])
    }
}

/// Compute the mask auto-fit from six key points and the mask polygon.
///
/// Pure and deterministic: identical inputs give bit-identical output.
/// The face-reference box is the nose/mouth/chin cluster box expanded
/// by margins proportional to the inter-eye distance `d`: `margin_x·d`
/// each side, `margin_top·d` for the forehead, `margin_bottom·d` for
/// the chin.
pub fn compute_mask_fit(
    keys: &KeyPoints,
    mask: &Polygon,
    tuning: &Tuning,
) -> Result<MaskFit, FitError> {
    let mask_bbox = mask
        .bounding_box()
        .filter(|b| !b.is_collapsed())
        .ok_or(FitError::ZeroScaleDimension {
            which: "template mask",
        })?;

    let d = keys.inter_eye_distance();
    let face_ref = keys
        .cluster_box()
        .ok_or(FitError::ZeroScaleDimension {
            which: "face reference",
        })?
        .expanded(
            tuning.fit_margin_x * d,
            tuning.fit_margin_x * d,
            tuning.fit_margin_top * d,
            tuning.fit_margin_bottom * d,
        );

    if face_ref.is_collapsed() {
        return Err(FitError::ZeroScaleDimension {
            which: "face reference",
        });
    }

    let scale = (face_ref.width() / mask_bbox.width()).min(face_ref.height() / mask_bbox.height());
    let face_center = face_ref.center();
    let mask_center = mask_bbox.center();

    Ok(MaskFit {
        scale,
        offset_x: face_center.x - mask_center.x,
        offset_y: face_center.y - mask_center.y,
    })
}

/// Apply a fit to one template-space point: scale about the mask bbox
/// center, then translate by the offset.
pub fn apply_fit(point: Point, fit: &MaskFit, mask_center: Point) -> Point {
    Point::new(
        mask_center.x + (point.x - mask_center.x) * fit.scale + fit.offset_x,
        mask_center.y + (point.y - mask_center.y) * fit.scale + fit.offset_y,
    )
}

/// Apply a fit to a whole polygon. Vertex order is preserved.
pub fn apply_fit_polygon(polygon: &Polygon, fit: &MaskFit, mask_center: Point) -> Polygon {
    Polygon::new(
        polygon
            .points
            .iter()
            .map(|&p| apply_fit(p, fit, mask_center))
            .collect(),
    )
}
