//! Zone adaptation.
//!
//! Maps template zone polygons onto a detected face. Zones with anchor
//! landmarks are placed at the anchor centroid and scaled from the
//! detected face dimensions; zones without anchors fall back to a
//! whole-face bounding-box transform. Failures are per-zone: a bad zone
//! is skipped with a recorded reason and never aborts the batch.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::confidence::{self, ConfidenceDetails};
use crate::geometry::{Point, Polygon};
use crate::landmarks::LandmarkSet;
use crate::template::ZoneTemplate;
use crate::tuning::Tuning;

/// Size ratio used when a template declares no ratio for a zone.
/// Roughly unit scale for a canonical-proportioned face.
pub const DEFAULT_SIZE_RATIO: f64 = 0.015;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ZoneAdaptError {
    #[error("zone `{zone_id}`: template polygon is degenerate")]
    DegeneratePolygon { zone_id: String },
    #[error("zone `{zone_id}`: anchor index {index} outside the landmark topology")]
    InvalidAnchorIndex { zone_id: String, index: usize },
    #[error("zone `{zone_id}`: {which} bounding box has zero width or height")]
    ZeroScaleDimension { zone_id: String, which: &'static str },
}

/// One zone's polygon mapped onto the detected face, with its
/// confidence breakdown. Recomputed per frame; never the authoritative
/// stored geometry (overrides outrank it).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaptedZone {
    pub zone_id: String,
    pub polygon: Polygon,
    pub confidence: ConfidenceDetails,
}

/// Result of adapting a whole template: the zones that mapped cleanly
/// and the ones that were skipped, with why.
#[derive(Debug, Clone, Default)]
pub struct AdaptOutcome {
    pub zones: Vec<AdaptedZone>,
    pub skipped: Vec<ZoneAdaptError>,
}

/// Adapt every zone of `template` onto `landmarks`.
///
/// Point count and vertex order of each template polygon are preserved
/// exactly; only positions change.
pub fn adapt_zones(
    landmarks: &LandmarkSet,
    template: &ZoneTemplate,
    tuning: &Tuning,
) -> AdaptOutcome {
    let mut outcome = AdaptOutcome::default();

    for (zone_id, zone_polygon) in &template.zones {
        match adapt_zone(zone_id, zone_polygon, landmarks, template, tuning) {
            Ok(zone) => outcome.zones.push(zone),
            Err(err) => {
                tracing::debug!(zone = %zone_id, error = %err, "zone skipped during adaptation");
                outcome.skipped.push(err);
            }
        }
    }

    outcome
}

fn adapt_zone(
    zone_id: &str,
    zone_polygon: &Polygon,
    landmarks: &LandmarkSet,
    template: &ZoneTemplate,
    tuning: &Tuning,
) -> Result<AdaptedZone, ZoneAdaptError> {
    if zone_polygon.is_degenerate() {
        return Err(ZoneAdaptError::DegeneratePolygon {
            zone_id: zone_id.into(),
        });
    }

    let anchors = template.anchors_for(zone_id);
    let ratio = template.size_ratio(zone_id).unwrap_or(DEFAULT_SIZE_RATIO);

    let (polygon, expected_center) = if anchors.is_empty() {
        whole_face_transform(zone_id, zone_polygon, landmarks, template)?
    } else {
        anchor_transform(zone_id, zone_polygon, landmarks, anchors, ratio, tuning)?
    };

    let expected_area = (landmarks.face_width * ratio) * (landmarks.face_height * ratio);
    let confidence = confidence::score_zone(
        &polygon,
        zone_polygon,
        landmarks,
        anchors,
        expected_area,
        expected_center,
        tuning,
    );

    Ok(AdaptedZone {
        zone_id: zone_id.into(),
        polygon,
        confidence,
    })
}

/// Anchor strategy: pivot at the template zone centroid, target at the
/// anchor landmark centroid, scale from the detected face dimensions
/// times the zone's size ratio. The vertical scale is floored at a
/// fraction of the horizontal scale so a squashed detection cannot
/// flatten the zone.
fn anchor_transform(
    zone_id: &str,
    zone_polygon: &Polygon,
    landmarks: &LandmarkSet,
    anchors: &[usize],
    ratio: f64,
    tuning: &Tuning,
) -> Result<(Polygon, Point), ZoneAdaptError> {
    for &index in anchors {
        if index >= landmarks.points.len() {
            return Err(ZoneAdaptError::InvalidAnchorIndex {
                zone_id: zone_id.into(),
                index,
            });
        }
    }

    if landmarks.face_width <= 0.0 || landmarks.face_height <= 0.0 {
        return Err(ZoneAdaptError::ZeroScaleDimension {
            zone_id: zone_id.into(),
            which: "detected face",
        });
    }

    // Indices are checked above; a non-empty anchor list has a centroid.
    let target = landmarks
        .centroid_of(anchors)
        .ok_or(ZoneAdaptError::InvalidAnchorIndex {
            zone_id: zone_id.into(),
            index: anchors[0],
        })?;

    let scale_x = landmarks.face_width * ratio;
    let scale_y = (landmarks.face_height * ratio).max(scale_x * tuning.vertical_scale_floor);

    // Non-degenerate polygon, centroid exists.
    let pivot = zone_polygon
        .centroid()
        .ok_or(ZoneAdaptError::DegeneratePolygon {
            zone_id: zone_id.into(),
        })?;

    let polygon = transform(zone_polygon, pivot, target, scale_x, scale_y);
    Ok((polygon, target))
}

/// Whole-face fallback: pivot at the template mask bbox center, target
/// at the detected landmark bbox center, per-axis scales from the bbox
/// ratio. No vertical floor here — the bbox ratio is reproduced as-is.
fn whole_face_transform(
    zone_id: &str,
    zone_polygon: &Polygon,
    landmarks: &LandmarkSet,
    template: &ZoneTemplate,
) -> Result<(Polygon, Point), ZoneAdaptError> {
    let mask_bbox = template
        .mask
        .bounding_box()
        .filter(|b| !b.is_collapsed())
        .ok_or(ZoneAdaptError::ZeroScaleDimension {
            zone_id: zone_id.into(),
            which: "template mask",
        })?;

    let face_bbox = landmarks.bounding_box;
    if face_bbox.is_collapsed() {
        return Err(ZoneAdaptError::ZeroScaleDimension {
            zone_id: zone_id.into(),
            which: "detected face",
        });
    }

    let scale_x = face_bbox.width() / mask_bbox.width();
    let scale_y = face_bbox.height() / mask_bbox.height();
    let target = face_bbox.center();

    let polygon = transform(zone_polygon, mask_bbox.center(), target, scale_x, scale_y);
    Ok((polygon, target))
}

/// Translate to the pivot, scale per axis, translate to the target.
fn transform(polygon: &Polygon, pivot: Point, target: Point, scale_x: f64, scale_y: f64) -> Polygon {
    Polygon::new(
        polygon
            .points
            .iter()
            .map(|p| {
                Point::new(
                    target.x + (p.x - pivot.x) * scale_x,
                    target.y + (p.y - pivot.y) * scale_y,
                )
            })
            .collect(),
    )
}
