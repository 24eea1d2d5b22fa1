//! Zone templates.
//!
//! A template is the hand-calibrated reference geometry for one subject
//! morphology: the face-mask outline, a named set of anatomical zone
//! polygons with optional exclusion cut-outs, and per-zone anchor and
//! size-ratio tables used by the adapter. Two calibrated defaults are
//! embedded at compile time from `contrib/templates/*.json`.
//!
//! Point editing never validates mid-edit — a polygon may pass through
//! a degenerate state while being reshaped. Validation happens once,
//! before the template is persisted.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use thiserror::Error;

use crate::geometry::{Point, Polygon, MIN_POLYGON_POINTS};

/// Compile-time embedded default calibrations.
const TEMPLATE_XX: &str = include_str!("../../../contrib/templates/xx.json");
const TEMPLATE_XY: &str = include_str!("../../../contrib/templates/xy.json");

static BUILTIN_XX: OnceLock<ZoneTemplate> = OnceLock::new();
static BUILTIN_XY: OnceLock<ZoneTemplate> = OnceLock::new();

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    #[error("degenerate polygon: {target} has fewer than {MIN_POLYGON_POINTS} points")]
    DegeneratePolygon { target: String },
    #[error("unknown zone `{0}`")]
    UnknownZone(String),
    #[error("point index {index} out of range for {target}")]
    PointOutOfRange { target: String, index: usize },
    #[error("size ratio for `{zone}` must be finite and positive, got {value}")]
    BadSizeRatio { zone: String, value: f64 },
}

/// Subject morphology selecting which calibration applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Morphology {
    #[serde(rename = "XX")]
    Xx,
    #[serde(rename = "XY")]
    Xy,
}

impl fmt::Display for Morphology {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            Morphology::Xx => "XX",
            Morphology::Xy => "XY",
        })
    }
}

impl FromStr for Morphology {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "XX" => Ok(Morphology::Xx),
            "XY" => Ok(Morphology::Xy),
            other => Err(format!("unknown morphology `{other}` (expected XX or XY)")),
        }
    }
}

/// Which polygon inside a template a point edit targets.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditTarget {
    /// The face-mask outline.
    Mask,
    /// A zone's inclusion polygon.
    Zone(String),
    /// A zone's exclusion cut-out. Created on first `add_point`.
    Exclusion(String),
}

impl fmt::Display for EditTarget {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            EditTarget::Mask => f.write_str("mask"),
            EditTarget::Zone(z) => write!(f, "zone `{z}`"),
            EditTarget::Exclusion(z) => write!(f, "exclusion of `{z}`"),
        }
    }
}

/// The calibrated reference geometry for one morphology.
///
/// Immutable during an adaptation pass: the adapter takes `&ZoneTemplate`
/// and never writes back. Edits go through the point-level methods and
/// are persisted as a whole document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneTemplate {
    pub id: String,
    pub morphology: Morphology,
    pub label: String,
    pub mask: Polygon,
    pub zones: BTreeMap<String, Polygon>,
    #[serde(default, rename = "zone_exclusions")]
    pub exclusions: BTreeMap<String, Polygon>,
    #[serde(default)]
    pub anchors: BTreeMap<String, Vec<usize>>,
    #[serde(default)]
    pub size_ratios: BTreeMap<String, f64>,
}

impl ZoneTemplate {
    /// The builtin calibration for a morphology.
    ///
    /// Parsed once on first use; the embedded documents are fixtures of
    /// this crate's test suite, so a parse failure here is a build
    /// defect, not a runtime condition.
    pub fn builtin(morphology: Morphology) -> &'static ZoneTemplate {
        let (cell, src) = match morphology {
            Morphology::Xx => (&BUILTIN_XX, TEMPLATE_XX),
            Morphology::Xy => (&BUILTIN_XY, TEMPLATE_XY),
        };
        cell.get_or_init(|| {
            serde_json::from_str(src).unwrap_or_else(|e| {
                panic!("embedded template for {morphology} is invalid: {e}")
            })
        })
    }

    /// Zone ids in stable (sorted) order.
    pub fn zone_ids(&self) -> Vec<&str> {
        self.zones.keys().map(String::as_str).collect()
    }

    pub fn zone(&self, zone_id: &str) -> Option<&Polygon> {
        self.zones.get(zone_id)
    }

    pub fn exclusion(&self, zone_id: &str) -> Option<&Polygon> {
        self.exclusions.get(zone_id)
    }

    /// Anchor landmark indices for a zone; empty slice when none are
    /// declared (the adapter then falls back to the whole-face strategy).
    pub fn anchors_for(&self, zone_id: &str) -> &[usize] {
        self.anchors.get(zone_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn size_ratio(&self, zone_id: &str) -> Option<f64> {
        self.size_ratios.get(zone_id).copied()
    }

    /// Append a point to the target polygon.
    pub fn add_point(&mut self, target: &EditTarget, point: Point) -> Result<(), TemplateError> {
        self.target_polygon_mut(target, true)?.points.push(point);
        Ok(())
    }

    /// Move an existing point of the target polygon.
    pub fn move_point(
        &mut self,
        target: &EditTarget,
        index: usize,
        point: Point,
    ) -> Result<(), TemplateError> {
        let poly = self.target_polygon_mut(target, false)?;
        let slot = poly
            .points
            .get_mut(index)
            .ok_or_else(|| TemplateError::PointOutOfRange {
                target: target.to_string(),
                index,
            })?;
        *slot = point;
        Ok(())
    }

    /// Remove a point from the target polygon. May leave the polygon
    /// degenerate; `validate` catches that at save time.
    pub fn remove_point(&mut self, target: &EditTarget, index: usize) -> Result<(), TemplateError> {
        let poly = self.target_polygon_mut(target, false)?;
        if index >= poly.points.len() {
            return Err(TemplateError::PointOutOfRange {
                target: target.to_string(),
                index,
            });
        }
        poly.points.remove(index);
        Ok(())
    }

    /// Pre-save invariants: the mask and every zone (and any non-empty
    /// exclusion) must have at least three points, and every size ratio
    /// must be finite and positive. Point ordering and simplicity are
    /// not checked.
    pub fn validate(&self) -> Result<(), TemplateError> {
        if self.mask.is_degenerate() {
            return Err(TemplateError::DegeneratePolygon {
                target: "mask".into(),
            });
        }
        for (zone_id, poly) in &self.zones {
            if poly.is_degenerate() {
                return Err(TemplateError::DegeneratePolygon {
                    target: format!("zone `{zone_id}`"),
                });
            }
        }
        for (zone_id, poly) in &self.exclusions {
            if !poly.is_empty() && poly.is_degenerate() {
                return Err(TemplateError::DegeneratePolygon {
                    target: format!("exclusion of `{zone_id}`"),
                });
            }
        }
        for (zone_id, &ratio) in &self.size_ratios {
            if !ratio.is_finite() || ratio <= 0.0 {
                return Err(TemplateError::BadSizeRatio {
                    zone: zone_id.clone(),
                    value: ratio,
                });
            }
        }
        Ok(())
    }

    fn target_polygon_mut(
        &mut self,
        target: &EditTarget,
        create_exclusion: bool,
    ) -> Result<&mut Polygon, TemplateError> {
        match target {
            EditTarget::Mask => Ok(&mut self.mask),
            EditTarget::Zone(zone_id) => self
                .zones
                .get_mut(zone_id)
                .ok_or_else(|| TemplateError::UnknownZone(zone_id.clone())),
            EditTarget::Exclusion(zone_id) => {
                if !self.zones.contains_key(zone_id) {
                    return Err(TemplateError::UnknownZone(zone_id.clone()));
                }
                if create_exclusion {
                    Ok(self.exclusions.entry(zone_id.clone()).or_default())
                } else {
                    self.exclusions
                        .get_mut(zone_id)
                        .ok_or_else(|| TemplateError::UnknownZone(zone_id.clone()))
                }
            }
        }
    }
}
