//! The pure per-frame computation.
//!
//! `compute_zones` is the whole engine as one deterministic function of
//! its inputs: the latest landmark snapshot (if any), the active
//! template, the override set, the saved mask fit and the capture pose.
//! It holds no state, so an external scheduler can re-run it every
//! frame and simply discard results that a newer snapshot supersedes.

use crate::adapter::{self, AdaptOutcome};
use crate::autofit::MaskFit;
use crate::confidence::ConfidenceDetails;
use crate::landmarks::LandmarkSet;
use crate::overrides::{self, OverrideKey, OverrideSet, Provenance};
use crate::template::ZoneTemplate;
use crate::tuning::Tuning;
use crate::visibility::{self, Pose};
use crate::geometry::Polygon;

/// One zone as handed to consumers: resolved polygon, where it came
/// from, and the confidence breakdown when landmark-driven.
#[derive(Debug, Clone, PartialEq)]
pub struct ZoneGeometry {
    pub zone_id: String,
    pub polygon: Polygon,
    pub provenance: Provenance,
    /// Present only for `Provenance::Adapted`; overrides and template
    /// fallbacks carry no landmark-derived score.
    pub confidence: Option<ConfidenceDetails>,
}

/// The full frame result: resolved zones plus the adapter's skip list
/// for diagnostics.
#[derive(Debug, Clone, Default)]
pub struct FrameResult {
    pub zones: Vec<ZoneGeometry>,
    pub skipped: Vec<adapter::ZoneAdaptError>,
}

/// Compute the effective geometry of every zone visible at `pose`.
///
/// Precedence per zone, highest first: override → adapted →
/// mask-fit-transformed template → raw template. Zone-level adaptation
/// failures never abort the batch; the affected zones fall through to
/// the next precedence level and the reason is reported in `skipped`.
pub fn compute_zones(
    landmarks: Option<&LandmarkSet>,
    template: &ZoneTemplate,
    overrides: &OverrideSet,
    fit: Option<&MaskFit>,
    pose: Pose,
    session_id: &str,
    photo_id: &str,
    tuning: &Tuning,
) -> FrameResult {
    let adapt_outcome: AdaptOutcome = match landmarks {
        Some(set) => adapter::adapt_zones(set, template, tuning),
        None => AdaptOutcome::default(),
    };

    let mut result = FrameResult {
        zones: Vec::new(),
        skipped: adapt_outcome.skipped,
    };

    for zone_id in template.zone_ids() {
        if !visibility::is_visible(zone_id, pose) {
            continue;
        }
        let key = OverrideKey::new(session_id, photo_id, zone_id);
        let adapted = adapt_outcome.zones.iter().find(|z| z.zone_id == zone_id);

        let Some(effective) =
            overrides::effective_geometry(&key, overrides, adapted, fit, template)
        else {
            continue;
        };

        let confidence = match effective.provenance {
            Provenance::Adapted => adapted.map(|z| z.confidence),
            _ => None,
        };

        result.zones.push(ZoneGeometry {
            zone_id: effective.zone_id,
            polygon: effective.polygon,
            provenance: effective.provenance,
            confidence,
        });
    }

    result
}
