//! Manual zone overrides and the effective-geometry precedence chain.
//!
//! An override is a fully user-edited polygon for one zone on one
//! photo. While it exists it outranks everything the engine computes;
//! clearing it hands the zone back to the computed chain. Persistence
//! is the caller's concern — this layer is the in-memory merge and the
//! precedence contract only.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::adapter::AdaptedZone;
use crate::autofit::{self, MaskFit};
use crate::geometry::{Point, Polygon};
use crate::template::ZoneTemplate;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum OverrideError {
    #[error("degenerate polygon: an override needs at least 3 points, got {0}")]
    DegeneratePolygon(usize),
}

/// Natural key of one override: which zone, on which photo, in which
/// session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OverrideKey {
    pub session_id: String,
    pub photo_id: String,
    pub zone_id: String,
}

impl OverrideKey {
    pub fn new(
        session_id: impl Into<String>,
        photo_id: impl Into<String>,
        zone_id: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            photo_id: photo_id.into(),
            zone_id: zone_id.into(),
        }
    }
}

/// Which precedence level produced a polygon handed to consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// A user-edited override — authoritative while it exists.
    Override,
    /// Landmark-driven adaptation of the current frame.
    Adapted,
    /// Template polygon transformed only by the saved global mask fit.
    MaskFit,
    /// Raw template polygon; nothing better was available.
    Template,
}

/// A polygon resolved through the precedence chain, tagged with where
/// it came from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveGeometry {
    pub zone_id: String,
    pub polygon: Polygon,
    pub provenance: Provenance,
}

/// In-memory override set, keyed by `(session, photo, zone)`.
#[derive(Debug, Clone, Default)]
pub struct OverrideSet {
    entries: HashMap<OverrideKey, Polygon>,
}

impl OverrideSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install an override. Rejects degenerate polygons; replacing an
    /// existing override is an ordinary upsert.
    pub fn set(&mut self, key: OverrideKey, polygon: Polygon) -> Result<(), OverrideError> {
        if polygon.is_degenerate() {
            return Err(OverrideError::DegeneratePolygon(polygon.len()));
        }
        self.entries.insert(key, polygon);
        Ok(())
    }

    /// Remove an override. Returns the removed polygon, if any.
    pub fn clear(&mut self, key: &OverrideKey) -> Option<Polygon> {
        self.entries.remove(key)
    }

    pub fn get(&self, key: &OverrideKey) -> Option<&Polygon> {
        self.entries.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All overrides for one photo, as `zone_id → polygon`.
    pub fn for_photo(&self, session_id: &str, photo_id: &str) -> HashMap<&str, &Polygon> {
        self.entries
            .iter()
            .filter(|(k, _)| k.session_id == session_id && k.photo_id == photo_id)
            .map(|(k, v)| (k.zone_id.as_str(), v))
            .collect()
    }

    /// Iterate all entries (used when flushing to a store).
    pub fn iter(&self) -> impl Iterator<Item = (&OverrideKey, &Polygon)> {
        self.entries.iter()
    }
}

/// Resolve one zone's geometry through the precedence chain:
/// override → adapted → mask-fit-transformed template → raw template.
///
/// Returns `None` only if the template does not know the zone at all.
pub fn effective_geometry(
    key: &OverrideKey,
    overrides: &OverrideSet,
    adapted: Option<&AdaptedZone>,
    fit: Option<&MaskFit>,
    template: &ZoneTemplate,
) -> Option<EffectiveGeometry> {
    if let Some(polygon) = overrides.get(key) {
        return Some(EffectiveGeometry {
            zone_id: key.zone_id.clone(),
            polygon: polygon.clone(),
            provenance: Provenance::Override,
        });
    }

    if let Some(zone) = adapted {
        return Some(EffectiveGeometry {
            zone_id: key.zone_id.clone(),
            polygon: zone.polygon.clone(),
            provenance: Provenance::Adapted,
        });
    }

    let template_polygon = template.zone(&key.zone_id)?;

    if let Some(fit) = fit {
        let mask_center = template.mask.bounding_box().map(|b| b.center());
        if let Some(center) = mask_center {
            return Some(EffectiveGeometry {
                zone_id: key.zone_id.clone(),
                polygon: autofit::apply_fit_polygon(template_polygon, fit, center),
                provenance: Provenance::MaskFit,
            });
        }
    }

    Some(EffectiveGeometry {
        zone_id: key.zone_id.clone(),
        polygon: template_polygon.clone(),
        provenance: Provenance::Template,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::adapt_zones;
    use crate::landmarks::test_support::synthetic_set;
    use crate::template::{Morphology, ZoneTemplate};
    use crate::tuning::Tuning;

    fn triangle() -> Polygon {
        Polygon::new(vec![
            Point::new(10.0, 10.0),
            Point::new(20.0, 10.0),
            Point::new(15.0, 20.0),
        ])
    }

    #[test]
    fn test_set_rejects_degenerate() {
        let mut set = OverrideSet::new();
        let key = OverrideKey::new("s1", "p1", "chin");
        let err = set
            .set(key, Polygon::new(vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)]))
            .unwrap_err();
        assert_eq!(err, OverrideError::DegeneratePolygon(2));
        assert!(set.is_empty());
    }

    #[test]
    fn test_override_outranks_adapted() {
        let template = ZoneTemplate::builtin(Morphology::Xx);
        let landmarks = synthetic_set();
        let outcome = adapt_zones(&landmarks, template, &Tuning::default());
        let adapted_chin = outcome.zones.iter().find(|z| z.zone_id == "chin").unwrap();

        let mut overrides = OverrideSet::new();
        let key = OverrideKey::new("s1", "p1", "chin");
        overrides.set(key.clone(), triangle()).unwrap();

        let eff =
            effective_geometry(&key, &overrides, Some(adapted_chin), None, template).unwrap();
        assert_eq!(eff.provenance, Provenance::Override);
        assert_eq!(eff.polygon, triangle());

        // Clearing hands the zone back to the computed chain.
        overrides.clear(&key);
        let eff =
            effective_geometry(&key, &overrides, Some(adapted_chin), None, template).unwrap();
        assert_eq!(eff.provenance, Provenance::Adapted);
        assert_eq!(eff.polygon, adapted_chin.polygon);
    }

    #[test]
    fn test_mask_fit_level_when_no_landmarks() {
        let template = ZoneTemplate::builtin(Morphology::Xx);
        let overrides = OverrideSet::new();
        let key = OverrideKey::new("s1", "p1", "chin");
        let fit = MaskFit { scale: 0.5, offset_x: 5.0, offset_y: -2.0 };

        let eff = effective_geometry(&key, &overrides, None, Some(&fit), template).unwrap();
        assert_eq!(eff.provenance, Provenance::MaskFit);

        let center = template.mask.bounding_box().unwrap().center();
        let expected = autofit::apply_fit_polygon(template.zone("chin").unwrap(), &fit, center);
        assert_eq!(eff.polygon, expected);
    }

    #[test]
    fn test_raw_template_is_last_resort() {
        let template = ZoneTemplate::builtin(Morphology::Xx);
        let overrides = OverrideSet::new();
        let key = OverrideKey::new("s1", "p1", "chin");

        let eff = effective_geometry(&key, &overrides, None, None, template).unwrap();
        assert_eq!(eff.provenance, Provenance::Template);
        assert_eq!(&eff.polygon, template.zone("chin").unwrap());
    }

    #[test]
    fn test_unknown_zone_resolves_to_none() {
        let template = ZoneTemplate::builtin(Morphology::Xx);
        let overrides = OverrideSet::new();
        let key = OverrideKey::new("s1", "p1", "scalp");
        assert!(effective_geometry(&key, &overrides, None, None, template).is_none());
    }

    #[test]
    fn test_for_photo_filters_by_session_and_photo() {
        let mut set = OverrideSet::new();
        set.set(OverrideKey::new("s1", "p1", "chin"), triangle()).unwrap();
        set.set(OverrideKey::new("s1", "p2", "nose"), triangle()).unwrap();
        set.set(OverrideKey::new("s2", "p1", "forehead"), triangle()).unwrap();

        let found = set.for_photo("s1", "p1");
        assert_eq!(found.len(), 1);
        assert!(found.contains_key("chin"));
    }

    #[test]
    fn test_set_is_upsert() {
        let mut set = OverrideSet::new();
        let key = OverrideKey::new("s1", "p1", "chin");
        set.set(key.clone(), triangle()).unwrap();
        let bigger = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(30.0, 0.0),
            Point::new(30.0, 30.0),
            Point::new(0.0, 30.0),
        ]);
        set.set(key.clone(), bigger.clone()).unwrap();
        assert_eq!(set.get(&key), Some(&bigger));
    }
}
