//! Repository seams.
//!
//! The engine never reaches for a hidden global cache: persistence is
//! injected through these traits, so tests substitute fixtures and the
//! daemon wires in SQLite. All writes are idempotent upserts keyed by
//! natural keys — last writer wins, no optimistic locking.

use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;

use crate::autofit::MaskFit;
use crate::geometry::Polygon;
use crate::landmarks::LandmarkSet;
use crate::overrides::OverrideKey;
use crate::template::{Morphology, TemplateError, ZoneTemplate};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("template validation failed: {0}")]
    InvalidTemplate(#[from] TemplateError),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// A saved mask fit with its natural key.
#[derive(Debug, Clone, PartialEq)]
pub struct MaskFitRecord {
    pub session_id: String,
    pub photo_id: String,
    pub morphology: Morphology,
    pub fit: MaskFit,
}

/// Per-morphology template storage. `get` returning `None` means no
/// user calibration exists yet; callers fall back to the builtin.
pub trait TemplateRepository {
    fn get(&self, morphology: Morphology) -> Result<Option<ZoneTemplate>, StoreError>;
    /// Validates before writing; a degenerate polygon rejects the save.
    fn put(&self, template: &ZoneTemplate) -> Result<(), StoreError>;
}

/// Mask-fit storage, one fit per `(session, photo, morphology)`.
pub trait FitRepository {
    fn get(
        &self,
        session_id: &str,
        photo_id: &str,
        morphology: Morphology,
    ) -> Result<Option<MaskFit>, StoreError>;
    fn save(&self, record: &MaskFitRecord) -> Result<(), StoreError>;
}

/// Override storage, unique per `(session, photo, zone)`.
pub trait OverrideRepository {
    fn get(&self, key: &OverrideKey) -> Result<Option<Polygon>, StoreError>;
    fn set(&self, key: &OverrideKey, polygon: &Polygon) -> Result<(), StoreError>;
    fn clear(&self, key: &OverrideKey) -> Result<(), StoreError>;
    /// All overrides for one photo, as `zone_id → polygon`.
    fn list_for_photo(
        &self,
        session_id: &str,
        photo_id: &str,
    ) -> Result<Vec<(String, Polygon)>, StoreError>;
}

/// Optional landmark cache so confidence and zoom can be recomputed
/// later without re-running the detector.
pub trait LandmarkRepository {
    fn get(&self, session_id: &str, photo_id: &str) -> Result<Option<LandmarkSet>, StoreError>;
    fn put(
        &self,
        session_id: &str,
        photo_id: &str,
        landmarks: &LandmarkSet,
    ) -> Result<(), StoreError>;
}

/// In-memory template repository for tests and the CLI's dry runs.
#[derive(Default)]
pub struct MemoryTemplateRepository {
    templates: Mutex<HashMap<Morphology, ZoneTemplate>>,
}

impl MemoryTemplateRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TemplateRepository for MemoryTemplateRepository {
    fn get(&self, morphology: Morphology) -> Result<Option<ZoneTemplate>, StoreError> {
        Ok(self.templates.lock().unwrap().get(&morphology).cloned())
    }

    fn put(&self, template: &ZoneTemplate) -> Result<(), StoreError> {
        template.validate()?;
        self.templates
            .lock()
            .unwrap()
            .insert(template.morphology, template.clone());
        Ok(())
    }
}

/// In-memory fit repository.
#[derive(Default)]
pub struct MemoryFitRepository {
    fits: Mutex<HashMap<(String, String, Morphology), MaskFit>>,
}

impl MemoryFitRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FitRepository for MemoryFitRepository {
    fn get(
        &self,
        session_id: &str,
        photo_id: &str,
        morphology: Morphology,
    ) -> Result<Option<MaskFit>, StoreError> {
        let key = (session_id.to_string(), photo_id.to_string(), morphology);
        Ok(self.fits.lock().unwrap().get(&key).copied())
    }

    fn save(&self, record: &MaskFitRecord) -> Result<(), StoreError> {
        let key = (
            record.session_id.clone(),
            record.photo_id.clone(),
            record.morphology,
        );
        self.fits.lock().unwrap().insert(key, record.fit);
        Ok(())
    }
}

/// In-memory override repository.
#[derive(Default)]
pub struct MemoryOverrideRepository {
    overrides: Mutex<HashMap<OverrideKey, Polygon>>,
}

impl MemoryOverrideRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OverrideRepository for MemoryOverrideRepository {
    fn get(&self, key: &OverrideKey) -> Result<Option<Polygon>, StoreError> {
        Ok(self.overrides.lock().unwrap().get(key).cloned())
    }

    fn set(&self, key: &OverrideKey, polygon: &Polygon) -> Result<(), StoreError> {
        self.overrides
            .lock()
            .unwrap()
            .insert(key.clone(), polygon.clone());
        Ok(())
    }

    fn clear(&self, key: &OverrideKey) -> Result<(), StoreError> {
        self.overrides.lock().unwrap().remove(key);
        Ok(())
    }

    fn list_for_photo(
        &self,
        session_id: &str,
        photo_id: &str,
    ) -> Result<Vec<(String, Polygon)>, StoreError> {
        Ok(self
            .overrides
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k.session_id == session_id && k.photo_id == photo_id)
            .map(|(k, v)| (k.zone_id.clone(), v.clone()))
            .collect())
    }
}

/// In-memory landmark cache.
#[derive(Default)]
pub struct MemoryLandmarkRepository {
    sets: Mutex<HashMap<(String, String), LandmarkSet>>,
}

impl MemoryLandmarkRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LandmarkRepository for MemoryLandmarkRepository {
    fn get(&self, session_id: &str, photo_id: &str) -> Result<Option<LandmarkSet>, StoreError> {
        let key = (session_id.to_string(), photo_id.to_string());
        Ok(self.sets.lock().unwrap().get(&key).cloned())
    }

    fn put(
        &self,
        session_id: &str,
        photo_id: &str,
        landmarks: &LandmarkSet,
    ) -> Result<(), StoreError> {
        let key = (session_id.to_string(), photo_id.to_string());
        self.sets.lock().unwrap().insert(key, landmarks.clone());
        Ok(())
    }
}

/// Resolve the active template: stored calibration if present, builtin
/// default otherwise.
pub fn active_template(
    repo: &dyn TemplateRepository,
    morphology: Morphology,
) -> Result<ZoneTemplate, StoreError> {
    match repo.get(morphology)? {
        Some(t) => Ok(t),
        None => Ok(ZoneTemplate::builtin(morphology).clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Point;

    #[test]
    fn test_active_template_falls_back_to_builtin() {
        let repo = MemoryTemplateRepository::new();
        let t = active_template(&repo, Morphology::Xx).unwrap();
        assert_eq!(t.id, "builtin-xx");

        let mut edited = t.clone();
        edited.id = "user-calibrated".into();
        repo.put(&edited).unwrap();
        let t = active_template(&repo, Morphology::Xx).unwrap();
        assert_eq!(t.id, "user-calibrated");
    }

    #[test]
    fn test_template_put_validates() {
        let repo = MemoryTemplateRepository::new();
        let mut t = ZoneTemplate::builtin(Morphology::Xx).clone();
        t.zones.insert(
            "broken".into(),
            Polygon::new(vec![Point::new(0.0, 0.0)]),
        );
        assert!(matches!(
            repo.put(&t),
            Err(StoreError::InvalidTemplate(_))
        ));
        assert!(repo.get(Morphology::Xx).unwrap().is_none());
    }

    #[test]
    fn test_fit_save_is_upsert() {
        let repo = MemoryFitRepository::new();
        let mut record = MaskFitRecord {
            session_id: "s1".into(),
            photo_id: "p1".into(),
            morphology: Morphology::Xx,
            fit: MaskFit { scale: 1.0, offset_x: 0.0, offset_y: 0.0 },
        };
        repo.save(&record).unwrap();
        record.fit.scale = 0.8;
        repo.save(&record).unwrap();

        let fit = repo.get("s1", "p1", Morphology::Xx).unwrap().unwrap();
        assert_eq!(fit.scale, 0.8);
        assert!(repo.get("s1", "p2", Morphology::Xx).unwrap().is_none());
    }

    #[test]
    fn test_override_roundtrip_and_clear() {
        let repo = MemoryOverrideRepository::new();
        let key = OverrideKey::new("s1", "p1", "chin");
        let poly = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(10.0, 0.0),
            Point::new(5.0, 8.0),
        ]);
        repo.set(&key, &poly).unwrap();
        assert_eq!(repo.get(&key).unwrap(), Some(poly.clone()));

        let listed = repo.list_for_photo("s1", "p1").unwrap();
        assert_eq!(listed, vec![("chin".to_string(), poly)]);

        repo.clear(&key).unwrap();
        assert!(repo.get(&key).unwrap().is_none());
    }
}
