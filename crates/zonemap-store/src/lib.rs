//! zonemap-store — SQLite persistence for the zone engine.
//!
//! Implements the `zonemap-core` repository traits over a single
//! SQLite database. Every write is an idempotent natural-key upsert;
//! mask fits carry a save timestamp and the latest save is
//! authoritative. Polygons and landmark sets are stored as JSON
//! documents inside the rows, matching the wire schemas.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use zonemap_core::store::{
    FitRepository, LandmarkRepository, MaskFitRecord, OverrideRepository, StoreError,
    TemplateRepository,
};
use zonemap_core::{LandmarkSet, MaskFit, Morphology, OverrideKey, Polygon, ZoneTemplate};

#[derive(Error, Debug)]
pub enum DbError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("corrupt stored document: {0}")]
    Corrupt(#[from] serde_json::Error),
}

impl From<DbError> for StoreError {
    fn from(e: DbError) -> Self {
        StoreError::Backend(e.to_string())
    }
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS templates (
    morphology  TEXT PRIMARY KEY,
    document    TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS mask_fits (
    session_id  TEXT NOT NULL,
    photo_id    TEXT NOT NULL,
    model       TEXT NOT NULL,
    scale       REAL NOT NULL,
    offset_x    REAL NOT NULL,
    offset_y    REAL NOT NULL,
    saved_at    TEXT NOT NULL,
    PRIMARY KEY (session_id, photo_id, model)
);

CREATE TABLE IF NOT EXISTS zone_overrides (
    session_id  TEXT NOT NULL,
    photo_id    TEXT NOT NULL,
    zone_id     TEXT NOT NULL,
    points      TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    PRIMARY KEY (session_id, photo_id, zone_id)
);

CREATE TABLE IF NOT EXISTS landmark_cache (
    session_id   TEXT NOT NULL,
    photo_id     TEXT NOT NULL,
    document     TEXT NOT NULL,
    eye_distance REAL NOT NULL,
    face_width   REAL NOT NULL,
    face_height  REAL NOT NULL,
    nose_width   REAL NOT NULL,
    mouth_width  REAL NOT NULL,
    saved_at     TEXT NOT NULL,
    PRIMARY KEY (session_id, photo_id)
);
";

/// A SQLite-backed store implementing all four repository traits.
///
/// Single-connection by design: the daemon's engine thread owns the
/// store exclusively, so there is no connection pool and no locking
/// beyond SQLite's own.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `path` and apply the schema.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        tracing::info!(path = %path.display(), "store opened");
        Ok(Self { conn })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }
}

impl TemplateRepository for Store {
    fn get(&self, morphology: Morphology) -> Result<Option<ZoneTemplate>, StoreError> {
        let row: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM templates WHERE morphology = ?1",
                params![morphology.to_string()],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::from)?;
        match row {
            Some(doc) => {
                let template = serde_json::from_str(&doc).map_err(DbError::from)?;
                Ok(Some(template))
            }
            None => Ok(None),
        }
    }

    fn put(&self, template: &ZoneTemplate) -> Result<(), StoreError> {
        template.validate()?;
        let doc = serde_json::to_string(template).map_err(DbError::from)?;
        self.conn
            .execute(
                "INSERT INTO templates (morphology, document, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(morphology) DO UPDATE SET
                     document = excluded.document,
                     updated_at = excluded.updated_at",
                params![template.morphology.to_string(), doc, Utc::now().to_rfc3339()],
            )
            .map_err(DbError::from)?;
        tracing::info!(morphology = %template.morphology, "template saved");
        Ok(())
    }
}

impl FitRepository for Store {
    fn get(
        &self,
        session_id: &str,
        photo_id: &str,
        morphology: Morphology,
    ) -> Result<Option<MaskFit>, StoreError> {
        let fit = self
            .conn
            .query_row(
                "SELECT scale, offset_x, offset_y FROM mask_fits
                 WHERE session_id = ?1 AND photo_id = ?2 AND model = ?3",
                params![session_id, photo_id, morphology.to_string()],
                |row| {
                    Ok(MaskFit {
                        scale: row.get(0)?,
                        offset_x: row.get(1)?,
                        offset_y: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(DbError::from)?;
        Ok(fit)
    }

    fn save(&self, record: &MaskFitRecord) -> Result<(), StoreError> {
        self.conn
            .execute(
                "INSERT INTO mask_fits
                     (session_id, photo_id, model, scale, offset_x, offset_y, saved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(session_id, photo_id, model) DO UPDATE SET
                     scale = excluded.scale,
                     offset_x = excluded.offset_x,
                     offset_y = excluded.offset_y,
                     saved_at = excluded.saved_at",
                params![
                    record.session_id,
                    record.photo_id,
                    record.morphology.to_string(),
                    record.fit.scale,
                    record.fit.offset_x,
                    record.fit.offset_y,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(DbError::from)?;
        Ok(())
    }
}

impl OverrideRepository for Store {
    fn get(&self, key: &OverrideKey) -> Result<Option<Polygon>, StoreError> {
        let row: Option<String> = self
            .conn
            .query_row(
                "SELECT points FROM zone_overrides
                 WHERE session_id = ?1 AND photo_id = ?2 AND zone_id = ?3",
                params![key.session_id, key.photo_id, key.zone_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::from)?;
        match row {
            Some(points) => Ok(Some(
                serde_json::from_str(&points).map_err(DbError::from)?,
            )),
            None => Ok(None),
        }
    }

    fn set(&self, key: &OverrideKey, polygon: &Polygon) -> Result<(), StoreError> {
        let points = serde_json::to_string(polygon).map_err(DbError::from)?;
        self.conn
            .execute(
                "INSERT INTO zone_overrides
                     (session_id, photo_id, zone_id, points, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(session_id, photo_id, zone_id) DO UPDATE SET
                     points = excluded.points,
                     updated_at = excluded.updated_at",
                params![
                    key.session_id,
                    key.photo_id,
                    key.zone_id,
                    points,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(DbError::from)?;
        Ok(())
    }

    fn clear(&self, key: &OverrideKey) -> Result<(), StoreError> {
        self.conn
            .execute(
                "DELETE FROM zone_overrides
                 WHERE session_id = ?1 AND photo_id = ?2 AND zone_id = ?3",
                params![key.session_id, key.photo_id, key.zone_id],
            )
            .map_err(DbError::from)?;
        Ok(())
    }

    fn list_for_photo(
        &self,
        session_id: &str,
        photo_id: &str,
    ) -> Result<Vec<(String, Polygon)>, StoreError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT zone_id, points FROM zone_overrides
                 WHERE session_id = ?1 AND photo_id = ?2
                 ORDER BY zone_id",
            )
            .map_err(DbError::from)?;
        let rows = stmt
            .query_map(params![session_id, photo_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(DbError::from)?;

        let mut out = Vec::new();
        for row in rows {
            let (zone_id, points) = row.map_err(DbError::from)?;
            let polygon = serde_json::from_str(&points).map_err(DbError::from)?;
            out.push((zone_id, polygon));
        }
        Ok(out)
    }
}

impl LandmarkRepository for Store {
    fn get(&self, session_id: &str, photo_id: &str) -> Result<Option<LandmarkSet>, StoreError> {
        let row: Option<String> = self
            .conn
            .query_row(
                "SELECT document FROM landmark_cache
                 WHERE session_id = ?1 AND photo_id = ?2",
                params![session_id, photo_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(DbError::from)?;
        match row {
            Some(doc) => Ok(Some(serde_json::from_str(&doc).map_err(DbError::from)?)),
            None => Ok(None),
        }
    }

    fn put(
        &self,
        session_id: &str,
        photo_id: &str,
        landmarks: &LandmarkSet,
    ) -> Result<(), StoreError> {
        let doc = serde_json::to_string(landmarks).map_err(DbError::from)?;
        self.conn
            .execute(
                "INSERT INTO landmark_cache
                     (session_id, photo_id, document, eye_distance, face_width,
                      face_height, nose_width, mouth_width, saved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(session_id, photo_id) DO UPDATE SET
                     document = excluded.document,
                     eye_distance = excluded.eye_distance,
                     face_width = excluded.face_width,
                     face_height = excluded.face_height,
                     nose_width = excluded.nose_width,
                     mouth_width = excluded.mouth_width,
                     saved_at = excluded.saved_at",
                params![
                    session_id,
                    photo_id,
                    doc,
                    landmarks.inter_eye_distance,
                    landmarks.face_width,
                    landmarks.face_height,
                    landmarks.nose_width,
                    landmarks.mouth_width,
                    Utc::now().to_rfc3339(),
                ],
            )
            .map_err(DbError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zonemap_core::Point;

    fn triangle() -> Polygon {
        Polygon::new(vec![
            Point::new(10.0, 10.0),
            Point::new(20.0, 10.0),
            Point::new(15.0, 20.0),
        ])
    }

    fn synthetic_landmarks() -> LandmarkSet {
        let raw = vec![
            zonemap_core::RawLandmark::new(0.5, 0.5);
            zonemap_core::topology::MESH_LANDMARK_COUNT
        ];
        LandmarkSet::normalize(&raw).unwrap()
    }

    #[test]
    fn test_template_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        assert!(TemplateRepository::get(&store, Morphology::Xx)
            .unwrap()
            .is_none());

        let template = ZoneTemplate::builtin(Morphology::Xx).clone();
        TemplateRepository::put(&store, &template).unwrap();
        let back = TemplateRepository::get(&store, Morphology::Xx)
            .unwrap()
            .unwrap();
        assert_eq!(back, template);
    }

    #[test]
    fn test_template_put_rejects_degenerate() {
        let store = Store::open_in_memory().unwrap();
        let mut template = ZoneTemplate::builtin(Morphology::Xx).clone();
        template
            .zones
            .insert("broken".into(), Polygon::new(vec![Point::new(0.0, 0.0)]));
        assert!(matches!(
            TemplateRepository::put(&store, &template),
            Err(StoreError::InvalidTemplate(_))
        ));
    }

    #[test]
    fn test_fit_upsert_latest_wins() {
        let store = Store::open_in_memory().unwrap();
        let mut record = MaskFitRecord {
            session_id: "s1".into(),
            photo_id: "p1".into(),
            morphology: Morphology::Xy,
            fit: MaskFit { scale: 1.0, offset_x: 0.0, offset_y: 0.0 },
        };
        store.save(&record).unwrap();
        record.fit = MaskFit { scale: 0.75, offset_x: 3.0, offset_y: -1.0 };
        store.save(&record).unwrap();

        let fit = FitRepository::get(&store, "s1", "p1", Morphology::Xy)
            .unwrap()
            .unwrap();
        assert_eq!(fit.scale, 0.75);
        assert_eq!(fit.offset_x, 3.0);
        // Different morphology is a different fit.
        assert!(FitRepository::get(&store, "s1", "p1", Morphology::Xx)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_override_unique_per_triple() {
        let store = Store::open_in_memory().unwrap();
        let key = OverrideKey::new("s1", "p1", "chin");
        store.set(&key, &triangle()).unwrap();

        let replacement = Polygon::new(vec![
            Point::new(0.0, 0.0),
            Point::new(9.0, 0.0),
            Point::new(9.0, 9.0),
            Point::new(0.0, 9.0),
        ]);
        store.set(&key, &replacement).unwrap();

        let listed = store.list_for_photo("s1", "p1").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].1, replacement);

        store.clear(&key).unwrap();
        assert!(OverrideRepository::get(&store, &key).unwrap().is_none());
        // Clearing again is a harmless no-op (idempotent).
        store.clear(&key).unwrap();
    }

    #[test]
    fn test_list_for_photo_scoped() {
        let store = Store::open_in_memory().unwrap();
        store
            .set(&OverrideKey::new("s1", "p1", "chin"), &triangle())
            .unwrap();
        store
            .set(&OverrideKey::new("s1", "p2", "nose"), &triangle())
            .unwrap();
        store
            .set(&OverrideKey::new("s2", "p1", "forehead"), &triangle())
            .unwrap();

        let listed = store.list_for_photo("s1", "p1").unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].0, "chin");
    }

    #[test]
    fn test_landmark_cache_roundtrip() {
        let store = Store::open_in_memory().unwrap();
        let set = synthetic_landmarks();
        LandmarkRepository::put(&store, "s1", "p1", &set).unwrap();
        let back = LandmarkRepository::get(&store, "s1", "p1")
            .unwrap()
            .unwrap();
        assert_eq!(back, set);
        assert!(LandmarkRepository::get(&store, "s1", "p2")
            .unwrap()
            .is_none());
    }
}
