//! zonemap-core — Facial zone geometry and calibration engine.
//!
//! Adapts hand-calibrated anatomical zone templates onto detected faces
//! (MediaPipe Face Mesh landmarks), scores the adaptation, computes a
//! global mask auto-fit, resolves user overrides and gates capture
//! behind a five-pose calibration flow. All computation is pure and
//! frame-driven; persistence is injected through the `store` traits.

pub mod adapter;
pub mod autofit;
pub mod calibration;
pub mod confidence;
pub mod engine;
pub mod geometry;
pub mod landmarks;
pub mod overrides;
pub mod store;
pub mod template;
pub mod topology;
pub mod tuning;
pub mod visibility;

pub use adapter::{AdaptOutcome, AdaptedZone, ZoneAdaptError};
pub use autofit::{FitError, KeyPoints, MaskFit};
pub use calibration::CalibrationState;
pub use confidence::ConfidenceDetails;
pub use engine::{compute_zones, FrameResult, ZoneGeometry};
pub use geometry::{Point, Polygon, Rect};
pub use landmarks::{LandmarkSet, NormalizeError, RawLandmark};
pub use overrides::{EffectiveGeometry, OverrideKey, OverrideSet, Provenance};
pub use template::{Morphology, TemplateError, ZoneTemplate};
pub use tuning::Tuning;
pub use visibility::Pose;
