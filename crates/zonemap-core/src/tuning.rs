//! Tunable heuristic constants.
//!
//! The engine's two unexplained-but-load-bearing constants (the
//! vertical scale floor and the position drift gain) plus the auto-fit
//! margin factors live here as a config struct instead of inline magic
//! numbers. Defaults are the calibrated production values; a TOML file
//! can override them for experimentation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TuningError {
    #[error("reading tuning file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("parsing tuning file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("tuning value `{0}` must be finite and positive, got {1}")]
    OutOfRange(&'static str, f64),
}

/// Heuristic constants for zone adaptation, confidence scoring and the
/// mask auto-fit. All values must be finite and positive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tuning {
    /// Floor on the vertical zone scale, as a fraction of the
    /// horizontal scale. Stops zones flattening when the detected face
    /// aspect ratio diverges from canonical.
    pub vertical_scale_floor: f64,
    /// Amplifies centroid drift in the position-accuracy score so small
    /// misplacements remain visible.
    pub position_drift_gain: f64,
    /// Auto-fit horizontal margin, as a fraction of inter-eye distance.
    pub fit_margin_x: f64,
    /// Auto-fit forehead allowance, as a fraction of inter-eye distance.
    pub fit_margin_top: f64,
    /// Auto-fit chin allowance, as a fraction of inter-eye distance.
    pub fit_margin_bottom: f64,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            vertical_scale_floor: 0.85,
            position_drift_gain: 10.0,
            fit_margin_x: 0.9,
            fit_margin_top: 0.65,
            fit_margin_bottom: 0.35,
        }
    }
}

impl Tuning {
    /// Load from a TOML file. Missing fields take the defaults; a
    /// missing file is not an error and yields the defaults.
    pub fn load(path: &Path) -> Result<Self, TuningError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path).map_err(|source| TuningError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let tuning: Tuning = toml::from_str(&raw).map_err(|source| TuningError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        tuning.validate()?;
        Ok(tuning)
    }

    pub fn validate(&self) -> Result<(), TuningError> {
        let fields = [
            ("vertical_scale_floor", self.vertical_scale_floor),
            ("position_drift_gain", self.position_drift_gain),
            ("fit_margin_x", self.fit_margin_x),
            ("fit_margin_top", self.fit_margin_top),
            ("fit_margin_bottom", self.fit_margin_bottom),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(TuningError::OutOfRange(name, value));
            }
        }
        Ok(())
    }
}
