//! Wire protocol for the capture frontend.
//!
//! Line-delimited JSON over stdio: one request object per line in, one
//! response object per line out. Requests are tagged by `op`, responses
//! by `kind`. Geometry uses the same `[x, y]` point encoding as the
//! persistence schemas.

use serde::{Deserialize, Serialize};

use zonemap_core::{
    CalibrationState, ConfidenceDetails, MaskFit, Morphology, Polygon, Pose, Provenance,
    RawLandmark,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// One detector frame. `seq` is the detector's monotonic sequence
    /// number; frames arriving out of order are treated as stale.
    Frame {
        landmarks: Vec<RawLandmark>,
        #[serde(default)]
        seq: Option<u64>,
    },
    /// Switch the capture pose (changes zone visibility).
    SetPose { pose: Pose },
    /// Select the working session/photo/morphology. Resets calibration
    /// and reloads overrides and the saved mask fit.
    Select {
        session_id: String,
        photo_id: String,
        morphology: Morphology,
    },
    SetOverride { zone_id: String, points: Polygon },
    ClearOverride { zone_id: String },
    /// Compute the mask auto-fit from the last good snapshot and save it.
    SaveFit,
    /// Store a manually adjusted fit verbatim.
    AdjustFit {
        scale: f64,
        offset_x: f64,
        offset_y: f64,
    },
    Calibration,
    Status,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Response {
    Zones {
        zones: Vec<ZoneReport>,
        #[serde(skip_serializing_if = "Option::is_none")]
        fit: Option<MaskFit>,
        calibration: CalibrationReport,
        detection: DetectionStatus,
        /// Non-fatal problems (zone skips, failed persistence) that the
        /// frontend may surface without blanking the display.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    Fit {
        fit: MaskFit,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    Calibration {
        calibration: CalibrationReport,
    },
    Ack {
        message: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    Status {
        version: String,
        instance_id: String,
        session_id: Option<String>,
        photo_id: Option<String>,
        morphology: Option<Morphology>,
        pose: Pose,
        has_snapshot: bool,
        calibration: CalibrationReport,
    },
    Error {
        message: String,
    },
}

/// One resolved zone as the frontend consumes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZoneReport {
    pub zone_id: String,
    pub points: Polygon,
    pub provenance: Provenance,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<ConfidenceDetails>,
}

/// Whether this response was computed from a fresh detection or served
/// from the retained last-good snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionStatus {
    Ok,
    Unavailable,
}

/// Calibration progress as shown in the capture UI.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CalibrationReport {
    pub center: bool,
    pub left: bool,
    pub right: bool,
    pub up: bool,
    pub down: bool,
    pub complete: bool,
    /// Frontal capture is gated on completion.
    pub capture_enabled: bool,
}

impl From<&CalibrationState> for CalibrationReport {
    fn from(state: &CalibrationState) -> Self {
        let complete = state.is_complete();
        Self {
            center: state.center,
            left: state.left,
            right: state.right,
            up: state.up,
            down: state.down,
            complete,
            capture_enabled: complete,
        }
    }
}
