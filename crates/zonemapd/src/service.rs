//! The session engine thread.
//!
//! One dedicated OS thread owns all mutable session state — the last
//! good landmark snapshot, calibration progress, the loaded template,
//! overrides and the saved mask fit — plus the store connection.
//! Requests arrive over a bounded channel and are answered over
//! oneshot replies, keeping all blocking store work off the async
//! runtime.

use std::collections::HashSet;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

use zonemap_core::store::{
    active_template, FitRepository, LandmarkRepository, MaskFitRecord, OverrideRepository,
    TemplateRepository,
};
use zonemap_core::{
    autofit, compute_zones, CalibrationState, KeyPoints, LandmarkSet, MaskFit, Morphology,
    OverrideKey, OverrideSet, Pose, RawLandmark, Tuning, ZoneAdaptError, ZoneTemplate,
};

use crate::protocol::{DetectionStatus, Request, Response, ZoneReport};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("service thread exited")]
    ChannelClosed,
}

struct Envelope {
    request: Request,
    reply: oneshot::Sender<Response>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct ServiceHandle {
    tx: mpsc::Sender<Envelope>,
}

impl ServiceHandle {
    pub async fn call(&self, request: Request) -> Result<Response, ServiceError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Envelope {
                request,
                reply: reply_tx,
            })
            .await
            .map_err(|_| ServiceError::ChannelClosed)?;
        reply_rx.await.map_err(|_| ServiceError::ChannelClosed)
    }
}

#[derive(Clone)]
struct Selection {
    session_id: String,
    photo_id: String,
    morphology: Morphology,
}

struct Session<S> {
    store: S,
    tuning: Tuning,
    min_frame_interval: Duration,
    instance_id: String,
    selection: Option<Selection>,
    template: Option<ZoneTemplate>,
    pose: Pose,
    /// Last successful snapshot; retained across failed detections so
    /// the display never blanks.
    snapshot: Option<LandmarkSet>,
    calibration: CalibrationState,
    fit: Option<MaskFit>,
    overrides: OverrideSet,
    /// Zones already warned about for invalid anchors this session.
    warned_zones: HashSet<String>,
    last_frame_at: Option<Instant>,
    last_seq: Option<u64>,
    last_zones: Option<Response>,
}

/// Spawn the engine on a dedicated OS thread and return its handle.
pub fn spawn_service<S>(store: S, tuning: Tuning, min_frame_interval: Duration) -> ServiceHandle
where
    S: TemplateRepository
        + FitRepository
        + OverrideRepository
        + LandmarkRepository
        + Send
        + 'static,
{
    let (tx, mut rx) = mpsc::channel::<Envelope>(16);

    let mut session = Session {
        store,
        tuning,
        min_frame_interval,
        instance_id: uuid::Uuid::new_v4().to_string(),
        selection: None,
        template: None,
        pose: Pose::Face,
        snapshot: None,
        calibration: CalibrationState::new(),
        fit: None,
        overrides: OverrideSet::new(),
        warned_zones: HashSet::new(),
        last_frame_at: None,
        last_seq: None,
        last_zones: None,
    };

    std::thread::Builder::new()
        .name("zonemap-engine".into())
        .spawn(move || {
            tracing::info!(instance = %session.instance_id, "engine thread started");
            while let Some(env) = rx.blocking_recv() {
                let response = session.handle(env.request);
                let _ = env.reply.send(response);
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    ServiceHandle { tx }
}

impl<S> Session<S>
where
    S: TemplateRepository + FitRepository + OverrideRepository + LandmarkRepository,
{
    fn handle(&mut self, request: Request) -> Response {
        match request {
            Request::Frame { landmarks, seq } => self.on_frame(&landmarks, seq),
            Request::SetPose { pose } => self.on_set_pose(pose),
            Request::Select {
                session_id,
                photo_id,
                morphology,
            } => self.on_select(session_id, photo_id, morphology),
            Request::SetOverride { zone_id, points } => self.on_set_override(zone_id, points),
            Request::ClearOverride { zone_id } => self.on_clear_override(zone_id),
            Request::SaveFit => self.on_save_fit(),
            Request::AdjustFit {
                scale,
                offset_x,
                offset_y,
            } => self.on_adjust_fit(scale, offset_x, offset_y),
            Request::Calibration => Response::Calibration {
                calibration: (&self.calibration).into(),
            },
            Request::Status => self.on_status(),
        }
    }

    fn on_frame(&mut self, landmarks: &[RawLandmark], seq: Option<u64>) -> Response {
        let Some(selection) = self.selection.clone() else {
            return Response::Error {
                message: "no session selected".into(),
            };
        };

        // Rate cap: frames above the configured rate are dropped and
        // answered from the last computed result.
        if let (Some(last), Some(cached)) = (self.last_frame_at, self.last_zones.as_ref()) {
            if last.elapsed() < self.min_frame_interval {
                return cached.clone();
            }
        }
        self.last_frame_at = Some(Instant::now());

        let mut warnings = Vec::new();

        // A non-advancing detector sequence means the detector is still
        // warming up; treat the frame as no-face.
        let stale = match (seq, self.last_seq) {
            (Some(s), Some(prev)) if s <= prev => true,
            _ => false,
        };
        if let Some(s) = seq {
            if !stale {
                self.last_seq = Some(s);
            }
        }

        let detection = if stale {
            DetectionStatus::Unavailable
        } else {
            match LandmarkSet::normalize(landmarks) {
                Ok(set) => {
                    if self.pose == Pose::Face {
                        self.calibration.observe(&set);
                    }
                    if let Err(e) = LandmarkRepository::put(
                        &self.store,
                        &selection.session_id,
                        &selection.photo_id,
                        &set,
                    ) {
                        tracing::warn!(error = %e, "landmark cache write failed");
                        warnings.push(format!("landmark cache write failed: {e}"));
                    }
                    self.snapshot = Some(set);
                    DetectionStatus::Ok
                }
                Err(e) => {
                    tracing::debug!(error = %e, "frame without usable landmarks");
                    DetectionStatus::Unavailable
                }
            }
        };

        let response = self.zones_response(&selection, detection, warnings);
        self.last_zones = Some(response.clone());
        response
    }

    /// Compute the current zone set from whatever the session has:
    /// the retained snapshot, the saved fit, or the bare template.
    fn zones_response(
        &mut self,
        selection: &Selection,
        detection: DetectionStatus,
        mut warnings: Vec<String>,
    ) -> Response {
        let template = match self.template.as_ref() {
            Some(t) => t,
            None => ZoneTemplate::builtin(selection.morphology),
        };

        let result = compute_zones(
            self.snapshot.as_ref(),
            template,
            &self.overrides,
            self.fit.as_ref(),
            self.pose,
            &selection.session_id,
            &selection.photo_id,
            &self.tuning,
        );

        for err in &result.skipped {
            if let ZoneAdaptError::InvalidAnchorIndex { zone_id, index } = err {
                // warn once per zone per session; repeats stay at debug
                if self.warned_zones.insert(zone_id.clone()) {
                    tracing::warn!(zone = %zone_id, index, "template anchor outside topology");
                }
            }
            warnings.push(err.to_string());
        }

        Response::Zones {
            zones: result
                .zones
                .into_iter()
                .map(|z| ZoneReport {
                    zone_id: z.zone_id,
                    points: z.polygon,
                    provenance: z.provenance,
                    confidence: z.confidence,
                })
                .collect(),
            fit: self.fit,
            calibration: (&self.calibration).into(),
            detection,
            warnings,
        }
    }

    fn on_set_pose(&mut self, pose: Pose) -> Response {
        self.pose = pose;
        self.last_zones = None;
        match self.selection.clone() {
            Some(selection) => self.zones_response(
                &selection,
                if self.snapshot.is_some() {
                    DetectionStatus::Ok
                } else {
                    DetectionStatus::Unavailable
                },
                Vec::new(),
            ),
            None => Response::Ack {
                message: format!("pose set to {pose}"),
                warnings: Vec::new(),
            },
        }
    }

    fn on_select(
        &mut self,
        session_id: String,
        photo_id: String,
        morphology: Morphology,
    ) -> Response {
        let mut warnings = Vec::new();

        let template = match active_template(&self.store, morphology) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(error = %e, "template load failed; using builtin");
                warnings.push(format!("template load failed: {e}"));
                ZoneTemplate::builtin(morphology).clone()
            }
        };

        let fit = match FitRepository::get(&self.store, &session_id, &photo_id, morphology) {
            Ok(f) => f,
            Err(e) => {
                warnings.push(format!("mask fit load failed: {e}"));
                None
            }
        };

        let mut overrides = OverrideSet::new();
        match self.store.list_for_photo(&session_id, &photo_id) {
            Ok(entries) => {
                for (zone_id, polygon) in entries {
                    let key = OverrideKey::new(session_id.clone(), photo_id.clone(), zone_id);
                    if let Err(e) = overrides.set(key, polygon) {
                        tracing::warn!(error = %e, "stored override is degenerate; ignored");
                    }
                }
            }
            Err(e) => warnings.push(format!("override load failed: {e}")),
        }

        tracing::info!(
            session = %session_id,
            photo = %photo_id,
            morphology = %morphology,
            "selection changed"
        );

        self.selection = Some(Selection {
            session_id,
            photo_id,
            morphology,
        });
        self.template = Some(template);
        self.fit = fit;
        self.overrides = overrides;
        // A new selection is a new capture flow: calibration restarts.
        self.calibration.reset();
        self.snapshot = None;
        self.warned_zones.clear();
        self.last_frame_at = None;
        self.last_seq = None;
        self.last_zones = None;

        Response::Ack {
            message: "selection updated".into(),
            warnings,
        }
    }

    fn on_set_override(&mut self, zone_id: String, points: zonemap_core::Polygon) -> Response {
        let Some(selection) = self.selection.clone() else {
            return Response::Error {
                message: "no session selected".into(),
            };
        };
        let key = OverrideKey::new(
            selection.session_id.clone(),
            selection.photo_id.clone(),
            zone_id.clone(),
        );

        if let Err(e) = self.overrides.set(key.clone(), points.clone()) {
            return Response::Error {
                message: e.to_string(),
            };
        }

        // Persistence failure never rolls back the in-memory override;
        // the save is retryable.
        let mut warnings = Vec::new();
        if let Err(e) = OverrideRepository::set(&self.store, &key, &points) {
            tracing::warn!(zone = %zone_id, error = %e, "override save failed");
            warnings.push(format!("override save failed: {e}"));
        }
        self.last_zones = None;

        Response::Ack {
            message: format!("override set for `{zone_id}`"),
            warnings,
        }
    }

    fn on_clear_override(&mut self, zone_id: String) -> Response {
        let Some(selection) = self.selection.clone() else {
            return Response::Error {
                message: "no session selected".into(),
            };
        };
        let key = OverrideKey::new(selection.session_id, selection.photo_id, zone_id.clone());
        self.overrides.clear(&key);

        let mut warnings = Vec::new();
        if let Err(e) = OverrideRepository::clear(&self.store, &key) {
            warnings.push(format!("override delete failed: {e}"));
        }
        self.last_zones = None;

        Response::Ack {
            message: format!("override cleared for `{zone_id}`"),
            warnings,
        }
    }

    fn on_save_fit(&mut self) -> Response {
        let Some(selection) = self.selection.clone() else {
            return Response::Error {
                message: "no session selected".into(),
            };
        };
        let Some(snapshot) = self.snapshot.as_ref() else {
            return Response::Error {
                message: "detection unavailable: no landmark snapshot yet".into(),
            };
        };
        let template = match self.template.as_ref() {
            Some(t) => t,
            None => ZoneTemplate::builtin(selection.morphology),
        };

        let keys = match KeyPoints::from_landmarks(snapshot) {
            Ok(k) => k,
            Err(e) => {
                return Response::Error {
                    message: e.to_string(),
                }
            }
        };

        match autofit::compute_mask_fit(&keys, &template.mask, &self.tuning) {
            Ok(fit) => {
                self.fit = Some(fit);
                self.last_zones = None;
                let warnings = self.persist_fit(&selection, fit);
                Response::Fit { fit, warnings }
            }
            // A collapsed reference box keeps the previous fit unchanged.
            Err(e) => match self.fit {
                Some(previous) => Response::Fit {
                    fit: previous,
                    warnings: vec![format!("auto-fit failed, keeping previous fit: {e}")],
                },
                None => Response::Error {
                    message: e.to_string(),
                },
            },
        }
    }

    fn on_adjust_fit(&mut self, scale: f64, offset_x: f64, offset_y: f64) -> Response {
        let Some(selection) = self.selection.clone() else {
            return Response::Error {
                message: "no session selected".into(),
            };
        };
        if !scale.is_finite() || scale <= 0.0 {
            return Response::Error {
                message: format!("fit scale must be finite and positive, got {scale}"),
            };
        }
        let fit = MaskFit {
            scale,
            offset_x,
            offset_y,
        };
        self.fit = Some(fit);
        self.last_zones = None;
        let warnings = self.persist_fit(&selection, fit);
        Response::Fit { fit, warnings }
    }

    fn persist_fit(&self, selection: &Selection, fit: MaskFit) -> Vec<String> {
        let record = MaskFitRecord {
            session_id: selection.session_id.clone(),
            photo_id: selection.photo_id.clone(),
            morphology: selection.morphology,
            fit,
        };
        match self.store.save(&record) {
            Ok(()) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "mask fit save failed");
                vec![format!("mask fit save failed: {e}")]
            }
        }
    }

    fn on_status(&self) -> Response {
        Response::Status {
            version: env!("CARGO_PKG_VERSION").to_string(),
            instance_id: self.instance_id.clone(),
            session_id: self.selection.as_ref().map(|s| s.session_id.clone()),
            photo_id: self.selection.as_ref().map(|s| s.photo_id.clone()),
            morphology: self.selection.as_ref().map(|s| s.morphology),
            pose: self.pose,
            has_snapshot: self.snapshot.is_some(),
            calibration: (&self.calibration).into(),
        }
    }
}
