//! Decision orchestration: one validation attempt, start to finish.
//!
//! Sequence: face capability, device resolution, gallery match, zone
//! authorization, escalation bookkeeping, one audit event, one best-effort
//! door signal. Expected conditions come back as outcomes; only collaborator
//! faults become errors.

use crate::authorize::authorize;
use crate::error::InfraError;
use crate::matcher::{FirstAcceptableMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
use crate::tracker::{
    AttemptKey, AttemptTracker, TrackerState, DEFAULT_ALERT_THRESHOLD, DEFAULT_IDLE_TTL,
};
use crate::traits::{
    AuditSink, DeviceDirectory, DoorSignal, DoorSignaler, FaceCapability, GalleryStore, GrantStore,
};
use crate::types::{
    AccessOutcome, AuditEvent, BoundingBox, Decision, DeviceRecord, DeviceStatus, SubjectInfo,
    ZoneInfo,
};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Zone code plus this offset addresses the physical door.
pub const DEFAULT_DOOR_OFFSET: u8 = 3;

/// Tunables for one orchestrator instance.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub match_threshold: f32,
    pub alert_threshold: u32,
    pub attempt_ttl: Duration,
    pub door_offset: u8,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            alert_threshold: DEFAULT_ALERT_THRESHOLD,
            attempt_ttl: DEFAULT_IDLE_TTL,
            door_offset: DEFAULT_DOOR_OFFSET,
        }
    }
}

/// Everything one exit path needs to close out the attempt.
struct Verdict<'a> {
    outcome: AccessOutcome,
    subject: Option<SubjectInfo>,
    device: Option<&'a DeviceRecord>,
    face: Option<BoundingBox>,
    distance: Option<f32>,
    attempts: u32,
    note: String,
}

impl<'a> Verdict<'a> {
    fn rejection(outcome: AccessOutcome, note: String) -> Self {
        Self {
            outcome,
            subject: None,
            device: None,
            face: None,
            distance: None,
            attempts: 1,
            note,
        }
    }
}

/// Sequences validation attempts against the injected collaborators.
pub struct Orchestrator {
    faces: Arc<dyn FaceCapability>,
    gallery: Arc<dyn GalleryStore>,
    devices: Arc<dyn DeviceDirectory>,
    grants: Arc<dyn GrantStore>,
    audit: Arc<dyn AuditSink>,
    doors: Arc<dyn DoorSignaler>,
    matcher: FirstAcceptableMatcher,
    tracker: AttemptTracker,
    door_offset: u8,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        faces: Arc<dyn FaceCapability>,
        gallery: Arc<dyn GalleryStore>,
        devices: Arc<dyn DeviceDirectory>,
        grants: Arc<dyn GrantStore>,
        audit: Arc<dyn AuditSink>,
        doors: Arc<dyn DoorSignaler>,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            faces,
            gallery,
            devices,
            grants,
            audit,
            doors,
            matcher: FirstAcceptableMatcher::new(config.match_threshold),
            tracker: AttemptTracker::new(config.alert_threshold, config.attempt_ttl),
            door_offset: config.door_offset,
        }
    }

    /// The attempt tracker, exposed for periodic eviction and status reads.
    pub fn tracker(&self) -> &AttemptTracker {
        &self.tracker
    }

    /// Validate one captured frame from the given origin.
    pub async fn validate(&self, frame: &[u8], origin: &str) -> Result<Decision, InfraError> {
        let detected = self.faces.detect(frame).await?;

        if detected.is_empty() {
            tracing::debug!(origin, "no face in frame");
            let verdict = Verdict::rejection(
                AccessOutcome::NoFace,
                format!("no face detected (origin {origin})"),
            );
            return self.conclude(frame, origin, verdict).await;
        }
        if detected.len() > 1 {
            tracing::debug!(origin, faces = detected.len(), "more than one face in frame");
            let verdict = Verdict::rejection(
                AccessOutcome::MultipleFaces,
                format!("{} faces in frame (origin {origin})", detected.len()),
            );
            return self.conclude(frame, origin, verdict).await;
        }
        let face = &detected[0];

        let device = match self.devices.device_by_origin(origin).await? {
            Some(d) if d.status == DeviceStatus::Active => d,
            Some(d) => {
                tracing::warn!(origin, status = d.status.as_str(), "device not active");
                let verdict = Verdict {
                    face: Some(face.bounding_box),
                    ..Verdict::rejection(
                        AccessOutcome::DeviceNotRegistered,
                        format!("device at {origin} has status {}", d.status.as_str()),
                    )
                };
                return self.conclude(frame, origin, verdict).await;
            }
            None => {
                tracing::warn!(origin, "origin not registered as a device");
                let verdict = Verdict {
                    face: Some(face.bounding_box),
                    ..Verdict::rejection(
                        AccessOutcome::DeviceNotRegistered,
                        format!("{origin} not registered as an active device"),
                    )
                };
                return self.conclude(frame, origin, verdict).await;
            }
        };

        let gallery = self.gallery.active_subjects().await?;
        let Some(m) = self.matcher.match_probe(&face.embedding, &gallery) else {
            tracing::info!(origin, "face matched no enrolled subject");
            let verdict = Verdict {
                device: Some(&device),
                face: Some(face.bounding_box),
                ..Verdict::rejection(
                    AccessOutcome::UnknownSubject,
                    "face matched no enrolled subject".to_string(),
                )
            };
            return self.conclude(frame, origin, verdict).await;
        };

        let display_name = gallery
            .iter()
            .find(|e| e.subject_id == m.subject_id)
            .map(|e| e.display_name.clone())
            .unwrap_or_default();
        let subject = SubjectInfo {
            id: m.subject_id,
            display_name,
        };

        let allowed = authorize(self.grants.as_ref(), m.subject_id, device.zone).await?;
        let key = AttemptKey::new(origin, m.subject_id);

        let (outcome, attempts, note) = if allowed {
            self.tracker.reset(&key);
            (
                AccessOutcome::Granted,
                1,
                format!("access granted to zone {}", device.zone),
            )
        } else {
            let (state, observed) = self.tracker.record_denial(&key, Instant::now());
            match state {
                TrackerState::AlertTriggered => (
                    AccessOutcome::Alert,
                    observed,
                    format!(
                        "alert: {observed} consecutive denials for zone {}",
                        device.zone
                    ),
                ),
                _ => (
                    AccessOutcome::Denied,
                    observed,
                    format!("no grant for zone {}", device.zone),
                ),
            }
        };

        tracing::info!(
            origin,
            subject = m.subject_id,
            zone = device.zone,
            outcome = outcome.as_str(),
            attempts,
            "validation decided"
        );

        let verdict = Verdict {
            outcome,
            subject: Some(subject),
            device: Some(&device),
            face: Some(face.bounding_box),
            distance: Some(m.distance),
            attempts,
            note,
        };
        self.conclude(frame, origin, verdict).await
    }

    /// Emit the audit event, fire the door signal, build the decision.
    ///
    /// Every exit path of `validate` funnels through here, which is what
    /// keeps the audit trail at exactly one event per attempt. The door
    /// signal comes after the audit write and its failure is only logged.
    async fn conclude(
        &self,
        frame: &[u8],
        origin: &str,
        verdict: Verdict<'_>,
    ) -> Result<Decision, InfraError> {
        let event = AuditEvent {
            id: Uuid::new_v4(),
            at: Utc::now(),
            subject_id: verdict.subject.as_ref().map(|s| s.id),
            device_id: verdict.device.map(|d| d.id),
            zone: verdict.device.map(|d| d.zone),
            outcome: verdict.outcome,
            attempts: verdict.attempts,
            frame: Some(frame.to_vec()),
            note: verdict.note,
        };
        if let Err(e) = self.audit.record(event).await {
            tracing::error!(origin, error = %e, "audit write failed");
            return Err(e);
        }

        if let (Some(signal), Some(device)) = (door_signal_for(verdict.outcome), verdict.device) {
            match device.zone.checked_add(self.door_offset) {
                Some(door) => {
                    if let Err(e) = self.doors.signal(door, signal).await {
                        tracing::warn!(door, ?signal, error = %e, "door signal failed");
                    }
                }
                None => {
                    tracing::error!(
                        zone = device.zone,
                        offset = self.door_offset,
                        "door number overflows; no signal sent"
                    );
                }
            }
        }

        Ok(Decision {
            outcome: verdict.outcome,
            subject: verdict.subject,
            zone: verdict.device.map(|d| ZoneInfo {
                code: d.zone,
                name: d.zone_name.clone(),
            }),
            face: verdict.face,
            distance: verdict.distance,
            attempts: verdict.attempts,
        })
    }
}

/// Hardware signal matching an outcome. Pre-decision rejections drive no
/// hardware at all.
fn door_signal_for(outcome: AccessOutcome) -> Option<DoorSignal> {
    match outcome {
        AccessOutcome::Granted => Some(DoorSignal::Green),
        AccessOutcome::Denied => Some(DoorSignal::Red),
        AccessOutcome::Alert => Some(DoorSignal::Alert),
        AccessOutcome::NoFace
        | AccessOutcome::MultipleFaces
        | AccessOutcome::UnknownSubject
        | AccessOutcome::DeviceNotRegistered => None,
    }
}
