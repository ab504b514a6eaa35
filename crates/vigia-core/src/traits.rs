//! Contracts with the engine's external collaborators.
//!
//! The identity, device, and grant data live in a store the engine does not
//! own; face detection is an opaque capability; the audit trail and the door
//! hardware are downstream sinks. The orchestrator only ever talks to these
//! traits, so every one of them can be faked in tests.

use crate::error::{BoxError, InfraError};
use crate::types::{
    AuditEvent, DetectedFace, DeviceRecord, DoorId, GalleryEntry, SubjectId, ZoneCode,
};
use async_trait::async_trait;

/// Turns raw frame bytes into zero or more detected faces with embeddings.
#[async_trait]
pub trait FaceCapability: Send + Sync {
    async fn detect(&self, frame: &[u8]) -> Result<Vec<DetectedFace>, InfraError>;
}

/// Read-only view of the enrolled, active subjects and their references.
#[async_trait]
pub trait GalleryStore: Send + Sync {
    async fn active_subjects(&self) -> Result<Vec<GalleryEntry>, InfraError>;
}

/// Resolves a network origin to a registered device, if any.
#[async_trait]
pub trait DeviceDirectory: Send + Sync {
    async fn device_by_origin(&self, origin: &str) -> Result<Option<DeviceRecord>, InfraError>;
}

/// Authorization relation: true iff an ACTIVE grant row links the subject
/// to the zone. Inactive rows never authorize.
#[async_trait]
pub trait GrantStore: Send + Sync {
    async fn is_granted(&self, subject: SubjectId, zone: ZoneCode) -> Result<bool, InfraError>;
}

/// Receives exactly one event per validation attempt.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: AuditEvent) -> Result<(), InfraError>;
}

/// Door signal vocabulary as the decision engine sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoorSignal {
    Green,
    Red,
    Blink,
    Alert,
}

/// Pushes a signal to the physical door hardware.
///
/// Best-effort: the orchestrator logs failures and moves on. A dead door
/// link must never change a decision that has already been made.
#[async_trait]
pub trait DoorSignaler: Send + Sync {
    async fn signal(&self, door: DoorId, signal: DoorSignal) -> Result<(), BoxError>;
}
