//! vigia-core — Access decision engine.
//!
//! Takes one detected face, resolves it against the enrolled gallery,
//! checks the zone grant relation, tracks consecutive denials per
//! (origin, subject), and drives the audit trail and door hardware through
//! injected collaborator traits.

pub mod authorize;
pub mod error;
pub mod matcher;
pub mod orchestrator;
pub mod tracker;
pub mod traits;
pub mod types;

pub use error::{BoxError, InfraError};
pub use matcher::{FirstAcceptableMatcher, GalleryMatch, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use orchestrator::{Orchestrator, OrchestratorConfig, DEFAULT_DOOR_OFFSET};
pub use tracker::{AttemptKey, AttemptTracker, TrackerState, DEFAULT_ALERT_THRESHOLD};
pub use traits::{
    AuditSink, DeviceDirectory, DoorSignal, DoorSignaler, FaceCapability, GalleryStore, GrantStore,
};
pub use types::{
    AccessOutcome, AuditEvent, BoundingBox, Decision, DetectedFace, DeviceRecord, DeviceStatus,
    DoorId, GalleryEntry, SubjectId, SubjectInfo, ZoneCode, ZoneInfo,
};
