use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enrolled subject identifier, as assigned by the identity store.
pub type SubjectId = i64;

/// Access-control zone code. Devices and grants both reference zones.
pub type ZoneCode = u8;

/// Physical door number as the controller firmware addresses it.
pub type DoorId = u8;

/// Bounding box for a detected face, in source-image pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// One face found in a captured frame: its embedding and where it sits.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    /// Unit-normalized feature vector produced by the face capability.
    pub embedding: Vec<f32>,
    pub bounding_box: BoundingBox,
}

/// An enrolled subject and its reference embeddings. Read-only to the engine.
#[derive(Debug, Clone)]
pub struct GalleryEntry {
    pub subject_id: SubjectId,
    pub display_name: String,
    pub references: Vec<Vec<f32>>,
}

/// Operational status of a capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    Inactive,
    Maintenance,
}

impl DeviceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Inactive => "inactive",
            DeviceStatus::Maintenance => "maintenance",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(DeviceStatus::Active),
            "inactive" => Some(DeviceStatus::Inactive),
            "maintenance" => Some(DeviceStatus::Maintenance),
            _ => None,
        }
    }
}

/// A registered capture device, resolved from its network origin.
#[derive(Debug, Clone)]
pub struct DeviceRecord {
    pub id: i64,
    pub name: String,
    pub origin: String,
    pub zone: ZoneCode,
    pub zone_name: String,
    pub status: DeviceStatus,
}

/// Outcome of one validation attempt.
///
/// A closed set: the audit writer, the door signal mapping, and the IPC
/// response all match on it exhaustively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessOutcome {
    Granted,
    Denied,
    Alert,
    NoFace,
    MultipleFaces,
    UnknownSubject,
    DeviceNotRegistered,
}

impl AccessOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessOutcome::Granted => "GRANTED",
            AccessOutcome::Denied => "DENIED",
            AccessOutcome::Alert => "ALERT",
            AccessOutcome::NoFace => "NO_FACE",
            AccessOutcome::MultipleFaces => "MULTIPLE_FACES",
            AccessOutcome::UnknownSubject => "UNKNOWN_SUBJECT",
            AccessOutcome::DeviceNotRegistered => "DEVICE_NOT_REGISTERED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "GRANTED" => Some(AccessOutcome::Granted),
            "DENIED" => Some(AccessOutcome::Denied),
            "ALERT" => Some(AccessOutcome::Alert),
            "NO_FACE" => Some(AccessOutcome::NoFace),
            "MULTIPLE_FACES" => Some(AccessOutcome::MultipleFaces),
            "UNKNOWN_SUBJECT" => Some(AccessOutcome::UnknownSubject),
            "DEVICE_NOT_REGISTERED" => Some(AccessOutcome::DeviceNotRegistered),
            _ => None,
        }
    }

    pub fn is_granted(self) -> bool {
        matches!(self, AccessOutcome::Granted)
    }
}

/// Matched subject fields a caller needs to render a response.
#[derive(Debug, Clone, Serialize)]
pub struct SubjectInfo {
    pub id: SubjectId,
    pub display_name: String,
}

/// Zone fields a caller needs to render a response.
#[derive(Debug, Clone, Serialize)]
pub struct ZoneInfo {
    pub code: ZoneCode,
    pub name: String,
}

/// What one validation attempt resolved to.
#[derive(Debug, Clone, Serialize)]
pub struct Decision {
    pub outcome: AccessOutcome,
    pub subject: Option<SubjectInfo>,
    pub zone: Option<ZoneInfo>,
    pub face: Option<BoundingBox>,
    /// Gallery match distance, when a subject was identified.
    pub distance: Option<f32>,
    /// Consecutive-denial count observed by this attempt (1 otherwise).
    pub attempts: u32,
}

/// Immutable record of one decision. Owned by the audit sink once emitted.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub id: Uuid,
    pub at: DateTime<Utc>,
    pub subject_id: Option<SubjectId>,
    pub device_id: Option<i64>,
    pub zone: Option<ZoneCode>,
    pub outcome: AccessOutcome,
    pub attempts: u32,
    /// Raw captured frame, kept for after-the-fact review.
    pub frame: Option<Vec<u8>>,
    pub note: String,
}

/// Scale a vector to unit length in place. A zero vector is left untouched.
pub fn l2_normalize(values: &mut [f32]) {
    let norm: f32 = values.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in values.iter_mut() {
            *v /= norm;
        }
    }
}

/// Euclidean distance between two equal-length vectors.
pub fn euclidean_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y).powi(2))
        .sum::<f32>()
        .sqrt()
}
