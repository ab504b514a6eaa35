use std::path::PathBuf;
use std::time::Duration;

/// Daemon configuration, loaded from environment variables.
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Path to the face pipeline ONNX model.
    pub model_path: PathBuf,
    /// Optional TOML file describing the door controller layout.
    pub actuator_layout: Option<PathBuf>,
    /// Euclidean distance threshold for a gallery match.
    pub match_threshold: f32,
    /// Detection score threshold for the face pipeline.
    pub face_confidence: f32,
    /// Consecutive denials that fire an alert.
    pub alert_threshold: u32,
    /// Idle window after which attempt counters are evicted.
    pub attempt_ttl: Duration,
    /// How often the eviction task runs.
    pub evict_interval: Duration,
    /// Zone code plus this offset addresses the physical door.
    pub door_offset: u8,
}

impl Config {
    /// Load configuration from `VIGIA_*` environment variables with
    /// defaults.
    pub fn from_env() -> Self {
        let data_dir = std::env::var("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("vigia");

        let db_path = std::env::var("VIGIA_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("access.db"));

        let model_path = std::env::var("VIGIA_MODEL_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("models/face_pipeline.onnx"));

        Self {
            db_path,
            model_path,
            actuator_layout: std::env::var("VIGIA_ACTUATOR_LAYOUT").ok().map(PathBuf::from),
            match_threshold: env_f32(
                "VIGIA_MATCH_THRESHOLD",
                vigia_core::DEFAULT_MATCH_THRESHOLD,
            ),
            face_confidence: env_f32(
                "VIGIA_FACE_CONFIDENCE",
                vigia_face::DEFAULT_CONFIDENCE_THRESHOLD,
            ),
            alert_threshold: env_u32("VIGIA_ALERT_THRESHOLD", vigia_core::DEFAULT_ALERT_THRESHOLD),
            attempt_ttl: Duration::from_secs(env_u64("VIGIA_ATTEMPT_TTL_SECS", 86_400)),
            evict_interval: Duration::from_secs(env_u64("VIGIA_EVICT_INTERVAL_SECS", 3_600)),
            door_offset: env_u8("VIGIA_DOOR_OFFSET", vigia_core::DEFAULT_DOOR_OFFSET),
        }
    }
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u8(key: &str, default: u8) -> u8 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
