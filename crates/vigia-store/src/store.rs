//! SQLite-backed access store.
//!
//! One connection serves the gallery, device directory, grant relation,
//! and audit trail behind the engine's collaborator traits. Reference
//! embeddings are persisted as JSON arrays in the subject row, timestamps
//! as RFC 3339 text. Tables are created on open for fresh databases; there
//! is no migration machinery.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::params;
use std::path::Path;
use thiserror::Error;
use tokio_rusqlite::Connection;
use vigia_core::{
    AccessOutcome, AuditEvent, AuditSink, DeviceDirectory, DeviceRecord, DeviceStatus,
    GalleryEntry, GalleryStore, GrantStore, InfraError, SubjectId, ZoneCode,
};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS zones (
    code        INTEGER PRIMARY KEY,
    name        TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS subjects (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name  TEXT NOT NULL,
    last_name   TEXT NOT NULL,
    job_title   TEXT,
    active      INTEGER NOT NULL DEFAULT 1,
    embeddings  TEXT,
    enrolled_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS devices (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    name          TEXT NOT NULL,
    origin        TEXT NOT NULL UNIQUE,
    zone_code     INTEGER NOT NULL REFERENCES zones(code),
    status        TEXT NOT NULL DEFAULT 'active',
    registered_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS grants (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    subject_id  INTEGER NOT NULL REFERENCES subjects(id),
    zone_code   INTEGER NOT NULL REFERENCES zones(code),
    active      INTEGER NOT NULL DEFAULT 1,
    granted_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL,
    UNIQUE (subject_id, zone_code)
);

CREATE TABLE IF NOT EXISTS events (
    id          TEXT PRIMARY KEY,
    at          TEXT NOT NULL,
    subject_id  INTEGER,
    device_id   INTEGER,
    zone_code   INTEGER,
    outcome     TEXT NOT NULL,
    attempts    INTEGER NOT NULL DEFAULT 1,
    frame       BLOB,
    note        TEXT
);

CREATE INDEX IF NOT EXISTS idx_events_at ON events(at);
"#;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("corrupt embedding column for subject {0}")]
    CorruptEmbedding(SubjectId),
    #[error("corrupt {table} row: {detail}")]
    CorruptRow { table: &'static str, detail: String },
}

impl StoreError {
    fn into_store(self) -> InfraError {
        InfraError::Store(Box::new(self))
    }

    fn into_audit(self) -> InfraError {
        InfraError::Audit(Box::new(self))
    }
}

/// A subject to enroll.
#[derive(Debug, Clone)]
pub struct NewSubject {
    pub first_name: String,
    pub last_name: String,
    pub job_title: Option<String>,
    pub active: bool,
    pub references: Vec<Vec<f32>>,
}

/// A device to register.
#[derive(Debug, Clone)]
pub struct NewDevice {
    pub name: String,
    pub origin: String,
    pub zone: ZoneCode,
    pub status: DeviceStatus,
}

/// Audit counters since midnight UTC.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DailySummary {
    pub total: u64,
    pub granted: u64,
    pub denied: u64,
    pub unidentified: u64,
}

/// A recent audit row, trimmed for display.
#[derive(Debug, Clone, serde::Serialize)]
pub struct EventRow {
    pub at: String,
    pub subject_id: Option<SubjectId>,
    pub outcome: AccessOutcome,
    pub attempts: u32,
    pub note: Option<String>,
}

/// Shared handle to the access database.
#[derive(Clone)]
pub struct AccessStore {
    conn: Connection,
}

impl AccessStore {
    /// Open (creating if needed) the database at the given path.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path.to_path_buf()).await?;
        Self::bootstrap(conn).await
    }

    /// In-memory database, for tests.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().await?;
        Self::bootstrap(conn).await
    }

    async fn bootstrap(conn: Connection) -> Result<Self, StoreError> {
        conn.call(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        tracing::debug!("schema ensured");
        Ok(Self { conn })
    }

    pub async fn add_zone(&self, code: ZoneCode, name: &str) -> Result<(), StoreError> {
        let name = name.to_string();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO zones (code, name) VALUES (?1, ?2)",
                    params![code as i64, name],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn add_subject(&self, subject: NewSubject) -> Result<SubjectId, StoreError> {
        let embeddings = serde_json::to_string(&subject.references)
            .map_err(|e| StoreError::CorruptRow {
                table: "subjects",
                detail: e.to_string(),
            })?;
        let now = Utc::now().to_rfc3339();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO subjects (first_name, last_name, job_title, active, embeddings, enrolled_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        subject.first_name,
                        subject.last_name,
                        subject.job_title,
                        subject.active as i64,
                        embeddings,
                        now
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    pub async fn set_subject_active(
        &self,
        subject: SubjectId,
        active: bool,
    ) -> Result<(), StoreError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "UPDATE subjects SET active = ?2 WHERE id = ?1",
                    params![subject, active as i64],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    pub async fn add_device(&self, device: NewDevice) -> Result<i64, StoreError> {
        let now = Utc::now().to_rfc3339();
        let id = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO devices (name, origin, zone_code, status, registered_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        device.name,
                        device.origin,
                        device.zone as i64,
                        device.status.as_str(),
                        now
                    ],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        Ok(id)
    }

    /// Replace a subject's grant set: every existing row is deactivated,
    /// then the listed zones are (re)activated.
    pub async fn set_grants(
        &self,
        subject: SubjectId,
        zones: Vec<ZoneCode>,
    ) -> Result<(), StoreError> {
        tracing::debug!(subject, zones = ?zones, "replacing grant set");
        let now = Utc::now().to_rfc3339();
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "UPDATE grants SET active = 0, updated_at = ?2 WHERE subject_id = ?1",
                    params![subject, now],
                )?;
                for zone in zones {
                    tx.execute(
                        "INSERT INTO grants (subject_id, zone_code, active, granted_at, updated_at)
                         VALUES (?1, ?2, 1, ?3, ?3)
                         ON CONFLICT (subject_id, zone_code)
                         DO UPDATE SET active = 1, updated_at = excluded.updated_at",
                        params![subject, zone as i64, now],
                    )?;
                }
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    /// Audit counters since midnight UTC.
    pub async fn daily_summary(&self) -> Result<DailySummary, StoreError> {
        // RFC 3339 timestamps with a fixed +00:00 offset compare
        // lexicographically, so a plain string bound works.
        let midnight = format!("{}T00:00:00+00:00", Utc::now().date_naive());
        let summary = self
            .conn
            .call(move |conn| {
                let count = |sql: &str| -> Result<u64, rusqlite::Error> {
                    conn.query_row(sql, params![midnight], |row| row.get::<_, i64>(0))
                        .map(|n| n as u64)
                };
                Ok(DailySummary {
                    total: count("SELECT COUNT(*) FROM events WHERE at >= ?1")?,
                    granted: count(
                        "SELECT COUNT(*) FROM events WHERE at >= ?1 AND outcome = 'GRANTED'",
                    )?,
                    denied: count(
                        "SELECT COUNT(*) FROM events WHERE at >= ?1 AND outcome IN ('DENIED', 'ALERT')",
                    )?,
                    unidentified: count(
                        "SELECT COUNT(*) FROM events WHERE at >= ?1 AND subject_id IS NULL",
                    )?,
                })
            })
            .await?;
        Ok(summary)
    }

    /// Most recent audit rows, newest first.
    pub async fn recent_events(&self, limit: u32) -> Result<Vec<EventRow>, StoreError> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT at, subject_id, outcome, attempts, note
                     FROM events ORDER BY at DESC LIMIT ?1",
                )?;
                let rows = stmt
                    .query_map(params![limit], |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<i64>>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, Option<String>>(4)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await?;

        rows.into_iter()
            .map(|(at, subject_id, outcome, attempts, note)| {
                let outcome =
                    AccessOutcome::parse(&outcome).ok_or_else(|| StoreError::CorruptRow {
                        table: "events",
                        detail: format!("unknown outcome {outcome:?}"),
                    })?;
                Ok(EventRow {
                    at,
                    subject_id,
                    outcome,
                    attempts: attempts as u32,
                    note,
                })
            })
            .collect()
    }
}

#[async_trait]
impl GalleryStore for AccessStore {
    async fn active_subjects(&self) -> Result<Vec<GalleryEntry>, InfraError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, first_name, last_name, embeddings
                     FROM subjects
                     WHERE active = 1 AND embeddings IS NOT NULL
                     ORDER BY id",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(|e| StoreError::from(e).into_store())?;

        rows.into_iter()
            .map(|(id, first, last, embeddings)| {
                let references: Vec<Vec<f32>> = serde_json::from_str(&embeddings)
                    .map_err(|_| StoreError::CorruptEmbedding(id).into_store())?;
                Ok(GalleryEntry {
                    subject_id: id,
                    display_name: format!("{first} {last}"),
                    references,
                })
            })
            .collect()
    }
}

#[async_trait]
impl DeviceDirectory for AccessStore {
    async fn device_by_origin(&self, origin: &str) -> Result<Option<DeviceRecord>, InfraError> {
        let origin = origin.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT d.id, d.name, d.origin, d.zone_code, z.name, d.status
                     FROM devices d JOIN zones z ON z.code = d.zone_code
                     WHERE d.origin = ?1",
                )?;
                let mut rows = stmt
                    .query_map(params![origin], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                            row.get::<_, String>(4)?,
                            row.get::<_, String>(5)?,
                        ))
                    })?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows.pop())
            })
            .await
            .map_err(|e| StoreError::from(e).into_store())?;

        row.map(|(id, name, origin, zone, zone_name, status)| {
            let status = DeviceStatus::parse(&status).ok_or_else(|| {
                StoreError::CorruptRow {
                    table: "devices",
                    detail: format!("unknown status {status:?}"),
                }
                .into_store()
            })?;
            Ok(DeviceRecord {
                id,
                name,
                origin,
                zone: zone as ZoneCode,
                zone_name,
                status,
            })
        })
        .transpose()
    }
}

#[async_trait]
impl GrantStore for AccessStore {
    async fn is_granted(&self, subject: SubjectId, zone: ZoneCode) -> Result<bool, InfraError> {
        let granted = self
            .conn
            .call(move |conn| {
                let granted = conn.query_row(
                    "SELECT EXISTS (
                         SELECT 1 FROM grants
                         WHERE subject_id = ?1 AND zone_code = ?2 AND active = 1
                     )",
                    params![subject, zone as i64],
                    |row| row.get::<_, bool>(0),
                )?;
                Ok(granted)
            })
            .await
            .map_err(|e| StoreError::from(e).into_store())?;
        Ok(granted)
    }
}

#[async_trait]
impl AuditSink for AccessStore {
    async fn record(&self, event: AuditEvent) -> Result<(), InfraError> {
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO events (id, at, subject_id, device_id, zone_code, outcome, attempts, frame, note)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        event.id.to_string(),
                        event.at.to_rfc3339(),
                        event.subject_id,
                        event.device_id,
                        event.zone.map(|z| z as i64),
                        event.outcome.as_str(),
                        event.attempts as i64,
                        event.frame,
                        event.note
                    ],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| StoreError::from(e).into_audit())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    async fn seeded() -> AccessStore {
        let store = AccessStore::open_in_memory().await.unwrap();
        store.add_zone(3, "Laboratorio").await.unwrap();
        store.add_zone(4, "Bodega").await.unwrap();
        store
    }

    fn subject(active: bool) -> NewSubject {
        NewSubject {
            first_name: "Ana".to_string(),
            last_name: "Morales".to_string(),
            job_title: Some("Ingeniera".to_string()),
            active,
            references: vec![vec![1.0, 0.0, 0.0]],
        }
    }

    fn event(
        subject_id: Option<SubjectId>,
        outcome: AccessOutcome,
        at: DateTime<Utc>,
    ) -> AuditEvent {
        AuditEvent {
            id: Uuid::new_v4(),
            at,
            subject_id,
            device_id: Some(1),
            zone: Some(3),
            outcome,
            attempts: 1,
            frame: Some(vec![0xde, 0xad]),
            note: "test".to_string(),
        }
    }

    #[tokio::test]
    async fn test_gallery_lists_only_active_subjects() {
        let store = seeded().await;
        let id = store.add_subject(subject(true)).await.unwrap();
        store.add_subject(subject(false)).await.unwrap();

        let gallery = store.active_subjects().await.unwrap();
        assert_eq!(gallery.len(), 1);
        assert_eq!(gallery[0].subject_id, id);
        assert_eq!(gallery[0].display_name, "Ana Morales");
        assert_eq!(gallery[0].references, vec![vec![1.0, 0.0, 0.0]]);

        store.set_subject_active(id, false).await.unwrap();
        assert!(store.active_subjects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_device_lookup_by_origin() {
        let store = seeded().await;
        let id = store
            .add_device(NewDevice {
                name: "lobby-cam".to_string(),
                origin: "192.168.0.85".to_string(),
                zone: 3,
                status: DeviceStatus::Active,
            })
            .await
            .unwrap();

        let device = store
            .device_by_origin("192.168.0.85")
            .await
            .unwrap()
            .expect("device registered");
        assert_eq!(device.id, id);
        assert_eq!(device.zone, 3);
        assert_eq!(device.zone_name, "Laboratorio");
        assert_eq!(device.status, DeviceStatus::Active);

        assert!(store.device_by_origin("10.0.0.1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_grants_replace_semantics() {
        let store = seeded().await;
        let id = store.add_subject(subject(true)).await.unwrap();

        store.set_grants(id, vec![3]).await.unwrap();
        assert!(store.is_granted(id, 3).await.unwrap());
        assert!(!store.is_granted(id, 4).await.unwrap());

        // Replacing the set deactivates zone 3 and activates zone 4; the
        // old row stays behind as inactive and must not authorize.
        store.set_grants(id, vec![4]).await.unwrap();
        assert!(!store.is_granted(id, 3).await.unwrap());
        assert!(store.is_granted(id, 4).await.unwrap());

        store.set_grants(id, vec![]).await.unwrap();
        assert!(!store.is_granted(id, 4).await.unwrap());
    }

    #[tokio::test]
    async fn test_unknown_subject_has_no_grants() {
        let store = seeded().await;
        assert!(!store.is_granted(999, 3).await.unwrap());
    }

    #[tokio::test]
    async fn test_audit_roundtrip_and_summary() {
        let store = seeded().await;
        let now = Utc::now();

        store.record(event(Some(42), AccessOutcome::Granted, now)).await.unwrap();
        store.record(event(Some(42), AccessOutcome::Denied, now)).await.unwrap();
        store.record(event(Some(42), AccessOutcome::Alert, now)).await.unwrap();
        store.record(event(None, AccessOutcome::NoFace, now)).await.unwrap();

        let summary = store.daily_summary().await.unwrap();
        assert_eq!(summary.total, 4);
        assert_eq!(summary.granted, 1);
        assert_eq!(summary.denied, 2);
        assert_eq!(summary.unidentified, 1);

        let recent = store.recent_events(10).await.unwrap();
        assert_eq!(recent.len(), 4);
        assert!(recent.iter().any(|r| r.outcome == AccessOutcome::NoFace));
    }

    #[tokio::test]
    async fn test_database_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("access.db");

        {
            let store = AccessStore::open(&path).await.unwrap();
            store.add_zone(3, "Laboratorio").await.unwrap();
            let id = store.add_subject(subject(true)).await.unwrap();
            store.set_grants(id, vec![3]).await.unwrap();
        }

        let store = AccessStore::open(&path).await.unwrap();
        let gallery = store.active_subjects().await.unwrap();
        assert_eq!(gallery.len(), 1);
        assert!(store.is_granted(gallery[0].subject_id, 3).await.unwrap());
    }
}
