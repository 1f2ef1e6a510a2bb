use crate::engine::{with_timeout, AttendanceEngine, EngineError};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use zbus::interface;

pub const BUS_NAME: &str = "org.rollcall.Rollcall1";
pub const OBJECT_PATH: &str = "/org/rollcall/Rollcall1";

/// D-Bus interface for the rollcall attendance daemon.
///
/// Bus name: org.rollcall.Rollcall1
/// Object path: /org/rollcall/Rollcall1
///
/// Results are returned as JSON strings.
pub struct RollcallService {
    engine: Arc<AttendanceEngine>,
    timeout: Duration,
    threshold: f32,
}

impl RollcallService {
    pub fn new(engine: Arc<AttendanceEngine>, timeout: Duration, threshold: f32) -> Self {
        Self {
            engine,
            timeout,
            threshold,
        }
    }
}

/// Client mistakes become `InvalidArgs`, timeouts `TimedOut`, the rest `Failed`.
fn to_fdo(e: EngineError) -> zbus::fdo::Error {
    if e.is_client_error() {
        return zbus::fdo::Error::InvalidArgs(e.to_string());
    }
    match e {
        EngineError::Timeout(_) => zbus::fdo::Error::TimedOut(e.to_string()),
        e => zbus::fdo::Error::Failed(e.to_string()),
    }
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> zbus::fdo::Result<String> {
    serde_json::to_string(value).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
}

#[interface(name = "org.rollcall.Rollcall1")]
impl RollcallService {
    /// Detect faces in `image` and enroll them under `identity`.
    async fn enroll(&self, identity: &str, image: Vec<u8>) -> zbus::fdo::Result<String> {
        tracing::info!(identity, bytes = image.len(), "enroll requested");
        let outcome = with_timeout(self.timeout, self.engine.enroll(identity, &image))
            .await
            .map_err(|e| {
                tracing::warn!(identity, error = %e, "enroll failed");
                to_fdo(e)
            })?;
        to_json(&outcome)
    }

    /// Recognize every face in `image` and mark attendance. Empty `session` means none.
    async fn recognize(&self, image: Vec<u8>, session: &str) -> zbus::fdo::Result<String> {
        let session = Some(session.trim()).filter(|s| !s.is_empty());
        tracing::info!(bytes = image.len(), session, "recognize requested");
        let results = with_timeout(self.timeout, self.engine.recognize(&image, session))
            .await
            .map_err(|e| {
                tracing::warn!(error = %e, "recognize failed");
                to_fdo(e)
            })?;
        to_json(&results)
    }

    /// List enrolled descriptors, optionally for one identity (empty = all).
    async fn list_descriptors(&self, identity: &str) -> zbus::fdo::Result<String> {
        let identity = Some(identity.trim()).filter(|s| !s.is_empty());
        tracing::debug!(identity, "list_descriptors requested");
        to_json(&self.engine.list_descriptors(identity))
    }

    async fn list_attendance(&self) -> zbus::fdo::Result<String> {
        tracing::debug!("list_attendance requested");
        let marks = self.engine.list_attendance().await.map_err(to_fdo)?;
        to_json(&marks)
    }

    /// Remove one descriptor. Returns false if the id was not found.
    async fn remove_descriptor(&self, id: &str) -> zbus::fdo::Result<bool> {
        tracing::info!(id, "remove_descriptor requested");
        self.engine.remove_descriptor(id).await.map_err(to_fdo)
    }

    /// Remove every descriptor. Returns the number removed.
    async fn clear_descriptors(&self) -> zbus::fdo::Result<u64> {
        tracing::info!("clear_descriptors requested");
        self.engine.clear_descriptors().await.map_err(to_fdo)
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let store = self.engine.store();
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "descriptors": store.len(),
            "descriptorLen": store.descriptor_len(),
            "threshold": self.threshold,
        })
        .to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::{PerSession, SqliteAttendanceRecorder};
    use crate::db;
    use crate::detector::CommandDetector;
    use crate::repository::SqliteDescriptorRepository;
    use crate::store::EmbeddingStore;
    use chrono::{Offset, Utc};
    use rollcall_core::{
        DescriptorError, DetectionError, EnrollmentGuard, EnrollmentPolicy, EuclideanMatcher,
    };

    #[test]
    fn test_error_mapping() {
        let invalid = to_fdo(EngineError::InvalidIdentifier("x".into()));
        assert!(matches!(invalid, zbus::fdo::Error::InvalidArgs(_)));

        let length = to_fdo(EngineError::InvalidDescriptor(DescriptorError::Length {
            expected: 128,
            actual: 3,
        }));
        assert!(matches!(length, zbus::fdo::Error::InvalidArgs(_)));

        let timeout = to_fdo(EngineError::Timeout(Duration::from_secs(10)));
        assert!(matches!(timeout, zbus::fdo::Error::TimedOut(_)));

        let detection = to_fdo(EngineError::DetectionFailed(DetectionError::Failed(
            "corrupt image".into(),
        )));
        let zbus::fdo::Error::Failed(msg) = detection else {
            panic!("expected Failed");
        };
        assert!(msg.contains("corrupt image"));

        let store = to_fdo(EngineError::StoreUnavailable("database is locked".into()));
        assert!(matches!(store, zbus::fdo::Error::Failed(_)));
    }

    #[test]
    fn test_to_json() {
        assert_eq!(to_json(&vec![1, 2]).unwrap(), "[1,2]");
        assert_eq!(to_json(&f32::INFINITY).unwrap(), "null");
    }

    #[tokio::test]
    async fn test_status_and_empty_listings() {
        let conn = db::open_in_memory().await.unwrap();
        let store = Arc::new(EmbeddingStore::new(
            Arc::new(SqliteDescriptorRepository::new(conn.clone())),
            128,
        ));
        let recorder = SqliteAttendanceRecorder::new(conn, Arc::new(PerSession), Utc.fix(), None);
        let detector = CommandDetector::from_command_line(&["rollcall-embed".into()]).unwrap();
        let engine = Arc::new(AttendanceEngine::new(
            store,
            Arc::new(detector),
            Arc::new(recorder),
            Box::new(EuclideanMatcher::new(0.55)),
            EnrollmentGuard::new(EnrollmentPolicy::default()),
        ));
        let service = RollcallService::new(engine, Duration::from_secs(10), 0.55);

        let status: serde_json::Value =
            serde_json::from_str(&service.status().await.unwrap()).unwrap();
        assert_eq!(status["descriptors"], 0);
        assert_eq!(status["descriptorLen"], 128);
        assert!((status["threshold"].as_f64().unwrap() - 0.55).abs() < 1e-6);

        assert_eq!(service.list_descriptors("").await.unwrap(), "[]");
        assert_eq!(service.list_attendance().await.unwrap(), "[]");
        assert!(matches!(
            service.remove_descriptor("nope").await,
            Err(zbus::fdo::Error::InvalidArgs(_))
        ));
    }
}
