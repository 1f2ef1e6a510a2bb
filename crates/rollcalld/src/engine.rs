use crate::attendance::{AttendanceError, AttendanceMark, AttendanceOutcome, AttendanceRecorder};
use crate::store::{EmbeddingStore, StoreError};
use rollcall_core::{
    DescriptorError, DescriptorId, DetectionAdapter, DetectionError, Embedding, EnrollmentError,
    EnrollmentGuard, EnrollmentPlan, FaceDescriptor, Matcher,
};
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Attendance error text for an identity that is already marked.
pub const ALREADY_MARKED: &str = "attendance already marked";
/// Enrollment message when the image holds no face.
pub const NO_FACES_DETECTED: &str = "no faces detected";

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    InvalidDescriptor(#[from] DescriptorError),
    #[error("invalid descriptor id: '{0}'")]
    InvalidIdentifier(String),
    #[error("identity must not be empty")]
    InvalidIdentity,
    #[error("identity '{0}' already has enrolled descriptors")]
    IdentityAlreadyEnrolled(String),
    #[error("enrollment image contains {0} faces, expected exactly one")]
    MultipleFaces(usize),
    #[error(transparent)]
    DetectionFailed(#[from] DetectionError),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error(transparent)]
    Attendance(#[from] AttendanceError),
    #[error("request timed out after {0:?}")]
    Timeout(Duration),
}

impl EngineError {
    /// Errors caused by the caller's input rather than a fault on our side.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDescriptor(_)
                | Self::InvalidIdentifier(_)
                | Self::InvalidIdentity
                | Self::IdentityAlreadyEnrolled(_)
                | Self::MultipleFaces(_)
        )
    }
}

impl From<EnrollmentError> for EngineError {
    fn from(e: EnrollmentError) -> Self {
        match e {
            EnrollmentError::InvalidDescriptor(d) => Self::InvalidDescriptor(d),
            EnrollmentError::EmptyIdentity => Self::InvalidIdentity,
            EnrollmentError::IdentityAlreadyEnrolled(identity) => {
                Self::IdentityAlreadyEnrolled(identity)
            }
            EnrollmentError::MultipleFaces(n) => Self::MultipleFaces(n),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidDescriptor(d) => Self::InvalidDescriptor(d),
            StoreError::Unavailable(e) => Self::StoreUnavailable(e.to_string()),
            StoreError::Codec(e) => Self::StoreUnavailable(e.to_string()),
        }
    }
}

/// Result of an enrollment request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EnrollOutcome {
    Saved {
        #[serde(rename = "savedCount")]
        saved_count: usize,
        identity: String,
    },
    /// Not an error: the image simply held no face.
    NoFaceDetected { message: String },
}

/// Per-face result of a recognition request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecognitionResult {
    #[serde(rename = "match")]
    pub matched: bool,
    pub identity: Option<String>,
    /// Distance to the nearest descriptor; serialized as `null` when nothing is enrolled.
    pub distance: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance: Option<AttendanceMark>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attendance_error: Option<String>,
}

impl RecognitionResult {
    fn recorded(identity: String, distance: f32, mark: AttendanceMark) -> Self {
        Self {
            matched: true,
            identity: Some(identity),
            distance,
            attendance: Some(mark),
            attendance_error: None,
        }
    }

    /// Matched, but the identity already holds a mark for this window.
    fn already_marked(identity: String, distance: f32, existing: AttendanceMark) -> Self {
        Self {
            matched: true,
            identity: Some(identity),
            distance,
            attendance: Some(existing),
            attendance_error: Some(ALREADY_MARKED.to_string()),
        }
    }

    fn not_recorded(identity: String, distance: f32, error: String) -> Self {
        Self {
            matched: true,
            identity: Some(identity),
            distance,
            attendance: None,
            attendance_error: Some(error),
        }
    }

    fn unmatched(distance: f32) -> Self {
        Self {
            matched: false,
            identity: None,
            distance,
            attendance: None,
            attendance_error: None,
        }
    }
}

/// The detect, match, record pipeline.
pub struct AttendanceEngine {
    store: Arc<EmbeddingStore>,
    detector: Arc<dyn DetectionAdapter>,
    recorder: Arc<dyn AttendanceRecorder>,
    matcher: Box<dyn Matcher + Send + Sync>,
    guard: EnrollmentGuard,
}

impl AttendanceEngine {
    pub fn new(
        store: Arc<EmbeddingStore>,
        detector: Arc<dyn DetectionAdapter>,
        recorder: Arc<dyn AttendanceRecorder>,
        matcher: Box<dyn Matcher + Send + Sync>,
        guard: EnrollmentGuard,
    ) -> Self {
        Self {
            store,
            detector,
            recorder,
            matcher,
            guard,
        }
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    /// Detect faces in `image` and enroll them under `identity`.
    pub async fn enroll(&self, identity: &str, image: &[u8]) -> Result<EnrollOutcome, EngineError> {
        let identity = identity.trim();
        if identity.is_empty() {
            return Err(EngineError::InvalidIdentity);
        }

        let detections = self.detector.detect(image).await?;
        tracing::info!(identity, faces = detections.len(), "enroll: faces detected");

        let embeddings = detections.into_iter().map(|d| d.embedding).collect();
        self.enroll_embeddings(identity, embeddings).await
    }

    /// Enroll precomputed embeddings under `identity`, subject to the same policy
    /// as image enrollment.
    pub async fn enroll_embeddings(
        &self,
        identity: &str,
        embeddings: Vec<Embedding>,
    ) -> Result<EnrollOutcome, EngineError> {
        let identity = identity.trim();
        let existing = self.store.count_for(identity);
        let plan = self.guard.plan(identity, existing, embeddings)?;

        let saved_count = match plan {
            EnrollmentPlan::NoFace => {
                tracing::info!(identity, "enroll: no faces detected, nothing saved");
                return Ok(EnrollOutcome::NoFaceDetected {
                    message: NO_FACES_DETECTED.to_string(),
                });
            }
            EnrollmentPlan::Append(embeddings) => match <[Embedding; 1]>::try_from(embeddings) {
                Ok([single]) => {
                    self.store.insert(identity, single).await?;
                    1
                }
                Err(embeddings) => self.store.insert_batch(identity, embeddings).await?.len(),
            },
            EnrollmentPlan::Replace(embeddings) => {
                self.store.replace_identity(identity, embeddings).await?.len()
            }
        };

        Ok(EnrollOutcome::Saved {
            saved_count,
            identity: identity.to_string(),
        })
    }

    /// Detect faces in `image`, match each against the enrolled descriptors and
    /// mark attendance for every recognised identity.
    ///
    /// Results are positional: one per detected face, in detection order. The
    /// recorder is called at most once per identity per request.
    pub async fn recognize(
        &self,
        image: &[u8],
        session: Option<&str>,
    ) -> Result<Vec<RecognitionResult>, EngineError> {
        let detections = self.detector.detect(image).await?;
        tracing::info!(faces = detections.len(), "recognize: faces detected");

        for detection in &detections {
            detection.embedding.validate(self.store.descriptor_len())?;
        }

        let gallery = self.store.all();
        // identity -> mark held after the first attempt, or that attempt's error
        let mut seen: HashMap<String, Result<AttendanceMark, String>> = HashMap::new();
        let mut results = Vec::with_capacity(detections.len());

        for detection in &detections {
            let verdict = self.matcher.best_match(&detection.embedding, &gallery);
            let distance = verdict.distance;
            let Some(identity) = verdict.identity().map(str::to_string) else {
                tracing::warn!(closest = distance, "face not recognized");
                results.push(RecognitionResult::unmatched(distance));
                continue;
            };
            tracing::info!(identity = %identity, distance, "face matched");

            if let Some(previous) = seen.get(&identity) {
                let result = match previous {
                    Ok(mark) => RecognitionResult::already_marked(identity, distance, mark.clone()),
                    Err(error) => RecognitionResult::not_recorded(identity, distance, error.clone()),
                };
                results.push(result);
                continue;
            }

            let result = match self.recorder.mark_present(&identity, session).await {
                Ok(AttendanceOutcome::Marked(mark)) => {
                    seen.insert(identity.clone(), Ok(mark.clone()));
                    RecognitionResult::recorded(identity, distance, mark)
                }
                Ok(AttendanceOutcome::AlreadyMarked(mark)) => {
                    tracing::warn!(identity = %identity, marked_at = %mark.marked_at, "attendance already marked");
                    seen.insert(identity.clone(), Ok(mark.clone()));
                    RecognitionResult::already_marked(identity, distance, mark)
                }
                Err(e) => {
                    tracing::warn!(identity = %identity, error = %e, "attendance recording failed");
                    seen.insert(identity.clone(), Err(e.to_string()));
                    RecognitionResult::not_recorded(identity, distance, e.to_string())
                }
            };
            results.push(result);
        }

        Ok(results)
    }

    /// All enrolled descriptors, optionally restricted to one identity.
    pub fn list_descriptors(&self, identity: Option<&str>) -> Vec<FaceDescriptor> {
        match identity {
            Some(identity) => self.store.descriptors_for(identity),
            None => self.store.all().as_ref().clone(),
        }
    }

    /// Delete one descriptor by id. `Ok(false)` means no such descriptor.
    pub async fn remove_descriptor(&self, id: &str) -> Result<bool, EngineError> {
        let parsed = uuid::Uuid::parse_str(id.trim())
            .map_err(|_| EngineError::InvalidIdentifier(id.to_string()))?;
        let id = DescriptorId::new(parsed.to_string());
        Ok(self.store.delete_by_id(&id).await?)
    }

    pub async fn clear_descriptors(&self) -> Result<u64, EngineError> {
        Ok(self.store.delete_all().await?)
    }

    pub async fn list_attendance(&self) -> Result<Vec<AttendanceMark>, EngineError> {
        Ok(self.recorder.list().await?)
    }
}

/// Run `fut` under a whole-request timeout.
pub async fn with_timeout<T, F>(timeout: Duration, fut: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, EngineError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| EngineError::Timeout(timeout))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attendance::{CalendarDay, SqliteAttendanceRecorder};
    use crate::db;
    use crate::repository::SqliteDescriptorRepository;
    use async_trait::async_trait;
    use chrono::{Offset, Utc};
    use rollcall_core::{
        Detection, EnrollmentPolicy, EuclideanMatcher, ExistingIdentity, MultiFace,
    };
    use std::sync::Mutex;

    const LEN: usize = 4;
    const E1: [f32; LEN] = [0.1, 0.2, 0.3, 0.4];
    const E2: [f32; LEN] = [0.9, 0.9, 0.9, 0.9];

    /// Returns the queued faces for every call, or fails when `fail` is set.
    struct StubDetector {
        faces: Mutex<Vec<Vec<f32>>>,
        fail: bool,
    }

    impl StubDetector {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                faces: Mutex::new(Vec::new()),
                fail: false,
            })
        }

        fn set(&self, faces: &[&[f32]]) {
            *self.faces.lock().unwrap() = faces.iter().map(|f| f.to_vec()).collect();
        }
    }

    #[async_trait]
    impl DetectionAdapter for StubDetector {
        async fn detect(&self, _image: &[u8]) -> Result<Vec<Detection>, DetectionError> {
            if self.fail {
                return Err(DetectionError::Failed("corrupt image".into()));
            }
            Ok(self
                .faces
                .lock()
                .unwrap()
                .iter()
                .map(|v| Detection {
                    embedding: Embedding::new(v.clone()),
                })
                .collect())
        }
    }

    /// Counts calls per identity; fails for `failing`.
    #[derive(Default)]
    struct StubRecorder {
        calls: Mutex<Vec<String>>,
        failing: Option<String>,
    }

    impl StubRecorder {
        fn calls_for(&self, identity: &str) -> usize {
            self.calls.lock().unwrap().iter().filter(|i| *i == identity).count()
        }
    }

    #[async_trait]
    impl AttendanceRecorder for StubRecorder {
        async fn mark_present(
            &self,
            identity: &str,
            session: Option<&str>,
        ) -> Result<AttendanceOutcome, AttendanceError> {
            self.calls.lock().unwrap().push(identity.to_string());
            if self.failing.as_deref() == Some(identity) {
                return Err(AttendanceError::RecordingFailed("disk full".into()));
            }
            Ok(AttendanceOutcome::Marked(AttendanceMark {
                id: "m".into(),
                identity: identity.to_string(),
                session: session.map(str::to_string),
                status: crate::attendance::AttendanceStatus::Present,
                marked_at: Utc::now(),
            }))
        }

        async fn list(&self) -> Result<Vec<AttendanceMark>, AttendanceError> {
            Ok(Vec::new())
        }
    }

    fn policy(existing_identity: ExistingIdentity, multi_face: MultiFace) -> EnrollmentPolicy {
        EnrollmentPolicy {
            existing_identity,
            multi_face,
            descriptor_len: LEN,
        }
    }

    async fn engine_with(
        detector: Arc<StubDetector>,
        recorder: Arc<dyn AttendanceRecorder>,
        policy: EnrollmentPolicy,
    ) -> AttendanceEngine {
        let conn = db::open_in_memory().await.unwrap();
        let store = Arc::new(EmbeddingStore::new(
            Arc::new(SqliteDescriptorRepository::new(conn)),
            LEN,
        ));
        AttendanceEngine::new(
            store,
            detector,
            recorder,
            Box::new(EuclideanMatcher::default()),
            EnrollmentGuard::new(policy),
        )
    }

    async fn engine(detector: Arc<StubDetector>, recorder: Arc<StubRecorder>) -> AttendanceEngine {
        engine_with(detector, recorder, policy(ExistingIdentity::Append, MultiFace::All)).await
    }

    #[tokio::test]
    async fn test_recognize_against_empty_store() {
        let detector = StubDetector::new();
        detector.set(&[&E1, &E2]);
        let recorder = Arc::new(StubRecorder::default());
        let engine = engine(detector, recorder.clone()).await;

        let results = engine.recognize(b"img", None).await.unwrap();
        assert_eq!(results.len(), 2);
        for r in &results {
            assert!(!r.matched);
            assert!(r.identity.is_none());
            assert!(r.distance.is_infinite());
        }
        assert!(recorder.calls.lock().unwrap().is_empty());

        let json = serde_json::to_value(&results[0]).unwrap();
        assert_eq!(json["match"], false);
        assert!(json["identity"].is_null());
        assert!(json["distance"].is_null());
        assert!(json.get("attendance").is_none());
    }

    #[tokio::test]
    async fn test_same_identity_is_marked_once_per_request() {
        let detector = StubDetector::new();
        let recorder = Arc::new(StubRecorder::default());
        let engine = engine(detector.clone(), recorder.clone()).await;

        detector.set(&[&E1, &[0.1, 0.2, 0.3, 0.45]]);
        engine.enroll("S001", b"img").await.unwrap();

        detector.set(&[&E1, &[0.1, 0.2, 0.3, 0.42]]);
        let results = engine.recognize(b"img", None).await.unwrap();

        assert_eq!(recorder.calls_for("S001"), 1);
        let first = results[0].attendance.as_ref().unwrap();
        assert!(results[0].attendance_error.is_none());
        assert_eq!(results[1].identity.as_deref(), Some("S001"));
        assert_eq!(results[1].attendance.as_ref(), Some(first));
        assert_eq!(results[1].attendance_error.as_deref(), Some(ALREADY_MARKED));
    }

    #[tokio::test]
    async fn test_attendance_failure_is_isolated() {
        let detector = StubDetector::new();
        let recorder = Arc::new(StubRecorder {
            failing: Some("S001".into()),
            ..Default::default()
        });
        let engine = engine(detector.clone(), recorder.clone()).await;

        detector.set(&[&E1]);
        engine.enroll("S001", b"img").await.unwrap();
        detector.set(&[&E2]);
        engine.enroll("S002", b"img").await.unwrap();

        detector.set(&[&E1, &E2, &E1]);
        let results = engine.recognize(b"img", Some("exam-1")).await.unwrap();

        assert_eq!(results.len(), 3);
        assert!(results[0].matched);
        assert!(results[0].attendance_error.as_deref().unwrap().contains("disk full"));
        assert_eq!(results[1].identity.as_deref(), Some("S002"));
        assert_eq!(
            results[1].attendance.as_ref().unwrap().session.as_deref(),
            Some("exam-1")
        );
        assert_eq!(results[2].attendance_error, results[0].attendance_error);
        assert_eq!(recorder.calls_for("S001"), 1);
        assert_eq!(recorder.calls_for("S002"), 1);
    }

    #[tokio::test]
    async fn test_enroll_then_recognize_end_to_end() {
        let detector = StubDetector::new();
        let conn = db::open_in_memory().await.unwrap();
        let recorder = Arc::new(SqliteAttendanceRecorder::new(
            conn,
            Arc::new(CalendarDay::new(Utc.fix())),
            Utc.fix(),
            None,
        ));
        let engine = engine_with(
            detector.clone(),
            recorder,
            policy(ExistingIdentity::Append, MultiFace::All),
        )
        .await;

        detector.set(&[&E1]);
        let outcome = engine.enroll("S001", b"img").await.unwrap();
        assert_eq!(
            outcome,
            EnrollOutcome::Saved {
                saved_count: 1,
                identity: "S001".into()
            }
        );

        // distance exactly 0.3 from E1
        detector.set(&[&[0.4, 0.2, 0.3, 0.4]]);
        let first = engine.recognize(b"img", None).await.unwrap();
        assert!(first[0].matched);
        assert_eq!(first[0].identity.as_deref(), Some("S001"));
        assert!((first[0].distance - 0.3).abs() < 1e-5);
        assert!(first[0].attendance.is_some());

        let second = engine.recognize(b"img", None).await.unwrap();
        assert!(second[0].matched);
        assert_eq!(second[0].attendance_error.as_deref(), Some(ALREADY_MARKED));
        assert_eq!(second[0].attendance, first[0].attendance);
        let json = serde_json::to_value(&second[0]).unwrap();
        assert_eq!(json["attendance"]["status"], "present");
        assert_eq!(engine.list_attendance().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enroll_without_faces_saves_nothing() {
        let detector = StubDetector::new();
        let engine = engine(detector, Arc::new(StubRecorder::default())).await;

        let outcome = engine.enroll("S001", b"img").await.unwrap();
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({ "message": NO_FACES_DETECTED })
        );
        assert!(engine.list_descriptors(None).is_empty());
    }

    #[tokio::test]
    async fn test_enroll_saves_one_descriptor_per_face() {
        let detector = StubDetector::new();
        let engine = engine(detector.clone(), Arc::new(StubRecorder::default())).await;

        detector.set(&[&E1, &E2]);
        let outcome = engine.enroll("S001", b"img").await.unwrap();
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({ "savedCount": 2, "identity": "S001" })
        );
        assert_eq!(engine.list_descriptors(Some("S001")).len(), 2);
        assert!(engine.list_descriptors(Some("S002")).is_empty());
    }

    #[tokio::test]
    async fn test_enroll_policy_errors() {
        let detector = StubDetector::new();
        let engine = engine_with(
            detector.clone(),
            Arc::new(StubRecorder::default()),
            policy(ExistingIdentity::Reject, MultiFace::Reject),
        )
        .await;

        detector.set(&[&E1, &E2]);
        let err = engine.enroll("S001", b"img").await.unwrap_err();
        assert!(matches!(err, EngineError::MultipleFaces(2)));
        assert!(err.is_client_error());

        detector.set(&[&E1]);
        engine.enroll("S001", b"img").await.unwrap();
        let err = engine.enroll("S001", b"img").await.unwrap_err();
        assert!(matches!(err, EngineError::IdentityAlreadyEnrolled(ref id) if id == "S001"));

        let err = engine.enroll("  ", b"img").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidIdentity));
    }

    #[tokio::test]
    async fn test_enroll_trims_identity() {
        let detector = StubDetector::new();
        let engine = engine(detector.clone(), Arc::new(StubRecorder::default())).await;

        detector.set(&[&E1]);
        let outcome = engine.enroll(" S001 ", b"img").await.unwrap();
        assert_eq!(
            outcome,
            EnrollOutcome::Saved {
                saved_count: 1,
                identity: "S001".into()
            }
        );
        engine.enroll("S001", b"img").await.unwrap();
        assert_eq!(engine.list_descriptors(Some("S001")).len(), 2);
        assert_eq!(engine.list_descriptors(None).len(), 2);
    }

    #[tokio::test]
    async fn test_replace_policy_swaps_descriptors() {
        let detector = StubDetector::new();
        let engine = engine_with(
            detector.clone(),
            Arc::new(StubRecorder::default()),
            policy(ExistingIdentity::Replace, MultiFace::First),
        )
        .await;

        detector.set(&[&E1]);
        engine.enroll("S001", b"img").await.unwrap();
        detector.set(&[&E2, &E1]);
        engine.enroll("S001", b"img").await.unwrap();

        let descriptors = engine.list_descriptors(Some("S001"));
        assert_eq!(descriptors.len(), 1);
        assert_eq!(descriptors[0].embedding.values, E2.to_vec());
    }

    #[tokio::test]
    async fn test_wrong_length_probe_is_rejected() {
        let detector = StubDetector::new();
        let recorder = Arc::new(StubRecorder::default());
        let engine = engine(detector.clone(), recorder.clone()).await;

        detector.set(&[&E1, &[0.1, 0.2]]);
        let err = engine.recognize(b"img", None).await.unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidDescriptor(DescriptorError::Length { expected: 4, actual: 2 })
        ));
        assert!(recorder.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_detection_failure_aborts_request() {
        let detector = Arc::new(StubDetector {
            faces: Mutex::new(Vec::new()),
            fail: true,
        });
        let engine = engine(detector, Arc::new(StubRecorder::default())).await;

        let err = engine.recognize(b"img", None).await.unwrap_err();
        assert!(matches!(err, EngineError::DetectionFailed(_)));
        assert!(!err.is_client_error());
    }

    #[tokio::test]
    async fn test_remove_descriptor() {
        let detector = StubDetector::new();
        let engine = engine(detector.clone(), Arc::new(StubRecorder::default())).await;
        detector.set(&[&E1]);
        engine.enroll("S001", b"img").await.unwrap();
        let id = engine.list_descriptors(None)[0].id.clone();

        let err = engine.remove_descriptor("not-a-uuid").await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidIdentifier(_)));
        assert!(!engine
            .remove_descriptor("6f1c2d3e-0000-4000-8000-000000000000")
            .await
            .unwrap());
        assert_eq!(engine.list_descriptors(None).len(), 1);

        assert!(engine.remove_descriptor(id.as_str()).await.unwrap());
        assert!(engine.list_descriptors(None).is_empty());
    }

    #[tokio::test]
    async fn test_clear_descriptors() {
        let detector = StubDetector::new();
        let engine = engine(detector.clone(), Arc::new(StubRecorder::default())).await;
        detector.set(&[&E1, &E2]);
        engine.enroll("S001", b"img").await.unwrap();

        assert_eq!(engine.clear_descriptors().await.unwrap(), 2);
        assert!(engine.list_descriptors(None).is_empty());
    }

    #[tokio::test]
    async fn test_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, EngineError>(())
        };
        let err = with_timeout(Duration::from_millis(10), slow).await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));

        let fast = with_timeout(Duration::from_secs(1), async { Ok::<_, EngineError>(7) }).await;
        assert_eq!(fast.unwrap(), 7);
    }

    #[test]
    fn test_matched_result_shape() {
        let result = RecognitionResult::not_recorded("S001".into(), 0.25, ALREADY_MARKED.into());
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["match"], true);
        assert_eq!(json["identity"], "S001");
        assert_eq!(json["attendanceError"], ALREADY_MARKED);
        assert!(json.get("attendance").is_none());
    }
}
