//! Attendance recording with a pluggable duplicate window.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveTime, SecondsFormat, Utc};
use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Error, Debug)]
pub enum AttendanceError {
    #[error("attendance recording failed: {0}")]
    RecordingFailed(String),
}

impl From<tokio_rusqlite::Error> for AttendanceError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        Self::RecordingFailed(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AttendanceStatus {
    Present,
    Late,
    Absent,
}

impl AttendanceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Present => "present",
            Self::Late => "late",
            Self::Absent => "absent",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "present" => Some(Self::Present),
            "late" => Some(Self::Late),
            "absent" => Some(Self::Absent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceMark {
    pub id: String,
    pub identity: String,
    pub session: Option<String>,
    pub status: AttendanceStatus,
    pub marked_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AttendanceOutcome {
    /// A new mark was written.
    Marked(AttendanceMark),
    /// The identity was already marked in this window; carries the existing mark.
    AlreadyMarked(AttendanceMark),
}

/// Decides whether two mark times fall into the same attendance window.
pub trait AttendanceWindow: Send + Sync {
    fn same_window(&self, last_marked_at: DateTime<Utc>, now: DateTime<Utc>) -> bool;
}

/// Same calendar day in a fixed local offset.
pub struct CalendarDay {
    offset: FixedOffset,
}

impl CalendarDay {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl AttendanceWindow for CalendarDay {
    fn same_window(&self, last_marked_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        last_marked_at.with_timezone(&self.offset).date_naive()
            == now.with_timezone(&self.offset).date_naive()
    }
}

/// Less than `span` since the previous mark.
pub struct Rolling {
    span: chrono::Duration,
}

impl Rolling {
    pub fn new(span: Duration) -> Self {
        Self {
            span: chrono::Duration::from_std(span).unwrap_or(chrono::Duration::MAX),
        }
    }
}

impl AttendanceWindow for Rolling {
    fn same_window(&self, last_marked_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(last_marked_at) < self.span
    }
}

/// One mark per session key; time is irrelevant.
pub struct PerSession;

impl AttendanceWindow for PerSession {
    fn same_window(&self, _last_marked_at: DateTime<Utc>, _now: DateTime<Utc>) -> bool {
        true
    }
}

#[async_trait]
pub trait AttendanceRecorder: Send + Sync {
    /// Mark `identity` present for the current window.
    ///
    /// Must be idempotent within a window: a repeat call returns
    /// `AlreadyMarked` with the existing mark instead of writing again.
    async fn mark_present(
        &self,
        identity: &str,
        session: Option<&str>,
    ) -> Result<AttendanceOutcome, AttendanceError>;

    /// All marks, newest first.
    async fn list(&self) -> Result<Vec<AttendanceMark>, AttendanceError>;
}

/// SQLite-backed recorder. Lookup and insert run in one transaction on the
/// connection thread, so concurrent calls for the same identity cannot both write.
pub struct SqliteAttendanceRecorder {
    conn: Connection,
    window: Arc<dyn AttendanceWindow>,
    offset: FixedOffset,
    late_after: Option<NaiveTime>,
}

impl SqliteAttendanceRecorder {
    pub fn new(
        conn: Connection,
        window: Arc<dyn AttendanceWindow>,
        offset: FixedOffset,
        late_after: Option<NaiveTime>,
    ) -> Self {
        Self {
            conn,
            window,
            offset,
            late_after,
        }
    }

    fn status_at(&self, now: DateTime<Utc>) -> AttendanceStatus {
        match self.late_after {
            Some(cutoff) if now.with_timezone(&self.offset).time() > cutoff => {
                AttendanceStatus::Late
            }
            _ => AttendanceStatus::Present,
        }
    }

    async fn mark_present_at(
        &self,
        identity: &str,
        session: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<AttendanceOutcome, AttendanceError> {
        let candidate = AttendanceMark {
            id: uuid::Uuid::new_v4().to_string(),
            identity: identity.to_string(),
            session: session.map(str::to_string),
            status: self.status_at(now),
            marked_at: now,
        };
        let window = self.window.clone();

        let outcome = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let last = tx
                    .query_row(
                        "SELECT id, identity, session, status, marked_at
                         FROM attendance
                         WHERE identity = ?1 AND session IS ?2
                         ORDER BY marked_at DESC
                         LIMIT 1",
                        params![candidate.identity, candidate.session],
                        decode_mark_row,
                    )
                    .optional()?;

                if let Some(last) = last {
                    if window.same_window(last.marked_at, candidate.marked_at) {
                        return Ok(AttendanceOutcome::AlreadyMarked(last));
                    }
                }

                tx.execute(
                    "INSERT INTO attendance (id, identity, session, status, marked_at)
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        candidate.id,
                        candidate.identity,
                        candidate.session,
                        candidate.status.as_str(),
                        format_timestamp(candidate.marked_at),
                    ],
                )?;
                tx.commit()?;
                Ok(AttendanceOutcome::Marked(candidate))
            })
            .await?;

        match &outcome {
            AttendanceOutcome::Marked(mark) => {
                tracing::info!(identity, status = mark.status.as_str(), "attendance marked");
            }
            AttendanceOutcome::AlreadyMarked(mark) => {
                tracing::debug!(identity, marked_at = %mark.marked_at, "attendance already marked");
            }
        }
        Ok(outcome)
    }
}

#[async_trait]
impl AttendanceRecorder for SqliteAttendanceRecorder {
    async fn mark_present(
        &self,
        identity: &str,
        session: Option<&str>,
    ) -> Result<AttendanceOutcome, AttendanceError> {
        self.mark_present_at(identity, session, Utc::now()).await
    }

    async fn list(&self) -> Result<Vec<AttendanceMark>, AttendanceError> {
        let marks = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, identity, session, status, marked_at
                     FROM attendance
                     ORDER BY marked_at DESC",
                )?;
                let marks = stmt
                    .query_map([], decode_mark_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(marks)
            })
            .await?;
        Ok(marks)
    }
}

/// Fixed-width UTC timestamps so `ORDER BY marked_at` sorts chronologically.
fn format_timestamp(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_mark_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceMark> {
    let status: String = row.get(3)?;
    let marked_at: String = row.get(4)?;

    let status = AttendanceStatus::parse(&status).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown attendance status '{status}'").into(),
        )
    })?;
    let marked_at = DateTime::parse_from_rfc3339(&marked_at)
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?
        .with_timezone(&Utc);

    Ok(AttendanceMark {
        id: row.get(0)?,
        identity: row.get(1)?,
        session: row.get(2)?,
        status,
        marked_at,
    })
}
