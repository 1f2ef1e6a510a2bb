use crate::attendance::{AttendanceWindow, CalendarDay, PerSession, Rolling};
use chrono::{FixedOffset, NaiveTime, Offset, Utc};
use rollcall_core::{
    EnrollmentPolicy, ExistingIdentity, MultiFace, DEFAULT_DESCRIPTOR_LEN, DEFAULT_MATCH_THRESHOLD,
};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

/// Which D-Bus bus the daemon registers on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BusKind {
    Session,
    System,
}

/// Span within which a repeated recognition counts as a duplicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowKind {
    /// Calendar day in the configured UTC offset.
    CalendarDay,
    /// One mark per session key, whatever the time.
    Session,
    /// Fixed span since the previous mark.
    Rolling(Duration),
}

impl FromStr for WindowKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        match s.as_str() {
            "day" => Ok(Self::CalendarDay),
            "session" => Ok(Self::Session),
            _ => s
                .strip_prefix("rolling:")
                .and_then(|m| m.parse::<u64>().ok())
                .filter(|m| *m > 0)
                .map(|m| Self::Rolling(Duration::from_secs(m * 60)))
                .ok_or_else(|| format!("unknown attendance window '{s}'")),
        }
    }
}

/// Daemon configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Euclidean distance threshold for a positive match (strict `<`).
    pub match_threshold: f32,
    /// Expected embedding length; descriptors of any other length are rejected.
    pub descriptor_len: usize,
    /// Timeout in seconds for one enroll or recognize request.
    pub request_timeout_secs: u64,
    /// External embedding command: program followed by its arguments.
    pub detector_command: Vec<String>,
    pub existing_identity: ExistingIdentity,
    pub multi_face: MultiFace,
    pub attendance_window: WindowKind,
    /// Local offset used for the calendar-day window and the late cutoff.
    pub utc_offset_minutes: i32,
    /// Local time after which new marks are recorded as late.
    pub late_after: Option<NaiveTime>,
    pub bus: BusKind,
}

impl Config {
    /// Load configuration from `ROLLCALL_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let data_dir = get("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                let home = get("HOME").unwrap_or_else(|| "/tmp".to_string());
                PathBuf::from(home).join(".local/share")
            })
            .join("rollcall");

        let db_path = get("ROLLCALL_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("rollcall.db"));

        let detector_command: Vec<String> = get("ROLLCALL_DETECTOR_CMD")
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .filter(|v: &Vec<String>| !v.is_empty())
            .unwrap_or_else(|| vec!["rollcall-embed".to_string()]);

        let late_after = get("ROLLCALL_LATE_AFTER").and_then(|v| {
            match NaiveTime::parse_from_str(v.trim(), "%H:%M") {
                Ok(t) => Some(t),
                Err(e) => {
                    tracing::warn!(value = %v, error = %e, "ignoring ROLLCALL_LATE_AFTER, expected HH:MM");
                    None
                }
            }
        });

        let bus = match get("ROLLCALL_BUS").as_deref().map(str::trim) {
            Some("system") => BusKind::System,
            _ => BusKind::Session,
        };

        Self {
            db_path,
            match_threshold: parse_where(
                &get,
                "ROLLCALL_MATCH_THRESHOLD",
                DEFAULT_MATCH_THRESHOLD,
                |t: &f32| t.is_finite() && *t > 0.0,
            ),
            descriptor_len: parse_where(
                &get,
                "ROLLCALL_DESCRIPTOR_LEN",
                DEFAULT_DESCRIPTOR_LEN,
                |n: &usize| *n > 0,
            ),
            request_timeout_secs: parse_or(&get, "ROLLCALL_REQUEST_TIMEOUT_SECS", 10),
            detector_command,
            existing_identity: parse_or(&get, "ROLLCALL_EXISTING_IDENTITY", ExistingIdentity::Append),
            multi_face: parse_or(&get, "ROLLCALL_MULTI_FACE", MultiFace::All),
            attendance_window: parse_or(&get, "ROLLCALL_ATTENDANCE_WINDOW", WindowKind::CalendarDay),
            utc_offset_minutes: parse_or(&get, "ROLLCALL_UTC_OFFSET_MINUTES", 0),
            late_after,
            bus,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn enrollment_policy(&self) -> EnrollmentPolicy {
        EnrollmentPolicy {
            existing_identity: self.existing_identity,
            multi_face: self.multi_face,
            descriptor_len: self.descriptor_len,
        }
    }

    /// Configured UTC offset, falling back to UTC when out of range.
    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| Utc.fix())
    }

    pub fn attendance_window(&self) -> Arc<dyn AttendanceWindow> {
        match self.attendance_window {
            WindowKind::CalendarDay => Arc::new(CalendarDay::new(self.utc_offset())),
            WindowKind::Session => Arc::new(PerSession),
            WindowKind::Rolling(span) => Arc::new(Rolling::new(span)),
        }
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    parse_where(get, key, default, |_| true)
}

/// Like [`parse_or`], but values failing `valid` also fall back to the default.
fn parse_where<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
    valid: impl Fn(&T) -> bool,
) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let Some(raw) = get(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(v) if valid(&v) => v,
        Ok(_) => {
            tracing::warn!(key, value = %raw, "value out of range, using default");
            default
        }
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, "invalid value, using default");
            default
        }
    }
}
