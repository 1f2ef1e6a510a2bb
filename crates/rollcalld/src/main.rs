use anyhow::{Context, Result};
use rollcall_core::{EnrollmentGuard, EuclideanMatcher};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod attendance;
mod config;
mod db;
mod dbus_interface;
mod detector;
mod engine;
mod repository;
mod store;

use attendance::SqliteAttendanceRecorder;
use config::{BusKind, Config};
use dbus_interface::{RollcallService, BUS_NAME, OBJECT_PATH};
use detector::CommandDetector;
use engine::AttendanceEngine;
use repository::SqliteDescriptorRepository;
use store::EmbeddingStore;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::from_env();
    tracing::info!(
        db = %config.db_path.display(),
        threshold = config.match_threshold,
        descriptor_len = config.descriptor_len,
        window = ?config.attendance_window,
        "configuration loaded"
    );

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let conn = db::open(&config.db_path)
        .await
        .with_context(|| format!("failed to open database {}", config.db_path.display()))?;

    let store = Arc::new(EmbeddingStore::new(
        Arc::new(SqliteDescriptorRepository::new(conn.clone())),
        config.descriptor_len,
    ));
    store.reload().await.context("failed to load descriptors")?;

    let recorder = Arc::new(SqliteAttendanceRecorder::new(
        conn,
        config.attendance_window(),
        config.utc_offset(),
        config.late_after,
    ));

    let detector = CommandDetector::from_command_line(&config.detector_command)
        .context("ROLLCALL_DETECTOR_CMD is empty")?;
    tracing::info!(program = detector.program(), "detector configured");

    let engine = Arc::new(AttendanceEngine::new(
        store,
        Arc::new(detector),
        recorder,
        Box::new(EuclideanMatcher::new(config.match_threshold)),
        EnrollmentGuard::new(config.enrollment_policy()),
    ));
    let service = RollcallService::new(engine, config.request_timeout(), config.match_threshold);

    let builder = match config.bus {
        BusKind::Session => zbus::connection::Builder::session()?,
        BusKind::System => zbus::connection::Builder::system()?,
    };
    let _connection = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("failed to register on D-Bus")?;

    tracing::info!(bus = ?config.bus, name = BUS_NAME, "rollcalld ready");

    tokio::signal::ctrl_c().await?;
    tracing::info!("rollcalld shutting down");

    Ok(())
}
