//! SQLite connection setup shared by the descriptor and attendance repositories.

use crate::repository::RepositoryError;
use std::path::Path;
use tokio_rusqlite::Connection;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS descriptors (
    id          TEXT PRIMARY KEY,
    identity    TEXT NOT NULL,
    descriptor  TEXT NOT NULL,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_descriptors_identity ON descriptors(identity);

CREATE TABLE IF NOT EXISTS attendance (
    id          TEXT PRIMARY KEY,
    identity    TEXT NOT NULL,
    session     TEXT,
    status      TEXT NOT NULL,
    marked_at   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_attendance_identity ON attendance(identity, session, marked_at);
";

/// Open (or create) the database at `path` and apply the schema.
pub async fn open(path: &Path) -> Result<Connection, RepositoryError> {
    let conn = Connection::open(path).await?;
    init_schema(&conn).await?;
    Ok(conn)
}

#[cfg(test)]
pub async fn open_in_memory() -> Result<Connection, RepositoryError> {
    let conn = Connection::open_in_memory().await?;
    init_schema(&conn).await?;
    Ok(conn)
}

async fn init_schema(conn: &Connection) -> Result<(), RepositoryError> {
    conn.call(|conn| {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    })
    .await?;
    Ok(())
}
