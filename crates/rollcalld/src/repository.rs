//! Persistent descriptor storage.
//!
//! Rows carry the embedding in its persisted text form; decoding and
//! validation belong to [`EmbeddingStore`](crate::store::EmbeddingStore).

use async_trait::async_trait;
use rusqlite::params;
use thiserror::Error;
use tokio_rusqlite::Connection;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(String),
}

impl From<tokio_rusqlite::Error> for RepositoryError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// One row of the `descriptors` table.
#[derive(Debug, Clone, PartialEq)]
pub struct DescriptorRow {
    pub id: String,
    pub identity: String,
    /// JSON number array.
    pub descriptor: String,
    /// RFC 3339 timestamp.
    pub created_at: String,
}

#[async_trait]
pub trait DescriptorRepository: Send + Sync {
    /// All rows in enrollment order.
    async fn load_all(&self) -> Result<Vec<DescriptorRow>, RepositoryError>;

    async fn insert(&self, rows: Vec<DescriptorRow>) -> Result<(), RepositoryError>;

    /// Atomically swap every row of `identity` for `rows`. Returns the number removed.
    async fn replace_identity(
        &self,
        identity: &str,
        rows: Vec<DescriptorRow>,
    ) -> Result<u64, RepositoryError>;

    /// Returns `false` when no row had this id.
    async fn delete(&self, id: &str) -> Result<bool, RepositoryError>;

    async fn delete_all(&self) -> Result<u64, RepositoryError>;
}

/// SQLite-backed descriptor repository.
pub struct SqliteDescriptorRepository {
    conn: Connection,
}

impl SqliteDescriptorRepository {
    pub fn new(conn: Connection) -> Self {
        Self { conn }
    }
}

fn insert_rows(conn: &rusqlite::Connection, rows: &[DescriptorRow]) -> rusqlite::Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO descriptors (id, identity, descriptor, created_at) VALUES (?1, ?2, ?3, ?4)",
    )?;
    for row in rows {
        stmt.execute(params![row.id, row.identity, row.descriptor, row.created_at])?;
    }
    Ok(())
}

#[async_trait]
impl DescriptorRepository for SqliteDescriptorRepository {
    async fn load_all(&self) -> Result<Vec<DescriptorRow>, RepositoryError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, identity, descriptor, created_at
                     FROM descriptors
                     ORDER BY created_at, rowid",
                )?;
                let rows = stmt
                    .query_map([], |row| {
                        Ok(DescriptorRow {
                            id: row.get(0)?,
                            identity: row.get(1)?,
                            descriptor: row.get(2)?,
                            created_at: row.get(3)?,
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        Ok(rows)
    }

    async fn insert(&self, rows: Vec<DescriptorRow>) -> Result<(), RepositoryError> {
        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                insert_rows(&tx, &rows)?;
                tx.commit()?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn replace_identity(
        &self,
        identity: &str,
        rows: Vec<DescriptorRow>,
    ) -> Result<u64, RepositoryError> {
        let identity = identity.to_string();
        let removed = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let removed =
                    tx.execute("DELETE FROM descriptors WHERE identity = ?1", params![identity])?;
                insert_rows(&tx, &rows)?;
                tx.commit()?;
                Ok(removed as u64)
            })
            .await?;
        Ok(removed)
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let id = id.to_string();
        let affected = self
            .conn
            .call(move |conn| {
                Ok(conn.execute("DELETE FROM descriptors WHERE id = ?1", params![id])?)
            })
            .await?;
        Ok(affected > 0)
    }

    async fn delete_all(&self) -> Result<u64, RepositoryError> {
        let affected = self
            .conn
            .call(|conn| Ok(conn.execute("DELETE FROM descriptors", [])?))
            .await?;
        Ok(affected as u64)
    }
}
