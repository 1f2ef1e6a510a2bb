//! In-memory descriptor snapshot backed by a [`DescriptorRepository`].
//!
//! The snapshot is an immutable `Arc<Vec<_>>` that is swapped whole on every
//! reload. Readers clone the `Arc` and never observe a partially built list;
//! the lock only guards the pointer swap.

use crate::repository::{DescriptorRepository, DescriptorRow, RepositoryError};
use chrono::{SecondsFormat, Utc};
use rollcall_core::codec::{self, CodecError};
use rollcall_core::{DescriptorError, DescriptorId, Embedding, FaceDescriptor};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(#[from] RepositoryError),
    #[error(transparent)]
    InvalidDescriptor(#[from] DescriptorError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

pub struct EmbeddingStore {
    repo: Arc<dyn DescriptorRepository>,
    snapshot: RwLock<Arc<Vec<FaceDescriptor>>>,
    descriptor_len: usize,
}

impl EmbeddingStore {
    /// Create an empty store; call [`reload`](Self::reload) to populate it.
    pub fn new(repo: Arc<dyn DescriptorRepository>, descriptor_len: usize) -> Self {
        Self {
            repo,
            snapshot: RwLock::new(Arc::new(Vec::new())),
            descriptor_len,
        }
    }

    pub fn descriptor_len(&self) -> usize {
        self.descriptor_len
    }

    /// Current snapshot, in enrollment order.
    pub fn all(&self) -> Arc<Vec<FaceDescriptor>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn len(&self) -> usize {
        self.all().len()
    }

    pub fn descriptors_for(&self, identity: &str) -> Vec<FaceDescriptor> {
        self.all()
            .iter()
            .filter(|d| d.identity == identity)
            .cloned()
            .collect()
    }

    pub fn count_for(&self, identity: &str) -> usize {
        self.all().iter().filter(|d| d.identity == identity).count()
    }

    /// Replace the snapshot with the repository contents.
    ///
    /// On repository failure the previous snapshot stays in place. Rows that
    /// fail to decode or have the wrong length are skipped.
    pub async fn reload(&self) -> Result<usize, StoreError> {
        let rows = match self.repo.load_all().await {
            Ok(rows) => rows,
            Err(e) => {
                tracing::warn!(error = %e, "descriptor reload failed; keeping previous snapshot");
                return Err(e.into());
            }
        };

        let mut descriptors = Vec::with_capacity(rows.len());
        for row in rows {
            match self.decode_row(&row) {
                Ok(d) => descriptors.push(d),
                Err(e) => {
                    tracing::warn!(id = %row.id, identity = %row.identity, error = %e, "skipping stored descriptor");
                }
            }
        }

        let count = descriptors.len();
        self.swap(descriptors);
        tracing::info!(count, "descriptors loaded");
        Ok(count)
    }

    /// Persist one descriptor for `identity`, then reload.
    ///
    /// Once the row is committed the call succeeds even if the reload fails;
    /// the snapshot is then patched in place.
    pub async fn insert(
        &self,
        identity: &str,
        embedding: Embedding,
    ) -> Result<DescriptorId, StoreError> {
        let row = self.new_row(identity, &embedding)?;
        let id = DescriptorId::new(row.id.clone());
        let added = vec![Self::descriptor_from(&row, embedding)];
        self.repo.insert(vec![row]).await?;
        tracing::info!(identity, id = %id, "descriptor saved");
        self.refresh_after_write(|snapshot| snapshot.extend(added)).await;
        Ok(id)
    }

    /// Persist several descriptors for `identity` in one transaction, then reload once.
    pub async fn insert_batch(
        &self,
        identity: &str,
        embeddings: Vec<Embedding>,
    ) -> Result<Vec<DescriptorId>, StoreError> {
        let rows = self.new_rows(identity, &embeddings)?;
        let ids = rows.iter().map(|r| DescriptorId::new(r.id.clone())).collect();
        let added = Self::descriptors_from(&rows, embeddings);
        self.repo.insert(rows).await?;
        tracing::info!(identity, count = added.len(), "descriptors saved");
        self.refresh_after_write(|snapshot| snapshot.extend(added)).await;
        Ok(ids)
    }

    /// Swap the whole descriptor set of `identity`, then reload.
    pub async fn replace_identity(
        &self,
        identity: &str,
        embeddings: Vec<Embedding>,
    ) -> Result<Vec<DescriptorId>, StoreError> {
        let rows = self.new_rows(identity, &embeddings)?;
        let ids = rows.iter().map(|r| DescriptorId::new(r.id.clone())).collect();
        let added = Self::descriptors_from(&rows, embeddings);
        let removed = self.repo.replace_identity(identity, rows).await?;
        tracing::info!(identity, removed, count = added.len(), "descriptors replaced");
        self.refresh_after_write(|snapshot| {
            snapshot.retain(|d| d.identity != identity);
            snapshot.extend(added);
        })
        .await;
        Ok(ids)
    }

    /// Remove one descriptor. Returns `false` if it did not exist.
    pub async fn delete_by_id(&self, id: &DescriptorId) -> Result<bool, StoreError> {
        let removed = self.repo.delete(id.as_str()).await?;
        if removed {
            tracing::info!(id = %id, "descriptor deleted");
            self.refresh_after_write(|snapshot| snapshot.retain(|d| &d.id != id))
                .await;
        }
        Ok(removed)
    }

    /// Clear the repository and the snapshot.
    pub async fn delete_all(&self) -> Result<u64, StoreError> {
        let removed = self.repo.delete_all().await?;
        self.swap(Vec::new());
        tracing::info!(removed, "all descriptors deleted");
        Ok(removed)
    }

    /// Reload after a committed write. If the reload fails, apply `patch` to
    /// the current snapshot so it still reflects the write.
    async fn refresh_after_write(&self, patch: impl FnOnce(&mut Vec<FaceDescriptor>)) {
        if self.reload().await.is_ok() {
            return;
        }
        let mut next = self.all().as_ref().clone();
        patch(&mut next);
        tracing::warn!(count = next.len(), "reload after write failed; snapshot patched in place");
        self.swap(next);
    }

    fn swap(&self, descriptors: Vec<FaceDescriptor>) {
        let next = Arc::new(descriptors);
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = next;
    }

    fn descriptor_from(row: &DescriptorRow, embedding: Embedding) -> FaceDescriptor {
        FaceDescriptor {
            id: DescriptorId::new(row.id.clone()),
            identity: row.identity.clone(),
            embedding,
            created_at: row.created_at.clone(),
        }
    }

    fn descriptors_from(rows: &[DescriptorRow], embeddings: Vec<Embedding>) -> Vec<FaceDescriptor> {
        rows.iter()
            .zip(embeddings)
            .map(|(row, embedding)| Self::descriptor_from(row, embedding))
            .collect()
    }

    fn decode_row(&self, row: &DescriptorRow) -> Result<FaceDescriptor, StoreError> {
        let embedding = codec::decode(&row.descriptor)?;
        embedding.validate(self.descriptor_len)?;
        Ok(FaceDescriptor {
            id: DescriptorId::new(row.id.clone()),
            identity: row.identity.clone(),
            embedding,
            created_at: row.created_at.clone(),
        })
    }

    fn new_rows(
        &self,
        identity: &str,
        embeddings: &[Embedding],
    ) -> Result<Vec<DescriptorRow>, StoreError> {
        embeddings.iter().map(|e| self.new_row(identity, e)).collect()
    }

    fn new_row(&self, identity: &str, embedding: &Embedding) -> Result<DescriptorRow, StoreError> {
        embedding.validate(self.descriptor_len)?;
        let descriptor = codec::encode(embedding)?;
        Ok(DescriptorRow {
            id: uuid::Uuid::new_v4().to_string(),
            identity: identity.to_string(),
            descriptor,
            created_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
        })
    }
}
