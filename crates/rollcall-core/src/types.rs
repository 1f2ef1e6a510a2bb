use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Embedding length produced by the deployed face model.
pub const DEFAULT_DESCRIPTOR_LEN: usize = 128;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DescriptorError {
    #[error("invalid descriptor: expected {expected} components, got {actual}")]
    Length { expected: usize, actual: usize },
    #[error("invalid descriptor: component {index} is not a finite number")]
    NonFinite { index: usize },
}

/// Face embedding vector.
///
/// Serialized as a plain numeric array, which is also the persisted text form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Embedding {
    pub values: Vec<f32>,
}

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Check the length invariant and reject NaN/infinite components.
    pub fn validate(&self, expected_len: usize) -> Result<(), DescriptorError> {
        if self.values.len() != expected_len {
            return Err(DescriptorError::Length {
                expected: expected_len,
                actual: self.values.len(),
            });
        }
        match self.values.iter().position(|v| !v.is_finite()) {
            Some(index) => Err(DescriptorError::NonFinite { index }),
            None => Ok(()),
        }
    }

    /// Compute Euclidean distance between two embeddings.
    ///
    /// Both sides must have the same length; callers validate this before
    /// matching, extra components on either side are ignored.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

impl From<Vec<f32>> for Embedding {
    fn from(values: Vec<f32>) -> Self {
        Self { values }
    }
}

/// Opaque identifier assigned to a descriptor by the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DescriptorId(String);

impl DescriptorId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DescriptorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An enrolled face descriptor. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaceDescriptor {
    pub id: DescriptorId,
    /// Registration number / user id this descriptor was enrolled under.
    pub identity: String,
    pub embedding: Embedding,
    /// RFC 3339 creation timestamp.
    pub created_at: String,
}

/// Nearest enrolled descriptor for one probe embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchCandidate {
    pub descriptor_id: DescriptorId,
    pub identity: String,
    pub distance: f32,
}

/// Result of matching a probe embedding against the gallery.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    /// Distance to the nearest descriptor, `f32::INFINITY` for an empty gallery.
    pub distance: f32,
    /// Nearest descriptor, reported even when it is outside the threshold.
    pub nearest: Option<MatchCandidate>,
}

impl MatchResult {
    pub fn no_gallery() -> Self {
        Self {
            matched: false,
            distance: f32::INFINITY,
            nearest: None,
        }
    }

    /// Identity of the match, `None` unless `matched`.
    pub fn identity(&self) -> Option<&str> {
        if !self.matched {
            return None;
        }
        self.nearest.as_ref().map(|c| c.identity.as_str())
    }
}
