//! Face detection boundary.
//!
//! The neural network that turns an image into embeddings lives outside this
//! crate. Implementations of [`DetectionAdapter`] wrap it; this module also
//! holds the JSON wire format those backends emit.

use crate::types::Embedding;
use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DetectionError {
    #[error("detection failed: {0}")]
    Failed(String),
}

/// One face found in an image.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub embedding: Embedding,
}

/// Image bytes in, zero or more face embeddings out.
///
/// An image without faces yields `Ok(vec![])`; only decode or model
/// failures are errors.
#[async_trait]
pub trait DetectionAdapter: Send + Sync {
    async fn detect(&self, image: &[u8]) -> Result<Vec<Detection>, DetectionError>;
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDetection {
    Bare(Vec<f32>),
    Tagged { embedding: Vec<f32> },
}

/// Parse detector output: `[[f32, ...], ...]` or `[{"embedding": [...]}, ...]`.
pub fn parse_detections(output: &[u8]) -> Result<Vec<Detection>, DetectionError> {
    let raw: Vec<RawDetection> = serde_json::from_slice(output)
        .map_err(|e| DetectionError::Failed(format!("unparsable detector output: {e}")))?;

    Ok(raw
        .into_iter()
        .map(|r| {
            let values = match r {
                RawDetection::Bare(v) => v,
                RawDetection::Tagged { embedding } => embedding,
            };
            Detection {
                embedding: Embedding::new(values),
            }
        })
        .collect())
}
