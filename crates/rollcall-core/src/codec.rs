//! Text encoding for persisted embeddings.
//!
//! Descriptors are stored as a JSON number array. `serde_json` writes the
//! shortest representation that parses back to the same `f32`, so the round
//! trip is lossless at single precision.

use crate::types::Embedding;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("descriptor is not a JSON number array: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("descriptor component {0} is not a finite number")]
    NonFinite(usize),
}

/// Encode an embedding as JSON text.
///
/// Non-finite components have no JSON form and are rejected.
pub fn encode(embedding: &Embedding) -> Result<String, CodecError> {
    if let Some(index) = embedding.values.iter().position(|v| !v.is_finite()) {
        return Err(CodecError::NonFinite(index));
    }
    Ok(serde_json::to_string(&embedding.values)?)
}

/// Decode JSON text produced by [`encode`].
pub fn decode(text: &str) -> Result<Embedding, CodecError> {
    let values: Vec<f32> = serde_json::from_str(text)?;
    Ok(Embedding::new(values))
}
