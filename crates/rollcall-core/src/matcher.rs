//! Nearest-neighbour matching of probe embeddings against enrolled descriptors.
//!
//! Linear scan, O(queries x descriptors). An index structure can replace
//! [`EuclideanMatcher`] behind the [`Matcher`] trait without touching callers.

use crate::types::{Embedding, FaceDescriptor, MatchCandidate, MatchResult};

/// Default maximum Euclidean distance still considered the same identity.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

/// Strategy for finding the best enrolled match for a probe embedding.
pub trait Matcher {
    fn best_match(&self, probe: &Embedding, gallery: &[FaceDescriptor]) -> MatchResult;

    /// Match every probe independently, preserving order.
    fn match_all(&self, probes: &[Embedding], gallery: &[FaceDescriptor]) -> Vec<MatchResult> {
        probes.iter().map(|p| self.best_match(p, gallery)).collect()
    }
}

/// Euclidean distance matcher with a single threshold.
///
/// A probe matches when the nearest distance is strictly below the threshold.
/// Ties keep the first descriptor encountered in gallery order.
#[derive(Debug, Clone, Copy)]
pub struct EuclideanMatcher {
    threshold: f32,
}

impl EuclideanMatcher {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Default for EuclideanMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_MATCH_THRESHOLD)
    }
}

impl Matcher for EuclideanMatcher {
    fn best_match(&self, probe: &Embedding, gallery: &[FaceDescriptor]) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;

        for (i, descriptor) in gallery.iter().enumerate() {
            let distance = probe.euclidean_distance(&descriptor.embedding);
            if distance.is_nan() {
                continue;
            }
            match best {
                Some((_, best_distance)) if distance >= best_distance => {}
                _ => best = Some((i, distance)),
            }
        }

        let Some((idx, distance)) = best else {
            return MatchResult::no_gallery();
        };
        let descriptor = &gallery[idx];

        MatchResult {
            matched: distance < self.threshold,
            distance,
            nearest: Some(MatchCandidate {
                descriptor_id: descriptor.id.clone(),
                identity: descriptor.identity.clone(),
                distance,
            }),
        }
    }
}
