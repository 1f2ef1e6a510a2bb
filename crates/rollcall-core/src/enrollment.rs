//! Enrollment policy: decides what happens to freshly detected descriptors.

use crate::types::{DescriptorError, Embedding, DEFAULT_DESCRIPTOR_LEN};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnrollmentError {
    #[error(transparent)]
    InvalidDescriptor(#[from] DescriptorError),
    #[error("identity must not be empty")]
    EmptyIdentity,
    #[error("identity '{0}' already has enrolled descriptors")]
    IdentityAlreadyEnrolled(String),
    #[error("enrollment image contains {0} faces, expected exactly one")]
    MultipleFaces(usize),
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("unknown {kind} policy '{value}'")]
pub struct ParsePolicyError {
    kind: &'static str,
    value: String,
}

/// What to do when the identity already has descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExistingIdentity {
    /// Add the new descriptors next to the existing ones.
    #[default]
    Append,
    /// Drop the existing descriptors and store the new ones.
    Replace,
    /// Refuse the enrollment.
    Reject,
}

impl FromStr for ExistingIdentity {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "replace" => Ok(Self::Replace),
            "reject" => Ok(Self::Reject),
            other => Err(ParsePolicyError {
                kind: "existing-identity",
                value: other.to_string(),
            }),
        }
    }
}

/// What to do when the enrollment image contains more than one face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MultiFace {
    /// Store one descriptor per detected face under the identity.
    #[default]
    All,
    /// Keep only the first face the detector reported.
    First,
    /// Refuse the enrollment.
    Reject,
}

impl FromStr for MultiFace {
    type Err = ParsePolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(Self::All),
            "first" => Ok(Self::First),
            "reject" => Ok(Self::Reject),
            other => Err(ParsePolicyError {
                kind: "multi-face",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnrollmentPolicy {
    pub existing_identity: ExistingIdentity,
    pub multi_face: MultiFace,
    pub descriptor_len: usize,
}

impl Default for EnrollmentPolicy {
    fn default() -> Self {
        Self {
            existing_identity: ExistingIdentity::default(),
            multi_face: MultiFace::default(),
            descriptor_len: DEFAULT_DESCRIPTOR_LEN,
        }
    }
}

/// Outcome of [`EnrollmentGuard::plan`].
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollmentPlan {
    /// Nothing detected, nothing to persist.
    NoFace,
    Append(Vec<Embedding>),
    Replace(Vec<Embedding>),
}

impl EnrollmentPlan {
    pub fn embeddings(&self) -> &[Embedding] {
        match self {
            Self::NoFace => &[],
            Self::Append(e) | Self::Replace(e) => e,
        }
    }
}

pub struct EnrollmentGuard {
    policy: EnrollmentPolicy,
}

impl EnrollmentGuard {
    pub fn new(policy: EnrollmentPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &EnrollmentPolicy {
        &self.policy
    }

    /// Decide how to persist `detected` for `identity`.
    ///
    /// `already_enrolled` is the number of descriptors the identity has now.
    /// Every embedding is validated before anything is accepted, so a plan
    /// never carries a descriptor that would violate the length invariant.
    pub fn plan(
        &self,
        identity: &str,
        already_enrolled: usize,
        mut detected: Vec<Embedding>,
    ) -> Result<EnrollmentPlan, EnrollmentError> {
        if identity.trim().is_empty() {
            return Err(EnrollmentError::EmptyIdentity);
        }
        if detected.is_empty() {
            return Ok(EnrollmentPlan::NoFace);
        }
        for embedding in &detected {
            embedding.validate(self.policy.descriptor_len)?;
        }

        if detected.len() > 1 {
            match self.policy.multi_face {
                MultiFace::All => {}
                MultiFace::First => {
                    tracing::debug!(faces = detected.len(), identity, "keeping first detected face");
                    detected.truncate(1);
                }
                MultiFace::Reject => return Err(EnrollmentError::MultipleFaces(detected.len())),
            }
        }

        if already_enrolled == 0 {
            return Ok(EnrollmentPlan::Append(detected));
        }
        match self.policy.existing_identity {
            ExistingIdentity::Append => Ok(EnrollmentPlan::Append(detected)),
            ExistingIdentity::Replace => Ok(EnrollmentPlan::Replace(detected)),
            ExistingIdentity::Reject => {
                Err(EnrollmentError::IdentityAlreadyEnrolled(identity.to_string()))
            }
        }
    }
}
