//! rollcall-core: descriptor matching and enrollment policy.
//!
//! Pure, I/O-free building blocks for the attendance daemon: the descriptor
//! data model, the text codec used for persisted embeddings, nearest-neighbour
//! matching under a Euclidean threshold, and the enrollment guard. Face
//! detection itself is an external collaborator behind [`DetectionAdapter`].

pub mod codec;
pub mod detector;
pub mod enrollment;
pub mod matcher;
pub mod types;

pub use detector::{parse_detections, Detection, DetectionAdapter, DetectionError};
pub use enrollment::{
    EnrollmentError, EnrollmentGuard, EnrollmentPlan, EnrollmentPolicy, ExistingIdentity, MultiFace,
};
pub use matcher::{EuclideanMatcher, Matcher, DEFAULT_MATCH_THRESHOLD};
pub use types::{
    DescriptorError, DescriptorId, Embedding, FaceDescriptor, MatchCandidate, MatchResult,
    DEFAULT_DESCRIPTOR_LEN,
};
