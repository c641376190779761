//! Core of the veriface liveness pipeline.
//!
//! Everything in this crate is synchronous and side-effect free:
//!
//! - [`geometry`] turns landmark points into eye aspect ratio and head tilt.
//! - [`challenge`] holds the blink / head-turn state machine.
//! - [`matcher`] compares identity descriptors against stored enrollments.
//!
//! Frame delivery, storage and outcome reporting live in `verifaced`.

pub mod challenge;
pub mod geometry;
pub mod landmarks;
pub mod matcher;

pub use challenge::{ChallengeState, Phase, Transition};
pub use geometry::{average_ear, compute_ear, compute_head_tilt, EyeMetrics};
pub use landmarks::{Descriptor, LandmarkSet, Point, DESCRIPTOR_DIM};
pub use matcher::{
    cosine_similarity, find_best_match, CosineMatcher, MatchError, MatchResult, Matcher,
    StoredVectorRecord,
};
