//! Per-frame driver: landmarks in, progress and (once) an enrollment outcome out.

use serde::{Deserialize, Serialize};
use veriface_core::{
    compute_head_tilt, ChallengeState, CosineMatcher, Descriptor, EyeMetrics, LandmarkSet,
    Matcher, Phase, Transition,
};

use crate::store::{NewVectorRecord, VectorStore};

/// One detector frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Monotonic capture time in milliseconds.
    pub t_ms: u64,
    /// Landmarks of the first detected face, if any.
    #[serde(default)]
    pub face: Option<LandmarkSet>,
    /// Identity descriptor, when the detector was asked for one.
    #[serde(default)]
    pub descriptor: Option<Vec<f64>>,
}

/// Challenge progress after a frame, for display.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressUpdate {
    pub blink_count: u8,
    pub phase: Phase,
    pub head_left_verified: bool,
    pub head_right_verified: bool,
    pub current_ear: Option<f64>,
    pub current_tilt: Option<f64>,
    pub prompt: String,
    /// Set while the driver needs the detector to attach descriptors.
    pub descriptor_requested: bool,
}

/// Terminal result of a session. Emitted at most once.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SessionOutcome {
    /// Liveness passed and no existing enrollment matched. `record_id` is
    /// `None` when persisting the new record failed.
    Success { record_id: Option<String> },
    /// Liveness passed but the descriptor matches an existing enrollment.
    DuplicateFound { similarity: f64, record_id: String },
    Error { reason: String },
}

/// Result of processing one frame.
#[derive(Debug, Clone)]
pub struct FrameReport {
    pub progress: ProgressUpdate,
    pub outcome: Option<SessionOutcome>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    NotReached,
    AwaitingDescriptor,
    Done,
}

/// Drives one verification session.
///
/// Owns the [`ChallengeState`]; dropping the pipeline discards it.
pub struct Pipeline<S> {
    state: ChallengeState,
    store: S,
    matcher: CosineMatcher,
    wallet_address: Option<String>,
    completion: Completion,
}

impl<S: VectorStore> Pipeline<S> {
    pub fn new(store: S, match_threshold: f64) -> Self {
        Self {
            state: ChallengeState::new(),
            store,
            matcher: CosineMatcher {
                threshold: match_threshold,
            },
            wallet_address: None,
            completion: Completion::NotReached,
        }
    }

    /// Attach a wallet address to the record enrolled on success.
    pub fn with_wallet(mut self, wallet_address: Option<String>) -> Self {
        self.wallet_address = wallet_address;
        self
    }

    pub fn state(&self) -> &ChallengeState {
        &self.state
    }

    /// Process one frame: update the challenge and, on the frame that
    /// completes it (or the first later frame carrying a descriptor), run
    /// the duplicate check and enrollment.
    pub async fn process(&mut self, frame: &Frame) -> FrameReport {
        let (current_ear, current_tilt) = self.observe(frame);

        let mut outcome = None;
        if self.completion == Completion::AwaitingDescriptor {
            match &frame.descriptor {
                Some(values) => {
                    self.completion = Completion::Done;
                    outcome = Some(self.enroll(values.clone()).await);
                }
                None => {
                    tracing::debug!(t_ms = frame.t_ms, "challenge complete; waiting for a descriptor");
                }
            }
        }

        FrameReport {
            progress: self.progress(current_ear, current_tilt),
            outcome,
        }
    }

    /// Compute metrics and advance the state machine. Frames without usable
    /// landmarks are skipped.
    fn observe(&mut self, frame: &Frame) -> (Option<f64>, Option<f64>) {
        let Some(face) = frame.face.as_ref() else {
            tracing::trace!(t_ms = frame.t_ms, "no face; frame skipped");
            return (None, None);
        };
        let Some((left, right)) = face.eyes() else {
            tracing::trace!(t_ms = frame.t_ms, "incomplete eye landmarks; frame skipped");
            return (None, None);
        };

        let ear = EyeMetrics::from_eyes(left, right).average_ear;
        let (tilt, transition) = match self.state.phase() {
            Phase::Complete => (None, Transition::None),
            Phase::AwaitingBlinks => (None, self.state.advance(ear, None, frame.t_ms)),
            Phase::AwaitingHeadLeft | Phase::AwaitingHeadRight => {
                let Some((left, right)) = face.head_pose_eyes() else {
                    tracing::trace!(t_ms = frame.t_ms, "incomplete head landmarks; frame skipped");
                    return (Some(ear), None);
                };
                let tilt = compute_head_tilt(left, right);
                (Some(tilt), self.state.advance(ear, Some(tilt), frame.t_ms))
            }
        };

        match transition {
            Transition::None => {}
            Transition::BlinkCounted(count) => {
                tracing::info!(count, t_ms = frame.t_ms, ear, "blink counted");
            }
            Transition::HeadLeftVerified => {
                tracing::info!(t_ms = frame.t_ms, tilt = ?tilt, "head left verified");
            }
            Transition::Completed => {
                tracing::info!(t_ms = frame.t_ms, tilt = ?tilt, "liveness challenge complete");
                self.completion = Completion::AwaitingDescriptor;
            }
        }

        (Some(ear), tilt)
    }

    /// Duplicate check against the store, then append on no match.
    async fn enroll(&self, values: Vec<f64>) -> SessionOutcome {
        let descriptor = match Descriptor::new(values) {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(error = %e, "descriptor rejected");
                return SessionOutcome::Error {
                    reason: format!("invalid descriptor: {e}"),
                };
            }
        };

        let candidates = match self.store.query_all().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(error = %e, "duplicate check unavailable; treating as no match");
                Vec::new()
            }
        };
        tracing::debug!(candidates = candidates.len(), "checking for existing enrollment");

        match self.matcher.best_match(descriptor.as_slice(), &candidates) {
            Ok(Some(found)) => {
                tracing::info!(
                    record_id = %found.id,
                    similarity = found.similarity,
                    "duplicate enrollment"
                );
                SessionOutcome::DuplicateFound {
                    similarity: found.similarity,
                    record_id: found.id,
                }
            }
            Ok(None) => {
                let record = NewVectorRecord {
                    vector: descriptor.into_vec(),
                    timestamp: chrono::Utc::now(),
                    wallet_address: self.wallet_address.clone(),
                };
                match self.store.append(record).await {
                    Ok(id) => {
                        tracing::info!(record_id = %id, "descriptor enrolled");
                        SessionOutcome::Success { record_id: Some(id) }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to store descriptor; reporting success");
                        SessionOutcome::Success { record_id: None }
                    }
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "match request failed");
                SessionOutcome::Error {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn progress(&self, current_ear: Option<f64>, current_tilt: Option<f64>) -> ProgressUpdate {
        ProgressUpdate {
            blink_count: self.state.blink_count(),
            phase: self.state.phase(),
            head_left_verified: self.state.head_left_verified(),
            head_right_verified: self.state.head_right_verified(),
            current_ear,
            current_tilt,
            prompt: self.state.prompt(),
            descriptor_requested: self.state.phase() == Phase::AwaitingHeadRight
                || self.completion == Completion::AwaitingDescriptor,
        }
    }
}
