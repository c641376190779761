//! Active liveness challenge: two blinks, then a head turn left, then right.
//!
//! A photograph cannot blink and a looped video is unlikely to follow an
//! ordered prompt, so the subject must complete the stages in sequence:
//!
//! 1. Blink twice. A blink is counted on the frame the eye aspect ratio
//!    drops below [`EAR_BLINK_THRESHOLD`], provided the eyes were seen open
//!    since the last counted blink (latch) and at least
//!    [`BLINK_COOLDOWN_MS`] have passed since it (cooldown).
//! 2. Tilt the head left (`tilt < -TILT_THRESHOLD`).
//! 3. Tilt the head right (`tilt > TILT_THRESHOLD`).
//!
//! The machine only moves forward. Frames without usable metrics leave it
//! untouched, and once [`Phase::Complete`] is reached every further call is
//! a no-op.
//!
//! # Threat Coverage
//!
//! - **Blocks:** Printed photographs, static screens.
//! - **Does not block:** Video replay of a subject performing the same
//!   sequence, 3D masks.

use serde::{Deserialize, Serialize};

/// Average EAR below which the eyes count as closed.
pub const EAR_BLINK_THRESHOLD: f64 = 0.290;
/// Minimum time between two counted blinks.
pub const BLINK_COOLDOWN_MS: u64 = 1000;
/// Head tilt magnitude required for a turn, applied symmetrically.
pub const TILT_THRESHOLD: f64 = 0.10;
/// Blinks required before the head-turn stages open.
pub const REQUIRED_BLINKS: u8 = 2;

/// Challenge stage. Ordered: a session only ever moves to a later variant.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    AwaitingBlinks,
    AwaitingHeadLeft,
    AwaitingHeadRight,
    Complete,
}

/// What a single [`ChallengeState::advance`] call changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    None,
    /// A blink was counted; carries the new count.
    BlinkCounted(u8),
    HeadLeftVerified,
    /// The final stage passed. Returned exactly once per session.
    Completed,
}

/// Liveness progress for one verification session.
///
/// Fields are private: the only way to change them is [`advance`](Self::advance),
/// which keeps the ordering invariants intact.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChallengeState {
    blink_count: u8,
    eyes_closed: bool,
    /// `None` stands for "no blink yet" (minus infinity).
    last_blink_ms: Option<u64>,
    head_left_verified: bool,
    head_right_verified: bool,
    phase: Phase,
}

impl ChallengeState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blink_count(&self) -> u8 {
        self.blink_count
    }

    pub fn eyes_closed(&self) -> bool {
        self.eyes_closed
    }

    pub fn last_blink_ms(&self) -> Option<u64> {
        self.last_blink_ms
    }

    pub fn head_left_verified(&self) -> bool {
        self.head_left_verified
    }

    pub fn head_right_verified(&self) -> bool {
        self.head_right_verified
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// Instruction to show the subject for the current stage.
    pub fn prompt(&self) -> String {
        match self.phase {
            Phase::AwaitingBlinks => format!(
                "Please blink twice ({}/{})",
                self.blink_count, REQUIRED_BLINKS
            ),
            Phase::AwaitingHeadLeft => "Blink verification complete! Now turn your head left".to_string(),
            Phase::AwaitingHeadRight => "Great! Now turn your head right".to_string(),
            Phase::Complete => "Verification complete! All steps passed successfully.".to_string(),
        }
    }

    /// Feed one frame's metrics into the machine.
    ///
    /// * `ear_average` — mean eye aspect ratio of both eyes.
    /// * `head_tilt` — signed tilt, or `None` when the head-turn landmarks
    ///   were not available this frame.
    /// * `now_ms` — monotonic frame timestamp in milliseconds.
    ///
    /// Frames must be fed in arrival order. A frame that completes the blink
    /// stage is not evaluated for head turns.
    pub fn advance(&mut self, ear_average: f64, head_tilt: Option<f64>, now_ms: u64) -> Transition {
        match self.phase {
            Phase::Complete => Transition::None,
            Phase::AwaitingBlinks => self.observe_eyes(ear_average, now_ms),
            Phase::AwaitingHeadLeft | Phase::AwaitingHeadRight => match head_tilt {
                Some(tilt) if tilt.is_finite() => self.observe_tilt(tilt),
                _ => Transition::None,
            },
        }
    }

    fn observe_eyes(&mut self, ear: f64, now_ms: u64) -> Transition {
        if ear < EAR_BLINK_THRESHOLD && !self.eyes_closed && self.cooldown_elapsed(now_ms) {
            self.eyes_closed = true;
            self.last_blink_ms = Some(now_ms);
            self.blink_count = (self.blink_count + 1).min(REQUIRED_BLINKS);
            if self.blink_count == REQUIRED_BLINKS {
                self.phase = Phase::AwaitingHeadLeft;
            }
            return Transition::BlinkCounted(self.blink_count);
        }

        if ear >= EAR_BLINK_THRESHOLD && self.eyes_closed {
            self.eyes_closed = false;
        }
        Transition::None
    }

    fn cooldown_elapsed(&self, now_ms: u64) -> bool {
        match self.last_blink_ms {
            None => true,
            Some(last) => now_ms.saturating_sub(last) > BLINK_COOLDOWN_MS,
        }
    }

    fn observe_tilt(&mut self, tilt: f64) -> Transition {
        match self.phase {
            Phase::AwaitingHeadLeft if !self.head_left_verified && tilt < -TILT_THRESHOLD => {
                self.head_left_verified = true;
                self.phase = Phase::AwaitingHeadRight;
                Transition::HeadLeftVerified
            }
            // Only reachable after the left turn moved the phase forward.
            Phase::AwaitingHeadRight if tilt > TILT_THRESHOLD => {
                self.head_right_verified = true;
                self.phase = Phase::Complete;
                Transition::Completed
            }
            _ => Transition::None,
        }
    }
}
