//! Adaptation decision state machine.
//!
//! [`transition`] is a pure function from the current [`AdaptationState`], one
//! [`EmotionSample`] and a monotonic timestamp to the next state. It applies two
//! gates before looking at the emotion itself:
//!
//! - the confidence gate drops samples without a face or below the threshold;
//! - the cooldown gate drops confused/frustrated samples that arrive within the
//!   cooldown window of the previous negative transition.
//!
//! Positive samples are never subject to the cooldown and never move the
//! cooldown timestamp, so praise stays responsive on every tick.
//!
//! Timestamps are offsets from a session epoch, which keeps the function free
//! of clocks and timers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::emotion::{EmotionCategory, EmotionSample};

// ============================================================================
// Guidance Text
// ============================================================================

/// Reason shown when confusion triggers a simplified explanation.
pub const CONFUSED_REASON: &str =
    "I noticed you might be feeling confused. Let me explain this more simply!";

/// Message shown alongside the simplified explanation.
pub const CONFUSED_MESSAGE: &str =
    "Don't worry! Learning new things can be tricky. Let's break it down step by step.";

/// Reason shown when frustration triggers a quiz.
pub const FRUSTRATED_REASON: &str =
    "I see you might be frustrated. How about a fun interactive quiz to re-engage?";

/// Message shown when the re-engagement quiz starts.
pub const FRUSTRATED_MESSAGE: &str =
    "Let's try something interactive! Sometimes a quick quiz helps us feel more confident.";

/// Reason shown when a positive emotion is detected.
pub const POSITIVE_REASON: &str = "Great! You seem engaged. Keep up the excellent work!";

/// Positive reinforcement message. Also the default banner text.
pub const POSITIVE_MESSAGE: &str =
    "You're doing amazing! Your positive energy is wonderful to see.";

/// Reason shown when the learner asks for a simpler explanation.
pub const SIMPLIFY_REASON: &str = "You requested a simpler explanation";

/// Message shown when the learner asks for a simpler explanation.
pub const SIMPLIFY_MESSAGE: &str = "No problem! Here's a simpler way to understand this.";

// ============================================================================
// AdaptationMode
// ============================================================================

/// Content presentation strategy currently in effect.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdaptationMode {
    /// Full lesson text.
    #[default]
    Normal,
    /// Simplified text with hints and extra examples.
    Simplified,
    /// Full text with hints and positive reinforcement.
    Encouraging,
    /// Interactive quiz.
    Quiz,
}

impl AdaptationMode {
    /// Returns the lowercase mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Simplified => "simplified",
            Self::Encouraging => "encouraging",
            Self::Quiz => "quiz",
        }
    }
}

impl std::fmt::Display for AdaptationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// AdaptationState
// ============================================================================

/// Mutable adaptation state owned by a lesson session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdaptationState {
    /// Active presentation mode.
    pub mode: AdaptationMode,
    /// Why the current mode was chosen; empty when there is nothing to say.
    pub reason: String,
    /// Guidance message for the learner; empty when there is nothing to say.
    pub message: String,
    /// Time of the last confused/frustrated transition, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_negative_adaptation_at: Option<Duration>,
}

impl AdaptationState {
    /// Creates the initial state: `normal`, no guidance, no cooldown.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Switches to the simplified explanation on the learner's request.
    ///
    /// Bypasses both gates and leaves the cooldown timestamp alone.
    pub fn request_simplified(&mut self) {
        self.mode = AdaptationMode::Simplified;
        self.reason = SIMPLIFY_REASON.to_string();
        self.message = SIMPLIFY_MESSAGE.to_string();
    }

    /// Enters quiz mode on the learner's request, bypassing both gates.
    ///
    /// Reason and message are left as they are.
    pub fn enter_quiz(&mut self) {
        self.mode = AdaptationMode::Quiz;
    }

    /// Switches to `encouraging` with the quiz summary as message.
    pub fn complete_quiz(&mut self, summary: impl Into<String>) {
        self.mode = AdaptationMode::Encouraging;
        self.message = summary.into();
    }

    /// Returns to `normal` after the learner abandons a quiz.
    ///
    /// Reason and message are cleared; the cooldown timestamp is kept.
    pub fn exit_quiz(&mut self) {
        self.mode = AdaptationMode::Normal;
        self.reason.clear();
        self.message.clear();
    }

    /// Returns `true` when a reason is currently displayed.
    #[must_use]
    pub fn is_adapting(&self) -> bool {
        !self.reason.is_empty()
    }

    /// Time left before another negative transition is allowed.
    ///
    /// Returns `None` when no cooldown is in effect at `now`.
    #[must_use]
    pub fn cooldown_remaining(&self, now: Duration, cooldown: Duration) -> Option<Duration> {
        let last = self.last_negative_adaptation_at?;
        let elapsed = now.saturating_sub(last);
        (elapsed < cooldown).then(|| cooldown - elapsed)
    }

    fn apply_guidance(&mut self, mode: AdaptationMode, reason: &str, message: &str) {
        self.mode = mode;
        self.reason = reason.to_string();
        self.message = message.to_string();
    }
}

// ============================================================================
// Policy
// ============================================================================

/// Thresholds applied by [`transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdaptationPolicy {
    /// Minimum confidence (percent) for a sample to be considered.
    pub confidence_threshold: u8,
    /// Minimum time between two negative transitions.
    pub cooldown: Duration,
}

impl AdaptationPolicy {
    /// Builds the policy from the engine configuration.
    #[must_use]
    pub const fn from_config(config: &EngineConfig) -> Self {
        Self {
            confidence_threshold: config.confidence_threshold,
            cooldown: config.cooldown(),
        }
    }
}

impl Default for AdaptationPolicy {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

// ============================================================================
// Decision
// ============================================================================

/// Why a sample did not change the state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum IgnoreReason {
    /// No face was detected.
    NoFace,
    /// The sample was below the confidence threshold.
    LowConfidence {
        /// Confidence of the sample.
        confidence: u8,
        /// Threshold it failed to reach.
        threshold: u8,
    },
    /// A negative sample arrived inside the cooldown window.
    Cooldown {
        /// Milliseconds left in the window.
        remaining_ms: u64,
    },
}

/// What [`transition`] did with a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The state is unchanged.
    Ignored(IgnoreReason),
    /// The sample was applied.
    Adapted {
        /// Category of the sample.
        category: EmotionCategory,
        /// Mode after the transition.
        mode: AdaptationMode,
        /// Whether the quiz sub-engine should be activated.
        start_quiz: bool,
    },
}

/// Result of applying one sample.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    /// State after the sample.
    pub state: AdaptationState,
    /// What happened.
    pub outcome: Outcome,
}

impl Decision {
    const fn ignored(state: AdaptationState, reason: IgnoreReason) -> Self {
        Self {
            state,
            outcome: Outcome::Ignored(reason),
        }
    }

    /// Returns `true` if the sample changed nothing.
    #[must_use]
    pub const fn is_ignored(&self) -> bool {
        matches!(self.outcome, Outcome::Ignored(_))
    }

    /// Returns `true` if the quiz sub-engine should start.
    #[must_use]
    pub const fn starts_quiz(&self) -> bool {
        matches!(
            self.outcome,
            Outcome::Adapted {
                start_quiz: true,
                ..
            }
        )
    }
}

/// Applies one sample to the adaptation state.
///
/// `now` is the sample time as an offset from the session epoch.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use emoteach_engine::{
///     transition, AdaptationMode, AdaptationPolicy, AdaptationState, EmotionLabel,
///     EmotionSample,
/// };
///
/// let policy = AdaptationPolicy::default();
/// let state = AdaptationState::new();
///
/// let decision = transition(
///     state,
///     &EmotionSample::new(EmotionLabel::Angry, 80),
///     Duration::ZERO,
///     &policy,
/// );
/// assert_eq!(decision.state.mode, AdaptationMode::Quiz);
/// assert!(decision.starts_quiz());
///
/// // Inside the cooldown window: unchanged.
/// let decision = transition(
///     decision.state,
///     &EmotionSample::new(EmotionLabel::Fearful, 90),
///     Duration::from_millis(5_000),
///     &policy,
/// );
/// assert!(decision.is_ignored());
/// assert_eq!(decision.state.mode, AdaptationMode::Quiz);
/// ```
#[must_use]
pub fn transition(
    mut state: AdaptationState,
    sample: &EmotionSample,
    now: Duration,
    policy: &AdaptationPolicy,
) -> Decision {
    let Some(label) = sample.label else {
        return Decision::ignored(state, IgnoreReason::NoFace);
    };

    if sample.confidence < policy.confidence_threshold {
        return Decision::ignored(
            state,
            IgnoreReason::LowConfidence {
                confidence: sample.confidence,
                threshold: policy.confidence_threshold,
            },
        );
    }

    let category = label.category();

    if category.is_negative() {
        if let Some(remaining) = state.cooldown_remaining(now, policy.cooldown) {
            let remaining_ms = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX);
            return Decision::ignored(state, IgnoreReason::Cooldown { remaining_ms });
        }
        state.last_negative_adaptation_at = Some(now);
    }

    let start_quiz = match category {
        EmotionCategory::Confused => {
            state.apply_guidance(AdaptationMode::Simplified, CONFUSED_REASON, CONFUSED_MESSAGE);
            false
        }
        EmotionCategory::Frustrated => {
            state.apply_guidance(AdaptationMode::Quiz, FRUSTRATED_REASON, FRUSTRATED_MESSAGE);
            true
        }
        EmotionCategory::Positive => {
            state.apply_guidance(AdaptationMode::Encouraging, POSITIVE_REASON, POSITIVE_MESSAGE);
            false
        }
        EmotionCategory::Other => {
            state.mode = AdaptationMode::Normal;
            state.reason.clear();
            state.message.clear();
            false
        }
    };

    Decision {
        outcome: Outcome::Adapted {
            category,
            mode: state.mode,
            start_quiz,
        },
        state,
    }
}
