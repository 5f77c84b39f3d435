//! Engine events and broadcasting.
//!
//! Every state change of a lesson session is published as an [`EngineEvent`]
//! to all subscribers of the session's [`EventBroadcaster`]. Events serialize
//! as JSON objects with `event` and `payload` fields.
//!
//! # Event Types
//!
//! - `emotion_observed` - A sample reached the session
//! - `sample_ignored` - A sample was dropped by the confidence or cooldown gate
//! - `mode_changed` - The adaptation mode, reason or message changed
//! - `quiz_started` / `answer_revealed` / `quiz_advanced` / `quiz_completed` /
//!   `quiz_exited` - Quiz lifecycle
//! - `progress_reported` - New progress was sent to the progress sink
//! - `action_rejected` - A user action was refused
//! - `source_started` / `source_stopped` / `camera_error` - Video source lifecycle
//!
//! # Example
//!
//! ```
//! use emoteach_engine::{EngineEvent, EventBroadcaster};
//!
//! # async fn example() {
//! let broadcaster = EventBroadcaster::new(100);
//! let mut receiver = broadcaster.subscribe();
//!
//! broadcaster.send(EngineEvent::source_started(1));
//!
//! if let Ok(event) = receiver.recv().await {
//!     assert_eq!(event.event_name(), "source_started");
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::adaptation::{AdaptationMode, AdaptationState, IgnoreReason};
use crate::emotion::{EmotionLabel, EmotionSample};
use crate::error::AcquisitionErrorKind;
use crate::progress::Progress;
use crate::quiz::{AnswerFeedback, QuizOutcome};

// ============================================================================
// Event Payloads
// ============================================================================

/// Payload for the `emotion_observed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionObservedPayload {
    /// Detected label, `None` when no face was found.
    pub label: Option<EmotionLabel>,
    /// Confidence in percent.
    pub confidence: u8,
    /// Session time of the sample in milliseconds.
    pub at_ms: u64,
}

/// Payload for the `sample_ignored` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleIgnoredPayload {
    /// Label of the dropped sample.
    pub label: Option<EmotionLabel>,
    /// Why it was dropped.
    #[serde(flatten)]
    pub ignored: IgnoreReason,
}

/// What caused a mode change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeCause {
    /// A classifier sample.
    Emotion,
    /// An explicit learner request.
    User,
    /// The quiz was completed.
    QuizCompleted,
    /// The quiz was abandoned.
    QuizExited,
}

/// Payload for the `mode_changed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeChangedPayload {
    /// Mode before the change.
    pub from: AdaptationMode,
    /// Mode after the change.
    pub to: AdaptationMode,
    /// Reason after the change.
    pub reason: String,
    /// Message after the change.
    pub message: String,
    /// What triggered the change.
    pub cause: ChangeCause,
}

/// Who started a quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizTrigger {
    /// A frustrated sample.
    Emotion,
    /// The learner.
    User,
}

/// Payload for the `quiz_started` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizStartedPayload {
    /// Number of questions.
    pub total: usize,
    /// Who started it.
    pub trigger: QuizTrigger,
    /// Progress snapshot the completion bonus is computed from.
    pub progress_at_start: Progress,
}

/// Payload for the `quiz_advanced` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizAdvancedPayload {
    /// Zero-based index of the new current question.
    pub index: usize,
}

/// Payload for the `quiz_completed` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizCompletedPayload {
    /// Final score and total.
    #[serde(flatten)]
    pub outcome: QuizOutcome,
    /// Completion message shown to the learner.
    pub message: String,
}

/// Payload for the `quiz_exited` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizExitedPayload {
    /// Questions answered before leaving.
    pub answered: usize,
}

/// Payload for the `progress_reported` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressReportedPayload {
    /// Lesson the progress belongs to.
    pub lesson_id: String,
    /// Progress before the report.
    pub previous: Progress,
    /// Reported progress.
    pub progress: Progress,
}

/// Payload for the `action_rejected` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRejectedPayload {
    /// The refused action.
    pub action: String,
    /// Human-readable reason.
    pub reason: String,
}

/// Payload for the source lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePayload {
    /// Source generation the event refers to.
    pub generation: u64,
}

/// Payload for the `camera_error` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraErrorPayload {
    /// Failure category.
    pub kind: AcquisitionErrorKind,
    /// Message shown to the learner.
    pub message: String,
}

// ============================================================================
// Event Enum
// ============================================================================

/// Events published by a lesson session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "payload", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A sample reached the session.
    EmotionObserved(EmotionObservedPayload),
    /// A sample was dropped by a gate.
    SampleIgnored(SampleIgnoredPayload),
    /// The adaptation mode changed.
    ModeChanged(ModeChangedPayload),
    /// A quiz started.
    QuizStarted(QuizStartedPayload),
    /// An answer was submitted and revealed.
    AnswerRevealed(AnswerFeedback),
    /// The quiz moved to the next question.
    QuizAdvanced(QuizAdvancedPayload),
    /// The quiz was completed.
    QuizCompleted(QuizCompletedPayload),
    /// The quiz was abandoned.
    QuizExited(QuizExitedPayload),
    /// Progress was reported.
    ProgressReported(ProgressReportedPayload),
    /// A user action was refused.
    ActionRejected(ActionRejectedPayload),
    /// The video source started.
    SourceStarted(SourcePayload),
    /// The video source stopped.
    SourceStopped(SourcePayload),
    /// The video source could not be acquired.
    CameraError(CameraErrorPayload),
}

impl EngineEvent {
    /// Creates an `EmotionObserved` event.
    #[must_use]
    pub const fn emotion_observed(sample: &EmotionSample, at_ms: u64) -> Self {
        Self::EmotionObserved(EmotionObservedPayload {
            label: sample.label,
            confidence: sample.confidence,
            at_ms,
        })
    }

    /// Creates a `SampleIgnored` event.
    #[must_use]
    pub const fn sample_ignored(sample: &EmotionSample, ignored: IgnoreReason) -> Self {
        Self::SampleIgnored(SampleIgnoredPayload {
            label: sample.label,
            ignored,
        })
    }

    /// Creates a `ModeChanged` event from the previous mode and the new state.
    #[must_use]
    pub fn mode_changed(from: AdaptationMode, state: &AdaptationState, cause: ChangeCause) -> Self {
        Self::ModeChanged(ModeChangedPayload {
            from,
            to: state.mode,
            reason: state.reason.clone(),
            message: state.message.clone(),
            cause,
        })
    }

    /// Creates a `QuizStarted` event.
    #[must_use]
    pub const fn quiz_started(total: usize, trigger: QuizTrigger, progress_at_start: Progress) -> Self {
        Self::QuizStarted(QuizStartedPayload {
            total,
            trigger,
            progress_at_start,
        })
    }

    /// Creates a `QuizCompleted` event.
    #[must_use]
    pub fn quiz_completed(outcome: QuizOutcome) -> Self {
        Self::QuizCompleted(QuizCompletedPayload {
            message: outcome.summary(),
            outcome,
        })
    }

    /// Creates a `ProgressReported` event.
    #[must_use]
    pub fn progress_reported(lesson_id: impl Into<String>, previous: Progress, progress: Progress) -> Self {
        Self::ProgressReported(ProgressReportedPayload {
            lesson_id: lesson_id.into(),
            previous,
            progress,
        })
    }

    /// Creates an `ActionRejected` event.
    #[must_use]
    pub fn action_rejected(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ActionRejected(ActionRejectedPayload {
            action: action.into(),
            reason: reason.into(),
        })
    }

    /// Creates a `SourceStarted` event.
    #[must_use]
    pub const fn source_started(generation: u64) -> Self {
        Self::SourceStarted(SourcePayload { generation })
    }

    /// Creates a `SourceStopped` event.
    #[must_use]
    pub const fn source_stopped(generation: u64) -> Self {
        Self::SourceStopped(SourcePayload { generation })
    }

    /// Creates a `CameraError` event.
    #[must_use]
    pub fn camera_error(kind: AcquisitionErrorKind, message: impl Into<String>) -> Self {
        Self::CameraError(CameraErrorPayload {
            kind,
            message: message.into(),
        })
    }

    /// Returns the event name as a string.
    #[must_use]
    pub const fn event_name(&self) -> &'static str {
        match self {
            Self::EmotionObserved(_) => "emotion_observed",
            Self::SampleIgnored(_) => "sample_ignored",
            Self::ModeChanged(_) => "mode_changed",
            Self::QuizStarted(_) => "quiz_started",
            Self::AnswerRevealed(_) => "answer_revealed",
            Self::QuizAdvanced(_) => "quiz_advanced",
            Self::QuizCompleted(_) => "quiz_completed",
            Self::QuizExited(_) => "quiz_exited",
            Self::ProgressReported(_) => "progress_reported",
            Self::ActionRejected(_) => "action_rejected",
            Self::SourceStarted(_) => "source_started",
            Self::SourceStopped(_) => "source_stopped",
            Self::CameraError(_) => "camera_error",
        }
    }
}

// ============================================================================
// Event Broadcaster
// ============================================================================

/// Broadcasts engine events to all subscribers.
///
/// Uses a tokio broadcast channel for pub-sub event distribution.
/// Events are not kept for subscribers that join later.
#[derive(Debug, Clone)]
pub struct EventBroadcaster {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBroadcaster {
    /// Creates a new `EventBroadcaster` with the specified buffer capacity.
    ///
    /// A subscriber that falls more than `capacity` events behind receives a
    /// `Lagged` error and misses the oldest events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Creates a new subscriber for receiving events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Broadcasts an event to all subscribers.
    ///
    /// Returns the number of receivers that will see the event; 0 when
    /// nobody is listening.
    pub fn send(&self, event: EngineEvent) -> usize {
        // send() only fails without receivers
        self.sender.send(event).unwrap_or(0)
    }

    /// Returns the number of active subscribers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(100)
    }
}
