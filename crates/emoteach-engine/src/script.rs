//! Session scripts.
//!
//! A script is a timed list of emotion readings, camera lifecycle changes and
//! learner actions for one lesson. Replaying it against a [`LessonSession`]
//! is deterministic: step timestamps become session time and nothing waits
//! on a real clock.
//!
//! ```json
//! {
//!   "lesson": "1",
//!   "steps": [
//!     { "at": 0, "type": "emotion", "emotion": "confused", "confidence": 70 },
//!     { "at": 12000, "type": "emotion", "emotion": "angry", "confidence": 80 },
//!     { "at": 13000, "type": "answer", "option": 1 }
//!   ]
//! }
//! ```
//!
//! Replay starts with the camera running (generation 1) so that scripts made
//! only of emotion readings need no lifecycle steps.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::adaptation::Outcome;
use crate::classifier::{Classification, ScriptedClassifier, ScriptedResponse};
use crate::emotion::{EmotionLabel, EmotionSample};
use crate::error::{AcquisitionErrorKind, EngineError, Result};
use crate::lesson::{Lesson, LessonProvider};
use crate::progress::{Progress, ProgressSink};
use crate::runtime::UserAction;
use crate::session::LessonSession;

/// Maximum script file size (512KB).
pub const MAX_SCRIPT_SIZE: u64 = 512 * 1024;

// ============================================================================
// Script Format
// ============================================================================

/// A timed session script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionScript {
    /// Lesson to run.
    pub lesson: String,
    /// Overrides the lesson's starting progress.
    #[serde(default)]
    pub initial_progress: Option<Progress>,
    /// Steps in non-decreasing time order.
    pub steps: Vec<ScriptStep>,
}

/// One timed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// Session time in milliseconds.
    pub at: u64,
    /// What happens.
    #[serde(flatten)]
    pub kind: StepKind,
}

/// What happens at a script step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StepKind {
    /// The classifier reports an expression.
    Emotion {
        /// Detected expression.
        emotion: EmotionLabel,
        /// Confidence in percent.
        confidence: u8,
    },
    /// The classifier finds no face.
    NoFace,
    /// The classifier fails on the frame.
    ClassifierFailure {
        /// Failure detail.
        #[serde(default)]
        message: String,
    },
    /// "Simplify this".
    Simplify,
    /// "Take a quiz".
    StartQuiz,
    /// Select an answer option.
    Answer {
        /// Zero-based option index.
        option: usize,
    },
    /// "Next question" or "Finish quiz".
    Next,
    /// "Exit quiz".
    ExitQuiz,
    /// "Mark as complete".
    MarkComplete,
    /// The camera starts a new generation.
    CameraStarted,
    /// The camera stops.
    CameraStopped,
    /// The camera could not be acquired.
    CameraError {
        /// Failure category.
        kind: AcquisitionErrorKind,
        /// Failure detail.
        #[serde(default)]
        message: String,
    },
}

impl StepKind {
    /// Returns `true` for steps produced by the classifier.
    #[must_use]
    pub const fn is_classifier_output(&self) -> bool {
        matches!(
            self,
            Self::Emotion { .. } | Self::NoFace | Self::ClassifierFailure { .. }
        )
    }

    /// The learner interaction of this step, if it is one.
    #[must_use]
    pub const fn user_action(&self) -> Option<UserAction> {
        match self {
            Self::Simplify => Some(UserAction::Simplify),
            Self::StartQuiz => Some(UserAction::StartQuiz),
            Self::Answer { option } => Some(UserAction::Answer { option: *option }),
            Self::Next => Some(UserAction::Next),
            Self::ExitQuiz => Some(UserAction::ExitQuiz),
            Self::MarkComplete => Some(UserAction::MarkComplete),
            _ => None,
        }
    }
}

impl ScriptStep {
    /// Step time as session time.
    #[must_use]
    pub const fn time(&self) -> Duration {
        Duration::from_millis(self.at)
    }
}

// ============================================================================
// Loading
// ============================================================================

impl SessionScript {
    /// Loads and validates a script file.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ScriptParseError` if the file is missing, too
    /// large, not UTF-8, not valid JSON or fails [`SessionScript::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::script_parse(path, "file not found")
            } else {
                EngineError::Io(e)
            }
        })?;

        if metadata.len() > MAX_SCRIPT_SIZE {
            return Err(EngineError::script_parse(
                path,
                format!("script is {}KB, the limit is 512KB", metadata.len() / 1024),
            ));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                EngineError::script_parse(path, "file is not valid UTF-8")
            } else {
                EngineError::Io(e)
            }
        })?;

        let script = Self::from_json(&content).map_err(|e| match e {
            EngineError::Json(e) => EngineError::script_parse(path, e.to_string()),
            EngineError::ScriptParseError { message, .. } => EngineError::script_parse(path, message),
            other => other,
        })?;

        debug!(path = %path.display(), steps = script.steps.len(), "Loaded session script");
        Ok(script)
    }

    /// Parses and validates a script from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Json` on malformed JSON and
    /// `EngineError::ScriptParseError` if validation fails.
    pub fn from_json(json: &str) -> Result<Self> {
        let script: Self = serde_json::from_str(json)?;
        script.validate()?;
        Ok(script)
    }

    /// Checks the lesson id, confidences and step ordering.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ScriptParseError` describing the first problem.
    pub fn validate(&self) -> Result<()> {
        if self.lesson.trim().is_empty() {
            return Err(EngineError::script_parse("<script>", "lesson id must not be empty"));
        }

        let mut previous = 0;
        for (i, step) in self.steps.iter().enumerate() {
            if step.at < previous {
                return Err(EngineError::script_parse(
                    "<script>",
                    format!("step {i} at {}ms is earlier than the step before it ({previous}ms)", step.at),
                ));
            }
            previous = step.at;

            if let StepKind::Emotion { confidence, .. } = step.kind {
                if confidence > 100 {
                    return Err(EngineError::script_parse(
                        "<script>",
                        format!("step {i} has confidence {confidence}, expected 0-100"),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Resolves the script's lesson, applying `initialProgress`.
    ///
    /// # Errors
    ///
    /// Returns the provider's error, usually `EngineError::UnknownLesson`.
    pub fn resolve_lesson(&self, provider: &impl LessonProvider) -> Result<Lesson> {
        let mut lesson = provider.lesson(&self.lesson)?;
        if let Some(progress) = self.initial_progress {
            lesson.initial_progress = progress;
        }
        Ok(lesson)
    }

    /// Steps that are not classifier output, in order.
    pub fn control_steps(&self) -> impl Iterator<Item = &ScriptStep> {
        self.steps.iter().filter(|step| !step.kind.is_classifier_output())
    }
}

// ============================================================================
// Replay
// ============================================================================

/// What one replayed step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// A sample reached the decision logic.
    Observed(Outcome),
    /// A sample arrived while the camera was stopped.
    Discarded,
    /// The classifier failed; the tick produced nothing.
    Skipped,
    /// A learner action was applied.
    Accepted,
    /// A learner action was rejected.
    Rejected(String),
    /// A camera lifecycle step was applied.
    Lifecycle,
}

/// Step counts of a replay.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    /// Samples that changed the adaptation.
    pub adapted: usize,
    /// Samples rejected by the gates.
    pub ignored: usize,
    /// Samples dropped because the camera was stopped.
    pub discarded: usize,
    /// Classifier failures.
    pub skipped: usize,
    /// Learner actions applied.
    pub accepted: usize,
    /// Learner actions rejected.
    pub rejected: usize,
}

impl ReplayReport {
    /// Counts one step result.
    pub fn record(&mut self, result: &StepResult) {
        match result {
            StepResult::Observed(Outcome::Adapted { .. }) => self.adapted += 1,
            StepResult::Observed(Outcome::Ignored(_)) => self.ignored += 1,
            StepResult::Discarded => self.discarded += 1,
            StepResult::Skipped => self.skipped += 1,
            StepResult::Accepted => self.accepted += 1,
            StepResult::Rejected(_) => self.rejected += 1,
            StepResult::Lifecycle => {}
        }
    }
}

impl SessionScript {
    /// Starts the camera at generation 1, the state replay begins in.
    pub fn begin<S: ProgressSink>(session: &mut LessonSession<S>) {
        session.source_started(1);
    }

    /// Applies one step at its timestamp.
    pub fn apply_step<S: ProgressSink>(step: &ScriptStep, session: &mut LessonSession<S>) -> StepResult {
        let now = step.time();
        let generation = session.generation();

        match &step.kind {
            StepKind::Emotion { emotion, confidence } => {
                observe(session, generation, EmotionSample::new(*emotion, *confidence), now)
            }
            StepKind::NoFace => observe(session, generation, EmotionSample::no_face(), now),
            StepKind::ClassifierFailure { message } => {
                warn!(at_ms = step.at, %message, "Classification failed, skipping tick");
                StepResult::Skipped
            }
            StepKind::CameraStarted => {
                session.source_started(generation + 1);
                StepResult::Lifecycle
            }
            StepKind::CameraStopped => {
                if session.is_source_active() {
                    session.source_stopped();
                }
                StepResult::Lifecycle
            }
            StepKind::CameraError { kind, message } => {
                session.camera_failed(*kind, message.clone());
                StepResult::Lifecycle
            }
            kind => match kind.user_action().map(|action| action.apply(session)) {
                Some(Ok(())) => StepResult::Accepted,
                Some(Err(e)) => StepResult::Rejected(e.to_string()),
                None => StepResult::Lifecycle,
            },
        }
    }

    /// Replays every step against `session`.
    pub fn replay<S: ProgressSink>(&self, session: &mut LessonSession<S>) -> ReplayReport {
        Self::begin(session);
        let mut report = ReplayReport::default();
        for step in &self.steps {
            let result = Self::apply_step(step, session);
            report.record(&result);
        }
        debug!(?report, "Replay finished");
        report
    }
}

fn observe<S: ProgressSink>(
    session: &mut LessonSession<S>,
    generation: u64,
    sample: EmotionSample,
    now: Duration,
) -> StepResult {
    session
        .observe_tick(generation, sample, now)
        .map_or(StepResult::Discarded, StepResult::Observed)
}

impl ScriptedClassifier {
    /// A classifier answering with the script's classifier steps, in order.
    #[must_use]
    pub fn from_script(script: &SessionScript) -> Self {
        Self::new(script.steps.iter().filter_map(|step| match &step.kind {
            StepKind::Emotion { emotion, confidence } => Some(ScriptedResponse::Detected(
                Classification::new(emotion.as_str(), f32::from(*confidence) / 100.0),
            )),
            StepKind::NoFace => Some(ScriptedResponse::NoFace),
            StepKind::ClassifierFailure { message } => Some(ScriptedResponse::Failure(message.clone())),
            _ => None,
        }))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tokio_test::assert_err;

    use super::*;
    use crate::adaptation::AdaptationMode;
    use crate::config::EngineConfig;
    use crate::events::EventBroadcaster;
    use crate::lesson::LessonCatalog;
    use crate::progress::ProgressStore;

    fn session_for(script: &SessionScript) -> LessonSession<ProgressStore> {
        let lesson = script.resolve_lesson(&LessonCatalog::builtin()).unwrap();
        LessonSession::new(
            lesson,
            &EngineConfig::default(),
            ProgressStore::new(),
            EventBroadcaster::default(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_steps() {
        let script = SessionScript::from_json(
            r#"{
                "lesson": "1",
                "initialProgress": 30,
                "steps": [
                    {"at": 0, "type": "emotion", "emotion": "Confused", "confidence": 70},
                    {"at": 500, "type": "noFace"},
                    {"at": 900, "type": "answer", "option": 2},
                    {"at": 1000, "type": "cameraError", "kind": "permission_denied"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(script.initial_progress, Some(Progress::new(30)));
        assert_eq!(
            script.steps[0].kind,
            StepKind::Emotion {
                emotion: EmotionLabel::Confused,
                confidence: 70
            }
        );
        assert_eq!(script.steps[1].kind, StepKind::NoFace);
        assert_eq!(
            script.steps[2].kind.user_action(),
            Some(UserAction::Answer { option: 2 })
        );
        assert_eq!(
            script.steps[3].kind,
            StepKind::CameraError {
                kind: AcquisitionErrorKind::PermissionDenied,
                message: String::new()
            }
        );
        assert_eq!(script.control_steps().count(), 2);
    }

    #[test]
    fn test_out_of_order_steps_rejected() {
        let result = SessionScript::from_json(
            r#"{"lesson": "1", "steps": [
                {"at": 100, "type": "simplify"},
                {"at": 50, "type": "simplify"}
            ]}"#,
        );
        let err = assert_err!(result);
        assert!(err.to_string().contains("earlier"));
    }

    #[test]
    fn test_confidence_over_100_rejected() {
        let result = SessionScript::from_json(
            r#"{"lesson": "1", "steps": [
                {"at": 0, "type": "emotion", "emotion": "happy", "confidence": 120}
            ]}"#,
        );
        assert_err!(result);
    }

    #[test]
    fn test_load_missing_file() {
        let err = assert_err!(SessionScript::load("/nonexistent/script.json"));
        assert!(matches!(err, EngineError::ScriptParseError { .. }));
    }

    #[test]
    fn test_load_reports_path() {
        let path = std::env::temp_dir().join("emoteach_bad_script.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = assert_err!(SessionScript::load(&path));
        assert!(err.to_string().contains("emoteach_bad_script.json"));

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_replay_is_deterministic() {
        let script = SessionScript::from_json(
            r#"{"lesson": "1", "steps": [
                {"at": 0, "type": "emotion", "emotion": "confused", "confidence": 70},
                {"at": 3000, "type": "emotion", "emotion": "angry", "confidence": 90},
                {"at": 11000, "type": "emotion", "emotion": "angry", "confidence": 90},
                {"at": 12000, "type": "answer", "option": 1},
                {"at": 13000, "type": "next"},
                {"at": 14000, "type": "answer", "option": 0},
                {"at": 15000, "type": "next"},
                {"at": 16000, "type": "answer", "option": 1},
                {"at": 17000, "type": "next"}
            ]}"#,
        )
        .unwrap();

        let mut first = session_for(&script);
        let report = script.replay(&mut first);
        let mut second = session_for(&script);
        assert_eq!(script.replay(&mut second), report);
        assert_eq!(first.adaptation(), second.adaptation());

        assert_eq!(report.adapted, 2);
        assert_eq!(report.ignored, 1);
        assert_eq!(report.accepted, 6);
        assert_eq!(first.mode(), AdaptationMode::Encouraging);
        assert_eq!(first.progress(), Progress::new(25));
    }

    #[test]
    fn test_replay_camera_lifecycle() {
        let script = SessionScript::from_json(
            r#"{"lesson": "2", "steps": [
                {"at": 0, "type": "cameraStopped"},
                {"at": 100, "type": "emotion", "emotion": "confused", "confidence": 90},
                {"at": 200, "type": "cameraStarted"},
                {"at": 300, "type": "emotion", "emotion": "confused", "confidence": 90},
                {"at": 400, "type": "classifierFailure", "message": "blurry"}
            ]}"#,
        )
        .unwrap();

        let mut session = session_for(&script);
        let report = script.replay(&mut session);

        assert_eq!(report.discarded, 1);
        assert_eq!(report.adapted, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(session.generation(), 2);
        assert_eq!(session.mode(), AdaptationMode::Simplified);
    }

    #[test]
    fn test_replay_counts_rejections() {
        let script = SessionScript::from_json(
            r#"{"lesson": "1", "steps": [
                {"at": 0, "type": "next"},
                {"at": 10, "type": "startQuiz"},
                {"at": 20, "type": "markComplete"}
            ]}"#,
        )
        .unwrap();

        let mut session = session_for(&script);
        let report = script.replay(&mut session);
        assert_eq!(report.rejected, 2);
        assert_eq!(report.accepted, 1);
        assert_eq!(session.progress(), Progress::ZERO);
    }

    #[test]
    fn test_initial_progress_override() {
        let script =
            SessionScript::from_json(r#"{"lesson": "3", "initialProgress": 90, "steps": []}"#).unwrap();
        let mut session = session_for(&script);
        assert_eq!(session.progress(), Progress::new(90));

        session.mark_complete().unwrap();
        assert_eq!(session.progress(), Progress::COMPLETE);
    }

    #[test]
    fn test_unknown_lesson() {
        let script = SessionScript::from_json(r#"{"lesson": "404", "steps": []}"#).unwrap();
        let err = assert_err!(script.resolve_lesson(&LessonCatalog::builtin()));
        assert!(matches!(err, EngineError::UnknownLesson { .. }));
    }

    #[tokio::test]
    async fn test_classifier_from_script() {
        use crate::classifier::{Classifier, Frame};

        let script = SessionScript::from_json(
            r#"{"lesson": "1", "steps": [
                {"at": 0, "type": "emotion", "emotion": "sad", "confidence": 72},
                {"at": 10, "type": "simplify"},
                {"at": 20, "type": "noFace"},
                {"at": 30, "type": "classifierFailure"}
            ]}"#,
        )
        .unwrap();

        let classifier = ScriptedClassifier::from_script(&script);
        assert_eq!(classifier.remaining(), 3);

        let frame = Frame::synthetic(1, 2, 2);
        let first = classifier.classify(&frame).await.unwrap().unwrap();
        assert_eq!(first.to_sample(), EmotionSample::new(EmotionLabel::Sad, 72));
        assert!(classifier.classify(&frame).await.unwrap().is_none());
        assert_err!(classifier.classify(&frame).await);
    }
}
