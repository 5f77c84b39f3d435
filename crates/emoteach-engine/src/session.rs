//! Lesson session: one learner working through one lesson.
//!
//! The session owns the adaptation state, the active quiz, progress and the
//! video source status. All mutation happens through `&mut self` methods, so a
//! single owner (the runtime task, or a script replay) serializes samples and
//! user actions. Every change is published on the session's
//! [`EventBroadcaster`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::adaptation::{
    transition, AdaptationMode, AdaptationPolicy, AdaptationState, Outcome,
};
use crate::config::EngineConfig;
use crate::emotion::EmotionSample;
use crate::error::{AcquisitionErrorKind, EngineError, Result};
use crate::events::{
    CameraErrorPayload, ChangeCause, EngineEvent, EventBroadcaster, QuizAdvancedPayload,
    QuizExitedPayload, QuizTrigger,
};
use crate::lesson::Lesson;
use crate::progress::{Progress, ProgressSink};
use crate::quiz::{validate_questions, AnswerFeedback, QuizPhase, QuizSession, QuizStep};

/// A quiz in progress together with the progress it started from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveQuiz {
    /// The quiz state machine.
    pub session: QuizSession,
    /// Progress when the quiz started; the completion bonus is added to it.
    pub progress_at_start: Progress,
    /// Who started the quiz.
    pub trigger: QuizTrigger,
}

/// Serializable summary of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    /// Lesson id.
    pub lesson_id: String,
    /// Lesson title.
    pub title: String,
    /// Current adaptation state.
    pub adaptation: AdaptationState,
    /// Current progress.
    pub progress: Progress,
    /// Last sample seen while the source was active.
    pub current_emotion: Option<EmotionSample>,
    /// Active quiz, if any.
    pub quiz: Option<QuizSnapshot>,
    /// Whether the video source is running.
    pub source_active: bool,
    /// Current source generation.
    pub generation: u64,
    /// Last camera acquisition error.
    pub camera_error: Option<CameraErrorPayload>,
    /// When the session was created.
    pub started_at: DateTime<Utc>,
}

/// Serializable summary of the active quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSnapshot {
    /// Zero-based current question.
    pub index: usize,
    /// Number of questions.
    pub total: usize,
    /// Correct answers so far.
    pub score: usize,
    /// Phase of the current question.
    pub phase: QuizPhase,
    /// Progress when the quiz started.
    pub progress_at_start: Progress,
}

/// One learner's session on one lesson.
#[derive(Debug)]
pub struct LessonSession<S> {
    lesson: Lesson,
    policy: AdaptationPolicy,
    display_threshold: u8,
    mark_complete_increment: u8,
    quiz_completion_increment: u8,
    adaptation: AdaptationState,
    quiz: Option<ActiveQuiz>,
    progress: Progress,
    current_emotion: Option<EmotionSample>,
    camera_error: Option<CameraErrorPayload>,
    source_active: bool,
    generation: u64,
    sink: S,
    events: EventBroadcaster,
    started_at: DateTime<Utc>,
}

impl<S: ProgressSink> LessonSession<S> {
    /// Creates a session for a resolved lesson.
    ///
    /// Progress starts at the lesson's `initial_progress`.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidLesson` if the lesson's quiz is not valid.
    pub fn new(
        lesson: Lesson,
        config: &EngineConfig,
        sink: S,
        events: EventBroadcaster,
    ) -> Result<Self> {
        validate_questions(&lesson.quiz)
            .map_err(|e| EngineError::invalid_lesson(&lesson.id, e.to_string()))?;

        info!(lesson_id = %lesson.id, title = %lesson.title, "Starting lesson session");

        Ok(Self {
            progress: lesson.initial_progress,
            lesson,
            policy: AdaptationPolicy::from_config(config),
            display_threshold: config.display_threshold,
            mark_complete_increment: config.mark_complete_increment,
            quiz_completion_increment: config.quiz_completion_increment,
            adaptation: AdaptationState::new(),
            quiz: None,
            current_emotion: None,
            camera_error: None,
            source_active: false,
            generation: 0,
            sink,
            events,
            started_at: Utc::now(),
        })
    }

    // ========================================================================
    // Emotion Samples
    // ========================================================================

    /// Applies one sample taken at session time `now`.
    ///
    /// A frustrated sample while a quiz is already running moves the mode
    /// back to `quiz` but keeps the running quiz and its answers; a new quiz
    /// only starts when none is active.
    pub fn observe_emotion(&mut self, sample: EmotionSample, now: Duration) -> Outcome {
        self.current_emotion = Some(sample);
        self.events
            .send(EngineEvent::emotion_observed(&sample, millis(now)));

        let previous = self.adaptation.clone();
        let decision = transition(std::mem::take(&mut self.adaptation), &sample, now, &self.policy);
        self.adaptation = decision.state;

        match decision.outcome {
            Outcome::Ignored(reason) => {
                debug!(
                    label = ?sample.label,
                    confidence = sample.confidence,
                    ?reason,
                    "Sample ignored"
                );
                self.events.send(EngineEvent::sample_ignored(&sample, reason));
            }
            Outcome::Adapted {
                category,
                start_quiz,
                ..
            } => {
                debug!(label = ?sample.label, confidence = sample.confidence, ?category, "Sample applied");
                self.announce_change(&previous, ChangeCause::Emotion);
                if start_quiz {
                    if self.quiz.is_some() {
                        debug!("Quiz already running, keeping current session");
                    } else {
                        self.begin_quiz(QuizTrigger::Emotion);
                    }
                }
            }
        }

        decision.outcome
    }

    /// Applies a sample produced for a given source generation.
    ///
    /// Samples from a stopped or replaced source are discarded and `None` is
    /// returned.
    pub fn observe_tick(
        &mut self,
        generation: u64,
        sample: EmotionSample,
        now: Duration,
    ) -> Option<Outcome> {
        if !self.source_active || generation != self.generation {
            debug!(
                generation,
                current_generation = self.generation,
                active = self.source_active,
                "Discarding stale sample"
            );
            return None;
        }
        Some(self.observe_emotion(sample, now))
    }

    // ========================================================================
    // User Actions
    // ========================================================================

    /// Switches to the simplified explanation on the learner's request.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ActionUnavailable` while a quiz is running.
    pub fn request_simplified(&mut self) -> Result<()> {
        if self.quiz.is_some() {
            return Err(self.reject(EngineError::action_unavailable(
                "simplify",
                "finish or exit the quiz first",
            )));
        }
        let previous = self.adaptation.clone();
        self.adaptation.request_simplified();
        self.announce_change(&previous, ChangeCause::User);
        Ok(())
    }

    /// Starts a quiz on the learner's request, bypassing both gates.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ActionUnavailable` if a quiz is already running.
    pub fn start_quiz(&mut self) -> Result<()> {
        if self.quiz.is_some() {
            return Err(self.reject(EngineError::action_unavailable(
                "start_quiz",
                "a quiz is already running",
            )));
        }
        let previous = self.adaptation.clone();
        self.adaptation.enter_quiz();
        self.announce_change(&previous, ChangeCause::User);
        self.begin_quiz(QuizTrigger::User);
        Ok(())
    }

    /// Answers the current quiz question.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidQuizAction` if no quiz is running, the
    /// answer is already revealed or the option does not exist.
    pub fn submit_answer(&mut self, option: usize) -> Result<AnswerFeedback> {
        let result = match self.quiz.as_mut() {
            Some(active) => active.session.submit_answer(option),
            None => Err(EngineError::invalid_quiz_action(
                "submit_answer",
                "no quiz is running",
            )),
        };

        match result {
            Ok(feedback) => {
                debug!(
                    question = feedback.question_index,
                    correct = feedback.correct,
                    score = feedback.score,
                    "Answer revealed"
                );
                self.events.send(EngineEvent::AnswerRevealed(feedback.clone()));
                Ok(feedback)
            }
            Err(e) => Err(self.reject(e)),
        }
    }

    /// Moves past a revealed answer, completing the quiz after the last one.
    ///
    /// On completion the mode becomes `encouraging` with the score summary as
    /// message, and progress is raised to the quiz-start value plus the
    /// completion increment.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidQuizAction` if no quiz is running or the
    /// current question is not answered yet.
    pub fn advance_quiz(&mut self) -> Result<QuizStep> {
        let result = match self.quiz.as_mut() {
            Some(active) => active.session.advance(),
            None => Err(EngineError::invalid_quiz_action("advance", "no quiz is running")),
        };

        let step = match result {
            Ok(step) => step,
            Err(e) => return Err(self.reject(e)),
        };

        match step {
            QuizStep::Next(index) => {
                self.events
                    .send(EngineEvent::QuizAdvanced(QuizAdvancedPayload { index }));
            }
            QuizStep::Completed(outcome) => {
                let progress_at_start = self
                    .quiz
                    .take()
                    .map_or(self.progress, |active| active.progress_at_start);

                info!(
                    lesson_id = %self.lesson.id,
                    score = outcome.score,
                    total = outcome.total,
                    "Quiz completed"
                );
                self.events.send(EngineEvent::quiz_completed(outcome));

                let previous = self.adaptation.clone();
                self.adaptation.complete_quiz(outcome.summary());
                self.announce_change(&previous, ChangeCause::QuizCompleted);

                self.propose_progress(progress_at_start.advanced_by(self.quiz_completion_increment));
            }
        }
        Ok(step)
    }

    /// Abandons the running quiz. Nothing is scored.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidQuizAction` if no quiz is running.
    pub fn exit_quiz(&mut self) -> Result<()> {
        let Some(active) = self.quiz.take() else {
            return Err(self.reject(EngineError::invalid_quiz_action(
                "exit",
                "no quiz is running",
            )));
        };

        let answered = active.session.exit();
        info!(lesson_id = %self.lesson.id, answered, "Quiz exited");
        self.events
            .send(EngineEvent::QuizExited(QuizExitedPayload { answered }));

        let previous = self.adaptation.clone();
        self.adaptation.exit_quiz();
        self.announce_change(&previous, ChangeCause::QuizExited);
        Ok(())
    }

    /// Marks the lesson step as done, adding the mark-complete increment.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ActionUnavailable` while a quiz is running, so
    /// the two progress paths cannot both apply to the same stretch of work.
    pub fn mark_complete(&mut self) -> Result<Progress> {
        if self.quiz.is_some() {
            return Err(self.reject(EngineError::action_unavailable(
                "mark_complete",
                "finish or exit the quiz first",
            )));
        }
        Ok(self.propose_progress(self.progress.advanced_by(self.mark_complete_increment)))
    }

    // ========================================================================
    // Video Source Lifecycle
    // ========================================================================

    /// Records that the video source started with the given generation.
    pub fn source_started(&mut self, generation: u64) {
        info!(generation, "Video source started");
        self.source_active = true;
        self.generation = generation;
        self.current_emotion = None;
        self.camera_error = None;
        self.events.send(EngineEvent::source_started(generation));
    }

    /// Records that the video source stopped.
    ///
    /// The current emotion is cleared immediately and later samples of this
    /// generation are discarded.
    pub fn source_stopped(&mut self) {
        info!(generation = self.generation, "Video source stopped");
        self.source_active = false;
        self.current_emotion = None;
        self.events.send(EngineEvent::source_stopped(self.generation));
    }

    /// Records that the video source could not be acquired.
    ///
    /// The adaptation state is left untouched.
    pub fn camera_failed(&mut self, kind: AcquisitionErrorKind, message: impl Into<String>) {
        let message = message.into();
        warn!(%kind, %message, "Camera acquisition failed");
        self.source_active = false;
        self.current_emotion = None;
        self.events
            .send(EngineEvent::camera_error(kind, message.clone()));
        self.camera_error = Some(CameraErrorPayload { kind, message });
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    /// The lesson being taught.
    #[must_use]
    pub const fn lesson(&self) -> &Lesson {
        &self.lesson
    }

    /// Current adaptation state.
    #[must_use]
    pub const fn adaptation(&self) -> &AdaptationState {
        &self.adaptation
    }

    /// Current adaptation mode.
    #[must_use]
    pub const fn mode(&self) -> AdaptationMode {
        self.adaptation.mode
    }

    /// The running quiz, if any.
    #[must_use]
    pub const fn quiz(&self) -> Option<&ActiveQuiz> {
        self.quiz.as_ref()
    }

    /// Current progress.
    #[must_use]
    pub const fn progress(&self) -> Progress {
        self.progress
    }

    /// Last sample seen while the source was active.
    #[must_use]
    pub const fn current_emotion(&self) -> Option<&EmotionSample> {
        self.current_emotion.as_ref()
    }

    /// Last camera acquisition error, cleared when the source starts.
    #[must_use]
    pub const fn camera_error(&self) -> Option<&CameraErrorPayload> {
        self.camera_error.as_ref()
    }

    /// Whether the video source is running.
    #[must_use]
    pub const fn is_source_active(&self) -> bool {
        self.source_active
    }

    /// Current source generation.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Confidence above which the emotion indicator names the emotion.
    #[must_use]
    pub const fn display_threshold(&self) -> u8 {
        self.display_threshold
    }

    /// The progress sink.
    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// The event broadcaster of this session.
    #[must_use]
    pub const fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    /// Serializable summary of the session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            lesson_id: self.lesson.id.clone(),
            title: self.lesson.title.clone(),
            adaptation: self.adaptation.clone(),
            progress: self.progress,
            current_emotion: self.current_emotion,
            quiz: self.quiz.as_ref().map(|active| QuizSnapshot {
                index: active.session.index(),
                total: active.session.len(),
                score: active.session.score(),
                phase: active.session.phase(),
                progress_at_start: active.progress_at_start,
            }),
            source_active: self.source_active,
            generation: self.generation,
            camera_error: self.camera_error.clone(),
            started_at: self.started_at,
        }
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn begin_quiz(&mut self, trigger: QuizTrigger) {
        match QuizSession::new(self.lesson.quiz.clone()) {
            Ok(session) => {
                info!(lesson_id = %self.lesson.id, ?trigger, questions = session.len(), "Quiz started");
                self.events.send(EngineEvent::quiz_started(
                    session.len(),
                    trigger,
                    self.progress,
                ));
                self.quiz = Some(ActiveQuiz {
                    session,
                    progress_at_start: self.progress,
                    trigger,
                });
            }
            // The quiz is validated in new(), so this only fires if that check
            // and QuizSession::new ever disagree.
            Err(e) => warn!(error = %e, "Could not start quiz"),
        }
    }

    fn announce_change(&self, previous: &AdaptationState, cause: ChangeCause) {
        let current = &self.adaptation;
        if previous.mode == current.mode
            && previous.reason == current.reason
            && previous.message == current.message
        {
            return;
        }
        info!(
            lesson_id = %self.lesson.id,
            from = %previous.mode,
            mode = %current.mode,
            ?cause,
            "Adaptation mode changed"
        );
        self.events
            .send(EngineEvent::mode_changed(previous.mode, current, cause));
    }

    fn propose_progress(&mut self, proposed: Progress) -> Progress {
        let previous = self.progress;
        let next = proposed.max(previous);
        self.progress = next;

        info!(lesson_id = %self.lesson.id, %previous, progress = %next, "Progress reported");
        self.sink.report_progress(&self.lesson.id, next);
        self.events
            .send(EngineEvent::progress_reported(&self.lesson.id, previous, next));
        next
    }

    fn reject(&self, error: EngineError) -> EngineError {
        let (action, reason) = match &error {
            EngineError::InvalidQuizAction { action, reason }
            | EngineError::ActionUnavailable { action, reason } => (action.clone(), reason.clone()),
            other => (String::from("unknown"), other.to_string()),
        };
        warn!(%action, %reason, "Action rejected");
        self.events.send(EngineEvent::action_rejected(action, reason));
        error
    }
}

/// Milliseconds in a duration, saturating at `u64::MAX`.
pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
