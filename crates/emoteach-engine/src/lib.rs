//! EmoTeach Adaptation Engine
//!
//! Watches a learner's facial expressions while they read a lesson and
//! adapts the presentation: simplified text for confusion, a quiz for
//! frustration, encouragement once a quiz is done. Also tracks lesson
//! progress and runs the quiz itself.

pub mod adaptation;
pub mod classifier;
pub mod config;
pub mod emotion;
pub mod error;
pub mod events;
pub mod lesson;
pub mod progress;
pub mod quiz;
pub mod runtime;
pub mod sampler;
pub mod script;
pub mod session;
pub mod view;

pub use adaptation::{
    transition, AdaptationMode, AdaptationPolicy, AdaptationState, Decision, IgnoreReason, Outcome,
};
pub use classifier::{
    select_face, Classification, Classifier, ExpressionClassifier, FaceDetection,
    FaceExpressionDetector, Frame, ScriptedClassifier, ScriptedResponse,
};
pub use config::EngineConfig;
pub use emotion::{EmotionCategory, EmotionLabel, EmotionSample};
pub use error::{AcquisitionErrorKind, EngineError, Result};
pub use events::{ChangeCause, EngineEvent, EventBroadcaster, QuizTrigger};
pub use lesson::{Lesson, LessonCatalog, LessonProvider, MAX_CATALOG_SIZE};
pub use progress::{Progress, ProgressSink, ProgressStage, ProgressStore};
pub use quiz::{AnswerFeedback, Question, QuizOutcome, QuizPhase, QuizSession, QuizStep};
pub use runtime::{spawn_engine, EngineCommand, EngineHandle, UserAction, DEFAULT_COMMAND_CAPACITY};
pub use sampler::{FrameFeed, Sampler, SourceStatus, VideoSource};
pub use script::{ReplayReport, ScriptStep, SessionScript, StepKind, StepResult};
pub use session::{ActiveQuiz, LessonSession, QuizSnapshot, SessionSnapshot};
pub use view::{EmotionIndicator, LessonBody, LessonView, QuizPanel};
