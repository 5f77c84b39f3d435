//! Single-owner engine task.
//!
//! All state changes of a [`LessonSession`] are serialized through one
//! command queue. The sampler, the capture layer and the user interface send
//! [`EngineCommand`]s; the engine task applies them in arrival order and
//! stamps emotion samples with its own monotonic clock.

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::emotion::EmotionSample;
use crate::error::{AcquisitionErrorKind, EngineError, Result};
use crate::events::{EngineEvent, EventBroadcaster};
use crate::progress::ProgressSink;
use crate::session::{LessonSession, SessionSnapshot};

/// Default command queue capacity.
pub const DEFAULT_COMMAND_CAPACITY: usize = 64;

// ============================================================================
// Commands
// ============================================================================

/// A learner interaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum UserAction {
    /// "Simplify this" was pressed.
    Simplify,
    /// "Take a quiz" was pressed.
    StartQuiz,
    /// An answer option was selected.
    Answer {
        /// Zero-based option index.
        option: usize,
    },
    /// "Next question" or "Finish quiz" was pressed.
    Next,
    /// "Exit quiz" was pressed.
    ExitQuiz,
    /// "Mark as complete" was pressed.
    MarkComplete,
}

impl UserAction {
    /// Applies the action to a session.
    ///
    /// # Errors
    ///
    /// Returns the session's rejection when the action is not available in
    /// the current state. The session is unchanged in that case.
    pub fn apply<S: ProgressSink>(self, session: &mut LessonSession<S>) -> Result<()> {
        match self {
            Self::Simplify => session.request_simplified(),
            Self::StartQuiz => session.start_quiz(),
            Self::Answer { option } => session.submit_answer(option).map(drop),
            Self::Next => session.advance_quiz().map(drop),
            Self::ExitQuiz => session.exit_quiz(),
            Self::MarkComplete => session.mark_complete().map(drop),
        }
    }

    /// Short action name used in logs.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Simplify => "simplify",
            Self::StartQuiz => "start_quiz",
            Self::Answer { .. } => "answer",
            Self::Next => "next",
            Self::ExitQuiz => "exit_quiz",
            Self::MarkComplete => "mark_complete",
        }
    }
}

/// A message for the engine task.
#[derive(Debug)]
pub enum EngineCommand {
    /// A classification result from the sampler.
    Sample {
        /// Source generation the frame belonged to.
        generation: u64,
        /// The normalized result.
        sample: EmotionSample,
    },
    /// The video source started.
    SourceStarted {
        /// The new generation.
        generation: u64,
    },
    /// The video source stopped.
    SourceStopped {
        /// The generation that stopped.
        generation: u64,
    },
    /// The video source could not be acquired.
    CameraFailed {
        /// Failure category.
        kind: AcquisitionErrorKind,
        /// Detail from the capture layer.
        message: String,
    },
    /// A learner interaction.
    User(UserAction),
    /// Request for the current session state.
    Snapshot(oneshot::Sender<SessionSnapshot>),
    /// Stop the engine task.
    Shutdown,
}

// ============================================================================
// Engine Task
// ============================================================================

/// Handle to a running engine task.
#[derive(Debug)]
pub struct EngineHandle<S> {
    commands: mpsc::Sender<EngineCommand>,
    events: EventBroadcaster,
    task: JoinHandle<LessonSession<S>>,
}

/// Spawns the engine task that owns `session`.
///
/// Session time starts at zero when this is called.
pub fn spawn_engine<S>(session: LessonSession<S>, capacity: usize) -> EngineHandle<S>
where
    S: ProgressSink + Send + 'static,
{
    let (commands, receiver) = mpsc::channel(capacity);
    let events = session.events().clone();
    let task = tokio::spawn(run_engine(session, receiver, Instant::now()));
    EngineHandle {
        commands,
        events,
        task,
    }
}

async fn run_engine<S: ProgressSink>(
    mut session: LessonSession<S>,
    mut commands: mpsc::Receiver<EngineCommand>,
    epoch: Instant,
) -> LessonSession<S> {
    info!(lesson_id = %session.lesson().id, "Engine started");

    while let Some(command) = commands.recv().await {
        match command {
            EngineCommand::Sample { generation, sample } => {
                session.observe_tick(generation, sample, epoch.elapsed());
            }
            EngineCommand::SourceStarted { generation } => session.source_started(generation),
            EngineCommand::SourceStopped { generation } => {
                if generation == session.generation() {
                    session.source_stopped();
                } else {
                    debug!(generation, current = session.generation(), "Ignoring stop of old generation");
                }
            }
            EngineCommand::CameraFailed { kind, message } => session.camera_failed(kind, message),
            EngineCommand::User(action) => {
                if let Err(e) = action.apply(&mut session) {
                    debug!(action = action.name(), error = %e, "User action had no effect");
                }
            }
            EngineCommand::Snapshot(reply) => {
                if reply.send(session.snapshot()).is_err() {
                    debug!("Snapshot requester went away");
                }
            }
            EngineCommand::Shutdown => break,
        }
    }

    info!(lesson_id = %session.lesson().id, progress = %session.progress(), "Engine stopped");
    session
}

impl<S> EngineHandle<S> {
    /// A sender for feeding commands from other tasks, such as the sampler.
    #[must_use]
    pub fn command_sender(&self) -> mpsc::Sender<EngineCommand> {
        self.commands.clone()
    }

    /// Subscribes to engine events.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// Queues a command.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::EngineStopped` if the engine task has ended.
    pub async fn send(&self, command: EngineCommand) -> Result<()> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::EngineStopped)
    }

    /// Queues a learner interaction.
    ///
    /// Rejections are reported as `action_rejected` events, not as errors.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::EngineStopped` if the engine task has ended.
    pub async fn user(&self, action: UserAction) -> Result<()> {
        self.send(EngineCommand::User(action)).await
    }

    /// Reports a camera acquisition failure.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::EngineStopped` if the engine task has ended.
    pub async fn camera_failed(&self, kind: AcquisitionErrorKind, message: impl Into<String>) -> Result<()> {
        self.send(EngineCommand::CameraFailed {
            kind,
            message: message.into(),
        })
        .await
    }

    /// Returns the session state after all previously queued commands.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::EngineStopped` if the engine task has ended.
    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        let (reply, response) = oneshot::channel();
        self.send(EngineCommand::Snapshot(reply)).await?;
        response.await.map_err(|_| EngineError::EngineStopped)
    }

    /// Stops the engine and returns the session.
    ///
    /// Commands queued before the call are applied first.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::EngineStopped` if the engine task ended
    /// abnormally.
    pub async fn shutdown(self) -> Result<LessonSession<S>> {
        // The task may already be gone; joining tells us how it ended.
        let _ = self.commands.send(EngineCommand::Shutdown).await;
        self.task.await.map_err(|_| EngineError::EngineStopped)
    }
}
