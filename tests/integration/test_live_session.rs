//! Live session tests for the EmoTeach engine
//!
//! These tests wire the frame feed, the interval sampler, a scripted
//! classifier and the engine task together on a paused tokio clock, then
//! drive the session the way a learner and a camera would.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use emoteach_engine::{
    spawn_engine, AdaptationMode, ChangeCause, Classification, EmotionLabel, EngineConfig,
    EngineEvent, EngineHandle, EventBroadcaster, Frame, FrameFeed, LessonCatalog, LessonProvider,
    LessonSession, Progress, ProgressStore, Sampler, ScriptedClassifier, ScriptedResponse,
    SessionScript, UserAction, DEFAULT_COMMAND_CAPACITY,
};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

/// Path to the fixtures directory.
fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

struct Harness {
    engine: EngineHandle<ProgressStore>,
    events: broadcast::Receiver<EngineEvent>,
    feed: Arc<FrameFeed>,
    classifier: Arc<ScriptedClassifier>,
    sampler: JoinHandle<()>,
}

impl Harness {
    fn start(classifier: ScriptedClassifier) -> Self {
        let config = EngineConfig::default();
        let catalog = LessonCatalog::load(fixture_path().join("lessons.json"))
            .expect("Failed to load catalog");
        let lesson = catalog.lesson("photosynthesis").expect("lesson exists");
        let session = LessonSession::new(
            lesson,
            &config,
            ProgressStore::new(),
            EventBroadcaster::new(512),
        )
        .expect("Failed to create session");

        let engine = spawn_engine(session, DEFAULT_COMMAND_CAPACITY);
        let events = engine.subscribe();
        let feed = Arc::new(FrameFeed::new());
        let classifier = Arc::new(classifier);
        let sampler = Sampler::new(
            Arc::clone(&classifier),
            Arc::clone(&feed),
            config.sampling_interval(),
            engine.command_sender(),
        )
        .spawn();

        Self {
            engine,
            events,
            feed,
            classifier,
            sampler,
        }
    }

    fn start_camera(&self) -> u64 {
        let generation = self.feed.start();
        self.feed.push_frame(Frame::synthetic(generation, 64, 48));
        generation
    }

    /// Waits for the next event with this name, skipping others.
    async fn wait_for(&mut self, name: &str) -> EngineEvent {
        timeout(Duration::from_secs(120), async {
            loop {
                let event = self.events.recv().await.expect("event stream open");
                if event.event_name() == name {
                    return event;
                }
            }
        })
        .await
        .unwrap_or_else(|_| unreachable!("no {name} event in time"))
    }

    /// Names of the events received so far without waiting.
    fn pending(&mut self) -> Vec<&'static str> {
        std::iter::from_fn(|| self.events.try_recv().ok())
            .map(|event| event.event_name())
            .collect()
    }

    async fn finish(self) -> LessonSession<ProgressStore> {
        let session = self.engine.shutdown().await.expect("engine shuts down");
        self.sampler.abort();
        session
    }
}

fn detected(label: &str, probability: f32) -> ScriptedResponse {
    ScriptedResponse::Detected(Classification::new(label, probability))
}

/// Tests the full live flow: confusion, cooldown, frustration, quiz, stop.
#[tokio::test(start_paused = true)]
async fn test_live_quiz_flow() {
    let mut responses = vec![detected("confused", 0.7), detected("angry", 0.9)];
    responses.extend(std::iter::repeat(ScriptedResponse::NoFace).take(9));
    responses.push(detected("angry", 0.9));

    let mut harness = Harness::start(ScriptedClassifier::new(responses));
    harness.start_camera();
    harness.wait_for("source_started").await;

    let EngineEvent::ModeChanged(simplified) = harness.wait_for("mode_changed").await else {
        unreachable!("expected mode_changed");
    };
    assert_eq!(simplified.to, AdaptationMode::Simplified);

    let EngineEvent::SampleIgnored(ignored) = harness.wait_for("sample_ignored").await else {
        unreachable!("expected sample_ignored");
    };
    assert_eq!(ignored.label, Some(EmotionLabel::Angry));

    let EngineEvent::QuizStarted(started) = harness.wait_for("quiz_started").await else {
        unreachable!("expected quiz_started");
    };
    assert_eq!(started.total, 3);
    assert_eq!(harness.classifier.remaining(), 0);

    for option in [1, 0, 1] {
        harness.engine.user(UserAction::Answer { option }).await.expect("engine running");
        harness.engine.user(UserAction::Next).await.expect("engine running");
    }
    let EngineEvent::QuizCompleted(completed) = harness.wait_for("quiz_completed").await else {
        unreachable!("expected quiz_completed");
    };
    assert_eq!(completed.outcome.score, 3);

    let snapshot = harness.engine.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.adaptation.mode, AdaptationMode::Encouraging);
    assert_eq!(snapshot.progress, Progress::new(25));
    assert!(snapshot.quiz.is_none());

    harness.feed.stop();
    harness.wait_for("source_stopped").await;
    let snapshot = harness.engine.snapshot().await.expect("snapshot");
    assert!(snapshot.current_emotion.is_none());
    assert!(!snapshot.source_active);

    let session = harness.finish().await;
    assert_eq!(session.sink().get("photosynthesis"), Progress::new(25));
}

/// Tests that a classification in flight when the camera stops is dropped.
#[tokio::test(start_paused = true)]
async fn test_stop_discards_in_flight_classification() {
    let classifier = ScriptedClassifier::new([detected("angry", 0.95)])
        .with_latency(Duration::from_millis(500));
    let mut harness = Harness::start(classifier);
    harness.start_camera();
    harness.wait_for("source_started").await;

    // The first tick fires at 1s; its result would arrive at 1.5s.
    sleep(Duration::from_millis(1_200)).await;
    assert_eq!(harness.classifier.calls(), 1);
    harness.feed.stop();
    harness.wait_for("source_stopped").await;

    sleep(Duration::from_secs(3)).await;
    assert!(!harness.pending().contains(&"emotion_observed"));

    let snapshot = harness.engine.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.adaptation.mode, AdaptationMode::Normal);
    assert!(snapshot.quiz.is_none());

    harness.finish().await;
}

/// Tests that a restarted camera samples under a new generation.
#[tokio::test(start_paused = true)]
async fn test_camera_restart_new_generation() {
    let mut harness = Harness::start(ScriptedClassifier::new([
        detected("happy", 0.9),
        detected("confused", 0.9),
    ]));
    harness.start_camera();
    harness.wait_for("emotion_observed").await;

    harness.feed.stop();
    harness.wait_for("source_stopped").await;

    assert_eq!(harness.start_camera(), 2);
    let EngineEvent::SourceStarted(started) = harness.wait_for("source_started").await else {
        unreachable!("expected source_started");
    };
    assert_eq!(started.generation, 2);

    harness.wait_for("emotion_observed").await;
    let snapshot = harness.engine.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.generation, 2);
    assert_eq!(snapshot.adaptation.mode, AdaptationMode::Simplified);

    harness.finish().await;
}

/// Tests that nothing is sampled until the model reports ready.
#[tokio::test(start_paused = true)]
async fn test_classifier_warm_up() {
    let classifier = ScriptedClassifier::new([detected("happy", 0.9)]);
    classifier.set_ready(false);
    let mut harness = Harness::start(classifier);
    harness.start_camera();
    harness.wait_for("source_started").await;

    sleep(Duration::from_secs(5)).await;
    assert_eq!(harness.classifier.calls(), 0);
    assert!(harness.pending().is_empty());

    harness.classifier.set_ready(true);
    let EngineEvent::ModeChanged(changed) = harness.wait_for("mode_changed").await else {
        unreachable!("expected mode_changed");
    };
    assert_eq!(changed.to, AdaptationMode::Encouraging);

    harness.finish().await;
}

/// Tests that actions unavailable during a quiz are rejected, not applied.
#[tokio::test(start_paused = true)]
async fn test_actions_rejected_during_quiz() {
    let mut harness = Harness::start(ScriptedClassifier::new([]));
    harness.engine.user(UserAction::StartQuiz).await.expect("engine running");
    harness.wait_for("quiz_started").await;

    for action in [UserAction::MarkComplete, UserAction::Simplify, UserAction::StartQuiz] {
        harness.engine.user(action).await.expect("engine running");
        harness.wait_for("action_rejected").await;
    }

    let snapshot = harness.engine.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.adaptation.mode, AdaptationMode::Quiz);
    assert_eq!(snapshot.progress, Progress::ZERO);

    let session = harness.finish().await;
    let quiz = session.quiz().expect("quiz still running");
    assert_eq!(quiz.session.index(), 0);
}

/// Tests that the scripted classifier built from a fixture script drives the
/// live sampler one response per tick.
#[tokio::test(start_paused = true)]
async fn test_script_drives_live_sampler() {
    let script = SessionScript::load(fixture_path().join("scripts/frustrated_quiz.json"))
        .expect("Failed to load script");
    let mut harness = Harness::start(ScriptedClassifier::from_script(&script));
    harness.start_camera();

    harness.wait_for("quiz_started").await;
    for step in script.control_steps() {
        if let Some(action) = step.kind.user_action() {
            harness.engine.user(action).await.expect("engine running");
        }
    }
    harness.wait_for("quiz_completed").await;

    let EngineEvent::ModeChanged(completed) = harness.wait_for("mode_changed").await else {
        unreachable!("expected mode_changed");
    };
    assert_eq!(completed.cause, ChangeCause::QuizCompleted);

    // The last classifier response (happy) arrives on a later tick.
    let EngineEvent::ModeChanged(encouraged) = harness.wait_for("mode_changed").await else {
        unreachable!("expected mode_changed");
    };
    assert_eq!(encouraged.cause, ChangeCause::Emotion);
    assert_eq!(encouraged.to, AdaptationMode::Encouraging);

    let session = harness.finish().await;
    assert_eq!(session.progress(), Progress::new(25));
    assert!(session.quiz().is_none());
}
