//! End-to-end scenario tests for the EmoTeach engine
//!
//! These tests load the fixture catalog and session scripts from disk and
//! replay them against a lesson session, checking the resulting adaptation,
//! quiz and progress state together with the emitted event stream.

use std::path::PathBuf;

use emoteach_engine::adaptation::{CONFUSED_REASON, POSITIVE_REASON, SIMPLIFY_REASON};
use emoteach_engine::{
    AdaptationMode, EngineConfig, EngineError, EngineEvent, EventBroadcaster, LessonBody,
    LessonCatalog, LessonProvider, LessonSession, Progress, ProgressStore, ReplayReport,
    SessionScript,
};
use tokio::sync::broadcast;

/// Path to the fixtures directory.
fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

fn load_config() -> EngineConfig {
    let mut config = EngineConfig::load_from_file(&fixture_path().join("emoteach.json"))
        .expect("Failed to load config");
    config.lessons = Some(fixture_path().join("lessons.json").display().to_string());
    config
}

fn load_catalog(config: &EngineConfig) -> LessonCatalog {
    let path = config.lessons.as_deref().expect("lessons path is set");
    LessonCatalog::load(path).expect("Failed to load catalog")
}

/// Replays a fixture script and returns the session, report and events.
fn replay(
    script_name: &str,
) -> (
    LessonSession<ProgressStore>,
    ReplayReport,
    Vec<EngineEvent>,
) {
    let config = load_config();
    let catalog = load_catalog(&config);
    let script = SessionScript::load(fixture_path().join("scripts").join(script_name))
        .expect("Failed to load script");
    let lesson = script.resolve_lesson(&catalog).expect("Failed to resolve lesson");

    let mut session = LessonSession::new(
        lesson,
        &config,
        ProgressStore::new(),
        EventBroadcaster::new(config.event_buffer_size),
    )
    .expect("Failed to create session");
    let mut events = session.events().subscribe();

    let report = script.replay(&mut session);
    (session, report, drain(&mut events))
}

fn drain(events: &mut broadcast::Receiver<EngineEvent>) -> Vec<EngineEvent> {
    std::iter::from_fn(|| events.try_recv().ok()).collect()
}

fn names(events: &[EngineEvent]) -> Vec<&'static str> {
    events.iter().map(EngineEvent::event_name).collect()
}

// ============================================================================
// Fixtures
// ============================================================================

/// Tests that the fixture config loads with its overrides.
#[test]
fn test_fixture_config_loads() {
    let config = load_config();
    assert_eq!(config.confidence_threshold, 60);
    assert_eq!(config.cooldown_ms, 10_000);
    assert_eq!(config.event_buffer_size, 256);
}

/// Tests that the fixture catalog resolves shared quiz and examples.
#[test]
fn test_fixture_catalog_loads() {
    let catalog = load_catalog(&load_config());
    assert_eq!(catalog.len(), 2);

    let photosynthesis = catalog.lesson("photosynthesis").expect("lesson exists");
    assert_eq!(photosynthesis.quiz.len(), 3);
    assert_eq!(photosynthesis.quiz[0].prompt, "What do plants need sunlight for?");
    assert_eq!(photosynthesis.extra_examples.len(), 2);

    let water = catalog.lesson("water-cycle").expect("lesson exists");
    assert_eq!(water.quiz[0].prompt, "What is it called when water turns into vapor?");
    assert_eq!(water.initial_progress, Progress::new(40));

    assert!(matches!(
        catalog.lesson("volcanoes"),
        Err(EngineError::UnknownLesson { .. })
    ));
}

/// Tests that every fixture script parses and validates.
#[test]
fn test_fixture_scripts_parse() {
    for name in [
        "frustrated_quiz.json",
        "confused_learner.json",
        "camera_restart.json",
    ] {
        let script = SessionScript::load(fixture_path().join("scripts").join(name));
        assert!(script.is_ok(), "{name} failed to load: {script:?}");
    }
}

// ============================================================================
// Scenarios
// ============================================================================

/// A frustrated learner gets a quiz, finishes it and is encouraged.
#[test]
fn test_frustrated_learner_completes_quiz() {
    let (session, report, events) = replay("frustrated_quiz.json");

    assert_eq!(
        names(&events),
        [
            "source_started",
            "emotion_observed",
            "emotion_observed",
            "mode_changed",
            "quiz_started",
            "emotion_observed",
            "sample_ignored",
            "answer_revealed",
            "quiz_advanced",
            "answer_revealed",
            "quiz_advanced",
            "answer_revealed",
            "quiz_completed",
            "mode_changed",
            "progress_reported",
            "emotion_observed",
            "mode_changed",
        ]
    );

    let completed = events
        .iter()
        .find_map(|event| match event {
            EngineEvent::QuizCompleted(payload) => Some(payload.clone()),
            _ => None,
        })
        .expect("quiz completed");
    assert_eq!(completed.outcome.score, 2);
    assert_eq!(completed.outcome.total, 3);
    assert_eq!(completed.message, "Quiz completed! You got 2 out of 3 correct!");

    assert_eq!(report.adapted, 3);
    assert_eq!(report.ignored, 1);
    assert_eq!(report.accepted, 6);
    assert_eq!(report.rejected, 0);

    assert_eq!(session.mode(), AdaptationMode::Encouraging);
    assert_eq!(session.adaptation().reason, POSITIVE_REASON);
    assert!(session.quiz().is_none());
    assert_eq!(session.progress(), Progress::new(25));
    assert_eq!(session.sink().get("photosynthesis"), Progress::new(25));
}

/// Confusion simplifies, the cooldown holds back a second negative emotion,
/// and an abandoned quiz leaves progress alone.
#[test]
fn test_confused_learner_with_cooldown() {
    let (session, report, events) = replay("confused_learner.json");

    assert_eq!(report.ignored, 3);
    assert_eq!(report.adapted, 3);
    assert_eq!(report.accepted, 2);

    let ignored: Vec<_> = events
        .iter()
        .filter_map(|event| match event {
            EngineEvent::SampleIgnored(payload) => {
                Some(serde_json::to_value(payload).expect("serializes")["reason"].clone())
            }
            _ => None,
        })
        .collect();
    assert_eq!(ignored, ["low_confidence", "cooldown", "cooldown"]);

    assert!(names(&events).contains(&"quiz_exited"));

    // Exit clears the frustrated reason, then the surprise encourages.
    assert_eq!(session.mode(), AdaptationMode::Encouraging);
    assert_eq!(session.progress(), Progress::new(50));
    assert_eq!(session.sink().get("water-cycle"), Progress::new(50));
}

/// Exiting the quiz mid-way returns to normal mode with no guidance shown.
#[test]
fn test_quiz_exit_clears_reason() {
    let config = load_config();
    let catalog = load_catalog(&config);
    let mut script = SessionScript::load(fixture_path().join("scripts/confused_learner.json"))
        .expect("Failed to load script");
    script.steps.retain(|step| step.at <= 13_000);

    let lesson = script.resolve_lesson(&catalog).expect("lesson resolves");
    let mut session =
        LessonSession::new(lesson, &config, ProgressStore::new(), EventBroadcaster::default())
            .expect("session");
    script.replay(&mut session);

    assert_eq!(session.mode(), AdaptationMode::Normal);
    assert!(session.adaptation().reason.is_empty());
    assert!(session.adaptation().message.is_empty());
    assert!(session.quiz().is_none());
    assert_eq!(session.progress(), Progress::new(40));

    let view = session.view();
    assert!(!view.adapting);
    assert!(view.reason.is_none());
    assert!(matches!(view.body, LessonBody::Text { simplified: false, .. }));
}

/// Camera stops, errors and restarts never disturb the adaptation state, and
/// samples from a stopped camera are discarded.
#[test]
fn test_camera_restart() {
    let (session, report, events) = replay("camera_restart.json");

    assert_eq!(report.discarded, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.ignored, 1);
    assert_eq!(report.adapted, 2);
    assert_eq!(report.accepted, 1);

    let event_names = names(&events);
    let stop = event_names
        .iter()
        .position(|name| *name == "source_stopped")
        .expect("source stopped");
    let error = event_names
        .iter()
        .position(|name| *name == "camera_error")
        .expect("camera error");
    assert!(stop < error);
    assert_eq!(
        event_names.iter().filter(|name| **name == "source_started").count(),
        2
    );

    assert_eq!(session.generation(), 2);
    assert!(session.is_source_active());
    assert!(session.camera_error().is_none());
    assert_eq!(session.mode(), AdaptationMode::Simplified);
    assert_eq!(session.adaptation().reason, CONFUSED_REASON);
    assert_eq!(session.progress(), Progress::new(20));
}

/// A manual simplify request survives a camera error.
#[test]
fn test_simplify_during_camera_error() {
    let config = load_config();
    let catalog = load_catalog(&config);
    let mut script = SessionScript::load(fixture_path().join("scripts/camera_restart.json"))
        .expect("Failed to load script");
    script.steps.retain(|step| step.at <= 800);

    let lesson = script.resolve_lesson(&catalog).expect("lesson resolves");
    let mut session =
        LessonSession::new(lesson, &config, ProgressStore::new(), EventBroadcaster::default())
            .expect("session");
    script.replay(&mut session);

    assert!(!session.is_source_active());
    assert!(session.camera_error().is_some());
    assert!(session.current_emotion().is_none());
    assert_eq!(session.mode(), AdaptationMode::Simplified);
    assert_eq!(session.adaptation().reason, SIMPLIFY_REASON);

    let view = session.view();
    assert!(view.camera_error.is_some());
    assert!(!view.indicator.detected);
    assert!(matches!(view.body, LessonBody::Text { simplified: true, .. }));
}

/// Replaying the same script twice yields the same state and events.
#[test]
fn test_replay_is_repeatable() {
    let (first, first_report, first_events) = replay("frustrated_quiz.json");
    let (second, second_report, second_events) = replay("frustrated_quiz.json");

    assert_eq!(first_report, second_report);
    assert_eq!(first.adaptation(), second.adaptation());
    assert_eq!(first.progress(), second.progress());
    assert_eq!(first_events, second_events);
}
