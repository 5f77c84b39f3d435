//! EmoTeach CLI
//!
//! Lists lessons and runs scripted learning sessions through the adaptation
//! engine, either replayed instantly or simulated in real time.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use emoteach_engine::{
    spawn_engine, EngineConfig, EngineEvent, EngineHandle, EventBroadcaster, Frame, FrameFeed,
    LessonCatalog, LessonSession, ProgressSink, ProgressStore, ReplayReport, Sampler,
    ScriptedClassifier, SessionScript, StepKind, DEFAULT_COMMAND_CAPACITY,
};
use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};
use tokio::time::{sleep, sleep_until, Instant};
use tracing_subscriber::EnvFilter;

/// Width of synthetic frames pushed by `simulate`.
const FRAME_WIDTH: u32 = 64;

/// Height of synthetic frames pushed by `simulate`.
const FRAME_HEIGHT: u32 = 48;

/// EmoTeach - Emotion-Driven Lesson Adaptation
///
/// Adapts lesson presentation to the learner's facial expressions: simplified
/// text when confused, a quiz when frustrated, encouragement afterwards.
#[derive(Parser, Debug)]
#[command(name = "emoteach")]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (default: emoteach.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Path to a lesson catalog (overrides the config file)
    #[arg(short, long, value_name = "FILE", global = true)]
    lessons: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the lessons of the catalog
    Lessons,

    /// Replay a session script instantly and deterministically
    Replay {
        /// Path to the session script
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,

        /// Print events as JSON lines
        #[arg(long)]
        json: bool,
    },

    /// Run a session script through the live sampler in real time
    Simulate {
        /// Path to the session script
        #[arg(value_name = "SCRIPT")]
        script: PathBuf,

        /// Sampling interval in milliseconds (overrides the config file)
        #[arg(long, value_name = "MS")]
        interval_ms: Option<u64>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, lessons = ?args.lessons, "Starting EmoTeach");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(lessons) = args.lessons {
        config.lessons = Some(lessons);
    }

    match args.command {
        Command::Lessons => {
            config.validate()?;
            let catalog = load_catalog(&config)?;
            print_lessons(&catalog);
            Ok(())
        }
        Command::Replay { script, json } => {
            config.validate()?;
            replay(&config, &script, json)
        }
        Command::Simulate {
            script,
            interval_ms,
        } => {
            if let Some(interval_ms) = interval_ms {
                config.sampling_interval_ms = interval_ms;
            }
            config.validate()?;
            simulate(&config, &script).await
        }
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<EngineConfig> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            EngineConfig::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => EngineConfig::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Loads the configured catalog, or the built-in lessons.
fn load_catalog(config: &EngineConfig) -> anyhow::Result<LessonCatalog> {
    match &config.lessons {
        Some(path) => {
            tracing::info!(path = %path, "Loading lesson catalog");
            Ok(LessonCatalog::load(path)?)
        }
        None => Ok(LessonCatalog::builtin()),
    }
}

/// Builds a session for the script's lesson.
fn open_session(
    config: &EngineConfig,
    script: &SessionScript,
) -> anyhow::Result<LessonSession<ProgressStore>> {
    let catalog = load_catalog(config)?;
    let lesson = script.resolve_lesson(&catalog)?;
    let events = EventBroadcaster::new(config.event_buffer_size);
    Ok(LessonSession::new(lesson, config, ProgressStore::new(), events)?)
}

// ============================================================================
// Replay
// ============================================================================

fn replay(config: &EngineConfig, script_path: &Path, json: bool) -> anyhow::Result<()> {
    let script = SessionScript::load(script_path)?;
    let mut session = open_session(config, &script)?;
    let mut events = session.events().subscribe();

    if !json {
        println!("Replaying {} ({} steps)", script_path.display(), script.steps.len());
        println!();
    }

    SessionScript::begin(&mut session);
    drain_events(&mut events, 0, json)?;

    let mut report = ReplayReport::default();
    for step in &script.steps {
        let result = SessionScript::apply_step(step, &mut session);
        tracing::debug!(at_ms = step.at, ?result, "Applied step");
        report.record(&result);
        drain_events(&mut events, step.at, json)?;
    }

    if json {
        println!("{}", serde_json::to_string(&session.snapshot())?);
    } else {
        println!();
        print_summary(&session, &report);
    }
    Ok(())
}

/// Prints every event queued on `events`.
fn drain_events(
    events: &mut broadcast::Receiver<EngineEvent>,
    at_ms: u64,
    json: bool,
) -> anyhow::Result<()> {
    loop {
        match events.try_recv() {
            Ok(event) => print_event(&event, at_ms, json)?,
            Err(TryRecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Event output fell behind");
            }
            Err(TryRecvError::Empty | TryRecvError::Closed) => return Ok(()),
        }
    }
}

fn print_event(event: &EngineEvent, at_ms: u64, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    let value = serde_json::to_value(event)?;
    let payload = value
        .get("payload")
        .map(ToString::to_string)
        .unwrap_or_default();
    println!("{at_ms:>8}ms  {:<18} {payload}", event.event_name());
    Ok(())
}

// ============================================================================
// Simulate
// ============================================================================

async fn simulate(config: &EngineConfig, script_path: &Path) -> anyhow::Result<()> {
    let script = SessionScript::load(script_path)?;
    let session = open_session(config, &script)?;
    let interval = config.sampling_interval();

    let engine = spawn_engine(session, DEFAULT_COMMAND_CAPACITY);
    let printer = tokio::spawn(print_live_events(engine.subscribe()));

    let feed = Arc::new(FrameFeed::new());
    let classifier = Arc::new(ScriptedClassifier::from_script(&script));
    let sampler = Sampler::new(
        Arc::clone(&classifier),
        Arc::clone(&feed),
        interval,
        engine.command_sender(),
    )
    .spawn();
    let pump = tokio::spawn(pump_frames(Arc::clone(&feed), interval));

    println!(
        "Simulating {} (sampling every {}ms)",
        script_path.display(),
        interval.as_millis()
    );
    println!("Press Ctrl+C to stop");
    println!();

    let epoch = Instant::now();
    feed.start();

    let mut interrupted = false;
    for step in script.control_steps() {
        tokio::select! {
            Ok(()) = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, stopping session");
                interrupted = true;
                break;
            }
            () = sleep_until(epoch + step.time()) => {
                apply_live_step(&step.kind, &feed, &engine).await?;
            }
        }
    }

    // Let the sampler use up the remaining classifier responses.
    while !interrupted && classifier.remaining() > 0 && feed.status().active {
        tokio::select! {
            Ok(()) = tokio::signal::ctrl_c() => {
                tracing::info!("Received Ctrl+C, stopping session");
                interrupted = true;
            }
            () = sleep(interval) => {}
        }
    }

    feed.stop();
    sleep(interval).await;

    let snapshot = engine.snapshot().await?;
    let session = engine.shutdown().await?;
    sampler.abort();
    pump.abort();
    printer.abort();

    println!();
    println!("=== EmoTeach Session Summary ===");
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    println!();
    println!("{}", session.view());
    Ok(())
}

async fn apply_live_step<S>(
    step: &StepKind,
    feed: &FrameFeed,
    engine: &EngineHandle<S>,
) -> anyhow::Result<()> {
    match step {
        StepKind::CameraStarted => {
            feed.start();
        }
        StepKind::CameraStopped => feed.stop(),
        StepKind::CameraError { kind, message } => {
            feed.stop();
            engine.camera_failed(*kind, message.clone()).await?;
        }
        other => {
            if let Some(action) = other.user_action() {
                tracing::info!(action = action.name(), "Injecting user action");
                engine.user(action).await?;
            }
        }
    }
    Ok(())
}

/// Pushes a synthetic frame twice per sampling interval.
async fn pump_frames(feed: Arc<FrameFeed>, interval: Duration) {
    let mut sequence: u64 = 0;
    loop {
        sequence += 1;
        feed.push_frame(Frame::synthetic(sequence, FRAME_WIDTH, FRAME_HEIGHT));
        sleep(interval / 2).await;
    }
}

async fn print_live_events(mut events: broadcast::Receiver<EngineEvent>) {
    let started = Instant::now();
    loop {
        match events.recv().await {
            Ok(event) => {
                let at_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                if let Err(e) = print_event(&event, at_ms, false) {
                    tracing::warn!(error = %e, "Failed to print event");
                }
            }
            Err(RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Event output fell behind");
            }
            Err(RecvError::Closed) => break,
        }
    }
}

// ============================================================================
// Output
// ============================================================================

/// Prints the lesson list.
fn print_lessons(catalog: &LessonCatalog) {
    println!("Lessons ({}):", catalog.len());
    for lesson in &catalog.lessons {
        println!(
            "  {:<4} {:<28} {:<14} quiz: {} questions, progress: {}",
            lesson.id,
            lesson.title,
            lesson.category,
            catalog.quiz_for(lesson).len(),
            lesson.initial_progress
        );
    }
}

/// Prints a summary of a replayed session.
fn print_summary<S: ProgressSink>(session: &LessonSession<S>, report: &ReplayReport) {
    println!("=== EmoTeach Session Summary ===");
    println!("Lesson: {} ({})", session.lesson().title, session.lesson().id);
    println!("Mode: {}", session.mode());
    if !session.adaptation().reason.is_empty() {
        println!("Reason: {}", session.adaptation().reason);
    }
    println!("Progress: {}", session.progress());
    if let Some(active) = session.quiz() {
        println!(
            "Quiz: question {} of {}, score {}",
            active.session.index() + 1,
            active.session.len(),
            active.session.score()
        );
    }
    println!(
        "Samples: {} adapted, {} ignored, {} discarded, {} failed",
        report.adapted, report.ignored, report.discarded, report.skipped
    );
    println!(
        "Actions: {} accepted, {} rejected",
        report.accepted, report.rejected
    );
    println!();
    println!("{}", session.view());
}
