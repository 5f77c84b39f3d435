//! Classification sampler.
//!
//! A [`Sampler`] task classifies the current frame of a [`VideoSource`] once
//! per interval and forwards the result to the engine command queue. Ticks
//! never overlap: a classification runs to completion inside its tick, and
//! ticks missed while it ran are skipped.
//!
//! The sampler also follows the source lifecycle. When the source stops, the
//! interval is dropped, any classification still in flight is abandoned and
//! `SourceStopped` is forwarded so the session clears the current emotion.

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::classifier::{Classifier, Frame};
use crate::emotion::EmotionSample;
use crate::runtime::EngineCommand;

// ============================================================================
// Video Source
// ============================================================================

/// Lifecycle status of a video source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStatus {
    /// Whether frames are being captured.
    pub active: bool,
    /// Incremented every time the source starts.
    pub generation: u64,
}

/// A live video source.
pub trait VideoSource: Send + Sync {
    /// Whether the source is capturing.
    fn is_active(&self) -> bool;

    /// The most recent frame, if one was captured.
    fn current_frame(&self) -> Option<Frame>;

    /// Subscribes to lifecycle changes.
    fn lifecycle(&self) -> watch::Receiver<SourceStatus>;
}

/// In-process video source fed by [`FrameFeed::push_frame`].
///
/// Stands in for a capture device: whoever owns the device pushes frames,
/// and the sampler reads the latest one.
#[derive(Debug)]
pub struct FrameFeed {
    status: watch::Sender<SourceStatus>,
    frame: watch::Sender<Option<Frame>>,
}

impl FrameFeed {
    /// Creates an inactive feed.
    #[must_use]
    pub fn new() -> Self {
        let (status, _) = watch::channel(SourceStatus::default());
        let (frame, _) = watch::channel(None);
        Self { status, frame }
    }

    /// Starts capturing and returns the new generation.
    ///
    /// Starting an active feed begins a new generation.
    pub fn start(&self) -> u64 {
        let mut generation = 0;
        self.status.send_modify(|status| {
            status.active = true;
            status.generation += 1;
            generation = status.generation;
        });
        self.frame.send_replace(None);
        info!(generation, "Frame feed started");
        generation
    }

    /// Stops capturing. Stopping an inactive feed does nothing.
    pub fn stop(&self) {
        let stopped = self.status.send_if_modified(|status| {
            let was_active = status.active;
            status.active = false;
            was_active
        });
        if stopped {
            self.frame.send_replace(None);
            info!(generation = self.status.borrow().generation, "Frame feed stopped");
        }
    }

    /// Publishes a captured frame. Frames pushed while stopped are dropped.
    pub fn push_frame(&self, frame: Frame) {
        if self.is_active() {
            self.frame.send_replace(Some(frame));
        }
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> SourceStatus {
        *self.status.borrow()
    }
}

impl Default for FrameFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl VideoSource for FrameFeed {
    fn is_active(&self) -> bool {
        self.status.borrow().active
    }

    fn current_frame(&self) -> Option<Frame> {
        self.frame.borrow().clone()
    }

    fn lifecycle(&self) -> watch::Receiver<SourceStatus> {
        self.status.subscribe()
    }
}

impl<V: VideoSource> VideoSource for std::sync::Arc<V> {
    fn is_active(&self) -> bool {
        (**self).is_active()
    }

    fn current_frame(&self) -> Option<Frame> {
        (**self).current_frame()
    }

    fn lifecycle(&self) -> watch::Receiver<SourceStatus> {
        (**self).lifecycle()
    }
}

// ============================================================================
// Sampler
// ============================================================================

/// Whether the sampler should keep running.
enum Flow {
    Continue,
    Shutdown,
}

/// Periodically classifies the current frame of a video source.
#[derive(Debug)]
pub struct Sampler<C, V> {
    classifier: C,
    source: V,
    interval: Duration,
    commands: mpsc::Sender<EngineCommand>,
}

impl<C, V> Sampler<C, V>
where
    C: Classifier + 'static,
    V: VideoSource + 'static,
{
    /// Creates a sampler that sends its output to `commands`.
    #[must_use]
    pub const fn new(
        classifier: C,
        source: V,
        interval: Duration,
        commands: mpsc::Sender<EngineCommand>,
    ) -> Self {
        Self {
            classifier,
            source,
            interval,
            commands,
        }
    }

    /// Spawns the sampler on the current tokio runtime.
    ///
    /// The task ends when the engine stops accepting commands or the source
    /// is dropped.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Runs the sampler until the engine or the source goes away.
    pub async fn run(self) {
        let mut lifecycle = self.source.lifecycle();
        let mut forwarded: Option<SourceStatus> = None;

        loop {
            let status = *lifecycle.borrow_and_update();

            if forwarded != Some(status) {
                if let Flow::Shutdown = self.forward_status(forwarded, status).await {
                    break;
                }
                forwarded = Some(status);
            }

            let flow = if status.active {
                self.run_generation(status.generation, &mut lifecycle).await
            } else if lifecycle.changed().await.is_ok() {
                Flow::Continue
            } else {
                Flow::Shutdown
            };

            if let Flow::Shutdown = flow {
                break;
            }
        }

        debug!("Sampler stopped");
    }

    async fn forward_status(&self, previous: Option<SourceStatus>, status: SourceStatus) -> Flow {
        let command = if status.active {
            EngineCommand::SourceStarted {
                generation: status.generation,
            }
        } else if previous.is_some_and(|p| p.active) {
            EngineCommand::SourceStopped {
                generation: status.generation,
            }
        } else {
            return Flow::Continue;
        };
        self.send(command).await
    }

    /// Samples one source generation until its status changes.
    async fn run_generation(
        &self,
        generation: u64,
        lifecycle: &mut watch::Receiver<SourceStatus>,
    ) -> Flow {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                changed = lifecycle.changed() => {
                    return if changed.is_ok() { Flow::Continue } else { Flow::Shutdown };
                }
                _ = ticker.tick() => {}
            }

            // A status change while classifying abandons the result.
            let sample = tokio::select! {
                biased;
                changed = lifecycle.changed() => {
                    debug!(generation, "Source changed during classification, discarding result");
                    return if changed.is_ok() { Flow::Continue } else { Flow::Shutdown };
                }
                sample = self.sample_once(generation) => sample,
            };

            if let Some(sample) = sample {
                if let Flow::Shutdown = self.send(EngineCommand::Sample { generation, sample }).await {
                    return Flow::Shutdown;
                }
            }
        }
    }

    /// Runs the classifier against the current frame.
    ///
    /// Returns `None` when nothing should be emitted this tick.
    async fn sample_once(&self, generation: u64) -> Option<EmotionSample> {
        if !self.source.is_active() {
            return None;
        }
        if !self.classifier.is_ready() {
            debug!(generation, "Classifier not ready, skipping tick");
            return None;
        }
        let Some(frame) = self.source.current_frame() else {
            debug!(generation, "No frame captured yet, skipping tick");
            return None;
        };

        match self.classifier.classify(&frame).await {
            Ok(Some(classification)) => {
                let sample = classification.to_sample();
                debug!(
                    generation,
                    frame = frame.sequence,
                    label = ?sample.label,
                    confidence = sample.confidence,
                    "Classified frame"
                );
                Some(sample)
            }
            Ok(None) => Some(EmotionSample::no_face()),
            Err(e) => {
                warn!(generation, frame = frame.sequence, error = %e, "Classification failed, skipping tick");
                None
            }
        }
    }

    async fn send(&self, command: EngineCommand) -> Flow {
        if self.commands.send(command).await.is_ok() {
            Flow::Continue
        } else {
            debug!("Engine command queue closed");
            Flow::Shutdown
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::classifier::{Classification, ScriptedClassifier, ScriptedResponse};
    use crate::emotion::EmotionLabel;

    fn detected(label: &str, confidence: f32) -> ScriptedResponse {
        ScriptedResponse::Detected(Classification::new(label, confidence))
    }

    fn setup(
        responses: Vec<ScriptedResponse>,
    ) -> (
        Arc<ScriptedClassifier>,
        Arc<FrameFeed>,
        mpsc::Receiver<EngineCommand>,
        JoinHandle<()>,
    ) {
        let classifier = Arc::new(ScriptedClassifier::new(responses));
        setup_with(classifier)
    }

    fn setup_with(
        classifier: Arc<ScriptedClassifier>,
    ) -> (
        Arc<ScriptedClassifier>,
        Arc<FrameFeed>,
        mpsc::Receiver<EngineCommand>,
        JoinHandle<()>,
    ) {
        let feed = Arc::new(FrameFeed::new());
        let (tx, rx) = mpsc::channel(32);
        let task = Sampler::new(
            Arc::clone(&classifier),
            Arc::clone(&feed),
            Duration::from_secs(1),
            tx,
        )
        .spawn();
        (classifier, feed, rx, task)
    }

    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    #[test]
    fn test_frame_feed_lifecycle() {
        let feed = FrameFeed::new();
        assert!(!feed.is_active());
        assert_eq!(feed.status().generation, 0);

        assert_eq!(feed.start(), 1);
        assert!(feed.is_active());
        assert!(feed.current_frame().is_none());

        feed.push_frame(Frame::synthetic(1, 4, 4));
        assert_eq!(feed.current_frame().unwrap().sequence, 1);

        feed.stop();
        assert!(!feed.is_active());
        assert!(feed.current_frame().is_none());

        feed.push_frame(Frame::synthetic(2, 4, 4));
        assert!(feed.current_frame().is_none());

        assert_eq!(feed.start(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_samples_while_inactive() {
        let (classifier, _feed, mut rx, task) = setup(vec![detected("happy", 0.9)]);

        time::sleep(Duration::from_secs(5)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(classifier.calls(), 0);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_sample_per_tick() {
        let (_classifier, feed, mut rx, task) = setup(vec![
            detected("happy", 0.95),
            detected("sad", 0.72),
        ]);

        let generation = feed.start();
        feed.push_frame(Frame::synthetic(1, 4, 4));

        let started = rx.recv().await.unwrap();
        assert!(matches!(started, EngineCommand::SourceStarted { generation: 1 }));

        let first = rx.recv().await.unwrap();
        let EngineCommand::Sample { generation: g, sample } = first else {
            unreachable!("expected a sample");
        };
        assert_eq!(g, generation);
        assert_eq!(sample, EmotionSample::new(EmotionLabel::Happy, 95));

        let second = rx.recv().await.unwrap();
        assert!(matches!(
            second,
            EngineCommand::Sample { sample, .. } if sample == EmotionSample::new(EmotionLabel::Sad, 72)
        ));

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        let (classifier, feed, mut rx, task) = setup(vec![detected("happy", 0.95)]);
        feed.start();
        feed.push_frame(Frame::synthetic(1, 4, 4));
        assert!(matches!(rx.recv().await.unwrap(), EngineCommand::SourceStarted { .. }));

        time::sleep(Duration::from_millis(999)).await;
        assert_eq!(classifier.calls(), 0);

        assert!(matches!(rx.recv().await.unwrap(), EngineCommand::Sample { .. }));
        assert_eq!(classifier.calls(), 1);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_face_emits_empty_sample() {
        let (_classifier, feed, mut rx, task) = setup(vec![ScriptedResponse::NoFace]);
        feed.start();
        feed.push_frame(Frame::synthetic(1, 4, 4));
        rx.recv().await.unwrap();

        let command = rx.recv().await.unwrap();
        assert!(matches!(
            command,
            EngineCommand::Sample { sample, .. } if sample == EmotionSample::no_face()
        ));

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_skips_tick() {
        let (classifier, feed, mut rx, task) = setup(vec![
            ScriptedResponse::Failure("model hiccup".to_string()),
            detected("angry", 0.8),
        ]);
        feed.start();
        feed.push_frame(Frame::synthetic(1, 4, 4));
        rx.recv().await.unwrap();

        // The failed tick emits nothing; the next tick emits the second response.
        let command = rx.recv().await.unwrap();
        assert!(matches!(
            command,
            EngineCommand::Sample { sample, .. } if sample.label == Some(EmotionLabel::Angry)
        ));
        assert_eq!(classifier.calls(), 2);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_ready_classifier_is_not_called() {
        let classifier = Arc::new(ScriptedClassifier::new([detected("happy", 0.9)]));
        classifier.set_ready(false);
        let (classifier, feed, mut rx, task) = setup_with(classifier);
        feed.start();
        feed.push_frame(Frame::synthetic(1, 4, 4));
        rx.recv().await.unwrap();

        time::sleep(Duration::from_secs(3)).await;
        settle().await;
        assert!(rx.try_recv().is_err());
        assert_eq!(classifier.calls(), 0);

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_forwards_and_halts_sampling() {
        let (classifier, feed, mut rx, task) = setup(vec![
            detected("happy", 0.9),
            detected("happy", 0.9),
            detected("happy", 0.9),
        ]);
        feed.start();
        feed.push_frame(Frame::synthetic(1, 4, 4));
        rx.recv().await.unwrap();
        assert!(matches!(rx.recv().await.unwrap(), EngineCommand::Sample { .. }));

        feed.stop();
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineCommand::SourceStopped { generation: 1 }
        ));

        let calls = classifier.calls();
        time::sleep(Duration::from_secs(5)).await;
        settle().await;
        assert_eq!(classifier.calls(), calls);
        assert!(rx.try_recv().is_err());

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_result_discarded_on_stop() {
        let classifier = Arc::new(
            ScriptedClassifier::new([detected("angry", 0.9)])
                .with_latency(Duration::from_millis(500)),
        );
        let (classifier, feed, mut rx, task) = setup_with(classifier);
        feed.start();
        feed.push_frame(Frame::synthetic(1, 4, 4));
        rx.recv().await.unwrap();

        // Tick at 1s starts a classification that would finish at 1.5s.
        time::sleep(Duration::from_millis(1_200)).await;
        settle().await;
        assert_eq!(classifier.calls(), 1);
        feed.stop();

        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineCommand::SourceStopped { .. }
        ));
        time::sleep(Duration::from_secs(2)).await;
        settle().await;
        assert!(rx.try_recv().is_err());

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_uses_new_generation() {
        let (_classifier, feed, mut rx, task) = setup(vec![
            detected("happy", 0.9),
            detected("sad", 0.9),
        ]);
        feed.start();
        feed.push_frame(Frame::synthetic(1, 4, 4));
        rx.recv().await.unwrap();
        rx.recv().await.unwrap();

        feed.stop();
        rx.recv().await.unwrap();

        feed.start();
        feed.push_frame(Frame::synthetic(2, 4, 4));
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineCommand::SourceStarted { generation: 2 }
        ));
        assert!(matches!(
            rx.recv().await.unwrap(),
            EngineCommand::Sample { generation: 2, .. }
        ));

        task.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_sampler_exits_when_engine_gone() {
        let (_classifier, feed, rx, task) = setup(vec![detected("happy", 0.9)]);
        drop(rx);
        feed.start();
        feed.push_frame(Frame::synthetic(1, 4, 4));

        time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
