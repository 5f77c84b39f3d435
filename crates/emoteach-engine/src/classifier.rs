//! Expression classifier capability.
//!
//! The engine never runs a model itself. It talks to a [`Classifier`], which
//! is either an [`ExpressionClassifier`] wrapping a face/expression detection
//! runtime or a [`ScriptedClassifier`] that replays canned responses.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::emotion::EmotionSample;
use crate::error::{EngineError, Result};

// ============================================================================
// Frames and Classifications
// ============================================================================

/// A captured video frame.
///
/// Pixel data is opaque to the engine and shared, so frames are cheap to
/// clone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Monotonic frame counter from the source.
    pub sequence: u64,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Raw pixel data.
    pub data: Arc<[u8]>,
}

impl Frame {
    /// Creates a frame with empty pixel data, for sources that only simulate
    /// capture.
    #[must_use]
    pub fn synthetic(sequence: u64, width: u32, height: u32) -> Self {
        Self {
            sequence,
            width,
            height,
            data: Arc::from(Vec::new()),
        }
    }
}

/// The dominant expression of the chosen face.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    /// Raw expression label as reported by the runtime.
    pub label: String,
    /// Probability of the label, in `[0, 1]`.
    pub confidence: f32,
}

impl Classification {
    /// Creates a classification.
    #[must_use]
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }

    /// Normalizes into an [`EmotionSample`] with a whole-percent confidence.
    #[must_use]
    pub fn to_sample(&self) -> EmotionSample {
        EmotionSample::from_probability(&self.label, self.confidence)
    }
}

// ============================================================================
// Classifier Trait
// ============================================================================

/// Classifies the expression in a frame.
pub trait Classifier: Send + Sync {
    /// Returns `true` once the underlying model is loaded.
    fn is_ready(&self) -> bool;

    /// Classifies one frame.
    ///
    /// Returns `Ok(None)` when no face is detected.
    ///
    /// # Errors
    ///
    /// Any error means "no sample this tick"; the sampler logs it and moves
    /// on.
    fn classify(
        &self,
        frame: &Frame,
    ) -> impl Future<Output = Result<Option<Classification>>> + Send;
}

impl<C: Classifier> Classifier for Arc<C> {
    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn classify(
        &self,
        frame: &Frame,
    ) -> impl Future<Output = Result<Option<Classification>>> + Send {
        (**self).classify(frame)
    }
}

// ============================================================================
// Expression Classifier
// ============================================================================

/// One face found by a detection runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceDetection {
    /// Detection confidence, when the runtime reports one.
    pub score: Option<f32>,
    /// Expression probabilities, in runtime order.
    pub expressions: Vec<(String, f32)>,
}

impl FaceDetection {
    /// Returns the most probable expression. Ties go to the last reported.
    #[must_use]
    pub fn dominant_expression(&self) -> Option<(&str, f32)> {
        self.expressions
            .iter()
            .map(|(label, probability)| (label.as_str(), *probability))
            .reduce(|best, candidate| if candidate.1 >= best.1 { candidate } else { best })
    }
}

/// A face detection and expression recognition runtime.
pub trait FaceExpressionDetector: Send + Sync {
    /// Returns `true` once the models are loaded.
    fn is_loaded(&self) -> bool;

    /// Detects all faces in a frame with their expression probabilities.
    ///
    /// # Errors
    ///
    /// Returns an error if inference fails.
    fn detect(&self, frame: &Frame) -> impl Future<Output = Result<Vec<FaceDetection>>> + Send;
}

/// [`Classifier`] backed by a [`FaceExpressionDetector`].
///
/// With several faces, the one with the highest detection score wins; if any
/// face lacks a score, the first reported face wins.
#[derive(Debug, Clone)]
pub struct ExpressionClassifier<D> {
    detector: D,
}

impl<D: FaceExpressionDetector> ExpressionClassifier<D> {
    /// Wraps a detector.
    #[must_use]
    pub const fn new(detector: D) -> Self {
        Self { detector }
    }

    /// The wrapped detector.
    #[must_use]
    pub const fn detector(&self) -> &D {
        &self.detector
    }
}

/// Picks the face whose expression is reported.
#[must_use]
pub fn select_face(faces: &[FaceDetection]) -> Option<&FaceDetection> {
    if faces.iter().any(|face| face.score.is_none()) {
        return faces.first();
    }
    faces
        .iter()
        .reduce(|best, candidate| if candidate.score > best.score { candidate } else { best })
}

impl<D: FaceExpressionDetector> Classifier for ExpressionClassifier<D> {
    fn is_ready(&self) -> bool {
        self.detector.is_loaded()
    }

    async fn classify(&self, frame: &Frame) -> Result<Option<Classification>> {
        if !self.detector.is_loaded() {
            return Err(EngineError::ClassifierNotReady);
        }

        let faces = self.detector.detect(frame).await?;
        Ok(select_face(&faces)
            .and_then(FaceDetection::dominant_expression)
            .map(|(label, probability)| Classification::new(label, probability)))
    }
}

// ============================================================================
// Scripted Classifier
// ============================================================================

/// One canned response of a [`ScriptedClassifier`].
#[derive(Debug, Clone, PartialEq)]
pub enum ScriptedResponse {
    /// A face with this expression.
    Detected(Classification),
    /// No face in the frame.
    NoFace,
    /// The classifier fails with this message.
    Failure(String),
}

/// Deterministic classifier that replays canned responses, one per call.
///
/// Once the script is exhausted every call reports no face.
#[derive(Debug)]
pub struct ScriptedClassifier {
    responses: Mutex<VecDeque<ScriptedResponse>>,
    ready: AtomicBool,
    calls: AtomicUsize,
    latency: Duration,
}

impl ScriptedClassifier {
    /// Creates a ready classifier with the given responses.
    #[must_use]
    pub fn new(responses: impl IntoIterator<Item = ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into_iter().collect()),
            ready: AtomicBool::new(true),
            calls: AtomicUsize::new(0),
            latency: Duration::ZERO,
        }
    }

    /// Makes every classification take `latency` before answering.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Marks the model as loaded or not.
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::SeqCst);
    }

    /// Appends a response.
    pub fn push(&self, response: ScriptedResponse) {
        self.lock().push_back(response);
    }

    /// Responses not yet consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.lock().len()
    }

    /// Number of `classify` calls so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<ScriptedResponse>> {
        self.responses.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Classifier for ScriptedClassifier {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn classify(&self, _frame: &Frame) -> Result<Option<Classification>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.lock().pop_front();

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        match response {
            Some(ScriptedResponse::Detected(classification)) => Ok(Some(classification)),
            Some(ScriptedResponse::NoFace) | None => Ok(None),
            Some(ScriptedResponse::Failure(message)) => {
                Err(EngineError::classification_failed(message))
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::emotion::EmotionLabel;
    use tokio_test::assert_err;

    fn face(score: Option<f32>, expressions: &[(&str, f32)]) -> FaceDetection {
        FaceDetection {
            score,
            expressions: expressions
                .iter()
                .map(|(label, p)| ((*label).to_string(), *p))
                .collect(),
        }
    }

    struct FixedDetector {
        loaded: bool,
        faces: Vec<FaceDetection>,
    }

    impl FaceExpressionDetector for FixedDetector {
        fn is_loaded(&self) -> bool {
            self.loaded
        }

        async fn detect(&self, _frame: &Frame) -> Result<Vec<FaceDetection>> {
            Ok(self.faces.clone())
        }
    }

    struct FailingDetector;

    impl FaceExpressionDetector for FailingDetector {
        fn is_loaded(&self) -> bool {
            true
        }

        async fn detect(&self, _frame: &Frame) -> Result<Vec<FaceDetection>> {
            Err(EngineError::classification_failed("inference backend crashed"))
        }
    }

    fn frame() -> Frame {
        Frame::synthetic(1, 640, 480)
    }

    #[test]
    fn test_dominant_expression_is_argmax() {
        let detection = face(None, &[("neutral", 0.2), ("happy", 0.7), ("sad", 0.1)]);
        assert_eq!(detection.dominant_expression(), Some(("happy", 0.7)));
    }

    #[test]
    fn test_dominant_expression_tie_takes_last() {
        let detection = face(None, &[("sad", 0.5), ("angry", 0.5), ("happy", 0.1)]);
        assert_eq!(detection.dominant_expression(), Some(("angry", 0.5)));
    }

    #[test]
    fn test_dominant_expression_empty() {
        assert_eq!(face(None, &[]).dominant_expression(), None);
    }

    #[test]
    fn test_select_face_highest_score() {
        let faces = vec![
            face(Some(0.6), &[("sad", 0.9)]),
            face(Some(0.95), &[("happy", 0.8)]),
            face(Some(0.7), &[("angry", 0.9)]),
        ];
        let chosen = select_face(&faces).unwrap();
        assert_eq!(chosen.dominant_expression().unwrap().0, "happy");
    }

    #[test]
    fn test_select_face_without_scores_takes_first() {
        let faces = vec![
            face(None, &[("sad", 0.9)]),
            face(Some(0.99), &[("happy", 0.8)]),
        ];
        let chosen = select_face(&faces).unwrap();
        assert_eq!(chosen.dominant_expression().unwrap().0, "sad");
    }

    #[test]
    fn test_select_face_none() {
        assert!(select_face(&[]).is_none());
    }

    #[test]
    fn test_classification_to_sample() {
        let sample = Classification::new("Fearful", 0.904).to_sample();
        assert_eq!(sample.label, Some(EmotionLabel::Fearful));
        assert_eq!(sample.confidence, 90);
    }

    #[tokio::test]
    async fn test_expression_classifier_picks_best_face() {
        let classifier = ExpressionClassifier::new(FixedDetector {
            loaded: true,
            faces: vec![
                face(Some(0.5), &[("neutral", 0.9)]),
                face(Some(0.9), &[("angry", 0.65), ("disgusted", 0.35)]),
            ],
        });

        let result = classifier.classify(&frame()).await.unwrap().unwrap();
        assert_eq!(result, Classification::new("angry", 0.65));
    }

    #[tokio::test]
    async fn test_expression_classifier_no_face() {
        let classifier = ExpressionClassifier::new(FixedDetector {
            loaded: true,
            faces: Vec::new(),
        });
        assert!(classifier.classify(&frame()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expression_classifier_not_loaded() {
        let classifier = ExpressionClassifier::new(FixedDetector {
            loaded: false,
            faces: vec![face(None, &[("happy", 1.0)])],
        });
        assert!(!classifier.is_ready());

        let err = classifier.classify(&frame()).await.unwrap_err();
        assert!(matches!(err, EngineError::ClassifierNotReady));
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_expression_classifier_propagates_failure() {
        let classifier = ExpressionClassifier::new(FailingDetector);
        let err = classifier.classify(&frame()).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_scripted_classifier_replays_in_order() {
        let classifier = ScriptedClassifier::new([
            ScriptedResponse::Detected(Classification::new("happy", 0.9)),
            ScriptedResponse::NoFace,
            ScriptedResponse::Failure("model hiccup".to_string()),
        ]);

        let first = classifier.classify(&frame()).await.unwrap();
        assert_eq!(first, Some(Classification::new("happy", 0.9)));
        assert!(classifier.classify(&frame()).await.unwrap().is_none());
        assert_err!(classifier.classify(&frame()).await);

        // Exhausted: no face from now on.
        assert!(classifier.classify(&frame()).await.unwrap().is_none());
        assert_eq!(classifier.calls(), 4);
        assert_eq!(classifier.remaining(), 0);
    }

    #[tokio::test]
    async fn test_scripted_classifier_push_and_ready() {
        let classifier = ScriptedClassifier::new([]);
        assert!(classifier.is_ready());
        classifier.set_ready(false);
        assert!(!classifier.is_ready());

        classifier.push(ScriptedResponse::Detected(Classification::new("sad", 0.7)));
        assert_eq!(classifier.remaining(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_classifier_latency() {
        let classifier = ScriptedClassifier::new([ScriptedResponse::NoFace])
            .with_latency(Duration::from_millis(300));

        let started = tokio::time::Instant::now();
        classifier.classify(&frame()).await.unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test]
    async fn test_arc_classifier_delegates() {
        let classifier = Arc::new(ScriptedClassifier::new([ScriptedResponse::Detected(
            Classification::new("surprised", 0.61),
        )]));
        let result = Classifier::classify(&classifier, &frame()).await.unwrap();
        assert_eq!(result.unwrap().label, "surprised");
        assert_eq!(classifier.calls(), 1);
    }
}
