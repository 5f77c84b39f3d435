//! Presentation model of a lesson session.
//!
//! [`LessonView`] is what a front end needs to draw the lesson screen: the
//! banner, the emotion indicator, the lesson body or quiz panel and which
//! actions are offered. Nothing here renders pixels; the `Display` impl gives
//! a plain-text rendering for terminals and logs.

use std::fmt;

use serde::Serialize;

use crate::adaptation::{AdaptationMode, POSITIVE_MESSAGE};
use crate::progress::{Progress, ProgressSink};
use crate::quiz::QuizSession;
use crate::session::LessonSession;

/// Indicator text shown while no emotion is confidently detected.
pub const DETECTING_LABEL: &str = "Detecting...";

/// Indicator hint shown while no emotion is confidently detected.
pub const DETECTING_HINT: &str = "Please look at camera";

/// Emoji shown while no emotion is confidently detected.
pub const DETECTING_EMOJI: &str = "🤔";

/// The floating emotion indicator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmotionIndicator {
    /// Emoji for the detected emotion.
    pub emoji: &'static str,
    /// Emotion name, or "Detecting...".
    pub label: String,
    /// Confidence like "87%", or "Please look at camera".
    pub detail: String,
    /// Whether an emotion is shown.
    pub detected: bool,
}

/// Mark on a quiz option once the answer is revealed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OptionMark {
    /// The correct option.
    Correct,
    /// The learner's wrong pick.
    Incorrect,
}

/// One option of the current quiz question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuizOptionView {
    /// Option text.
    pub text: String,
    /// Whether the learner picked it.
    pub selected: bool,
    /// Mark, only once the answer is revealed.
    pub mark: Option<OptionMark>,
}

/// The quiz panel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizPanel {
    /// Position like "2 of 3".
    pub position: String,
    /// Question text.
    pub prompt: String,
    /// Options in display order.
    pub options: Vec<QuizOptionView>,
    /// Explanation, once the answer is revealed.
    pub explanation: Option<String>,
    /// Label of the continue button, once the answer is revealed.
    pub continue_label: Option<&'static str>,
    /// Score line like "Score: 1/3".
    pub score: String,
    /// Whether the quiz was triggered by adaptation.
    pub adapted: bool,
}

impl QuizPanel {
    fn from_quiz(quiz: &QuizSession, adapted: bool) -> Self {
        let question = quiz.current_question();
        let revealed = quiz.answer_revealed();
        let selected = quiz.selected_answer();

        let options = question
            .options
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let mark = if !revealed {
                    None
                } else if question.is_correct(index) {
                    Some(OptionMark::Correct)
                } else if selected == Some(index) {
                    Some(OptionMark::Incorrect)
                } else {
                    None
                };
                QuizOptionView {
                    text: text.clone(),
                    selected: selected == Some(index),
                    mark,
                }
            })
            .collect();

        Self {
            position: format!("{} of {}", quiz.index() + 1, quiz.len()),
            prompt: question.prompt.clone(),
            options,
            explanation: revealed.then(|| question.explanation.clone()),
            continue_label: revealed.then(|| {
                if quiz.is_last_question() {
                    "Finish Quiz"
                } else {
                    "Next Question"
                }
            }),
            score: format!("Score: {}/{}", quiz.score(), quiz.len()),
            adapted,
        }
    }
}

/// Main content area.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LessonBody {
    /// Lesson text.
    Text {
        /// The full or simplified explanation.
        text: String,
        /// Whether `text` is the simplified explanation.
        simplified: bool,
        /// Extra examples, only with the simplified explanation.
        extra_examples: Vec<String>,
    },
    /// The quiz panel.
    Quiz(QuizPanel),
}

/// Everything needed to draw the lesson screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonView {
    /// Lesson title.
    pub title: String,
    /// Lesson category.
    pub category: String,
    /// Progress bar value.
    pub progress: Progress,
    /// Current adaptation mode.
    pub mode: AdaptationMode,
    /// Encouragement banner.
    pub banner: String,
    /// Adaptation reason, when there is one.
    pub reason: Option<String>,
    /// Whether the "Adapting" badge is shown.
    pub adapting: bool,
    /// Floating emotion indicator.
    pub indicator: EmotionIndicator,
    /// Lesson text or quiz panel.
    pub body: LessonBody,
    /// Hints, in `simplified` and `encouraging` modes outside a quiz.
    pub hints: Option<Vec<String>>,
    /// Whether "Take Quiz", "Mark Complete" and "Simplify" are offered.
    pub actions_available: bool,
    /// Camera error shown to the learner.
    pub camera_error: Option<String>,
}

impl LessonView {
    /// Builds the view of a session.
    #[must_use]
    pub fn of<S: ProgressSink>(session: &LessonSession<S>) -> Self {
        let lesson = session.lesson();
        let adaptation = session.adaptation();
        let mode = adaptation.mode;

        let banner = if adaptation.message.is_empty() {
            POSITIVE_MESSAGE.to_string()
        } else {
            adaptation.message.clone()
        };

        let indicator = match session.current_emotion() {
            Some(sample) if sample.confidence > session.display_threshold() => {
                match sample.label {
                    Some(label) => EmotionIndicator {
                        emoji: label.emoji(),
                        label: label.to_string(),
                        detail: format!("{}%", sample.confidence),
                        detected: true,
                    },
                    None => EmotionIndicator::detecting(),
                }
            }
            _ => EmotionIndicator::detecting(),
        };

        let (body, hints) = match session.quiz() {
            Some(active) => (
                LessonBody::Quiz(QuizPanel::from_quiz(&active.session, adaptation.is_adapting())),
                None,
            ),
            None => {
                let body = if mode == AdaptationMode::Simplified {
                    LessonBody::Text {
                        text: lesson.simplified_text.clone(),
                        simplified: true,
                        extra_examples: lesson.extra_examples.clone(),
                    }
                } else {
                    LessonBody::Text {
                        text: lesson.full_text.clone(),
                        simplified: false,
                        extra_examples: Vec::new(),
                    }
                };
                let hints = matches!(mode, AdaptationMode::Simplified | AdaptationMode::Encouraging)
                    .then(|| lesson.hints.clone());
                (body, hints)
            }
        };

        Self {
            title: lesson.title.clone(),
            category: lesson.category.clone(),
            progress: session.progress(),
            mode,
            banner,
            reason: adaptation
                .is_adapting()
                .then(|| adaptation.reason.clone()),
            adapting: adaptation.is_adapting(),
            indicator,
            actions_available: session.quiz().is_none(),
            body,
            hints,
            camera_error: session
                .camera_error()
                .map(|error| error.message.clone()),
        }
    }
}

impl EmotionIndicator {
    fn detecting() -> Self {
        Self {
            emoji: DETECTING_EMOJI,
            label: DETECTING_LABEL.to_string(),
            detail: DETECTING_HINT.to_string(),
            detected: false,
        }
    }
}

impl<S: ProgressSink> LessonSession<S> {
    /// Builds the presentation model of this session.
    #[must_use]
    pub fn view(&self) -> LessonView {
        LessonView::of(self)
    }
}

impl fmt::Display for LessonView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} [{}] {}", self.title, self.mode, self.progress)?;
        writeln!(
            f,
            "{} {} ({})",
            self.indicator.emoji, self.indicator.label, self.indicator.detail
        )?;
        if let Some(error) = &self.camera_error {
            writeln!(f, "Camera: {error}")?;
        }
        writeln!(f, "💡 {}", self.banner)?;
        if let Some(reason) = &self.reason {
            writeln!(f, "Adapting: {reason}")?;
        }

        match &self.body {
            LessonBody::Text {
                text,
                extra_examples,
                ..
            } => {
                writeln!(f)?;
                writeln!(f, "{text}")?;
                for example in extra_examples {
                    writeln!(f, "{example}")?;
                }
            }
            LessonBody::Quiz(panel) => {
                writeln!(f)?;
                writeln!(f, "Practice Quiz ({})", panel.position)?;
                writeln!(f, "{}", panel.prompt)?;
                for (index, option) in panel.options.iter().enumerate() {
                    let mark = match option.mark {
                        Some(OptionMark::Correct) => " ✓",
                        Some(OptionMark::Incorrect) => " ✗",
                        None => "",
                    };
                    writeln!(f, "  {}. {}{mark}", index + 1, option.text)?;
                }
                if let Some(explanation) = &panel.explanation {
                    writeln!(f, "{explanation}")?;
                }
                writeln!(f, "{}", panel.score)?;
            }
        }

        if let Some(hints) = &self.hints {
            writeln!(f)?;
            writeln!(f, "Hints:")?;
            for hint in hints {
                writeln!(f, "  • {hint}")?;
            }
        }
        Ok(())
    }
}
