//! Lesson content and the lesson catalog.
//!
//! Lessons are read verbatim and never mutated by the engine. A catalog can
//! carry a shared quiz and shared extra examples that apply to every lesson
//! without its own.

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};
use crate::progress::Progress;
use crate::quiz::{validate_questions, Question};

/// Maximum allowed lesson catalog file size in bytes (512KB).
pub const MAX_CATALOG_SIZE: u64 = 512 * 1024;

/// A single lesson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    /// Unique lesson identifier.
    pub id: String,

    /// Lesson title.
    pub title: String,

    /// One-line description for lesson lists.
    #[serde(default)]
    pub description: String,

    /// Subject area, e.g. "Mathematics".
    #[serde(default)]
    pub category: String,

    /// Full explanation shown in `normal`, `encouraging` and `quiz` modes.
    pub full_text: String,

    /// Simplified explanation shown in `simplified` mode.
    pub simplified_text: String,

    /// Ordered hints shown in `simplified` and `encouraging` modes.
    #[serde(default)]
    pub hints: Vec<String>,

    /// Extra examples shown with the simplified text.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_examples: Vec<String>,

    /// Lesson-specific quiz.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quiz: Vec<Question>,

    /// Progress the lesson starts with.
    #[serde(default)]
    pub initial_progress: Progress,
}

/// Supplies lesson content by id.
pub trait LessonProvider {
    /// Returns the lesson with its effective quiz and extra examples filled in.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::UnknownLesson` if no lesson has this id.
    fn lesson(&self, lesson_id: &str) -> Result<Lesson>;
}

/// A validated collection of lessons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonCatalog {
    /// Lessons in display order.
    pub lessons: Vec<Lesson>,

    /// Quiz used by lessons without their own.
    #[serde(default)]
    pub shared_quiz: Vec<Question>,

    /// Extra examples used by lessons without their own.
    #[serde(default)]
    pub shared_examples: Vec<String>,
}

impl LessonCatalog {
    /// Loads and validates a catalog from a JSON file.
    ///
    /// Validates that:
    /// - The file exists
    /// - The file size is within the 512KB limit
    /// - The content is valid UTF-8 and matches the catalog schema
    /// - Every lesson passes [`LessonCatalog::validate`]
    ///
    /// # Errors
    ///
    /// Returns `EngineError::CatalogNotFound`, `CatalogTooLarge`,
    /// `CatalogEncodingError` or `CatalogParseError` for the file checks, and
    /// `InvalidLesson` if validation fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let metadata = std::fs::metadata(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                EngineError::catalog_not_found(path)
            } else {
                EngineError::Io(e)
            }
        })?;

        let file_size = metadata.len();
        if file_size > MAX_CATALOG_SIZE {
            return Err(EngineError::catalog_too_large(path, file_size / 1024));
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                EngineError::catalog_encoding(path)
            } else {
                EngineError::Io(e)
            }
        })?;

        let catalog: Self = serde_json::from_str(&content)
            .map_err(|e| EngineError::catalog_parse(path, e.to_string()))?;
        catalog.validate()?;

        tracing::debug!(path = %path.display(), lessons = catalog.lessons.len(), "Loaded lesson catalog");
        Ok(catalog)
    }

    /// Checks ids, titles and the effective quiz of every lesson.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidLesson` naming the first offending lesson.
    pub fn validate(&self) -> Result<()> {
        if self.lessons.is_empty() {
            return Err(EngineError::invalid_lesson(
                "",
                "the catalog contains no lessons",
            ));
        }

        let mut seen = HashSet::new();
        for lesson in &self.lessons {
            if lesson.id.trim().is_empty() {
                return Err(EngineError::invalid_lesson(
                    &lesson.id,
                    "lesson id must not be empty",
                ));
            }
            if !seen.insert(lesson.id.as_str()) {
                return Err(EngineError::invalid_lesson(&lesson.id, "duplicate lesson id"));
            }
            if lesson.title.trim().is_empty() {
                return Err(EngineError::invalid_lesson(
                    &lesson.id,
                    "lesson title must not be empty",
                ));
            }
            validate_questions(self.quiz_for(lesson))
                .map_err(|e| EngineError::invalid_lesson(&lesson.id, e.to_string()))?;
        }
        Ok(())
    }

    /// Looks up a lesson by id.
    #[must_use]
    pub fn get(&self, lesson_id: &str) -> Option<&Lesson> {
        self.lessons.iter().find(|lesson| lesson.id == lesson_id)
    }

    /// The quiz a lesson uses: its own, or the shared one.
    #[must_use]
    pub fn quiz_for<'a>(&'a self, lesson: &'a Lesson) -> &'a [Question] {
        if lesson.quiz.is_empty() {
            &self.shared_quiz
        } else {
            &lesson.quiz
        }
    }

    /// The extra examples a lesson uses: its own, or the shared ones.
    #[must_use]
    pub fn examples_for<'a>(&'a self, lesson: &'a Lesson) -> &'a [String] {
        if lesson.extra_examples.is_empty() {
            &self.shared_examples
        } else {
            &lesson.extra_examples
        }
    }

    /// Number of lessons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    /// Returns `true` if the catalog has no lessons.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }

    /// The built-in fractions course.
    #[must_use]
    pub fn builtin() -> Self {
        Self {
            lessons: vec![
                builtin_lesson(
                    "1",
                    "Introduction to Fractions",
                    "Learn the basics of fractions with visual examples",
                    "A fraction represents a part of a whole. When we write 1/2, we mean one part out of two equal parts.",
                    "A fraction is like a piece of a pie! If you cut a pie into 2 equal pieces and take 1 piece, you have 1/2 of the pie.",
                    &[
                        "Think of fractions like pizza slices",
                        "The bottom number shows how many pieces total",
                        "The top number shows how many pieces you have",
                    ],
                ),
                builtin_lesson(
                    "2",
                    "Adding Fractions",
                    "Master the art of adding fractions together",
                    "To add fractions with the same denominator, simply add the numerators and keep the denominator the same.",
                    "When fractions have the same bottom number, just add the top numbers! Like 1/4 + 2/4 = 3/4.",
                    &[
                        "Only add the top numbers",
                        "Keep the bottom number the same",
                        "Check if your answer can be simplified",
                    ],
                ),
                builtin_lesson(
                    "3",
                    "Equivalent Fractions",
                    "Understand how different fractions can represent the same value",
                    "Equivalent fractions are fractions that represent the same value, like 1/2 and 2/4.",
                    "Some fractions look different but mean the same thing! Like 1/2 is the same as 2/4 - they're both half!",
                    &[
                        "Multiply or divide top and bottom by the same number",
                        "1/2 = 2/4 = 3/6",
                        "Draw pictures to see they're equal",
                    ],
                ),
            ],
            shared_quiz: vec![
                Question::new(
                    "If you eat 2 slices out of 8 pizza slices, what fraction did you eat?",
                    ["1/4", "2/8", "1/2", "3/4"],
                    1,
                    "Great! 2 out of 8 slices is 2/8. You can also say 1/4 since 2/8 = 1/4!",
                ),
                Question::new(
                    "Which fraction is bigger: 1/2 or 1/4?",
                    ["1/4", "1/2", "They're the same", "Can't tell"],
                    1,
                    "Excellent! 1/2 means half, while 1/4 means one quarter. Half is bigger than a quarter!",
                ),
                Question::new(
                    "If you drink 3/4 of your juice, how much is left?",
                    ["1/4", "1/2", "3/4", "Nothing"],
                    0,
                    "Perfect! If you drink 3/4, then 1/4 is left. Together they make the whole: 3/4 + 1/4 = 4/4 = 1 whole!",
                ),
            ],
            shared_examples: vec![
                "• If you have 8 crayons and use 3, you used 3/8 of them".to_string(),
                "• If you read 5 pages out of a 10-page book, you read 5/10 = 1/2".to_string(),
                "• If you eat 1 out of 3 cookies, you ate 1/3 of the cookies".to_string(),
            ],
        }
    }
}

fn builtin_lesson(
    id: &str,
    title: &str,
    description: &str,
    full_text: &str,
    simplified_text: &str,
    hints: &[&str],
) -> Lesson {
    Lesson {
        id: id.to_string(),
        title: title.to_string(),
        description: description.to_string(),
        category: "Mathematics".to_string(),
        full_text: full_text.to_string(),
        simplified_text: simplified_text.to_string(),
        hints: hints.iter().map(ToString::to_string).collect(),
        extra_examples: Vec::new(),
        quiz: Vec::new(),
        initial_progress: Progress::ZERO,
    }
}

impl LessonProvider for LessonCatalog {
    fn lesson(&self, lesson_id: &str) -> Result<Lesson> {
        let lesson = self
            .get(lesson_id)
            .ok_or_else(|| EngineError::unknown_lesson(lesson_id))?;

        let mut resolved = lesson.clone();
        resolved.quiz = self.quiz_for(lesson).to_vec();
        resolved.extra_examples = self.examples_for(lesson).to_vec();
        Ok(resolved)
    }
}
