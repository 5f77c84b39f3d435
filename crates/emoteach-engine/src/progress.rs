//! Lesson progress arithmetic and the progress sink.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Lesson progress as a whole percentage in `0..=100`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "u8", into = "u8")]
pub struct Progress(u8);

impl Progress {
    /// No progress.
    pub const ZERO: Self = Self(0);

    /// A finished lesson.
    pub const COMPLETE: Self = Self(100);

    /// Creates a progress value, clamping it to 100.
    #[must_use]
    pub fn new(percent: u8) -> Self {
        Self(percent.min(100))
    }

    /// Returns the percentage.
    #[must_use]
    pub const fn percent(self) -> u8 {
        self.0
    }

    /// Returns `min(self + increment, 100)`.
    ///
    /// # Examples
    ///
    /// ```
    /// use emoteach_engine::Progress;
    ///
    /// assert_eq!(Progress::new(30).advanced_by(25).percent(), 55);
    /// assert_eq!(Progress::new(95).advanced_by(10).percent(), 100);
    /// ```
    #[must_use]
    pub fn advanced_by(self, increment: u8) -> Self {
        Self::new(self.0.saturating_add(increment))
    }

    /// Returns `true` at 100%.
    #[must_use]
    pub const fn is_complete(self) -> bool {
        self.0 >= 100
    }

    /// Coarse stage used by lesson lists.
    #[must_use]
    pub const fn stage(self) -> ProgressStage {
        match self.0 {
            0 => ProgressStage::NotStarted,
            1..=49 => ProgressStage::Started,
            50..=99 => ProgressStage::Advanced,
            _ => ProgressStage::Complete,
        }
    }
}

/// Coarse progress stage of a lesson.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    /// 0%.
    NotStarted,
    /// Below 50%.
    Started,
    /// 50% up to, but excluding, 100%.
    Advanced,
    /// 100%.
    Complete,
}

impl std::fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not started"),
            Self::Started => write!(f, "started"),
            Self::Advanced => write!(f, "advanced"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

impl From<u8> for Progress {
    fn from(percent: u8) -> Self {
        Self::new(percent)
    }
}

impl From<Progress> for u8 {
    fn from(progress: Progress) -> Self {
        progress.0
    }
}

impl std::fmt::Display for Progress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Receives progress updates proposed by a lesson session.
///
/// Reporting is fire-and-forget: the session never waits for, or depends on,
/// what the sink does with the value.
pub trait ProgressSink {
    /// Records the new progress of a lesson.
    fn report_progress(&mut self, lesson_id: &str, progress: Progress);
}

impl<S: ProgressSink + ?Sized> ProgressSink for &mut S {
    fn report_progress(&mut self, lesson_id: &str, progress: Progress) {
        (**self).report_progress(lesson_id, progress);
    }
}

/// In-memory progress table.
///
/// Keeps the highest value ever reported per lesson, so a stale or lower
/// report can never move progress backwards.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressStore {
    lessons: HashMap<String, ProgressRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProgressRecord {
    progress: Progress,
    updated_at: DateTime<Utc>,
}

impl ProgressStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the recorded progress for a lesson, or zero.
    #[must_use]
    pub fn get(&self, lesson_id: &str) -> Progress {
        self.lessons
            .get(lesson_id)
            .map(|record| record.progress)
            .unwrap_or_default()
    }

    /// When the recorded progress of a lesson last increased.
    #[must_use]
    pub fn updated_at(&self, lesson_id: &str) -> Option<DateTime<Utc>> {
        self.lessons.get(lesson_id).map(|record| record.updated_at)
    }

    /// Number of lessons with recorded progress.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lessons.len()
    }

    /// Returns `true` if nothing was reported yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lessons.is_empty()
    }
}

impl ProgressSink for ProgressStore {
    fn report_progress(&mut self, lesson_id: &str, progress: Progress) {
        let current = self.get(lesson_id);
        if progress > current {
            self.lessons.insert(
                lesson_id.to_string(),
                ProgressRecord {
                    progress,
                    updated_at: Utc::now(),
                },
            );
        } else {
            debug!(lesson_id, %progress, %current, "Ignoring non-increasing progress report");
        }
    }
}
