//! Error types for the EmoTeach adaptation engine.
//!
//! This module defines the error hierarchy for engine operations, including
//! configuration loading, lesson catalog parsing, camera acquisition,
//! classification and quiz interaction.

use std::path::PathBuf;

/// A specialized `Result` type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while running an adaptive lesson.
///
/// Variants are grouped by subsystem and carry actionable suggestions
/// where the user can do something about them. None of them is fatal to a
/// running session: the worst outcome is that adaptation stays in its
/// current mode.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Invalid JSON syntax in the configuration file.
    #[error("Invalid JSON in config file '{path}': {message}\n\nSuggestion: Validate your emoteach.json with a JSON linter")]
    ConfigParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// Configuration validation failed.
    #[error("Invalid configuration: {message}\n\nSuggestion: {suggestion}")]
    ConfigValidationError {
        /// Description of the validation failure.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    // ========================================================================
    // Lesson Catalog Errors
    // ========================================================================
    /// Lesson catalog file was not found.
    #[error("Lesson catalog not found: '{path}'\n\nSuggestion: Check the 'lessons' field in emoteach.json or omit it to use the built-in lessons")]
    CatalogNotFound {
        /// Path where the catalog was expected.
        path: PathBuf,
    },

    /// Lesson catalog exceeds the size limit.
    #[error("Lesson catalog exceeds size limit (512KB): '{path}' is {size_kb}KB\n\nSuggestion: Split the catalog into smaller files")]
    CatalogTooLarge {
        /// Path to the oversized catalog.
        path: PathBuf,
        /// Actual size in kilobytes.
        size_kb: u64,
    },

    /// Lesson catalog contains non-UTF-8 content.
    #[error("Lesson catalog has invalid encoding: '{path}'\n\nSuggestion: Convert the file to UTF-8 encoding")]
    CatalogEncodingError {
        /// Path to the catalog with encoding issues.
        path: PathBuf,
    },

    /// Lesson catalog is not valid JSON or does not match the schema.
    #[error("Invalid lesson catalog '{path}': {message}")]
    CatalogParseError {
        /// Path to the catalog.
        path: PathBuf,
        /// Description of the parse error.
        message: String,
    },

    /// A lesson failed validation.
    #[error("Invalid lesson '{lesson_id}': {message}")]
    InvalidLesson {
        /// Identifier of the offending lesson.
        lesson_id: String,
        /// What is wrong with it.
        message: String,
    },

    /// The requested lesson does not exist in the catalog.
    #[error("Unknown lesson '{lesson_id}'\n\nSuggestion: Run 'emoteach lessons' to list available lesson ids")]
    UnknownLesson {
        /// The id that was requested.
        lesson_id: String,
    },

    /// A quiz question sequence failed validation.
    #[error("Invalid quiz: {message}")]
    InvalidQuiz {
        /// What is wrong with the quiz.
        message: String,
    },

    // ========================================================================
    // Camera & Classifier Errors
    // ========================================================================
    /// The video source could not be acquired.
    #[error("Camera unavailable ({kind}): {message}\n\nSuggestion: {suggestion}")]
    CameraUnavailable {
        /// The kind of acquisition failure.
        kind: AcquisitionErrorKind,
        /// Detailed message from the capture layer.
        message: String,
        /// Actionable suggestion for the user.
        suggestion: String,
    },

    /// The classifier has not finished loading its model.
    #[error("Classifier is not ready")]
    ClassifierNotReady,

    /// The classifier failed on a single frame.
    #[error("Classification failed: {message}")]
    ClassificationFailed {
        /// Description of the failure.
        message: String,
    },

    // ========================================================================
    // Interaction Errors
    // ========================================================================
    /// A quiz action was attempted in a state that does not accept it.
    #[error("Quiz action '{action}' rejected: {reason}")]
    InvalidQuizAction {
        /// The rejected action.
        action: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A lesson action is not available in the current session state.
    #[error("Action '{action}' unavailable: {reason}")]
    ActionUnavailable {
        /// The rejected action.
        action: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The engine task is no longer running.
    #[error("Engine is not running")]
    EngineStopped,

    // ========================================================================
    // Script Errors
    // ========================================================================
    /// A session script is malformed.
    #[error("Invalid session script '{path}': {message}")]
    ScriptParseError {
        /// Path to the script.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    // ========================================================================
    // General I/O Errors
    // ========================================================================
    /// General I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Categories of camera acquisition failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionErrorKind {
    /// The user or the platform denied camera access.
    PermissionDenied,
    /// No camera device was found.
    NotFound,
    /// The camera is in use by another application.
    InUse,
    /// The requested resolution or device constraints are not supported.
    UnsupportedConstraints,
    /// Other unclassified failures.
    Other,
}

impl std::fmt::Display for AcquisitionErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PermissionDenied => write!(f, "permission_denied"),
            Self::NotFound => write!(f, "not_found"),
            Self::InUse => write!(f, "in_use"),
            Self::UnsupportedConstraints => write!(f, "unsupported_constraints"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl AcquisitionErrorKind {
    /// Returns a suggestion message for this failure kind.
    #[must_use]
    pub const fn suggestion(&self) -> &'static str {
        match self {
            Self::PermissionDenied => "Allow camera access for this application and try again",
            Self::NotFound => "Connect a camera and refresh the device list",
            Self::InUse => "Close other applications that are using the camera",
            Self::UnsupportedConstraints => "Select a different camera or a lower resolution",
            Self::Other => "Check the camera connection and try again",
        }
    }
}

impl EngineError {
    /// Creates a new `ConfigParseError` with the given path and message.
    #[must_use]
    pub fn config_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `ConfigValidationError` with the given message and suggestion.
    #[must_use]
    pub fn config_validation(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConfigValidationError {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Creates a new `CatalogNotFound` error.
    #[must_use]
    pub fn catalog_not_found(path: impl Into<PathBuf>) -> Self {
        Self::CatalogNotFound { path: path.into() }
    }

    /// Creates a new `CatalogTooLarge` error.
    #[must_use]
    pub fn catalog_too_large(path: impl Into<PathBuf>, size_kb: u64) -> Self {
        Self::CatalogTooLarge {
            path: path.into(),
            size_kb,
        }
    }

    /// Creates a new `CatalogEncodingError`.
    #[must_use]
    pub fn catalog_encoding(path: impl Into<PathBuf>) -> Self {
        Self::CatalogEncodingError { path: path.into() }
    }

    /// Creates a new `CatalogParseError`.
    #[must_use]
    pub fn catalog_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::CatalogParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Creates a new `InvalidLesson` error.
    #[must_use]
    pub fn invalid_lesson(lesson_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidLesson {
            lesson_id: lesson_id.into(),
            message: message.into(),
        }
    }

    /// Creates a new `UnknownLesson` error.
    #[must_use]
    pub fn unknown_lesson(lesson_id: impl Into<String>) -> Self {
        Self::UnknownLesson {
            lesson_id: lesson_id.into(),
        }
    }

    /// Creates a new `InvalidQuiz` error.
    #[must_use]
    pub fn invalid_quiz(message: impl Into<String>) -> Self {
        Self::InvalidQuiz {
            message: message.into(),
        }
    }

    /// Creates a new `CameraUnavailable` error with a suggestion based on the kind.
    #[must_use]
    pub fn camera_unavailable(kind: AcquisitionErrorKind, message: impl Into<String>) -> Self {
        Self::CameraUnavailable {
            kind,
            message: message.into(),
            suggestion: kind.suggestion().to_string(),
        }
    }

    /// Creates a new `ClassificationFailed` error.
    #[must_use]
    pub fn classification_failed(message: impl Into<String>) -> Self {
        Self::ClassificationFailed {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidQuizAction` error.
    #[must_use]
    pub fn invalid_quiz_action(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidQuizAction {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `ActionUnavailable` error.
    #[must_use]
    pub fn action_unavailable(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ActionUnavailable {
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new `ScriptParseError`.
    #[must_use]
    pub fn script_parse(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ScriptParseError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Returns `true` if this error only affects the current sampling tick.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ClassifierNotReady | Self::ClassificationFailed { .. }
        )
    }

    /// Returns `true` if this error prevents a session from being set up.
    ///
    /// Errors raised while a session is running (rejected quiz actions,
    /// classification failures, camera loss) are never fatal.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ConfigParseError { .. }
                | Self::ConfigValidationError { .. }
                | Self::CatalogNotFound { .. }
                | Self::CatalogTooLarge { .. }
                | Self::CatalogEncodingError { .. }
                | Self::CatalogParseError { .. }
                | Self::InvalidLesson { .. }
                | Self::UnknownLesson { .. }
                | Self::InvalidQuiz { .. }
                | Self::ScriptParseError { .. }
        )
    }
}
