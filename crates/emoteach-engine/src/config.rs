//! Configuration types for the adaptation engine.
//!
//! This module provides the tunables that control sampling cadence,
//! confidence gating, cooldown and progress increments, loaded from an
//! `emoteach.json` file with defaults for every missing key.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "emoteach.json";

/// Default minimum confidence (percent) for a sample to drive adaptation.
const fn default_confidence_threshold() -> u8 {
    60
}

/// Default cooldown between negative-emotion transitions, in milliseconds.
const fn default_cooldown_ms() -> u64 {
    10_000
}

/// Default sampling interval in milliseconds (1 Hz).
const fn default_sampling_interval_ms() -> u64 {
    1_000
}

/// Default confidence above which the emotion indicator shows a label.
const fn default_display_threshold() -> u8 {
    50
}

/// Default progress added by "Mark complete".
const fn default_mark_complete_increment() -> u8 {
    10
}

/// Default progress added by completing a quiz.
const fn default_quiz_completion_increment() -> u8 {
    25
}

/// Default capacity of the engine event channel.
const fn default_event_buffer_size() -> usize {
    100
}

/// Main configuration for the adaptation engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Samples below this confidence (percent) are ignored.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: u8,

    /// Minimum time between two negative-emotion transitions.
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Time between two classifier invocations.
    #[serde(default = "default_sampling_interval_ms")]
    pub sampling_interval_ms: u64,

    /// The emotion indicator only names emotions above this confidence.
    #[serde(default = "default_display_threshold")]
    pub display_threshold: u8,

    /// Progress added by the "Mark complete" action.
    #[serde(default = "default_mark_complete_increment")]
    pub mark_complete_increment: u8,

    /// Progress added when a quiz is completed.
    #[serde(default = "default_quiz_completion_increment")]
    pub quiz_completion_increment: u8,

    /// Capacity of the event broadcast buffer per subscriber.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,

    /// Path to a lesson catalog; the built-in lessons are used when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lessons: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            cooldown_ms: default_cooldown_ms(),
            sampling_interval_ms: default_sampling_interval_ms(),
            display_threshold: default_display_threshold(),
            mark_complete_increment: default_mark_complete_increment(),
            quiz_completion_increment: default_quiz_completion_increment(),
            event_buffer_size: default_event_buffer_size(),
            lessons: None,
        }
    }
}

impl EngineConfig {
    /// Loads configuration from the current working directory.
    ///
    /// Looks for `emoteach.json` in the current directory and falls back to
    /// the defaults when it does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            EngineError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `emoteach.json` in a specific directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but contains invalid JSON.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// If the file does not exist, returns the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ConfigParseError` for unreadable files or invalid
    /// JSON, and `EngineError::ConfigValidationError` for out-of-range values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(EngineError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| EngineError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::ConfigValidationError` if any check fails.
    pub fn validate(&self) -> Result<()> {
        if self.confidence_threshold > 100 {
            return Err(EngineError::config_validation(
                "confidenceThreshold must be between 0 and 100",
                "Set confidenceThreshold to a percentage in your emoteach.json",
            ));
        }

        if self.display_threshold > 100 {
            return Err(EngineError::config_validation(
                "displayThreshold must be between 0 and 100",
                "Set displayThreshold to a percentage in your emoteach.json",
            ));
        }

        if self.sampling_interval_ms == 0 {
            return Err(EngineError::config_validation(
                "samplingIntervalMs must be greater than 0",
                "Set samplingIntervalMs to at least 1 in your emoteach.json (1000 samples once per second)",
            ));
        }

        if self.mark_complete_increment == 0 || self.mark_complete_increment > 100 {
            return Err(EngineError::config_validation(
                "markCompleteIncrement must be between 1 and 100",
                "Set markCompleteIncrement to a positive percentage in your emoteach.json",
            ));
        }

        if self.quiz_completion_increment == 0 || self.quiz_completion_increment > 100 {
            return Err(EngineError::config_validation(
                "quizCompletionIncrement must be between 1 and 100",
                "Set quizCompletionIncrement to a positive percentage in your emoteach.json",
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(EngineError::config_validation(
                "eventBufferSize must be greater than 0",
                "Set eventBufferSize to at least 1 in your emoteach.json",
            ));
        }

        if self
            .lessons
            .as_deref()
            .is_some_and(|path| path.trim().is_empty())
        {
            return Err(EngineError::config_validation(
                "lessons path must not be empty",
                "Provide a valid lesson catalog path in your emoteach.json or remove the field",
            ));
        }

        Ok(())
    }

    /// Returns the cooldown window as a `Duration`.
    #[must_use]
    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// Returns the sampling interval as a `Duration`.
    #[must_use]
    pub const fn sampling_interval(&self) -> Duration {
        Duration::from_millis(self.sampling_interval_ms)
    }
}
