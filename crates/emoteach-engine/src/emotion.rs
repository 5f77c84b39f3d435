//! Emotion vocabulary and per-tick samples.
//!
//! The classifier speaks in free-form labels; this module maps them onto a
//! closed vocabulary and onto the coarse categories the adaptation engine
//! reacts to.

use serde::{Deserialize, Serialize};

/// Emotion label reported by the expression classifier.
///
/// The first seven variants are the classifier vocabulary. `Confused` and
/// `Excited` are only produced by richer classifiers; anything else parses to
/// `Unknown`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmotionLabel {
    /// Happy expression.
    Happy,
    /// Sad expression.
    Sad,
    /// Angry expression.
    Angry,
    /// Fearful expression.
    Fearful,
    /// Disgusted expression.
    Disgusted,
    /// Surprised expression.
    Surprised,
    /// Neutral expression.
    Neutral,
    /// Explicit confusion, from richer classifiers.
    Confused,
    /// Explicit excitement, from richer classifiers.
    Excited,
    /// A label outside the known vocabulary.
    Unknown,
}

/// Coarse grouping of labels that drives mode transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmotionCategory {
    /// Fearful, sad or confused.
    Confused,
    /// Angry or disgusted.
    Frustrated,
    /// Happy, surprised or excited.
    Positive,
    /// Neutral and anything unrecognized.
    Other,
}

impl EmotionCategory {
    /// Returns `true` for the categories that are subject to the cooldown.
    #[must_use]
    pub const fn is_negative(&self) -> bool {
        matches!(self, Self::Confused | Self::Frustrated)
    }
}

impl EmotionLabel {
    /// Parses a raw classifier label, case-insensitively.
    ///
    /// Never fails: unrecognized labels become [`EmotionLabel::Unknown`].
    ///
    /// # Examples
    ///
    /// ```
    /// use emoteach_engine::EmotionLabel;
    ///
    /// assert_eq!(EmotionLabel::from_raw("Happy"), EmotionLabel::Happy);
    /// assert_eq!(EmotionLabel::from_raw(" ANGRY "), EmotionLabel::Angry);
    /// assert_eq!(EmotionLabel::from_raw("bored"), EmotionLabel::Unknown);
    /// ```
    #[must_use]
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "happy" => Self::Happy,
            "sad" => Self::Sad,
            "angry" => Self::Angry,
            "fearful" => Self::Fearful,
            "disgusted" => Self::Disgusted,
            "surprised" => Self::Surprised,
            "neutral" => Self::Neutral,
            "confused" => Self::Confused,
            "excited" => Self::Excited,
            _ => Self::Unknown,
        }
    }

    /// Returns the lowercase label name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Fearful => "fearful",
            Self::Disgusted => "disgusted",
            Self::Surprised => "surprised",
            Self::Neutral => "neutral",
            Self::Confused => "confused",
            Self::Excited => "excited",
            Self::Unknown => "unknown",
        }
    }

    /// Maps the label onto its adaptation category.
    ///
    /// # Examples
    ///
    /// ```
    /// use emoteach_engine::{EmotionCategory, EmotionLabel};
    ///
    /// assert_eq!(EmotionLabel::Fearful.category(), EmotionCategory::Confused);
    /// assert_eq!(EmotionLabel::Disgusted.category(), EmotionCategory::Frustrated);
    /// assert_eq!(EmotionLabel::Surprised.category(), EmotionCategory::Positive);
    /// assert_eq!(EmotionLabel::Neutral.category(), EmotionCategory::Other);
    /// ```
    #[must_use]
    pub const fn category(&self) -> EmotionCategory {
        match self {
            Self::Fearful | Self::Sad | Self::Confused => EmotionCategory::Confused,
            Self::Angry | Self::Disgusted => EmotionCategory::Frustrated,
            Self::Happy | Self::Surprised | Self::Excited => EmotionCategory::Positive,
            Self::Neutral | Self::Unknown => EmotionCategory::Other,
        }
    }

    /// Returns the emoji shown next to the label in the emotion indicator.
    #[must_use]
    pub const fn emoji(&self) -> &'static str {
        match self {
            Self::Happy => "😊",
            Self::Sad => "😢",
            Self::Angry => "😠",
            Self::Fearful => "😨",
            Self::Disgusted => "🤢",
            Self::Surprised => "😲",
            Self::Neutral => "😐",
            Self::Confused | Self::Excited | Self::Unknown => "🤔",
        }
    }
}

impl std::fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EmotionLabel {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(Self::from_raw(&s))
    }
}

impl Serialize for EmotionLabel {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

/// One classifier observation, produced once per sampling tick.
///
/// `label` is `None` when no face was detected; `confidence` is a whole
/// percentage in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmotionSample {
    /// The detected label, or `None` when no face was found.
    pub label: Option<EmotionLabel>,
    /// Confidence of the label in percent.
    pub confidence: u8,
}

impl EmotionSample {
    /// Creates a sample, clamping the confidence to 100.
    #[must_use]
    pub fn new(label: EmotionLabel, confidence: u8) -> Self {
        Self {
            label: Some(label),
            confidence: confidence.min(100),
        }
    }

    /// Creates the sample emitted when no face is detected.
    #[must_use]
    pub const fn no_face() -> Self {
        Self {
            label: None,
            confidence: 0,
        }
    }

    /// Creates a sample from a raw label and a probability in `[0, 1]`.
    ///
    /// The probability is rounded to a whole percentage; out-of-range and
    /// non-finite values are clamped.
    ///
    /// # Examples
    ///
    /// ```
    /// use emoteach_engine::{EmotionLabel, EmotionSample};
    ///
    /// let sample = EmotionSample::from_probability("sad", 0.876);
    /// assert_eq!(sample.label, Some(EmotionLabel::Sad));
    /// assert_eq!(sample.confidence, 88);
    /// ```
    #[must_use]
    pub fn from_probability(raw_label: &str, probability: f32) -> Self {
        Self {
            label: Some(EmotionLabel::from_raw(raw_label)),
            confidence: probability_to_percent(probability),
        }
    }

    /// Returns `true` if a face was detected with at least `threshold` confidence.
    #[must_use]
    pub const fn is_confident(&self, threshold: u8) -> bool {
        self.label.is_some() && self.confidence >= threshold
    }

    /// Returns the category of the label, if any.
    #[must_use]
    pub fn category(&self) -> Option<EmotionCategory> {
        self.label.map(|label| label.category())
    }
}

/// Converts a probability into a whole percentage in `0..=100`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn probability_to_percent(probability: f32) -> u8 {
    if !probability.is_finite() {
        return 0;
    }
    // Clamped to [0, 100] before the cast, so the conversion cannot overflow.
    (probability * 100.0).round().clamp(0.0, 100.0) as u8
}
