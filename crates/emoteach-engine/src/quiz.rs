//! Quiz sub-engine.
//!
//! A [`QuizSession`] walks a validated question sequence through
//! `answering(i) → revealed(i) → answering(i+1) → … → completed`. Answers are
//! immutable once revealed, and invalid actions are rejected without touching
//! the session.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Minimum number of questions in a quiz.
pub const MIN_QUESTIONS: usize = 3;

/// Minimum number of options per question.
pub const MIN_OPTIONS: usize = 2;

// ============================================================================
// Question
// ============================================================================

/// A multiple-choice question with exactly one correct option.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    /// The question text.
    pub prompt: String,
    /// Answer options, in display order.
    pub options: Vec<String>,
    /// Index of the correct option.
    pub correct_option_index: usize,
    /// Explanation shown once the answer is revealed.
    pub explanation: String,
}

impl Question {
    /// Creates a new question.
    #[must_use]
    pub fn new(
        prompt: impl Into<String>,
        options: impl IntoIterator<Item = impl Into<String>>,
        correct_option_index: usize,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            options: options.into_iter().map(Into::into).collect(),
            correct_option_index,
            explanation: explanation.into(),
        }
    }

    /// Returns `true` if `option` is the correct answer.
    #[must_use]
    pub const fn is_correct(&self, option: usize) -> bool {
        option == self.correct_option_index
    }

    fn validate(&self, position: usize) -> Result<()> {
        let number = position + 1;
        if self.prompt.trim().is_empty() {
            return Err(EngineError::invalid_quiz(format!(
                "question {number} has an empty prompt"
            )));
        }
        if self.options.len() < MIN_OPTIONS {
            return Err(EngineError::invalid_quiz(format!(
                "question {number} needs at least {MIN_OPTIONS} options, found {}",
                self.options.len()
            )));
        }
        if self.correct_option_index >= self.options.len() {
            return Err(EngineError::invalid_quiz(format!(
                "question {number} marks option {} as correct but only has {} options",
                self.correct_option_index,
                self.options.len()
            )));
        }
        Ok(())
    }
}

/// Checks that a question sequence can be used as a quiz.
///
/// # Errors
///
/// Returns `EngineError::InvalidQuiz` if there are fewer than
/// [`MIN_QUESTIONS`] questions, or if any question has an empty prompt, fewer
/// than [`MIN_OPTIONS`] options or an out-of-range correct index.
pub fn validate_questions(questions: &[Question]) -> Result<()> {
    if questions.len() < MIN_QUESTIONS {
        return Err(EngineError::invalid_quiz(format!(
            "a quiz needs at least {MIN_QUESTIONS} questions, found {}",
            questions.len()
        )));
    }
    questions
        .iter()
        .enumerate()
        .try_for_each(|(position, question)| question.validate(position))
}

// ============================================================================
// Session
// ============================================================================

/// Phase of the current question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuizPhase {
    /// Waiting for an answer to the current question.
    #[default]
    Answering,
    /// The answer to the current question is shown.
    Revealed,
    /// The last answer was acknowledged.
    Completed,
}

/// Feedback for a submitted answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerFeedback {
    /// Zero-based index of the answered question.
    pub question_index: usize,
    /// The selected option.
    pub selected: usize,
    /// Whether the selection was correct.
    pub correct: bool,
    /// The correct option.
    pub correct_option_index: usize,
    /// Explanation of the correct answer.
    pub explanation: String,
    /// Score after this answer.
    pub score: usize,
}

/// Final result of a completed quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizOutcome {
    /// Correct answers.
    pub score: usize,
    /// Number of questions.
    pub total: usize,
}

impl QuizOutcome {
    /// Returns the completion message shown to the learner.
    ///
    /// # Examples
    ///
    /// ```
    /// use emoteach_engine::QuizOutcome;
    ///
    /// let outcome = QuizOutcome { score: 2, total: 3 };
    /// assert_eq!(outcome.summary(), "Quiz completed! You got 2 out of 3 correct!");
    /// ```
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Quiz completed! You got {} out of {} correct!",
            self.score, self.total
        )
    }
}

/// Result of [`QuizSession::advance`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuizStep {
    /// Moved on to the question at this index.
    Next(usize),
    /// The quiz is over.
    Completed(QuizOutcome),
}

/// A running quiz.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSession {
    questions: Vec<Question>,
    index: usize,
    score: usize,
    selected_answer: Option<usize>,
    phase: QuizPhase,
}

impl QuizSession {
    /// Starts a fresh session at the first question with a zero score.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidQuiz` if the questions fail
    /// [`validate_questions`].
    pub fn new(questions: Vec<Question>) -> Result<Self> {
        validate_questions(&questions)?;
        Ok(Self {
            questions,
            index: 0,
            score: 0,
            selected_answer: None,
            phase: QuizPhase::Answering,
        })
    }

    /// All questions of the session.
    #[must_use]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// The current question.
    #[must_use]
    pub fn current_question(&self) -> &Question {
        // index is kept in range by construction and advance()
        &self.questions[self.index]
    }

    /// Zero-based index of the current question.
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    /// Number of questions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Always `false`: a session holds at least [`MIN_QUESTIONS`] questions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    /// Correct answers so far.
    #[must_use]
    pub const fn score(&self) -> usize {
        self.score
    }

    /// The option selected for the current question, once revealed.
    #[must_use]
    pub const fn selected_answer(&self) -> Option<usize> {
        self.selected_answer
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> QuizPhase {
        self.phase
    }

    /// Returns `true` while the answer to the current question is shown.
    #[must_use]
    pub const fn answer_revealed(&self) -> bool {
        matches!(self.phase, QuizPhase::Revealed | QuizPhase::Completed)
    }

    /// Returns `true` when the current question is the last one.
    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.index + 1 == self.questions.len()
    }

    /// Returns `true` once the last answer has been acknowledged.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self.phase, QuizPhase::Completed)
    }

    /// Number of questions answered so far.
    #[must_use]
    pub const fn answered(&self) -> usize {
        if self.answer_revealed() {
            self.index + 1
        } else {
            self.index
        }
    }

    /// Submits an answer to the current question.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidQuizAction` if the answer to the current
    /// question is already revealed, the quiz is completed, or `option` is out
    /// of range. The session is unchanged in every error case.
    pub fn submit_answer(&mut self, option: usize) -> Result<AnswerFeedback> {
        match self.phase {
            QuizPhase::Answering => {}
            QuizPhase::Revealed => {
                return Err(EngineError::invalid_quiz_action(
                    "submit_answer",
                    "the answer to this question is already revealed",
                ));
            }
            QuizPhase::Completed => {
                return Err(EngineError::invalid_quiz_action(
                    "submit_answer",
                    "the quiz is already completed",
                ));
            }
        }

        let index = self.index;
        let question = &self.questions[index];
        if option >= question.options.len() {
            return Err(EngineError::invalid_quiz_action(
                "submit_answer",
                format!(
                    "option {option} does not exist (question has {} options)",
                    question.options.len()
                ),
            ));
        }

        let correct = question.is_correct(option);
        let correct_option_index = question.correct_option_index;
        let explanation = question.explanation.clone();

        if correct {
            self.score += 1;
        }
        self.selected_answer = Some(option);
        self.phase = QuizPhase::Revealed;

        Ok(AnswerFeedback {
            question_index: index,
            selected: option,
            correct,
            correct_option_index,
            explanation,
            score: self.score,
        })
    }

    /// Moves past a revealed answer.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidQuizAction` unless the current answer is
    /// revealed. The session is unchanged in that case.
    pub fn advance(&mut self) -> Result<QuizStep> {
        match self.phase {
            QuizPhase::Revealed => {}
            QuizPhase::Answering => {
                return Err(EngineError::invalid_quiz_action(
                    "advance",
                    "the current question has not been answered",
                ));
            }
            QuizPhase::Completed => {
                return Err(EngineError::invalid_quiz_action(
                    "advance",
                    "the quiz is already completed",
                ));
            }
        }

        if self.is_last_question() {
            self.phase = QuizPhase::Completed;
            return Ok(QuizStep::Completed(self.outcome()));
        }

        self.index += 1;
        self.selected_answer = None;
        self.phase = QuizPhase::Answering;
        Ok(QuizStep::Next(self.index))
    }

    /// Abandons the session. Returns how many questions had been answered.
    pub fn exit(self) -> usize {
        self.answered()
    }

    /// Score and total as they stand.
    #[must_use]
    pub fn outcome(&self) -> QuizOutcome {
        QuizOutcome {
            score: self.score,
            total: self.questions.len(),
        }
    }
}
