//! Practice Session Reports
//!
//! This crate turns a graded practice set into a [`SessionRecord`] that can be
//! handed to a persistence store, serialized to JSON, or rendered as a
//! Markdown review for the learner.
//!
//! # Types
//!
//! - [`SessionRecord`] - A completed practice session with its graded questions
//! - [`SessionScore`] - The two tallies of a session, kept apart
//! - [`SessionStore`] - Where finished sessions are handed off
//!
//! # Generators
//!
//! - [`json::JsonGenerator`] - Generate JSON with compact or pretty formatting
//! - [`MarkdownGenerator`] - Generate a human-readable session review
//!
//! # Example
//!
//! ```rust
//! use practice_core::{Answer, AnswerOption, GradedQuestion, Question};
//! use practice_report::SessionRecord;
//! use practice_report::json::JsonGenerator;
//!
//! let question = Question::multiple_choice(
//!     "q1",
//!     "What is 2+2?",
//!     vec![AnswerOption::new("A", "3"), AnswerOption::new("B", "4")],
//!     "B",
//! );
//! let graded = GradedQuestion::new(question, Some(Answer::selected("B")), true, "Two plus two is four.");
//!
//! let record = SessionRecord::builder()
//!     .course("ap-calculus-ab")
//!     .graded_question(graded)
//!     .build()
//!     .unwrap();
//! assert_eq!(record.score.correct, 1);
//!
//! let json = JsonGenerator::new(&record).generate_pretty().unwrap();
//! assert!(json.contains("\"sessionId\""));
//! ```

pub mod json;
mod markdown;
mod store;

pub use markdown::MarkdownGenerator;
pub use store::{JsonFileStore, SessionStore};

use chrono::{DateTime, Utc};
use practice_core::{Difficulty, GradedBatch, GradedQuestion, QuestionKind, ScoreTally};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while building, rendering, or storing reports.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Failed to serialize the record to JSON.
    #[error("failed to serialize session record: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to read or write report files.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid record data.
    #[error("invalid session data: {0}")]
    InvalidData(String),
}

/// Result type for report operations.
pub type Result<T> = std::result::Result<T, ReportError>;

// ============================================================================
// SessionScore
// ============================================================================

/// Scores of a practice session.
///
/// Multiple-choice correctness and rubric points are separate scoring
/// systems and are never combined here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionScore {
    /// Correct multiple-choice answers.
    pub correct: u32,
    /// Multiple-choice questions in the session.
    pub multiple_choice_count: u32,
    /// Points earned on rubric-graded questions.
    pub points_earned: u32,
    /// Points available on rubric-graded questions.
    pub points_possible: u32,
}

impl SessionScore {
    /// Tallies a slice of graded questions.
    #[must_use]
    pub fn from_graded(graded: &[GradedQuestion]) -> Self {
        ScoreTally::of(graded).into()
    }

    /// Share of multiple-choice questions answered correctly, in percent.
    ///
    /// Returns `None` when the session has no multiple-choice questions.
    #[must_use]
    pub fn percent_correct(&self) -> Option<f64> {
        (self.multiple_choice_count > 0)
            .then(|| f64::from(self.correct) * 100.0 / f64::from(self.multiple_choice_count))
    }

    /// Share of rubric points earned, in percent.
    ///
    /// Returns `None` when no rubric points were available.
    #[must_use]
    pub fn percent_points(&self) -> Option<f64> {
        (self.points_possible > 0)
            .then(|| f64::from(self.points_earned) * 100.0 / f64::from(self.points_possible))
    }
}

impl From<ScoreTally> for SessionScore {
    fn from(tally: ScoreTally) -> Self {
        Self {
            correct: tally.correct,
            multiple_choice_count: tally.multiple_choice_count,
            points_earned: tally.points_earned,
            points_possible: tally.points_possible,
        }
    }
}

// ============================================================================
// SessionRecord
// ============================================================================

/// A completed practice session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    /// Identifier, also used as the stored file name.
    pub session_id: String,

    /// Course id.
    pub course: String,

    /// Unit ids the session covered.
    #[serde(default)]
    pub units: Vec<String>,

    /// Difficulty tier.
    #[serde(default)]
    pub difficulty: Difficulty,

    /// Question type of the set, when uniform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_type: Option<QuestionKind>,

    /// Graded questions, in presentation order.
    pub graded_questions: Vec<GradedQuestion>,

    /// Tallies over `graded_questions`.
    pub score: SessionScore,

    /// When the learner started.
    pub started_at: DateTime<Utc>,

    /// When grading finished.
    pub completed_at: DateTime<Utc>,

    /// Seconds between start and completion.
    pub duration_seconds: u64,
}

impl SessionRecord {
    /// Creates a new record builder.
    #[must_use]
    pub fn builder() -> SessionRecordBuilder {
        SessionRecordBuilder::default()
    }

    /// Serializes the record to JSON.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::Serialization` if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(ReportError::from)
    }

    /// Number of questions the learner left unanswered.
    #[must_use]
    pub fn unanswered_count(&self) -> usize {
        self.graded_questions
            .iter()
            .filter(|q| q.user_answer.as_ref().map_or(true, practice_core::Answer::is_empty))
            .count()
    }
}

/// Builder for constructing [`SessionRecord`] instances.
#[derive(Debug, Default)]
pub struct SessionRecordBuilder {
    session_id: Option<String>,
    course: Option<String>,
    units: Vec<String>,
    difficulty: Difficulty,
    test_type: Option<QuestionKind>,
    graded_questions: Vec<GradedQuestion>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl SessionRecordBuilder {
    /// Sets an explicit session id.
    #[must_use]
    pub fn session_id(mut self, id: impl Into<String>) -> Self {
        self.session_id = Some(id.into());
        self
    }

    /// Sets the course id.
    #[must_use]
    pub fn course(mut self, course: impl Into<String>) -> Self {
        self.course = Some(course.into());
        self
    }

    /// Sets the unit ids.
    #[must_use]
    pub fn units(mut self, units: Vec<String>) -> Self {
        self.units = units;
        self
    }

    /// Sets the difficulty.
    #[must_use]
    pub const fn difficulty(mut self, difficulty: Difficulty) -> Self {
        self.difficulty = difficulty;
        self
    }

    /// Sets the question type of the set.
    #[must_use]
    pub const fn test_type(mut self, kind: QuestionKind) -> Self {
        self.test_type = Some(kind);
        self
    }

    /// Adds a graded question.
    #[must_use]
    pub fn graded_question(mut self, graded: GradedQuestion) -> Self {
        self.graded_questions.push(graded);
        self
    }

    /// Sets all graded questions from a graded batch.
    #[must_use]
    pub fn batch(mut self, batch: GradedBatch) -> Self {
        self.graded_questions = batch.graded_questions;
        self
    }

    /// Sets the start time.
    #[must_use]
    pub const fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    /// Sets the completion time.
    #[must_use]
    pub const fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    /// Builds the record.
    ///
    /// The completion time defaults to now and the start time to the
    /// completion time. Without an explicit id, one is derived from the course
    /// and completion time.
    ///
    /// # Errors
    ///
    /// Returns `ReportError::InvalidData` if the course is missing, or the
    /// session ends before it starts.
    pub fn build(self) -> Result<SessionRecord> {
        let course = self
            .course
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| ReportError::InvalidData("course is required".to_string()))?;

        let completed_at = self.completed_at.unwrap_or_else(Utc::now);
        let started_at = self.started_at.unwrap_or(completed_at);
        if started_at > completed_at {
            return Err(ReportError::InvalidData(
                "session cannot complete before it starts".to_string(),
            ));
        }
        let duration_seconds =
            u64::try_from((completed_at - started_at).num_seconds()).unwrap_or_default();

        let session_id = self.session_id.unwrap_or_else(|| {
            format!("{course}-{}", completed_at.format("%Y%m%dT%H%M%S%6f"))
        });

        Ok(SessionRecord {
            score: SessionScore::from_graded(&self.graded_questions),
            session_id,
            course,
            units: self.units,
            difficulty: self.difficulty,
            test_type: self.test_type,
            graded_questions: self.graded_questions,
            started_at,
            completed_at,
            duration_seconds,
        })
    }
}

// ============================================================================
// Tests
// ============================================================================
