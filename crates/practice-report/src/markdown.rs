//! Markdown review of a practice session.
//!
//! [`MarkdownGenerator`] converts a [`SessionRecord`] into a document the
//! learner can read back:
//!
//! - A summary table with both scores
//! - Every question with the learner's answer, the grade, the explanation
//!   and any feedback
//!
//! # Example
//!
//! ```rust
//! use practice_report::{MarkdownGenerator, SessionRecord};
//!
//! let record = SessionRecord::builder().course("ap-biology").build().unwrap();
//! let markdown = MarkdownGenerator::new(&record).generate();
//! assert!(markdown.contains("# Practice Session Review: AP Biology"));
//! ```

use std::fmt::Write;

use chrono::{DateTime, Utc};
use practice_core::{Curriculum, GradedQuestion, QuestionBody};

use crate::SessionRecord;

/// Generates Markdown reviews from session records.
pub struct MarkdownGenerator<'a> {
    record: &'a SessionRecord,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given record.
    #[must_use]
    pub const fn new(record: &'a SessionRecord) -> Self {
        Self { record }
    }

    /// Generates the complete review.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_questions(&mut output);
        self.write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Practice Session Review: {}\n",
            escape_markdown(course_title(&self.record.course))
        );
    }

    fn write_summary(&self, output: &mut String) {
        let record = self.record;
        let score = &record.score;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(output, "| Course | {} |", escape_markdown(&record.course));
        if !record.units.is_empty() {
            let _ = writeln!(
                output,
                "| Units | {} |",
                escape_markdown(&record.units.join(", "))
            );
        }
        let _ = writeln!(output, "| Difficulty | {} |", record.difficulty);
        let _ = writeln!(output, "| Questions | {} |", record.graded_questions.len());
        if let Some(percent) = score.percent_correct() {
            let _ = writeln!(
                output,
                "| Multiple Choice | {} of {} correct ({percent:.0}%) |",
                score.correct, score.multiple_choice_count
            );
        }
        if let Some(percent) = score.percent_points() {
            let _ = writeln!(
                output,
                "| Rubric Points | {} of {} ({percent:.0}%) |",
                score.points_earned, score.points_possible
            );
        }
        let unanswered = record.unanswered_count();
        if unanswered > 0 {
            let _ = writeln!(output, "| Unanswered | {unanswered} |");
        }
        let _ = writeln!(
            output,
            "| Duration | {} |",
            format_duration(record.duration_seconds)
        );
        let _ = writeln!(output);
    }

    fn write_questions(&self, output: &mut String) {
        let _ = writeln!(output, "## Questions\n");

        if self.record.graded_questions.is_empty() {
            let _ = writeln!(output, "No questions were graded in this session.\n");
            return;
        }

        for (i, graded) in self.record.graded_questions.iter().enumerate() {
            write_question(output, i + 1, graded);
        }
    }

    fn write_footer(&self, output: &mut String) {
        let _ = writeln!(output, "---");
        let _ = writeln!(
            output,
            "*Session {} completed {}*",
            self.record.session_id,
            format_timestamp(&self.record.completed_at)
        );
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn write_question(output: &mut String, number: usize, graded: &GradedQuestion) {
    let question = &graded.question;
    let _ = writeln!(
        output,
        "### Question {number}: {} {}\n",
        grade_icon(graded),
        grade_label(graded)
    );
    let _ = writeln!(output, "{}\n", question.content.trim());

    match &question.body {
        QuestionBody::MultipleChoice {
            options,
            correct_answer,
        } => {
            for option in options {
                let is_key = practice_core::question::labels_match(&option.label, correct_answer);
                if is_key {
                    let _ = writeln!(output, "- **{}. {}** (correct)", option.label, option.text);
                } else {
                    let _ = writeln!(output, "- {}. {}", option.label, option.text);
                }
            }
            let _ = writeln!(output);
        }
        QuestionBody::DocumentBased { documents, .. } => {
            let titles: Vec<String> = documents
                .iter()
                .enumerate()
                .map(|(i, d)| {
                    if d.title.trim().is_empty() {
                        format!("Document {}", i + 1)
                    } else {
                        format!("Document {}: {}", i + 1, d.title.trim())
                    }
                })
                .collect();
            let _ = writeln!(output, "**Documents**: {}\n", titles.join("; "));
        }
        QuestionBody::FreeResponse { .. } => {}
    }

    let answer = graded
        .user_answer
        .as_ref()
        .and_then(practice_core::Answer::response)
        .unwrap_or("*(no answer)*");
    let _ = writeln!(output, "**Your answer**: {answer}\n");
    let _ = writeln!(output, "**Explanation**: {}\n", graded.explanation.trim());
    if let Some(feedback) = graded.feedback.as_deref() {
        let _ = writeln!(output, "**Feedback**: {}\n", feedback.trim());
    }
}

fn grade_icon(graded: &GradedQuestion) -> &'static str {
    if graded.is_correct {
        "✅"
    } else if graded.score.is_some_and(|s| s > 0) {
        "🟡"
    } else {
        "❌"
    }
}

fn grade_label(graded: &GradedQuestion) -> String {
    match (graded.score, graded.total_points) {
        (Some(score), Some(total)) => format!("{score}/{total} points"),
        _ if graded.is_correct => "Correct".to_string(),
        _ => "Incorrect".to_string(),
    }
}

/// Display title of a course id, or the id itself if unknown.
fn course_title(course: &str) -> &str {
    Curriculum::builtin().course(course).map_or(course, |c| c.title)
}

/// Formats a duration in seconds to a human-readable string.
///
/// Examples: "45s", "5m 30s", "1h 1m 1s"
fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();

    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }

    parts.join(" ")
}

fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes Markdown special characters for table cells and headings.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

// ============================================================================
// Tests
// ============================================================================
