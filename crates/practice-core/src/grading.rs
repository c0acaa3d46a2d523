//! Grading dispatcher.
//!
//! Picks a strategy from a question's declared type and always produces a
//! [`GradedQuestion`]:
//!
//! - multiple choice is graded locally; the completion service only writes
//!   the explanation
//! - free-response and document-based answers are graded remotely against
//!   the rubric and documents
//!
//! Remote failures degrade to fixed fallback text and are never surfaced.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::completion::{request_structured, CompletionClient, CompletionRequest};
use crate::config::Config;
use crate::question::{labels_match, Answer, Document, GradedQuestion, Question, QuestionBody};

/// Explanation for an unanswered question.
pub const NO_ANSWER_EXPLANATION: &str = "No answer was provided";
/// Explanation when remote grading fails.
pub const GRADING_ERROR_EXPLANATION: &str = "An error occurred during grading";
/// Feedback when remote grading fails.
pub const GRADING_ERROR_FEEDBACK: &str = "Unable to properly evaluate this response";

/// Upper bound on a point total reported by the grader for a question with no
/// rubric. A rubric's own `maxPoints` is not capped.
pub const MAX_REMOTE_TOTAL_POINTS: u32 = 100;

const EXPLAIN_INSTRUCTIONS: &str = "You explain multiple-choice answers to students. \
The user message is a JSON object with the question, its options, the correct label, the \
student's label and whether the student was correct. Respond with a JSON object \
{\"explanation\": string} explaining why the correct option is right and, if the student \
was wrong, why their choice is not.";

const RUBRIC_INSTRUCTIONS: &str = "You grade written answers to practice questions. \
The user message is a JSON object with the question, an optional rubric, optional source \
documents and the student's answer. Respond with a JSON object {\"isCorrect\": boolean, \
\"score\": number, \"totalPoints\": number, \"explanation\": string, \"feedback\": string}.";

#[derive(Debug, Deserialize)]
struct ExplanationReply {
    explanation: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RubricVerdict {
    #[serde(alias = "is_correct")]
    is_correct: bool,
    #[serde(default)]
    score: Option<f64>,
    #[serde(default, alias = "total_points")]
    total_points: Option<f64>,
    explanation: String,
    #[serde(default)]
    feedback: Option<String>,
}

/// Graded questions of one practice set with their two tallies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedBatch {
    /// Graded questions, in input order.
    pub graded_questions: Vec<GradedQuestion>,
    /// Correct multiple-choice answers.
    pub score: u32,
    /// Points earned on rubric-graded questions.
    pub points_earned: u32,
    /// Points available on rubric-graded questions.
    pub points_possible: u32,
}

impl GradedBatch {
    /// Tallies graded questions without mixing the two scoring systems.
    pub fn from_graded(graded_questions: Vec<GradedQuestion>) -> Self {
        let tally = ScoreTally::of(&graded_questions);
        Self {
            graded_questions,
            score: tally.correct,
            points_earned: tally.points_earned,
            points_possible: tally.points_possible,
        }
    }
}

/// Correct-answer count and rubric points over a set of graded questions.
///
/// Multiple-choice questions count toward `correct`; rubric-graded questions
/// with a point total count toward the points. Sums saturate at `u32::MAX`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreTally {
    /// Correct multiple-choice answers.
    pub correct: u32,
    /// Multiple-choice questions seen.
    pub multiple_choice_count: u32,
    /// Points earned on rubric-graded questions.
    pub points_earned: u32,
    /// Points available on rubric-graded questions.
    pub points_possible: u32,
}

impl ScoreTally {
    /// Tallies `graded`.
    #[must_use]
    pub fn of(graded: &[GradedQuestion]) -> Self {
        graded.iter().fold(Self::default(), |mut tally, graded| {
            if graded.kind().is_rubric_graded() {
                if let Some(total) = graded.total_points {
                    tally.points_earned = tally
                        .points_earned
                        .saturating_add(graded.score.unwrap_or(0));
                    tally.points_possible = tally.points_possible.saturating_add(total);
                }
            } else {
                tally.multiple_choice_count = tally.multiple_choice_count.saturating_add(1);
                if graded.is_correct {
                    tally.correct = tally.correct.saturating_add(1);
                }
            }
            tally
        })
    }
}

/// Routes each question to its grading strategy.
#[derive(Clone)]
pub struct GradingDispatcher {
    client: Arc<dyn CompletionClient>,
    timeout: Duration,
    temperature: f32,
}

impl std::fmt::Debug for GradingDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GradingDispatcher")
            .field("timeout", &self.timeout)
            .field("temperature", &self.temperature)
            .finish_non_exhaustive()
    }
}

impl GradingDispatcher {
    /// Creates a dispatcher from configuration.
    pub fn new(client: Arc<dyn CompletionClient>, config: &Config) -> Self {
        Self {
            client,
            timeout: config.grading.timeout(),
            temperature: config.completion.grading_temperature,
        }
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Grades one question. Never fails.
    pub async fn grade(&self, question: &Question, answer: Option<&Answer>) -> GradedQuestion {
        let Some(response) = answer.and_then(Answer::response) else {
            debug!(question = %question.id, "No answer provided");
            return no_answer(question, answer);
        };

        match &question.body {
            QuestionBody::MultipleChoice { correct_answer, .. } => {
                let is_correct = labels_match(response, correct_answer);
                let explanation = self.explain_choice(question, response, is_correct).await;
                GradedQuestion::new(question.clone(), answer.cloned(), is_correct, explanation)
            }
            QuestionBody::FreeResponse { .. } | QuestionBody::DocumentBased { .. } => {
                self.grade_with_rubric(question, answer.cloned(), response).await
            }
        }
    }

    /// Grades every question concurrently, pairing answers by index.
    ///
    /// A missing answer entry counts as no answer.
    pub async fn grade_batch(&self, questions: &[Question], answers: &[Option<Answer>]) -> GradedBatch {
        let graded = join_all(
            questions
                .iter()
                .enumerate()
                .map(|(i, q)| self.grade(q, answers.get(i).and_then(Option::as_ref))),
        )
        .await;

        let batch = GradedBatch::from_graded(graded);
        info!(
            questions = questions.len(),
            score = batch.score,
            points_earned = batch.points_earned,
            points_possible = batch.points_possible,
            "Graded batch"
        );
        batch
    }

    /// Explanation text for a locally graded choice.
    ///
    /// `is_correct` is only reported to the service, never taken from it.
    async fn explain_choice(&self, question: &Question, selected: &str, is_correct: bool) -> String {
        let QuestionBody::MultipleChoice {
            options,
            correct_answer,
        } = &question.body
        else {
            return String::new();
        };

        let payload = json!({
            "question": question.content,
            "options": options,
            "correctAnswer": correct_answer,
            "selectedAnswer": selected,
            "isCorrect": is_correct,
            "referenceExplanation": question.explanation,
        });
        let request = CompletionRequest::structured(EXPLAIN_INSTRUCTIONS, &payload, self.temperature);

        let reply: Option<ExplanationReply> =
            request_structured(self.client.as_ref(), request, self.timeout, "explain_choice").await;

        reply
            .map(|r| r.explanation.trim().to_string())
            .filter(|e| !e.is_empty())
            .or_else(|| question.answer_key_explanation())
            .unwrap_or_default()
    }

    async fn grade_with_rubric(
        &self,
        question: &Question,
        answer: Option<Answer>,
        response: &str,
    ) -> GradedQuestion {
        let rubric = question.rubric();
        let documents = question.documents();

        let mut payload = json!({
            "questionType": question.kind(),
            "question": question.content,
            "studentAnswer": response,
        });
        if let Some(rubric) = rubric {
            payload["rubric"] = json!(rubric);
        }
        if !documents.is_empty() {
            payload["documents"] = json!(render_documents(documents));
        }

        let request = CompletionRequest::structured(RUBRIC_INSTRUCTIONS, &payload, self.temperature);
        let verdict: Option<RubricVerdict> =
            request_structured(self.client.as_ref(), request, self.timeout, "grade_with_rubric").await;

        let rubric_total = rubric.map(|r| r.max_points);

        let Some(verdict) = verdict else {
            let graded = GradedQuestion::new(
                question.clone(),
                answer,
                false,
                GRADING_ERROR_EXPLANATION,
            )
            .with_feedback(GRADING_ERROR_FEEDBACK);
            return match rubric_total {
                Some(total) => graded.with_points(0, total),
                None => graded,
            };
        };

        let total = rubric_total.or_else(|| {
            verdict
                .total_points
                .map(|t| to_points(t, f64::from(MAX_REMOTE_TOTAL_POINTS)))
        });
        let mut graded = GradedQuestion::new(
            question.clone(),
            answer,
            verdict.is_correct,
            verdict.explanation,
        );
        if let Some(total) = total {
            let score = verdict.score.map_or(0, |s| to_points(s, f64::from(total)));
            graded = graded.with_points(score, total);
        }
        match verdict.feedback.filter(|f| !f.trim().is_empty()) {
            Some(feedback) => graded.with_feedback(feedback),
            None => graded,
        }
    }
}

fn no_answer(question: &Question, answer: Option<&Answer>) -> GradedQuestion {
    let graded = GradedQuestion::new(
        question.clone(),
        answer.filter(|a| !a.is_empty()).cloned(),
        false,
        NO_ANSWER_EXPLANATION,
    );
    match question.rubric() {
        Some(rubric) => graded.with_points(0, rubric.max_points),
        None => graded,
    }
}

/// Renders documents under `Document {n}: {title}` headers.
fn render_documents(documents: &[Document]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| {
            let n = i + 1;
            if doc.title.trim().is_empty() {
                format!("Document {n}\n{}", doc.content)
            } else {
                format!("Document {n}: {}\n{}", doc.title.trim(), doc.content)
            }
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Rounds a reported score into `0..=max`.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_points(value: f64, max: f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    value.round().clamp(0.0, max.min(f64::from(u32::MAX))) as u32
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::completion::testing::{Reply, ScriptedClient};
    use crate::completion::CompletionResponse;
    use crate::error::CompletionError;
    use crate::question::{AnswerOption, Rubric};

    fn dispatcher(client: Arc<dyn CompletionClient>) -> GradingDispatcher {
        GradingDispatcher::new(client, &Config::default()).with_timeout(Duration::from_millis(200))
    }

    fn scripted(reply: Reply) -> (Arc<ScriptedClient>, GradingDispatcher) {
        let client = Arc::new(ScriptedClient::always(reply));
        let dispatcher = dispatcher(client.clone());
        (client, dispatcher)
    }

    fn arithmetic() -> Question {
        Question::multiple_choice(
            "q1",
            "What is 2+2?",
            vec![AnswerOption::new("A", "3"), AnswerOption::new("B", "4")],
            "B",
        )
    }

    fn essay(max_points: u32) -> Question {
        Question::free_response(
            "q2",
            "Explain the chain rule.",
            Some(Rubric {
                max_points,
                criteria: vec!["States the rule".into()],
            }),
        )
    }

    /// Fails any call whose payload mentions `marker`.
    struct FailOnMarker {
        marker: &'static str,
        reply: &'static str,
    }

    #[async_trait]
    impl CompletionClient for FailOnMarker {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, CompletionError> {
            if request.user_payload.contains(self.marker) {
                Err(CompletionError::Network("connection reset".into()))
            } else {
                Ok(CompletionResponse {
                    text: self.reply.to_string(),
                })
            }
        }
    }

    #[tokio::test]
    async fn test_choice_match_ignores_case_and_whitespace() {
        let (client, grader) = scripted(ScriptedClient::text(r#"{"explanation": "Four."}"#));
        let graded = grader.grade(&arithmetic(), Some(&Answer::selected("  b "))).await;

        assert!(graded.is_correct);
        assert_eq!(graded.explanation, "Four.");
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_wrong_choice_with_failed_explanation_uses_answer_key() {
        let (_, grader) = scripted(Reply::Fail(CompletionError::Network("down".into())));
        let graded = grader.grade(&arithmetic(), Some(&Answer::selected("A"))).await;

        assert!(!graded.is_correct);
        assert_eq!(graded.explanation, "The correct answer is B: 4.");
        assert!(graded.question.explanation.is_none());
    }

    #[tokio::test]
    async fn test_remote_reply_cannot_override_correctness() {
        let (client, grader) = scripted(ScriptedClient::text(
            r#"{"explanation": "Correct!", "isCorrect": true}"#,
        ));
        let graded = grader.grade(&arithmetic(), Some(&Answer::selected("A"))).await;
        assert!(!graded.is_correct);

        let sent: serde_json::Value =
            serde_json::from_str(&client.requests()[0].user_payload).unwrap();
        assert_eq!(sent["isCorrect"], false);
        assert_eq!(sent["selectedAnswer"], "A");
    }

    #[tokio::test]
    async fn test_blank_explanation_falls_back() {
        let (_, grader) = scripted(ScriptedClient::text(r#"{"explanation": "   "}"#));
        let graded = grader.grade(&arithmetic(), Some(&Answer::selected("B"))).await;
        assert_eq!(graded.explanation, "The correct answer is B: 4.");
    }

    #[tokio::test]
    async fn test_no_answer_makes_no_remote_call() {
        let (client, grader) = scripted(ScriptedClient::text("{}"));
        let blank = Answer::text("   ");

        for answer in [None, Some(&blank)] {
            let graded = grader.grade(&arithmetic(), answer).await;
            assert!(!graded.is_correct);
            assert_eq!(graded.explanation, NO_ANSWER_EXPLANATION);
            assert!(graded.user_answer.is_none());
        }

        let graded = grader.grade(&essay(6), None).await;
        assert_eq!(graded.score, Some(0));
        assert_eq!(graded.total_points, Some(6));
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_rubric_score_is_rounded_and_clamped() {
        let (_, grader) = scripted(ScriptedClient::text(
            r#"{"isCorrect": true, "score": 7.6, "totalPoints": 10, "explanation": "Good.", "feedback": "Cite an example."}"#,
        ));
        let graded = grader.grade(&essay(10), Some(&Answer::text("f(g(x))' = f'(g(x))g'(x)"))).await;
        assert!(graded.is_correct);
        assert_eq!(graded.score, Some(8));
        assert_eq!(graded.total_points, Some(10));
        assert_eq!(graded.feedback.as_deref(), Some("Cite an example."));

        let (_, grader) = scripted(ScriptedClient::text(
            r#"{"isCorrect": true, "score": 15, "totalPoints": 15, "explanation": "Great."}"#,
        ));
        let graded = grader.grade(&essay(10), Some(&Answer::text("answer"))).await;
        assert_eq!(graded.score, Some(10));
        assert_eq!(graded.total_points, Some(10));
    }

    #[tokio::test]
    async fn test_rubric_failure_degrades_gracefully() {
        for reply in [
            Reply::Fail(CompletionError::api(500, "boom")),
            ScriptedClient::text("I think this answer is pretty good"),
            Reply::Hang(Duration::from_secs(5)),
        ] {
            let (client, grader) = scripted(reply);
            let graded = grader.grade(&essay(4), Some(&Answer::text("answer"))).await;

            assert!(!graded.is_correct);
            assert_eq!(graded.explanation, GRADING_ERROR_EXPLANATION);
            assert_eq!(graded.feedback.as_deref(), Some(GRADING_ERROR_FEEDBACK));
            assert_eq!(graded.score, Some(0));
            assert_eq!(graded.total_points, Some(4));
            assert_eq!(client.calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_documents_are_sent_with_headers() {
        let (client, grader) = scripted(ScriptedClient::text(
            r#"{"isCorrect": false, "score": 1, "totalPoints": 7, "explanation": "Partial."}"#,
        ));
        let question = Question::document_based(
            "q3",
            "Assess the causes of the Civil War.",
            None,
            vec![
                Document {
                    title: "Lincoln, 1858".into(),
                    content: "A house divided...".into(),
                },
                Document {
                    title: String::new(),
                    content: "Census data".into(),
                },
            ],
        );
        let graded = grader.grade(&question, Some(&Answer::text("Slavery."))).await;

        // No rubric, so the grader's total is used.
        assert_eq!(graded.score, Some(1));
        assert_eq!(graded.total_points, Some(7));

        let sent: serde_json::Value =
            serde_json::from_str(&client.requests()[0].user_payload).unwrap();
        let documents = sent["documents"].as_str().unwrap();
        assert!(documents.contains("Document 1: Lincoln, 1858\nA house divided..."));
        assert!(documents.contains("Document 2\nCensus data"));
        assert!(sent.get("rubric").is_none());
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let client: Arc<dyn CompletionClient> = Arc::new(FailOnMarker {
            marker: "photosynthesis",
            reply: r#"{"isCorrect": true, "score": 3, "totalPoints": 3, "explanation": "Yes.", "feedback": "Nice."}"#,
        });
        let grader = dispatcher(client);
        let questions = vec![
            Question::free_response("a", "Describe photosynthesis.", None),
            Question::free_response("b", "Describe osmosis.", None),
            arithmetic(),
        ];
        let answers = vec![
            Some(Answer::text("Light to sugar")),
            Some(Answer::text("Water moves")),
        ];

        let batch = grader.grade_batch(&questions, &answers).await;

        assert_eq!(batch.graded_questions.len(), 3);
        assert_eq!(batch.graded_questions[0].explanation, GRADING_ERROR_EXPLANATION);
        assert!(batch.graded_questions[1].is_correct);
        assert_eq!(batch.graded_questions[2].explanation, NO_ANSWER_EXPLANATION);
        assert_eq!(batch.score, 0);
        assert_eq!(batch.points_earned, 3);
        assert_eq!(batch.points_possible, 3);
    }

    #[test]
    fn test_tallies_are_kept_apart() {
        let graded = vec![
            GradedQuestion::new(arithmetic(), Some(Answer::selected("B")), true, "ok"),
            GradedQuestion::new(essay(5), Some(Answer::text("x")), true, "ok").with_points(4, 5),
            GradedQuestion::new(essay(5), Some(Answer::text("y")), false, "no").with_points(1, 5),
        ];
        let tally = ScoreTally::of(&graded);
        assert_eq!(tally.multiple_choice_count, 1);

        let batch = GradedBatch::from_graded(graded);
        assert_eq!(batch.score, 1);
        assert_eq!(batch.points_earned, 5);
        assert_eq!(batch.points_possible, 10);
    }

    #[tokio::test]
    async fn test_huge_remote_totals_are_capped() {
        let (client, grader) = scripted(ScriptedClient::text(
            r#"{"isCorrect": true, "score": 1e12, "totalPoints": 1e12, "explanation": "ok"}"#,
        ));
        let questions = vec![
            Question::free_response("a", "Describe mitosis.", None),
            Question::free_response("b", "Describe meiosis.", None),
        ];
        let answers = vec![Some(Answer::text("splits")), Some(Answer::text("halves"))];

        let batch = grader.grade_batch(&questions, &answers).await;

        assert_eq!(client.calls(), 2);
        for graded in &batch.graded_questions {
            assert_eq!(graded.score, Some(MAX_REMOTE_TOTAL_POINTS));
            assert_eq!(graded.total_points, Some(MAX_REMOTE_TOTAL_POINTS));
        }
        assert_eq!(batch.points_earned, 2 * MAX_REMOTE_TOTAL_POINTS);
        assert_eq!(batch.points_possible, 2 * MAX_REMOTE_TOTAL_POINTS);
    }

    #[test]
    fn test_tally_saturates_instead_of_overflowing() {
        let graded = vec![
            GradedQuestion::new(essay(u32::MAX), Some(Answer::text("x")), true, "ok")
                .with_points(u32::MAX, u32::MAX),
            GradedQuestion::new(essay(u32::MAX), Some(Answer::text("y")), true, "ok")
                .with_points(u32::MAX, u32::MAX),
        ];
        let batch = GradedBatch::from_graded(graded);
        assert_eq!(batch.points_earned, u32::MAX);
        assert_eq!(batch.points_possible, u32::MAX);
    }

    #[test]
    fn test_grade_is_usable_from_blocking_code() {
        let (_, grader) = scripted(ScriptedClient::text(r#"{"explanation": "Because."}"#));
        let graded = tokio_test::block_on(grader.grade(&arithmetic(), Some(&Answer::selected("B"))));
        assert!(graded.is_correct);
        assert_eq!(graded.explanation, "Because.");
    }

    #[test]
    fn test_to_points_bounds() {
        assert_eq!(to_points(-3.0, 10.0), 0);
        assert_eq!(to_points(f64::NAN, 10.0), 0);
        assert_eq!(to_points(2.5, 10.0), 3);
        assert_eq!(to_points(1e12, f64::from(MAX_REMOTE_TOTAL_POINTS)), 100);
    }
}
