//! Generation orchestrator.
//!
//! Turns a course/unit selection (or a raw topic) into a validated batch of
//! questions via the completion service, with a bounded, strictly
//! sequential retry loop.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::classifier::{ClassificationResult, Difficulty, TopicClassifier};
use crate::completion::{request_json, CompletionClient, CompletionRequest};
use crate::config::Config;
use crate::curriculum::Selection;
use crate::error::{CompletionError, GenerationError, GenerationErrorCode};
use crate::question::{Question, QuestionBody, QuestionKind};

/// Maximum completion calls per generation request.
pub const MAX_ATTEMPTS: u32 = 3;

const SYSTEM_INSTRUCTIONS: &str = "You write practice questions for high-school \
Advanced Placement courses. The user message is a JSON object describing the course, \
units, difficulty, question count and question type. Respond with a JSON object of the \
form {\"questions\": [...]}. Every question has \"type\" and \"content\". \
multiple_choice questions also have \"options\" (objects with \"label\" and \"text\"), \
\"correctAnswer\" (an option label) and \"explanation\". free_response questions have a \
\"rubric\" with \"maxPoints\" and \"criteria\". document_based questions also have \
\"documents\", each with \"title\" and \"content\".";

const fn default_count() -> u32 {
    5
}

const fn default_kind() -> QuestionKind {
    QuestionKind::MultipleChoice
}

/// An explicit request for a batch of questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    /// Course id or title.
    pub course: String,

    /// Unit ids or titles; empty means the whole course.
    #[serde(default)]
    pub units: Vec<String>,

    /// Difficulty tier.
    #[serde(default)]
    pub difficulty: Difficulty,

    /// Number of questions to request.
    #[serde(default = "default_count")]
    pub count: u32,

    /// Question type to request.
    #[serde(default = "default_kind")]
    pub kind: QuestionKind,
}

impl GenerationRequest {
    /// Creates a request for `count` multiple-choice questions at the default
    /// difficulty.
    pub fn new(course: impl Into<String>, units: Vec<String>, count: u32) -> Self {
        Self {
            course: course.into(),
            units,
            difficulty: Difficulty::default(),
            count,
            kind: default_kind(),
        }
    }
}

/// How one completion attempt ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// The response passed validation.
    Succeeded {
        /// Number of questions accepted.
        questions: usize,
    },
    /// The call failed or its output was rejected.
    Failed {
        /// Classification of the failure.
        code: GenerationErrorCode,
        /// Underlying error text.
        message: String,
    },
}

/// One completion attempt of a generation request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    /// 1-based attempt number.
    pub attempt: u32,
    /// How the attempt ended.
    pub outcome: AttemptOutcome,
    /// When the call was issued.
    pub started_at: DateTime<Utc>,
    /// When the call returned or timed out.
    pub ended_at: DateTime<Utc>,
}

/// A validated set of generated questions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionBatch {
    /// Questions with unique ids.
    pub questions: Vec<Question>,
    /// Course id the questions were generated for.
    pub course: String,
    /// Unit ids the questions were generated for.
    pub units: Vec<String>,
    /// Difficulty the questions were generated at.
    pub difficulty: Difficulty,
    /// Every attempt made, in order.
    pub attempts: Vec<AttemptRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeneratedPayload {
    Wrapped { questions: Vec<serde_json::Value> },
    Bare(Vec<serde_json::Value>),
}

/// Produces question batches through a [`CompletionClient`].
#[derive(Clone)]
pub struct QuestionGenerator {
    client: Arc<dyn CompletionClient>,
    classifier: TopicClassifier,
    timeout: Duration,
    retry_delay: Duration,
    max_question_count: u32,
    temperature: f32,
}

impl std::fmt::Debug for QuestionGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuestionGenerator")
            .field("timeout", &self.timeout)
            .field("retry_delay", &self.retry_delay)
            .field("max_question_count", &self.max_question_count)
            .finish_non_exhaustive()
    }
}

impl QuestionGenerator {
    /// Creates a generator from configuration.
    pub fn new(client: Arc<dyn CompletionClient>, config: &Config) -> Self {
        Self {
            client,
            classifier: TopicClassifier::new(config.classifier.clone()),
            timeout: config.generation.timeout(),
            retry_delay: Duration::from_millis(config.generation.retry_delay_ms),
            max_question_count: config.generation.max_question_count,
            temperature: config.completion.generation_temperature,
        }
    }

    /// Replaces the classifier (and with it the curriculum).
    #[must_use]
    pub fn with_classifier(mut self, classifier: TopicClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    /// Overrides the per-call timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the delay between attempts.
    #[must_use]
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// The classifier used by [`QuestionGenerator::generate_for_topic`].
    pub const fn classifier(&self) -> &TopicClassifier {
        &self.classifier
    }

    /// Generates a batch for an explicit course and unit selection.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<QuestionBatch, GenerationError> {
        let selection = self
            .classifier
            .curriculum()
            .resolve(&request.course, &request.units)
            .map_err(|e| GenerationError::topic_analysis(format!("Could not resolve selection: {e}")))?;

        let count = request.count.clamp(1, self.max_question_count.max(1));
        let completion = CompletionRequest::structured(
            SYSTEM_INSTRUCTIONS,
            &build_payload(&selection, request.difficulty, count, request.kind),
            self.temperature,
        );

        info!(
            course = %selection.course.id,
            units = ?selection.unit_ids(),
            difficulty = %request.difficulty,
            count,
            kind = %request.kind,
            "Generating questions"
        );

        let mut attempts = Vec::with_capacity(MAX_ATTEMPTS as usize);
        let mut last_error = CompletionError::Other("no attempt was made".into());

        for attempt in 1..=MAX_ATTEMPTS {
            let started_at = Utc::now();
            let result = self.attempt(completion.clone(), request.kind).await;
            let ended_at = Utc::now();

            let err = match result {
                Ok(questions) => {
                    attempts.push(AttemptRecord {
                        attempt,
                        outcome: AttemptOutcome::Succeeded {
                            questions: questions.len(),
                        },
                        started_at,
                        ended_at,
                    });
                    info!(attempt, questions = questions.len(), "Generation succeeded");
                    return Ok(QuestionBatch {
                        questions: finalize(questions),
                        course: selection.course.id.to_string(),
                        units: selection.unit_ids(),
                        difficulty: request.difficulty,
                        attempts,
                    });
                }
                Err(err) => err,
            };

            attempts.push(AttemptRecord {
                attempt,
                outcome: AttemptOutcome::Failed {
                    code: GenerationErrorCode::from(&err),
                    message: err.to_string(),
                },
                started_at,
                ended_at,
            });

            if !err.is_transient() {
                warn!(attempt, error = %err, "Generation failed with a non-retryable error");
                return Err(GenerationError::from_cause(err, attempt));
            }

            if attempt < MAX_ATTEMPTS {
                let delay = self.retry_delay(&err, attempt);
                warn!(
                    attempt,
                    max_attempts = MAX_ATTEMPTS,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "Generation attempt failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            last_error = err;
        }

        warn!(attempts = MAX_ATTEMPTS, error = %last_error, "Generation attempts exhausted");
        Err(GenerationError::from_cause(last_error, MAX_ATTEMPTS))
    }

    /// Classifies `topic`, then generates a batch for the winning course and
    /// units.
    ///
    /// `difficulty` defaults to the classifier's suggestion.
    pub async fn generate_for_topic(
        &self,
        topic: &str,
        difficulty: Option<Difficulty>,
        count: u32,
        kind: QuestionKind,
    ) -> Result<(QuestionBatch, ClassificationResult), GenerationError> {
        let classification = self.classifier.classify(topic);
        debug!(
            topic,
            course = %classification.course,
            confidence = classification.confidence,
            "Topic classified for generation"
        );

        let request = GenerationRequest {
            course: classification.course.clone(),
            units: classification.units.iter().cloned().collect(),
            difficulty: difficulty.unwrap_or(classification.suggested_difficulty),
            count,
            kind,
        };

        let batch = self.generate(&request).await?;
        Ok((batch, classification))
    }

    async fn attempt(
        &self,
        request: CompletionRequest,
        kind: QuestionKind,
    ) -> Result<Vec<Question>, CompletionError> {
        let payload: GeneratedPayload =
            request_json(self.client.as_ref(), request, self.timeout).await?;
        validate(payload, kind)
    }

    fn retry_delay(&self, err: &CompletionError, attempt: u32) -> Duration {
        if err.is_rate_limit() {
            self.retry_delay.saturating_mul(attempt)
        } else {
            self.retry_delay
        }
    }
}

fn build_payload(
    selection: &Selection,
    difficulty: Difficulty,
    count: u32,
    kind: QuestionKind,
) -> serde_json::Value {
    json!({
        "course": { "id": selection.course.id, "title": selection.course.title },
        "units": selection
            .units
            .iter()
            .map(|u| json!({ "id": u.id, "title": u.title }))
            .collect::<Vec<_>>(),
        "difficulty": difficulty,
        "count": count,
        "questionKind": kind,
    })
}

/// Accepts a response only if it holds at least one question and every
/// question is valid and of the requested `kind`.
fn validate(
    payload: GeneratedPayload,
    kind: QuestionKind,
) -> Result<Vec<Question>, CompletionError> {
    let raw = match payload {
        GeneratedPayload::Wrapped { questions } | GeneratedPayload::Bare(questions) => questions,
    };
    if raw.is_empty() {
        return Err(CompletionError::malformed("response contained no questions"));
    }

    raw.into_iter()
        .enumerate()
        .map(|(i, value)| {
            let question = serde_json::from_value::<Question>(value)
                .map_err(|e| CompletionError::malformed(format!("question {}: {e}", i + 1)))?;
            if question.kind() == kind {
                Ok(question)
            } else {
                Err(CompletionError::malformed(format!(
                    "question {}: expected {kind}, got {}",
                    i + 1,
                    question.kind()
                )))
            }
        })
        .collect()
}

/// Normalizes ids and fills in missing multiple-choice explanations.
fn finalize(mut questions: Vec<Question>) -> Vec<Question> {
    let mut seen = HashSet::new();
    for (i, question) in questions.iter_mut().enumerate() {
        let id = question.id.trim();
        if id.is_empty() || seen.contains(id) {
            let mut n = i + 1;
            while seen.contains(&format!("q{n}")) {
                n += 1;
            }
            question.id = format!("q{n}");
        } else if id.len() != question.id.len() {
            question.id = id.to_string();
        }
        seen.insert(question.id.clone());

        if question.explanation.is_none() && matches!(question.body, QuestionBody::MultipleChoice { .. }) {
            question.explanation = question.answer_key_explanation();
        }
    }
    questions
}
