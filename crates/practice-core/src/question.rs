//! Question, answer, and graded-result types.
//!
//! A [`Question`] keeps the fields shared by every item (`id`, `content`,
//! `explanation`) and moves the type-specific fields into [`QuestionBody`], so
//! a multiple-choice question without a correct answer cannot exist. The wire
//! format is a flat JSON object keyed on `type`; [`RawQuestion`] is that flat
//! shape and conversion into [`Question`] is where the per-type rules are
//! enforced.

use serde::{Deserialize, Serialize};

// ============================================================================
// QuestionKind
// ============================================================================

/// The declared type of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QuestionKind {
    /// Pick one labeled option; graded locally.
    MultipleChoice,
    /// Open-ended written answer graded against a rubric.
    FreeResponse,
    /// Written answer grounded in supplied source documents.
    DocumentBased,
}

impl QuestionKind {
    /// Parses a string into a `QuestionKind`, case-insensitively.
    ///
    /// Short forms (`mcq`, `frq`, `dbq`) are accepted alongside the long ones.
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "multiple_choice" | "mcq" => Some(Self::MultipleChoice),
            "free_response" | "frq" => Some(Self::FreeResponse),
            "document_based" | "dbq" => Some(Self::DocumentBased),
            _ => None,
        }
    }

    /// The canonical wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleChoice => "multiple_choice",
            Self::FreeResponse => "free_response",
            Self::DocumentBased => "document_based",
        }
    }

    /// Returns `true` for types graded against a rubric by the remote grader.
    #[must_use]
    pub const fn is_rubric_graded(&self) -> bool {
        matches!(self, Self::FreeResponse | Self::DocumentBased)
    }
}

impl std::fmt::Display for QuestionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for QuestionKind {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid question type '{s}': expected one of 'multiple_choice', 'free_response', 'document_based'"
            ))
        })
    }
}

impl Serialize for QuestionKind {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Question parts
// ============================================================================

/// One labeled choice of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOption {
    /// Short label the learner selects, e.g. `"B"`.
    pub label: String,
    /// Option text.
    pub text: String,
}

impl AnswerOption {
    /// Creates a new option.
    #[must_use]
    pub fn new(label: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
        }
    }
}

/// Point-weighted grading criteria for open-ended questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rubric {
    /// Maximum attainable points.
    #[serde(alias = "max_points")]
    pub max_points: u32,
    /// Criteria the grader checks, in order.
    #[serde(default)]
    pub criteria: Vec<String>,
}

/// A source document supplied with a document-based question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Document title or citation.
    #[serde(default)]
    pub title: String,
    /// Document text.
    pub content: String,
}

/// Type-specific part of a question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuestionBody {
    /// Multiple choice with a locally checkable key.
    MultipleChoice {
        /// Choices in display order.
        options: Vec<AnswerOption>,
        /// Label of the correct option.
        correct_answer: String,
    },
    /// Free response.
    FreeResponse {
        /// Grading rubric, if one was supplied.
        rubric: Option<Rubric>,
    },
    /// Document-based response.
    DocumentBased {
        /// Grading rubric, if one was supplied.
        rubric: Option<Rubric>,
        /// Source documents in display order.
        documents: Vec<Document>,
    },
}

// ============================================================================
// Question
// ============================================================================

/// A single assessable item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawQuestion", into = "RawQuestion")]
pub struct Question {
    /// Identifier, unique within a batch.
    pub id: String,
    /// Prompt text.
    pub content: String,
    /// Worked explanation, if the question came with one.
    pub explanation: Option<String>,
    /// Type-specific fields.
    pub body: QuestionBody,
}

impl Question {
    /// Creates a multiple-choice question.
    #[must_use]
    pub fn multiple_choice(
        id: impl Into<String>,
        content: impl Into<String>,
        options: Vec<AnswerOption>,
        correct_answer: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            explanation: None,
            body: QuestionBody::MultipleChoice {
                options,
                correct_answer: correct_answer.into(),
            },
        }
    }

    /// Creates a free-response question.
    #[must_use]
    pub fn free_response(
        id: impl Into<String>,
        content: impl Into<String>,
        rubric: Option<Rubric>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            explanation: None,
            body: QuestionBody::FreeResponse { rubric },
        }
    }

    /// Creates a document-based question.
    #[must_use]
    pub fn document_based(
        id: impl Into<String>,
        content: impl Into<String>,
        rubric: Option<Rubric>,
        documents: Vec<Document>,
    ) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            explanation: None,
            body: QuestionBody::DocumentBased { rubric, documents },
        }
    }

    /// The declared type of this question.
    #[must_use]
    pub const fn kind(&self) -> QuestionKind {
        match self.body {
            QuestionBody::MultipleChoice { .. } => QuestionKind::MultipleChoice,
            QuestionBody::FreeResponse { .. } => QuestionKind::FreeResponse,
            QuestionBody::DocumentBased { .. } => QuestionKind::DocumentBased,
        }
    }

    /// The rubric of a rubric-graded question.
    #[must_use]
    pub const fn rubric(&self) -> Option<&Rubric> {
        match &self.body {
            QuestionBody::FreeResponse { rubric } | QuestionBody::DocumentBased { rubric, .. } => {
                rubric.as_ref()
            }
            QuestionBody::MultipleChoice { .. } => None,
        }
    }

    /// Source documents; empty for other types.
    #[must_use]
    pub fn documents(&self) -> &[Document] {
        match &self.body {
            QuestionBody::DocumentBased { documents, .. } => documents,
            _ => &[],
        }
    }

    /// Text of the option with the given label, compared case-insensitively.
    #[must_use]
    pub fn option_text(&self, label: &str) -> Option<&str> {
        match &self.body {
            QuestionBody::MultipleChoice { options, .. } => options
                .iter()
                .find(|o| labels_match(&o.label, label))
                .map(|o| o.text.as_str()),
            _ => None,
        }
    }

    /// Deterministic explanation naming the correct option.
    ///
    /// Returns `None` for types without an answer key.
    #[must_use]
    pub fn answer_key_explanation(&self) -> Option<String> {
        let QuestionBody::MultipleChoice { correct_answer, .. } = &self.body else {
            return None;
        };
        let label = correct_answer.trim();
        Some(match self.option_text(label) {
            Some(text) => format!("The correct answer is {label}: {text}."),
            None => format!("The correct answer is {label}."),
        })
    }
}

/// Case-insensitive, whitespace-trimmed label comparison.
#[must_use]
pub fn labels_match(a: &str, b: &str) -> bool {
    a.trim().to_uppercase() == b.trim().to_uppercase()
}

/// Reasons a flat question record is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QuestionError {
    /// No `type` field.
    #[error("question is missing 'type'")]
    MissingType,
    /// A `type` value that names no known question type.
    #[error("unknown question type '{0}'")]
    UnknownType(String),
    /// No `content`, or blank content.
    #[error("question is missing 'content'")]
    MissingContent,
    /// A multiple-choice question without options.
    #[error("multiple-choice question has no options")]
    MissingOptions,
    /// A multiple-choice question without a correct answer.
    #[error("multiple-choice question is missing 'correctAnswer'")]
    MissingCorrectAnswer,
    /// A document-based question without documents.
    #[error("document-based question has no documents")]
    MissingDocuments,
}

// ============================================================================
// Wire representation
// ============================================================================

/// A multiple-choice option as it may appear on the wire.
///
/// Generated content sometimes lists options as bare strings; those receive
/// letter labels by position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawOption {
    /// `{ "label": "A", "text": "..." }`
    Labeled(AnswerOption),
    /// `"..."`
    Plain(String),
}

/// Flat JSON shape of a question, before per-type validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawQuestion {
    /// Identifier; may be empty.
    #[serde(default)]
    pub id: String,

    /// Declared type, as written.
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    /// Prompt text.
    #[serde(default, alias = "question", skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,

    /// Multiple-choice options.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<RawOption>>,

    /// Multiple-choice answer key. A numeric key is kept as its decimal text.
    #[serde(
        default,
        alias = "correct_answer",
        deserialize_with = "scalar_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub correct_answer: Option<String>,

    /// Rubric for open-ended types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rubric: Option<Rubric>,

    /// Documents for document-based questions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub documents: Option<Vec<Document>>,

    /// Worked explanation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl RawQuestion {
    /// Returns `true` if both `type` and non-blank `content` are present.
    ///
    /// This is the minimal shape check applied at the API boundary before any
    /// per-type validation.
    #[must_use]
    pub fn has_content_and_type(&self) -> bool {
        self.kind.as_deref().is_some_and(|k| !k.trim().is_empty())
            && self.content.as_deref().is_some_and(|c| !c.trim().is_empty())
    }
}

/// A JSON scalar that stands in for a label or short answer.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Number(serde_json::Number),
    Flag(bool),
}

impl Scalar {
    /// Text form of the scalar; booleans carry no answer.
    fn into_text(self) -> Option<String> {
        match self {
            Self::Text(text) => Some(text),
            Self::Number(number) => Some(number.to_string()),
            Self::Flag(_) => None,
        }
    }
}

/// Reads a string or number as text. `null` and booleans read as `None`.
fn scalar_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(Option::<Scalar>::deserialize(deserializer)?.and_then(Scalar::into_text))
}

/// Letter label for the option at `index` (`A`, `B`, ..., `Z`, then `27`, ...).
fn positional_label(index: usize) -> String {
    u8::try_from(index)
        .ok()
        .filter(|i| *i < 26)
        .map_or_else(|| (index + 1).to_string(), |i| char::from(b'A' + i).to_string())
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl TryFrom<RawQuestion> for Question {
    type Error = QuestionError;

    fn try_from(raw: RawQuestion) -> std::result::Result<Self, Self::Error> {
        let kind_str = non_blank(raw.kind).ok_or(QuestionError::MissingType)?;
        let kind = QuestionKind::from_str_case_insensitive(&kind_str)
            .ok_or(QuestionError::UnknownType(kind_str))?;
        let content = non_blank(raw.content).ok_or(QuestionError::MissingContent)?;

        let body = match kind {
            QuestionKind::MultipleChoice => {
                let options: Vec<AnswerOption> = raw
                    .options
                    .unwrap_or_default()
                    .into_iter()
                    .enumerate()
                    .map(|(i, option)| match option {
                        RawOption::Labeled(option) => option,
                        RawOption::Plain(text) => AnswerOption::new(positional_label(i), text),
                    })
                    .collect();
                if options.is_empty() {
                    return Err(QuestionError::MissingOptions);
                }
                let correct_answer =
                    non_blank(raw.correct_answer).ok_or(QuestionError::MissingCorrectAnswer)?;
                QuestionBody::MultipleChoice {
                    options,
                    correct_answer,
                }
            }
            QuestionKind::FreeResponse => QuestionBody::FreeResponse { rubric: raw.rubric },
            QuestionKind::DocumentBased => {
                let documents = raw.documents.unwrap_or_default();
                if documents.is_empty() {
                    return Err(QuestionError::MissingDocuments);
                }
                QuestionBody::DocumentBased {
                    rubric: raw.rubric,
                    documents,
                }
            }
        };

        Ok(Self {
            id: raw.id,
            content,
            explanation: non_blank(raw.explanation),
            body,
        })
    }
}

impl From<Question> for RawQuestion {
    fn from(question: Question) -> Self {
        let kind = Some(question.kind().as_str().to_string());
        let mut raw = Self {
            id: question.id,
            kind,
            content: Some(question.content),
            explanation: question.explanation,
            ..Self::default()
        };
        match question.body {
            QuestionBody::MultipleChoice {
                options,
                correct_answer,
            } => {
                raw.options = Some(options.into_iter().map(RawOption::Labeled).collect());
                raw.correct_answer = Some(correct_answer);
            }
            QuestionBody::FreeResponse { rubric } => raw.rubric = rubric,
            QuestionBody::DocumentBased { rubric, documents } => {
                raw.rubric = rubric;
                raw.documents = Some(documents);
            }
        }
        raw
    }
}

// ============================================================================
// Answer
// ============================================================================

/// A learner's response.
///
/// Multiple-choice answers arrive as `{"selected": "B"}`, written answers as
/// `{"text": "..."}`; a bare string is accepted for either. Numeric labels
/// such as `{"selected": 2}` are read as their decimal text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "AnswerRepr")]
pub struct Answer {
    /// Selected option label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected: Option<String>,
    /// Written response.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum AnswerRepr {
    Plain(Scalar),
    Fields {
        #[serde(default, deserialize_with = "scalar_text")]
        selected: Option<String>,
        #[serde(default, deserialize_with = "scalar_text")]
        text: Option<String>,
    },
}

impl From<AnswerRepr> for Answer {
    fn from(repr: AnswerRepr) -> Self {
        match repr {
            AnswerRepr::Plain(scalar) => Self {
                selected: None,
                text: scalar.into_text(),
            },
            AnswerRepr::Fields { selected, text } => Self { selected, text },
        }
    }
}

impl Answer {
    /// An answer selecting the option with `label`.
    #[must_use]
    pub fn selected(label: impl Into<String>) -> Self {
        Self {
            selected: Some(label.into()),
            text: None,
        }
    }

    /// A written answer.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            selected: None,
            text: Some(text.into()),
        }
    }

    /// The trimmed response, preferring `selected` over `text`.
    ///
    /// Returns `None` when the learner gave no answer.
    #[must_use]
    pub fn response(&self) -> Option<&str> {
        [self.selected.as_deref(), self.text.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|s| !s.is_empty())
    }

    /// Returns `true` if this answer carries no response.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.response().is_none()
    }
}

// ============================================================================
// GradedQuestion
// ============================================================================

/// A question together with the learner's answer and its grade.
///
/// Serializes as the question's own fields plus the grading fields. The
/// question's generated explanation is replaced by the grading explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedQuestion {
    /// The graded question.
    #[serde(flatten)]
    pub question: Question,

    /// The learner's answer, if any.
    pub user_answer: Option<Answer>,

    /// Whether the answer was judged correct.
    pub is_correct: bool,

    /// Points earned on rubric-graded types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<u32>,

    /// Points possible on rubric-graded types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_points: Option<u32>,

    /// Explanation shown to the learner.
    pub explanation: String,

    /// Additional feedback on the learner's response.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
}

impl GradedQuestion {
    /// Starts a graded record for `question`, dropping its own explanation.
    #[must_use]
    pub fn new(
        mut question: Question,
        user_answer: Option<Answer>,
        is_correct: bool,
        explanation: impl Into<String>,
    ) -> Self {
        question.explanation = None;
        Self {
            question,
            user_answer,
            is_correct,
            score: None,
            total_points: None,
            explanation: explanation.into(),
            feedback: None,
        }
    }

    /// Sets rubric points.
    #[must_use]
    pub fn with_points(mut self, score: u32, total_points: u32) -> Self {
        self.score = Some(score);
        self.total_points = Some(total_points);
        self
    }

    /// Sets feedback text.
    #[must_use]
    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    /// Declared type of the graded question.
    #[must_use]
    pub const fn kind(&self) -> QuestionKind {
        self.question.kind()
    }
}
