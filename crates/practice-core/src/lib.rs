//! Practice Pipeline Core
//!
//! Classifies topics onto a curriculum, generates practice questions through
//! a completion service, grades answers, and serves all three over HTTP.

pub mod api;
pub mod classifier;
pub mod completion;
pub mod config;
pub mod curriculum;
pub mod error;
pub mod generation;
pub mod grading;
pub mod question;

pub use api::{
    create_router, AppState, ClassifyRequest, ErrorResponse, GenerateRequest, GenerateResponse,
    GenerationErrorResponse, GenerationMetadata, GradeRequest, HealthResponse,
};
pub use classifier::{ClassificationResult, CourseMatch, Difficulty, TopicClassifier};
pub use completion::{
    CompletionClient, CompletionRequest, CompletionResponse, HttpCompletionClient,
};
pub use config::{ClassifierConfig, CompletionConfig, Config, GenerationConfig, GradingConfig};
pub use curriculum::{Course, Curriculum, Selection, SelectionError, Unit};
pub use error::{
    CompletionError, GenerationError, GenerationErrorCode, PracticeError, Result,
};
pub use generation::{
    AttemptOutcome, AttemptRecord, GenerationRequest, QuestionBatch, QuestionGenerator,
    MAX_ATTEMPTS,
};
pub use grading::{GradedBatch, GradingDispatcher, ScoreTally};
pub use question::{
    Answer, AnswerOption, Document, GradedQuestion, Question, QuestionBody, QuestionError,
    QuestionKind, RawQuestion, Rubric,
};
