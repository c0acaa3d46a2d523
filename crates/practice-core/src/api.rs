//! HTTP API for the practice pipeline.
//!
//! # Endpoints
//!
//! - `POST /api/generate` - Generate a practice set from a topic or a course selection
//! - `POST /api/grade` - Grade a submitted practice set
//! - `POST /api/classify` - Classify a free-text topic
//! - `GET /api/courses` - List the curriculum
//! - `GET /api/health` - Liveness check
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use practice_core::{create_router, AppState, Config, HttpCompletionClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::default();
//! let client = Arc::new(HttpCompletionClient::from_config(&config.completion)?);
//! let router = create_router(AppState::new(config, client));
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
//! axum::serve(listener, router).await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::classifier::{ClassificationResult, Difficulty, TopicClassifier};
use crate::completion::CompletionClient;
use crate::curriculum::Course;
use crate::error::{GenerationError, GenerationErrorCode};
use crate::generation::{GenerationRequest, QuestionBatch, QuestionGenerator};
use crate::grading::{GradedBatch, GradingDispatcher};
use crate::question::{Answer, Question, QuestionKind, RawQuestion};
use crate::Config;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for the generate endpoint.
///
/// Either `course` (with optional `units`) or `topic` must be given; an
/// explicit course wins.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    /// Free-text topic to classify.
    #[serde(default)]
    pub topic: Option<String>,
    /// Explicit course id or title.
    #[serde(default)]
    pub course: Option<String>,
    /// Explicit unit ids or titles.
    #[serde(default, alias = "selectedUnits")]
    pub units: Vec<String>,
    /// Difficulty; defaults to the topic's suggested difficulty, or
    /// intermediate for an explicit course.
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    /// Number of questions.
    #[serde(default, alias = "count")]
    pub question_count: Option<u32>,
    /// Question type.
    #[serde(default, alias = "questionType", alias = "testType")]
    pub question_kind: Option<QuestionKind>,
}

/// Metadata describing how a practice set was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationMetadata {
    /// Course the questions were generated for.
    pub detected_course: String,
    /// Units the questions were generated for.
    pub detected_units: Vec<String>,
    /// Classification confidence; 1.0 for an explicit course.
    pub confidence: f64,
    /// Wall-clock time spent handling the request.
    pub processing_time_ms: u64,
    /// Completion calls made.
    pub attempts: u32,
}

/// Response body for the generate endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    /// The generated questions.
    pub questions: Vec<Question>,
    /// How the questions were produced.
    pub metadata: GenerationMetadata,
}

/// Request body for the grade endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeRequest {
    /// Questions as submitted; validated before grading.
    pub questions: Vec<RawQuestion>,
    /// Answers paired with questions by index.
    #[serde(default, alias = "userAnswers")]
    pub answers: Vec<Option<Answer>>,
    /// Practice set type, informational.
    #[serde(default)]
    pub test_type: Option<String>,
    /// Practice set difficulty, informational.
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
    /// Units the practice set covered, informational.
    #[serde(default)]
    pub selected_units: Vec<String>,
}

/// Request body for the classify endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ClassifyRequest {
    /// Free-text topic.
    pub topic: String,
}

/// Response body for the courses endpoint.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoursesResponse {
    /// Course used when a topic matches nothing.
    pub default_course: &'static str,
    /// Every course with its units.
    pub courses: &'static [Course],
}

/// Response body for the health endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"ok"`.
    pub status: String,
    /// Server version.
    pub version: String,
}

/// Error response body returned on failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Description of the error.
    pub error: String,
}

/// Error response body returned when generation fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationErrorResponse {
    /// Human-readable message.
    pub error: String,
    /// Failure classification.
    pub code: GenerationErrorCode,
    /// Whether the client should offer a retry.
    pub retryable: bool,
}

// ============================================================================
// Application State
// ============================================================================

/// Shared application state for the HTTP server.
///
/// Everything in here is immutable once built.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Configuration the components were built from.
    pub config: Config,
    /// Topic classifier.
    pub classifier: TopicClassifier,
    /// Question generator.
    pub generator: QuestionGenerator,
    /// Grading dispatcher.
    pub grader: GradingDispatcher,
}

impl AppState {
    /// Builds every component from `config` around one completion client.
    pub fn new(config: Config, client: Arc<dyn CompletionClient>) -> Self {
        let classifier = TopicClassifier::new(config.classifier.clone());
        Self {
            generator: QuestionGenerator::new(Arc::clone(&client), &config)
                .with_classifier(classifier.clone()),
            grader: GradingDispatcher::new(client, &config),
            classifier,
            config,
        }
    }
}

// ============================================================================
// API Error Type
// ============================================================================

/// Internal error type for API handlers.
#[derive(Debug)]
enum ApiError {
    /// The request body or its questions are invalid.
    BadRequest(String),
    /// Generation failed after the retry policy ran.
    Generation(GenerationError),
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::BadRequest(format!("Invalid request body: {}", rejection.body_text()))
    }
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        Self::Generation(err)
    }
}

const fn generation_status(code: GenerationErrorCode) -> StatusCode {
    match code {
        GenerationErrorCode::TopicAnalysisFailed => StatusCode::BAD_REQUEST,
        GenerationErrorCode::RateLimit => StatusCode::TOO_MANY_REQUESTS,
        GenerationErrorCode::ApiError | GenerationErrorCode::ParsingError => StatusCode::BAD_GATEWAY,
        GenerationErrorCode::NetworkError => StatusCode::GATEWAY_TIMEOUT,
        GenerationErrorCode::UnknownError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(error) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error })).into_response()
            }
            Self::Generation(err) => {
                let body = GenerationErrorResponse {
                    error: err.message,
                    code: err.code,
                    retryable: err.retryable,
                };
                (generation_status(err.code), Json(body)).into_response()
            }
        }
    }
}

// ============================================================================
// Router Setup
// ============================================================================

/// Creates the HTTP router with all API endpoints.
///
/// Routes live under `/api`, with permissive CORS and request tracing.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/generate", post(handle_generate))
        .route("/grade", post(handle_grade))
        .route("/classify", post(handle_classify))
        .route("/courses", get(handle_courses))
        .route("/health", get(handle_health));

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(Arc::new(state))
}

// ============================================================================
// Handlers
// ============================================================================

/// Handler for `POST /api/generate`.
async fn handle_generate(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GenerateRequest>, JsonRejection>,
) -> Result<Json<GenerateResponse>, ApiError> {
    let Json(request) = payload?;
    let started = Instant::now();
    let count = request.question_count.unwrap_or(5);
    let kind = request.question_kind.unwrap_or(QuestionKind::MultipleChoice);

    // A blank topic still goes to the classifier, which falls back to the
    // default course. Only a request naming neither is rejected.
    let course = request.course.as_deref().map(str::trim).filter(|c| !c.is_empty());
    let topic = request.topic.as_deref().map(str::trim);

    let (batch, confidence): (QuestionBatch, f64) = match (course, topic) {
        (Some(course), _) => {
            info!(course, units = ?request.units, "Generate request for explicit course");
            let generation = GenerationRequest {
                course: course.to_string(),
                units: request.units.clone(),
                difficulty: request.difficulty.unwrap_or_default(),
                count,
                kind,
            };
            (state.generator.generate(&generation).await?, 1.0)
        }
        (None, Some(topic)) => {
            info!(topic, "Generate request for topic");
            let (batch, classification) = state
                .generator
                .generate_for_topic(topic, request.difficulty, count, kind)
                .await?;
            (batch, classification.confidence)
        }
        (None, None) => {
            warn!("Generate request without topic or course");
            return Err(GenerationError::topic_analysis(
                "Provide a topic or choose a course to generate questions.",
            )
            .into());
        }
    };

    let attempts = u32::try_from(batch.attempts.len()).unwrap_or(u32::MAX);
    let processing_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    Ok(Json(GenerateResponse {
        metadata: GenerationMetadata {
            detected_course: batch.course,
            detected_units: batch.units,
            confidence,
            processing_time_ms,
            attempts,
        },
        questions: batch.questions,
    }))
}

/// Handler for `POST /api/grade`.
///
/// Every question is validated before any grading happens.
async fn handle_grade(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<GradeRequest>, JsonRejection>,
) -> Result<Json<GradedBatch>, ApiError> {
    let Json(request) = payload?;

    let missing = request
        .questions
        .iter()
        .filter(|q| !q.has_content_and_type())
        .count();
    if missing > 0 {
        warn!(missing, "Rejecting grade request with malformed questions");
        return Err(ApiError::BadRequest(format!(
            "Invalid question format: {missing} question(s) missing content or type"
        )));
    }

    let questions = request
        .questions
        .into_iter()
        .enumerate()
        .map(|(i, raw)| {
            Question::try_from(raw)
                .map_err(|e| ApiError::BadRequest(format!("Invalid question {}: {e}", i + 1)))
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        questions = questions.len(),
        answers = request.answers.len(),
        test_type = request.test_type.as_deref().unwrap_or("unspecified"),
        "Grading practice set"
    );

    let batch = state.grader.grade_batch(&questions, &request.answers).await;
    Ok(Json(batch))
}

/// Handler for `POST /api/classify`.
async fn handle_classify(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ClassifyRequest>, JsonRejection>,
) -> Result<Json<ClassificationResult>, ApiError> {
    let Json(request) = payload?;
    Ok(Json(state.classifier.classify(&request.topic)))
}

/// Handler for `GET /api/courses`.
async fn handle_courses(State(state): State<Arc<AppState>>) -> Json<CoursesResponse> {
    let curriculum = state.classifier.curriculum();
    Json(CoursesResponse {
        default_course: curriculum.default_course,
        courses: curriculum.courses,
    })
}

/// Handler for `GET /api/health`.
async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Tests
// ============================================================================
