//! End-to-end tests for the practice pipeline.
//!
//! Each test binds the real router on a random port with a completion client
//! that answers by request kind, then drives it over HTTP with `reqwest`.

use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use practice_core::{
    create_router, AppState, CompletionClient, CompletionError, CompletionRequest,
    CompletionResponse, Config, GradedBatch,
};
use practice_report::{JsonFileStore, MarkdownGenerator, SessionRecord, SessionStore};
use serde_json::{json, Value};

const GENERATED: &str = r#"{"questions": [
    {"type": "multiple_choice", "question": "Where does photosynthesis take place?",
     "options": ["Mitochondrion", "Chloroplast", "Nucleus", "Ribosome"], "correctAnswer": "B"},
    {"type": "multiple_choice", "question": "Which molecule stores energy for the cell?",
     "options": ["ATP", "DNA", "RNA", "Glucose-6-phosphate"], "correctAnswer": "A"}
]}"#;

/// How the fake service answers generation requests.
#[derive(Clone, Copy)]
enum GenerationMode {
    Valid,
    Garbage,
    Rejected,
}

/// Completion client that answers by looking at the request instructions.
struct PipelineClient {
    generation: GenerationMode,
    generation_calls: AtomicUsize,
    grading_calls: AtomicUsize,
}

impl PipelineClient {
    fn new(generation: GenerationMode) -> Arc<Self> {
        Arc::new(Self {
            generation,
            generation_calls: AtomicUsize::new(0),
            grading_calls: AtomicUsize::new(0),
        })
    }

    fn generation_calls(&self) -> usize {
        self.generation_calls.load(Ordering::SeqCst)
    }

    fn grading_calls(&self) -> usize {
        self.grading_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionClient for PipelineClient {
    async fn complete(
        &self,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, CompletionError> {
        let instructions = request.system_instructions.to_lowercase();

        let text = if instructions.contains("write practice questions") {
            self.generation_calls.fetch_add(1, Ordering::SeqCst);
            match self.generation {
                GenerationMode::Valid => GENERATED.to_string(),
                GenerationMode::Garbage => "I'm sorry, I can't help with that.".to_string(),
                GenerationMode::Rejected => {
                    return Err(CompletionError::api(400, "model not found"));
                }
            }
        } else if instructions.starts_with("you explain") {
            self.grading_calls.fetch_add(1, Ordering::SeqCst);
            json!({ "explanation": "Chloroplasts capture light energy." }).to_string()
        } else {
            self.grading_calls.fetch_add(1, Ordering::SeqCst);
            json!({
                "isCorrect": true,
                "score": 4,
                "totalPoints": 6,
                "explanation": "Identifies diffusion of water.",
                "feedback": "Mention the membrane."
            })
            .to_string()
        };

        Ok(CompletionResponse { text })
    }
}

fn find_available_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .expect("Failed to bind to port")
        .local_addr()
        .expect("Failed to get local addr")
        .port()
}

/// Spawns the server and returns its `/api` base URL.
async fn spawn_server(client: Arc<PipelineClient>) -> String {
    let mut config = Config::default();
    config.generation.retry_delay_ms = 0;

    let state = AppState::new(config, client);
    let router = create_router(state);

    let addr = format!("127.0.0.1:{}", find_available_port());
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind");

    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://{addr}/api")
}

async fn post(url: &str, body: &Value) -> (u16, Value) {
    let response = reqwest::Client::new()
        .post(url)
        .json(body)
        .send()
        .await
        .expect("Failed to send request");
    let status = response.status().as_u16();
    let body = response.json().await.expect("Response was not JSON");
    (status, body)
}

// ============================================================================
// Classification and catalog
// ============================================================================

#[tokio::test]
async fn test_health_and_courses() {
    let base = spawn_server(PipelineClient::new(GenerationMode::Valid)).await;

    let health: Value = reqwest::get(format!("{base}/health"))
        .await
        .expect("health request")
        .json()
        .await
        .expect("health body");
    assert_eq!(health["status"], "ok");

    let courses: Value = reqwest::get(format!("{base}/courses"))
        .await
        .expect("courses request")
        .json()
        .await
        .expect("courses body");
    assert_eq!(courses["defaultCourse"], "ap-calculus-ab");
    let ids: Vec<&str> = courses["courses"]
        .as_array()
        .expect("course list")
        .iter()
        .filter_map(|c| c["id"].as_str())
        .collect();
    assert!(ids.contains(&"ap-biology"));
}

#[tokio::test]
async fn test_classify_topic() {
    let client = PipelineClient::new(GenerationMode::Valid);
    let base = spawn_server(Arc::clone(&client)).await;

    let (status, body) = post(
        &format!("{base}/classify"),
        &json!({ "topic": "biology photosynthesis" }),
    )
    .await;

    assert_eq!(status, 200);
    assert_eq!(body["course"], "ap-biology");
    assert_eq!(body["units"], json!(["unit-3"]));
    assert_eq!(client.generation_calls() + client.grading_calls(), 0);
}

// ============================================================================
// Generation
// ============================================================================

#[tokio::test]
async fn test_generate_from_topic() {
    let client = PipelineClient::new(GenerationMode::Valid);
    let base = spawn_server(Arc::clone(&client)).await;

    let (status, body) = post(
        &format!("{base}/generate"),
        &json!({ "topic": "biology photosynthesis", "questionCount": 2 }),
    )
    .await;

    assert_eq!(status, 200, "unexpected body: {body}");
    let questions = body["questions"].as_array().expect("questions");
    assert_eq!(questions.len(), 2);
    assert_eq!(questions[0]["id"], "q1");
    assert_eq!(questions[1]["id"], "q2");
    assert_eq!(questions[0]["options"][1]["label"], "B");
    assert_eq!(body["metadata"]["detectedCourse"], "ap-biology");
    assert_eq!(body["metadata"]["attempts"], 1);
    assert_eq!(client.generation_calls(), 1);
}

#[tokio::test]
async fn test_generate_for_explicit_course_reports_full_confidence() {
    let base = spawn_server(PipelineClient::new(GenerationMode::Valid)).await;

    let (status, body) = post(
        &format!("{base}/generate"),
        &json!({ "course": "ap-biology", "selectedUnits": ["unit-2"], "count": 2 }),
    )
    .await;

    assert_eq!(status, 200, "unexpected body: {body}");
    assert_eq!(body["metadata"]["detectedUnits"], json!(["unit-2"]));
    assert_eq!(body["metadata"]["confidence"], 1.0);
}

#[tokio::test]
async fn test_generate_retries_unparseable_output_three_times() {
    let client = PipelineClient::new(GenerationMode::Garbage);
    let base = spawn_server(Arc::clone(&client)).await;

    let (status, body) = post(
        &format!("{base}/generate"),
        &json!({ "course": "ap-biology" }),
    )
    .await;

    assert_eq!(status, 502);
    assert_eq!(body["code"], "PARSING_ERROR");
    assert_eq!(body["retryable"], true);
    assert_eq!(client.generation_calls(), 3);
}

#[tokio::test]
async fn test_generate_does_not_retry_api_rejection() {
    let client = PipelineClient::new(GenerationMode::Rejected);
    let base = spawn_server(Arc::clone(&client)).await;

    let (status, body) = post(
        &format!("{base}/generate"),
        &json!({ "topic": "biology photosynthesis" }),
    )
    .await;

    assert_eq!(status, 502);
    assert_eq!(body["code"], "API_ERROR");
    assert_eq!(body["retryable"], false);
    assert_eq!(client.generation_calls(), 1);
}

#[tokio::test]
async fn test_generate_unknown_course_makes_no_calls() {
    let client = PipelineClient::new(GenerationMode::Valid);
    let base = spawn_server(Arc::clone(&client)).await;

    let (status, body) = post(
        &format!("{base}/generate"),
        &json!({ "course": "ap-latin" }),
    )
    .await;

    assert_eq!(status, 400);
    assert_eq!(body["code"], "TOPIC_ANALYSIS_FAILED");
    assert_eq!(client.generation_calls(), 0);
}

// ============================================================================
// Grading and session records
// ============================================================================

fn grade_body() -> Value {
    json!({
        "questions": [
            {"id": "q1", "type": "multiple_choice", "content": "Where does photosynthesis take place?",
             "options": [{"label": "A", "text": "Mitochondrion"}, {"label": "B", "text": "Chloroplast"}],
             "correctAnswer": "B"},
            {"id": "q2", "type": "multiple_choice", "content": "Which molecule stores energy?",
             "options": [{"label": "A", "text": "ATP"}, {"label": "B", "text": "DNA"}],
             "correctAnswer": "A"},
            {"id": "q3", "type": "free_response", "content": "Explain osmosis."},
            {"id": "q4", "type": "multiple_choice", "content": "Which organelle makes proteins?",
             "options": [{"label": "A", "text": "Ribosome"}, {"label": "B", "text": "Vacuole"}],
             "correctAnswer": "A"}
        ],
        "userAnswers": [
            {"selected": "b"},
            {"selected": "B"},
            {"text": "Water moves across a membrane toward higher solute concentration."},
            null
        ],
        "testType": "mixed",
        "selectedUnits": ["unit-2", "unit-3"]
    })
}

#[tokio::test]
async fn test_grade_mixed_set() {
    let client = PipelineClient::new(GenerationMode::Valid);
    let base = spawn_server(Arc::clone(&client)).await;

    let (status, body) = post(&format!("{base}/grade"), &grade_body()).await;

    assert_eq!(status, 200, "unexpected body: {body}");
    assert_eq!(body["score"], 1);
    assert_eq!(body["pointsEarned"], 4);
    assert_eq!(body["pointsPossible"], 6);

    let graded = body["gradedQuestions"].as_array().expect("graded questions");
    assert_eq!(graded.len(), 4);
    assert_eq!(graded[0]["isCorrect"], true);
    assert_eq!(graded[1]["isCorrect"], false);
    assert_eq!(graded[2]["score"], 4);
    assert_eq!(graded[2]["feedback"], "Mention the membrane.");
    assert_eq!(graded[3]["isCorrect"], false);
    assert_eq!(graded[3]["userAnswer"], Value::Null);

    // Unanswered questions never reach the service.
    assert_eq!(client.grading_calls(), 3);
}

#[tokio::test]
async fn test_grade_rejects_malformed_questions_before_grading() {
    let client = PipelineClient::new(GenerationMode::Valid);
    let base = spawn_server(Arc::clone(&client)).await;

    let (status, body) = post(
        &format!("{base}/grade"),
        &json!({
            "questions": [
                {"id": "q1", "type": "free_response", "content": "Explain osmosis."},
                {"id": "q2", "content": "No type here."}
            ],
            "answers": [{"text": "Water moves."}, null]
        }),
    )
    .await;

    assert_eq!(status, 400);
    assert_eq!(
        body["error"],
        "Invalid question format: 1 question(s) missing content or type"
    );
    assert_eq!(client.grading_calls(), 0);
}

#[tokio::test]
async fn test_graded_set_becomes_stored_session() {
    let base = spawn_server(PipelineClient::new(GenerationMode::Valid)).await;

    let (status, body) = post(&format!("{base}/grade"), &grade_body()).await;
    assert_eq!(status, 200);
    let batch: GradedBatch = serde_json::from_value(body).expect("graded batch");

    let record = SessionRecord::builder()
        .session_id("integration-session")
        .course("ap-biology")
        .units(vec!["unit-2".into(), "unit-3".into()])
        .batch(batch)
        .build()
        .expect("session record");
    assert_eq!(record.score.correct, 1);
    assert_eq!(record.score.points_possible, 6);
    assert_eq!(record.unanswered_count(), 1);

    let markdown = MarkdownGenerator::new(&record).generate();
    assert!(markdown.contains("# Practice Session Review: AP Biology"));
    assert!(markdown.contains("| Multiple Choice | 1 of 3 correct (33%) |"));

    let dir = std::env::temp_dir().join(format!("practice-integration-{}", std::process::id()));
    let store = JsonFileStore::new(&dir);
    let path = store.save(&record).expect("saved record");
    assert_eq!(path, dir.join("integration-session.json"));

    let stored: SessionRecord =
        serde_json::from_str(&std::fs::read_to_string(&path).expect("stored file"))
            .expect("stored record");
    assert_eq!(stored, record);
    let _ = std::fs::remove_dir_all(&dir);
}
