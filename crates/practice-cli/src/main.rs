//! Practice Pipeline CLI
//!
//! Main entry point for serving the practice API and running the pipeline
//! stages from the command line.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Utc;
use clap::{Args as ClapArgs, Parser, Subcommand};
use practice_core::{
    create_router, Answer, AppState, CompletionClient, Config, Curriculum, Difficulty,
    GenerationRequest, GradingDispatcher, HttpCompletionClient, Question, QuestionGenerator,
    QuestionKind, TopicClassifier,
};
use practice_report::{JsonFileStore, MarkdownGenerator, SessionRecord, SessionStore};
use serde::Deserialize;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Default port for the HTTP API server.
const DEFAULT_PORT: u16 = 3000;

/// Default number of questions per generated set.
const DEFAULT_COUNT: u32 = 5;

/// Practice - adaptive practice question pipeline
///
/// Classifies study topics onto a course curriculum, generates practice
/// questions through a completion service, and grades learner answers.
#[derive(Parser, Debug)]
#[command(name = "practice")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: practice.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP API server
    Serve {
        /// Port for the HTTP API server
        #[arg(short, long, default_value_t = DEFAULT_PORT)]
        port: u16,
    },

    /// Classify a free-text topic and print the result as JSON
    Classify {
        /// Topic to classify
        #[arg(value_name = "TOPIC")]
        topic: String,
    },

    /// Generate a question set
    Generate(GenerateArgs),

    /// Grade answers and store the session
    Grade(GradeArgs),
}

#[derive(ClapArgs, Debug)]
struct GenerateArgs {
    /// Free-text topic to classify first
    #[arg(short, long, conflicts_with_all = ["course", "unit"], required_unless_present = "course")]
    topic: Option<String>,

    /// Course id or title
    #[arg(long)]
    course: Option<String>,

    /// Unit id or title (repeatable; omit for the whole course)
    #[arg(short, long, requires = "course")]
    unit: Vec<String>,

    /// Difficulty: beginner, intermediate, advanced, exam
    #[arg(short, long, value_parser = parse_difficulty)]
    difficulty: Option<Difficulty>,

    /// Number of questions
    #[arg(short = 'n', long, default_value_t = DEFAULT_COUNT)]
    count: u32,

    /// Question type: multiple_choice, free_response, document_based
    #[arg(short, long, value_parser = parse_kind, default_value = "multiple_choice")]
    kind: QuestionKind,

    /// Write the batch to FILE instead of stdout
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct GradeArgs {
    /// JSON file with a question array or a generated batch
    #[arg(short, long, value_name = "FILE")]
    questions: PathBuf,

    /// JSON file with an answer array (null for unanswered)
    #[arg(short, long, value_name = "FILE")]
    answers: PathBuf,

    /// Course id when the questions file does not name one
    #[arg(long)]
    course: Option<String>,

    /// Directory for session records (overrides outputDir)
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<String>,
}

fn parse_difficulty(s: &str) -> Result<Difficulty, String> {
    Difficulty::from_str_case_insensitive(s).ok_or_else(|| {
        format!("unknown difficulty '{s}' (expected beginner, intermediate, advanced or exam)")
    })
}

fn parse_kind(s: &str) -> Result<QuestionKind, String> {
    QuestionKind::from_str_case_insensitive(s).ok_or_else(|| {
        format!(
            "unknown question type '{s}' (expected multiple_choice, free_response or document_based)"
        )
    })
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, "Config file");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;

    match args.command {
        Command::Serve { port } => serve(config, port).await,
        Command::Classify { topic } => classify(&config, &topic),
        Command::Generate(generate_args) => generate(&config, generate_args).await,
        Command::Grade(grade_args) => grade(config, grade_args).await,
    }
}

/// Loads configuration from the specified path or default location.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

fn completion_client(config: &Config) -> anyhow::Result<Arc<dyn CompletionClient>> {
    let client = HttpCompletionClient::from_config(&config.completion)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    tracing::debug!(
        endpoint = client.endpoint(),
        model = %config.completion.model,
        "Completion client ready"
    );
    Ok(Arc::new(client))
}

async fn serve(config: Config, port: u16) -> anyhow::Result<()> {
    let client = completion_client(&config)?;
    print_config(&config);

    let addr: SocketAddr = ([127, 0, 0, 1], port).into();
    let router = create_router(AppState::new(config, client));

    let listener = TcpListener::bind(addr).await.map_err(|e| {
        anyhow::anyhow!(
            "Failed to bind to {addr}: {e}\n\nSuggestion: Try a different port with --port"
        )
    })?;

    println!("HTTP API server running on http://{addr}");
    println!("Press Ctrl+C to stop");
    tracing::info!(%addr, "Practice API listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl+C, shutting down");
            }
        })
        .await?;

    Ok(())
}

fn classify(config: &Config, topic: &str) -> anyhow::Result<()> {
    let classifier = TopicClassifier::new(config.classifier.clone());
    let result = classifier.classify(topic);
    tracing::info!(
        course = %result.course,
        confidence = result.confidence,
        "Topic classified"
    );
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

async fn generate(config: &Config, args: GenerateArgs) -> anyhow::Result<()> {
    let generator = QuestionGenerator::new(completion_client(config)?, config);

    let batch = match (args.topic, args.course) {
        (Some(topic), _) => {
            let (batch, classification) = generator
                .generate_for_topic(&topic, args.difficulty, args.count, args.kind)
                .await?;
            eprintln!(
                "Topic classified as {} (confidence {:.2})",
                classification.course, classification.confidence
            );
            batch
        }
        (None, Some(course)) => {
            let request = GenerationRequest {
                difficulty: args.difficulty.unwrap_or_default(),
                kind: args.kind,
                ..GenerationRequest::new(course, args.unit, args.count)
            };
            generator.generate(&request).await?
        }
        (None, None) => anyhow::bail!(
            "Nothing to generate\n\nSuggestion: Pass --topic or --course"
        ),
    };

    eprintln!(
        "Generated {} question(s) for {} in {} attempt(s)",
        batch.questions.len(),
        batch.course,
        batch.attempts.len()
    );

    let json = serde_json::to_string_pretty(&batch)?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, json).map_err(|e| {
                anyhow::anyhow!("Failed to write '{}': {e}", path.display())
            })?;
            println!("Questions written to {}", path.display());
        }
        None => println!("{json}"),
    }

    Ok(())
}

/// Contents of a `--questions` file.
///
/// Either a bare question array or an object carrying `questions`, such as
/// the output of `practice generate`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum QuestionsFile {
    Batch {
        questions: Vec<Question>,
        #[serde(default)]
        course: Option<String>,
        #[serde(default)]
        units: Vec<String>,
        #[serde(default)]
        difficulty: Option<Difficulty>,
    },
    List(Vec<Question>),
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> anyhow::Result<T> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read '{}': {e}", path.display()))?;
    serde_json::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Invalid JSON in '{}': {e}", path.display()))
}

/// The single question type of a set, if it has exactly one.
fn uniform_kind(questions: &[Question]) -> Option<QuestionKind> {
    let first = questions.first()?.kind();
    questions.iter().all(|q| q.kind() == first).then_some(first)
}

async fn grade(mut config: Config, args: GradeArgs) -> anyhow::Result<()> {
    if let Some(output_dir) = args.output_dir {
        config.output_dir = output_dir;
        config.validate()?;
    }

    let (questions, course, units, difficulty) = match read_json(&args.questions)? {
        QuestionsFile::Batch {
            questions,
            course,
            units,
            difficulty,
        } => (questions, course.or(args.course), units, difficulty),
        QuestionsFile::List(questions) => (questions, args.course, Vec::new(), None),
    };
    let answers: Vec<Option<Answer>> = read_json(&args.answers)?;

    if questions.is_empty() {
        anyhow::bail!("No questions found in '{}'", args.questions.display());
    }
    if answers.len() != questions.len() {
        tracing::warn!(
            questions = questions.len(),
            answers = answers.len(),
            "Answer count does not match question count"
        );
    }

    let course = course.unwrap_or_else(|| Curriculum::builtin().default_course.to_string());
    let grader = GradingDispatcher::new(completion_client(&config)?, &config);

    let started_at = Utc::now();
    let batch = grader.grade_batch(&questions, &answers).await;
    let completed_at = Utc::now();

    let mut builder = SessionRecord::builder()
        .course(course)
        .units(units)
        .difficulty(difficulty.unwrap_or_default())
        .batch(batch)
        .started_at(started_at)
        .completed_at(completed_at);
    if let Some(kind) = uniform_kind(&questions) {
        builder = builder.test_type(kind);
    }
    let record = builder.build()?;

    println!("{}", MarkdownGenerator::new(&record).generate());

    let store = JsonFileStore::new(&config.output_dir);
    let path = store.save(&record)?;
    println!("Session saved to {}", path.display());

    Ok(())
}

/// Prints the loaded configuration.
fn print_config(config: &Config) {
    println!("Configuration loaded:");
    println!("  Completion endpoint: {}", config.completion.base_url);
    println!("  Model: {}", config.completion.model);
    println!(
        "  Generation timeout: {}s",
        config.generation.timeout_seconds
    );
    println!("  Grading timeout: {}s", config.grading.timeout_seconds);
    println!("  Output directory: {}", config.output_dir);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate_for_course() {
        let args = Args::try_parse_from([
            "practice",
            "generate",
            "--course",
            "ap-biology",
            "--unit",
            "unit-2",
            "--unit",
            "unit-3",
            "--difficulty",
            "hard",
            "-n",
            "3",
        ])
        .unwrap();

        let Command::Generate(generate) = args.command else {
            unreachable!("expected generate")
        };
        assert_eq!(generate.course.as_deref(), Some("ap-biology"));
        assert_eq!(generate.unit, vec!["unit-2", "unit-3"]);
        assert_eq!(generate.difficulty, Some(Difficulty::Advanced));
        assert_eq!(generate.count, 3);
        assert_eq!(generate.kind, QuestionKind::MultipleChoice);
    }

    #[test]
    fn test_generate_requires_topic_or_course() {
        assert!(Args::try_parse_from(["practice", "generate"]).is_err());
        assert!(Args::try_parse_from([
            "practice", "generate", "--topic", "cells", "--course", "ap-biology"
        ])
        .is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let args =
            Args::try_parse_from(["practice", "classify", "photosynthesis", "--verbose"]).unwrap();
        assert!(args.verbose);
        assert!(matches!(args.command, Command::Classify { ref topic } if topic == "photosynthesis"));
    }

    #[test]
    fn test_serve_default_port() {
        let args = Args::try_parse_from(["practice", "serve"]).unwrap();
        assert!(matches!(args.command, Command::Serve { port: DEFAULT_PORT }));
    }

    #[test]
    fn test_rejects_unknown_kind() {
        assert!(Args::try_parse_from([
            "practice", "generate", "--topic", "cells", "--kind", "essay_plus"
        ])
        .is_err());
    }

    #[test]
    fn test_questions_file_accepts_list_and_batch() {
        let list = r#"[{"id":"q1","type":"free_response","content":"Explain osmosis."}]"#;
        let parsed: QuestionsFile = serde_json::from_str(list).unwrap();
        assert!(matches!(parsed, QuestionsFile::List(ref q) if q.len() == 1));

        let batch = r#"{
            "questions": [{"id":"q1","type":"free_response","content":"Explain osmosis."}],
            "course": "ap-biology",
            "units": ["unit-2"],
            "difficulty": "advanced",
            "attempts": []
        }"#;
        let parsed: QuestionsFile = serde_json::from_str(batch).unwrap();
        let QuestionsFile::Batch {
            course, difficulty, ..
        } = parsed
        else {
            unreachable!("expected batch")
        };
        assert_eq!(course.as_deref(), Some("ap-biology"));
        assert_eq!(difficulty, Some(Difficulty::Advanced));
    }

    #[test]
    fn test_uniform_kind() {
        let essay = Question::free_response("q1", "Explain osmosis.", None);
        let choice = Question::multiple_choice(
            "q2",
            "Pick one",
            vec![
                practice_core::AnswerOption::new("A", "x"),
                practice_core::AnswerOption::new("B", "y"),
            ],
            "A",
        );
        assert_eq!(
            uniform_kind(&[essay.clone(), essay.clone()]),
            Some(QuestionKind::FreeResponse)
        );
        assert_eq!(uniform_kind(&[essay, choice]), None);
        assert_eq!(uniform_kind(&[]), None);
    }
}
