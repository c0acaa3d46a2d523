//! Configuration types for the practice pipeline.
//!
//! Settings are read from `practice.json`. Every field has a default, unknown
//! fields are ignored, and the loaded values are validated before use.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{PracticeError, Result};

/// The default config file name.
const CONFIG_FILE_NAME: &str = "practice.json";

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

const fn default_generation_temperature() -> f32 {
    0.7
}

const fn default_grading_temperature() -> f32 {
    0.2
}

/// Default per-call budget for completion requests.
const fn default_timeout_seconds() -> u64 {
    30
}

const fn default_retry_delay_ms() -> u64 {
    1000
}

const fn default_max_question_count() -> u32 {
    20
}

const fn default_course_keyword_weight() -> u32 {
    3
}

const fn default_unit_keyword_weight() -> u32 {
    2
}

const fn default_cross_cutting_weight() -> u32 {
    1
}

const fn default_max_possible_score() -> f64 {
    10.0
}

const fn default_default_confidence() -> f64 {
    0.1
}

fn default_output_dir() -> String {
    ".practice/sessions".to_string()
}

/// Main configuration for the practice pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Completion service connection settings.
    #[serde(default)]
    pub completion: CompletionConfig,

    /// Question generation settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Grading settings.
    #[serde(default)]
    pub grading: GradingConfig,

    /// Topic classifier calibration.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Directory where graded session records are written.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            completion: CompletionConfig::default(),
            generation: GenerationConfig::default(),
            grading: GradingConfig::default(),
            classifier: ClassifierConfig::default(),
            output_dir: default_output_dir(),
        }
    }
}

impl Config {
    /// Loads configuration from the current working directory.
    ///
    /// # Errors
    ///
    /// Returns an error if `practice.json` exists but is invalid.
    pub fn load() -> Result<Self> {
        let current_dir = std::env::current_dir().map_err(|e| {
            PracticeError::config_parse(
                "<current directory>",
                format!("cannot determine current directory: {e}"),
            )
        })?;
        Self::load_from_dir(&current_dir)
    }

    /// Loads configuration from `practice.json` in a specific directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        Self::load_from_file(&dir.join(CONFIG_FILE_NAME))
    }

    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::ConfigParseError` for unreadable or malformed
    /// JSON and `PracticeError::ConfigValidationError` for invalid values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let config = Self::default();
                config.validate()?;
                return Ok(config);
            }
            Err(e) => {
                return Err(PracticeError::config_parse(
                    path,
                    format!("failed to read file: {e}"),
                ));
            }
        };

        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| PracticeError::config_parse(path, e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `PracticeError::ConfigValidationError` naming the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if self.completion.base_url.trim().is_empty() {
            return Err(PracticeError::config_validation(
                "completion.baseUrl must not be empty",
                "Set completion.baseUrl to your completion service endpoint in practice.json",
            ));
        }

        if self.completion.model.trim().is_empty() {
            return Err(PracticeError::config_validation(
                "completion.model must not be empty",
                "Set completion.model to a model name in practice.json",
            ));
        }

        for (name, value) in [
            (
                "completion.generationTemperature",
                self.completion.generation_temperature,
            ),
            (
                "completion.gradingTemperature",
                self.completion.grading_temperature,
            ),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(PracticeError::config_validation(
                    format!("{name} must be between 0 and 2"),
                    format!("Set {name} to a value between 0 and 2 in practice.json"),
                ));
            }
        }

        if self.generation.timeout_seconds == 0 {
            return Err(PracticeError::config_validation(
                "generation.timeoutSeconds must be greater than 0",
                "Set generation.timeoutSeconds to at least 1 second in practice.json",
            ));
        }

        if self.generation.max_question_count == 0 {
            return Err(PracticeError::config_validation(
                "generation.maxQuestionCount must be greater than 0",
                "Set generation.maxQuestionCount to at least 1 in practice.json",
            ));
        }

        if self.grading.timeout_seconds == 0 {
            return Err(PracticeError::config_validation(
                "grading.timeoutSeconds must be greater than 0",
                "Set grading.timeoutSeconds to at least 1 second in practice.json",
            ));
        }

        if self.classifier.max_possible_score <= 0.0 {
            return Err(PracticeError::config_validation(
                "classifier.maxPossibleScore must be greater than 0",
                "Set classifier.maxPossibleScore to a positive number in practice.json",
            ));
        }

        if !(0.0..=1.0).contains(&self.classifier.default_confidence) {
            return Err(PracticeError::config_validation(
                "classifier.defaultConfidence must be between 0 and 1",
                "Set classifier.defaultConfidence to a value between 0 and 1 in practice.json",
            ));
        }

        if self.output_dir.trim().is_empty() {
            return Err(PracticeError::config_validation(
                "outputDir must not be empty",
                "Provide a valid output directory path in practice.json",
            ));
        }

        Ok(())
    }
}

/// Connection settings for the completion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionConfig {
    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Environment variable holding the API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Sampling temperature for question generation.
    #[serde(default = "default_generation_temperature")]
    pub generation_temperature: f32,

    /// Sampling temperature for grading and explanations.
    #[serde(default = "default_grading_temperature")]
    pub grading_temperature: f32,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            generation_temperature: default_generation_temperature(),
            grading_temperature: default_grading_temperature(),
        }
    }
}

/// Settings for the generation orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    /// Budget for each completion call, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Delay between attempts, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Upper bound on questions per request.
    #[serde(default = "default_max_question_count")]
    pub max_question_count: u32,
}

impl GenerationConfig {
    /// Per-call timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
            retry_delay_ms: default_retry_delay_ms(),
            max_question_count: default_max_question_count(),
        }
    }
}

/// Settings for the grading dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingConfig {
    /// Budget for each completion call, in seconds.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl GradingConfig {
    /// Per-call timeout as a `Duration`.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for GradingConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout_seconds(),
        }
    }
}

/// Keyword-scoring calibration for the topic classifier.
///
/// These weights are tunable; the defaults have no derivation beyond
/// producing sensible rankings on typical input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifierConfig {
    /// Points per matching course-name keyword.
    #[serde(default = "default_course_keyword_weight")]
    pub course_keyword_weight: u32,

    /// Points per matching unit keyword.
    #[serde(default = "default_unit_keyword_weight")]
    pub unit_keyword_weight: u32,

    /// Points per matching cross-cutting keyword.
    #[serde(default = "default_cross_cutting_weight")]
    pub cross_cutting_weight: u32,

    /// Score that maps to full confidence.
    #[serde(default = "default_max_possible_score")]
    pub max_possible_score: f64,

    /// Confidence reported when nothing matched.
    #[serde(default = "default_default_confidence")]
    pub default_confidence: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            course_keyword_weight: default_course_keyword_weight(),
            unit_keyword_weight: default_unit_keyword_weight(),
            cross_cutting_weight: default_cross_cutting_weight(),
            max_possible_score: default_max_possible_score(),
            default_confidence: default_default_confidence(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn test_config_default_values() {
        let config: Config = serde_json::from_str("{}").unwrap();

        assert_eq!(config.completion.base_url, "https://api.openai.com/v1");
        assert_eq!(config.completion.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.generation.timeout_seconds, 30);
        assert_eq!(config.generation.retry_delay_ms, 1000);
        assert_eq!(config.grading.timeout_seconds, 30);
        assert_eq!(config.output_dir, ".practice/sessions");
    }

    #[test]
    fn test_classifier_defaults_preserve_calibration() {
        let classifier = ClassifierConfig::default();

        assert_eq!(classifier.course_keyword_weight, 3);
        assert_eq!(classifier.unit_keyword_weight, 2);
        assert_eq!(classifier.max_possible_score, 10.0);
        assert_eq!(classifier.default_confidence, 0.1);
    }

    #[test]
    fn test_config_deserialization_with_overrides() {
        let json = r#"{
            "completion": { "model": "local-model", "baseUrl": "http://localhost:8080/v1" },
            "generation": { "retryDelayMs": 0 },
            "classifier": { "maxPossibleScore": 12.5 }
        }"#;
        let config: Config = serde_json::from_str(json).unwrap();

        assert_eq!(config.completion.model, "local-model");
        assert_eq!(config.completion.base_url, "http://localhost:8080/v1");
        assert_eq!(config.generation.retry_delay_ms, 0);
        assert_eq!(config.generation.timeout_seconds, 30);
        assert_eq!(config.classifier.max_possible_score, 12.5);
        assert_eq!(config.classifier.course_keyword_weight, 3);
    }

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{ "outputDir": "out", "somethingElse": true }"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.output_dir, "out");
    }

    #[test]
    fn test_load_from_file_nonexistent_returns_default() {
        let config = Config::load_from_file(&PathBuf::from("/nonexistent/practice.json")).unwrap();
        assert_eq!(config.generation.timeout_seconds, 30);
        assert_eq!(config.output_dir, ".practice/sessions");
    }

    #[test]
    fn test_load_from_file_invalid_json() {
        let config_path = std::env::temp_dir().join("test_practice_invalid.json");
        let mut file = std::fs::File::create(&config_path).unwrap();
        file.write_all(b"{ not valid json }").unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(
            matches!(&err, PracticeError::ConfigParseError { path, .. } if *path == config_path),
            "Expected ConfigParseError, got: {err:?}"
        );

        std::fs::remove_file(&config_path).ok();
    }

    #[test]
    fn test_load_from_dir_finds_practice_json() {
        let temp_dir = std::env::temp_dir().join("test_practice_dir");
        std::fs::create_dir_all(&temp_dir).unwrap();
        let config_path = temp_dir.join("practice.json");
        std::fs::write(&config_path, r#"{"grading": {"timeoutSeconds": 12}}"#).unwrap();

        let config = Config::load_from_dir(&temp_dir).unwrap();
        assert_eq!(config.grading.timeout_seconds, 12);

        std::fs::remove_file(&config_path).ok();
        std::fs::remove_dir(&temp_dir).ok();
    }

    #[test]
    fn test_load_from_file_validates_after_parsing() {
        let config_path = std::env::temp_dir().join("test_practice_validation.json");
        std::fs::write(&config_path, r#"{"generation": {"timeoutSeconds": 0}}"#).unwrap();

        let err = Config::load_from_file(&config_path).unwrap_err();
        assert!(
            matches!(&err, PracticeError::ConfigValidationError { message, .. } if message.contains("timeoutSeconds")),
            "Expected ConfigValidationError, got: {err:?}"
        );

        std::fs::remove_file(&config_path).ok();
    }

    #[test]
    fn test_validation_rejects_bad_classifier_values() {
        let mut config = Config::default();
        config.classifier.max_possible_score = 0.0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.classifier.default_confidence = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_out_of_range_temperature() {
        let mut config = Config::default();
        config.completion.grading_temperature = 3.0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("gradingTemperature"));
    }

    #[test]
    fn test_validation_rejects_empty_output_dir() {
        let config = Config {
            output_dir: "   ".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_default_config_passes_validation() {
        assert!(Config::default().validate().is_ok());
    }
}
