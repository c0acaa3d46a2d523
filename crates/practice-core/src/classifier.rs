//! Topic classification by weighted keyword scoring.
//!
//! [`TopicClassifier::classify`] maps a free-text topic onto a course and a
//! set of units from a [`Curriculum`]. It is pure and never fails: input that
//! matches nothing lands on the curriculum's default course with the
//! configured default confidence.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::ClassifierConfig;
use crate::curriculum::{Course, Curriculum};

/// Number of runner-up courses reported as fallbacks.
const MAX_FALLBACKS: usize = 2;

const EXAM_TERMS: &[&str] = &[
    "exam",
    "test prep",
    "practice test",
    "mock test",
    "get a 5",
    "score a 5",
];

const ADVANCED_TERMS: &[&str] = &[
    "advanced",
    "hard",
    "difficult",
    "challenging",
    "in-depth",
    "in depth",
    "complex",
];

const BEGINNER_TERMS: &[&str] = &[
    "beginner",
    "basic",
    "intro",
    "easy",
    "simple",
    "first time",
    "new to",
];

// ============================================================================
// Difficulty
// ============================================================================

/// Difficulty tier of a practice set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Difficulty {
    /// Foundational questions.
    Beginner,
    /// Standard course-level questions (default).
    #[default]
    Intermediate,
    /// Harder, multi-step questions.
    Advanced,
    /// Questions modeled on the end-of-course exam.
    Exam,
}

impl Difficulty {
    /// Parses a string into a `Difficulty`, case-insensitively.
    ///
    /// `easy`, `medium` and `hard` are accepted as aliases.
    pub fn from_str_case_insensitive(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "beginner" | "easy" => Some(Self::Beginner),
            "intermediate" | "medium" => Some(Self::Intermediate),
            "advanced" | "hard" => Some(Self::Advanced),
            "exam" | "exam_level" | "exam-level" => Some(Self::Exam),
            _ => None,
        }
    }

    /// The canonical wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Exam => "exam",
        }
    }

    /// Suggests a difficulty from the wording of a topic.
    ///
    /// Exam terms win over advanced terms, which win over beginner terms.
    #[must_use]
    pub fn suggest(normalized_topic: &str) -> Self {
        let mentions = |terms: &[&str]| terms.iter().any(|t| normalized_topic.contains(t));
        if mentions(EXAM_TERMS) {
            Self::Exam
        } else if mentions(ADVANCED_TERMS) {
            Self::Advanced
        } else if mentions(BEGINNER_TERMS) {
            Self::Beginner
        } else {
            Self::Intermediate
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_str_case_insensitive(&s).ok_or_else(|| {
            serde::de::Error::custom(format!(
                "invalid difficulty '{s}': expected one of 'beginner', 'intermediate', 'advanced', 'exam'"
            ))
        })
    }
}

impl Serialize for Difficulty {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

// ============================================================================
// Results
// ============================================================================

/// A course candidate with the units that supported it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseMatch {
    /// Course id.
    pub course: String,
    /// Unit ids, touched by keywords or the course default.
    pub units: BTreeSet<String>,
    /// Strength of the keyword evidence, `0.0..=1.0`.
    pub confidence: f64,
}

/// Outcome of classifying a topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassificationResult {
    /// Winning course id.
    pub course: String,
    /// Selected unit ids of the winning course.
    pub units: BTreeSet<String>,
    /// Strength of the keyword evidence, `0.0..=1.0`.
    pub confidence: f64,
    /// Difficulty suggested by the topic wording.
    pub suggested_difficulty: Difficulty,
    /// Runner-up courses, best first.
    pub fallbacks: Vec<CourseMatch>,
}

// ============================================================================
// Classifier
// ============================================================================

#[derive(Debug, Clone, Default)]
struct Tally {
    score: u32,
    units: BTreeSet<&'static str>,
}

/// Keyword-scoring topic classifier.
#[derive(Debug, Clone)]
pub struct TopicClassifier {
    curriculum: &'static Curriculum,
    config: ClassifierConfig,
}

impl Default for TopicClassifier {
    fn default() -> Self {
        Self::new(ClassifierConfig::default())
    }
}

impl TopicClassifier {
    /// Creates a classifier over the built-in curriculum.
    #[must_use]
    pub fn new(config: ClassifierConfig) -> Self {
        Self::with_curriculum(Curriculum::builtin(), config)
    }

    /// Creates a classifier over a specific curriculum.
    #[must_use]
    pub const fn with_curriculum(curriculum: &'static Curriculum, config: ClassifierConfig) -> Self {
        Self { curriculum, config }
    }

    /// The curriculum this classifier scores against.
    #[must_use]
    pub const fn curriculum(&self) -> &'static Curriculum {
        self.curriculum
    }

    /// Classifies a free-text topic.
    pub fn classify(&self, topic: &str) -> ClassificationResult {
        let normalized = topic.trim().to_lowercase();
        let suggested_difficulty = Difficulty::suggest(&normalized);
        let tallies = self.score(&normalized);

        let mut ranked: Vec<usize> = (0..tallies.len()).filter(|&i| tallies[i].score > 0).collect();
        // Stable sort keeps curriculum order among equal scores.
        ranked.sort_by(|&a, &b| tallies[b].score.cmp(&tallies[a].score));

        let Some((&winner, runners_up)) = ranked.split_first() else {
            return self.default_result(suggested_difficulty);
        };

        let best = self.course_match(winner, &tallies[winner]);
        let fallbacks = runners_up
            .iter()
            .take(MAX_FALLBACKS)
            .map(|&i| self.course_match(i, &tallies[i]))
            .collect();

        tracing::debug!(
            course = %best.course,
            score = tallies[winner].score,
            confidence = best.confidence,
            "Classified topic"
        );

        ClassificationResult {
            course: best.course,
            units: best.units,
            confidence: best.confidence,
            suggested_difficulty,
            fallbacks,
        }
    }

    fn score(&self, normalized: &str) -> Vec<Tally> {
        let courses = self.curriculum.courses;
        let mut tallies = vec![Tally::default(); courses.len()];

        for (course, tally) in courses.iter().zip(tallies.iter_mut()) {
            for keyword in course.keywords {
                if normalized.contains(keyword) {
                    tally.score += self.config.course_keyword_weight;
                }
            }
            for unit in course.units {
                for keyword in unit.keywords {
                    if normalized.contains(keyword) {
                        tally.score += self.config.unit_keyword_weight;
                        tally.units.insert(unit.id);
                    }
                }
            }
        }

        for group in self.curriculum.cross_cutting {
            let [Some(a), Some(b)] = group.courses.map(|id| self.curriculum.position(id)) else {
                continue;
            };
            let Some(default) = self.curriculum.position(group.default_course) else {
                continue;
            };
            for keyword in group.keywords {
                if !normalized.contains(keyword) {
                    continue;
                }
                let target = match (tallies[a].score > 0, tallies[b].score > 0) {
                    (true, false) => a,
                    (false, true) => b,
                    _ => {
                        let course = &courses[default];
                        tallies[default].units.insert(course.default_unit);
                        default
                    }
                };
                tallies[target].score += self.config.cross_cutting_weight;
            }
        }

        tallies
    }

    fn confidence(&self, score: u32) -> f64 {
        (f64::from(score) / self.config.max_possible_score).min(1.0)
    }

    fn course_match(&self, index: usize, tally: &Tally) -> CourseMatch {
        let course = &self.curriculum.courses[index];
        CourseMatch {
            course: course.id.to_string(),
            units: selected_units(course, tally),
            confidence: self.confidence(tally.score),
        }
    }

    fn default_result(&self, suggested_difficulty: Difficulty) -> ClassificationResult {
        let course_id = self.curriculum.default_course;
        let default_unit = self
            .curriculum
            .course(course_id)
            .map_or("", |c| c.default_unit);

        tracing::debug!(course = %course_id, "No keyword evidence; using default course");

        ClassificationResult {
            course: course_id.to_string(),
            units: std::iter::once(default_unit.to_string())
                .filter(|u| !u.is_empty())
                .collect(),
            confidence: self.config.default_confidence,
            suggested_difficulty,
            fallbacks: Vec::new(),
        }
    }
}

fn selected_units(course: &Course, tally: &Tally) -> BTreeSet<String> {
    if tally.units.is_empty() {
        std::iter::once(course.default_unit.to_string()).collect()
    } else {
        tally.units.iter().map(|u| (*u).to_string()).collect()
    }
}
