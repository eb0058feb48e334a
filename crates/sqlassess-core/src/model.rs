use serde::{Deserialize, Serialize};

/// Placeholder for a key category the completion service did not report.
pub const NONE_FOUND: &str = "None found";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmResponse {
    pub text: String,
    pub provider: String,
    pub model: String,
}

/// Key listing described by the completion service. Free text, never computed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct KeyInfo {
    #[serde(default = "none_found")]
    pub candidate_key: String,
    #[serde(default = "none_found")]
    pub primary_key: String,
    #[serde(default = "none_found")]
    pub foreign_key: String,
    #[serde(default = "none_found")]
    pub composite_key: String,
}

fn none_found() -> String {
    NONE_FOUND.to_string()
}

impl Default for KeyInfo {
    fn default() -> Self {
        Self {
            candidate_key: none_found(),
            primary_key: none_found(),
            foreign_key: none_found(),
            composite_key: none_found(),
        }
    }
}

/// Which key categories the key identification prompt asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyDetail {
    /// Primary and foreign keys only.
    #[default]
    Basic,
    /// Adds candidate and composite keys.
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionCounts {
    #[serde(default)]
    pub easy: u32,
    #[serde(default)]
    pub medium: u32,
    #[serde(default)]
    pub hard: u32,
}

impl Default for QuestionCounts {
    fn default() -> Self {
        Self {
            easy: 5,
            medium: 5,
            hard: 5,
        }
    }
}

impl QuestionCounts {
    /// Saturates instead of overflowing on absurd counts.
    pub fn total(&self) -> u32 {
        self.easy.saturating_add(self.medium).saturating_add(self.hard)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuestion {
    pub difficulty: Option<Difficulty>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub test_id: String,
    pub question_number: u32,
    pub question_text: String,
    #[serde(default = "default_marks")]
    pub marks: u32,
    /// Back-filled by answer generation; may stay absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
}

fn default_marks() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Test {
    pub id: String,
    pub name: String,
    pub schema: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_info: Option<KeyInfo>,
    pub created_at: String,
    /// Ordered by question number.
    pub questions: Vec<Question>,
}

/// Input for creating a test; question order is kept as given.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDraft {
    pub name: String,
    pub schema: String,
    #[serde(default)]
    pub key_info: Option<KeyInfo>,
    pub questions: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedAnswer {
    pub question_id: String,
    pub question_text: String,
    pub submitted_answer: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GradeResult {
    Correct,
    Incorrect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradedAnswer {
    pub question_id: String,
    pub question_text: String,
    pub submitted_answer: String,
    pub result: GradeResult,
    /// Present only for incorrect answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feedback: Option<String>,
    pub score: u32,
}

impl GradedAnswer {
    pub fn new(question: &Question, submitted_answer: &str, grade: ParsedGrade) -> Self {
        let score = match grade.result {
            GradeResult::Correct => 1,
            GradeResult::Incorrect => 0,
        };
        Self {
            question_id: question.id.clone(),
            question_text: question.question_text.clone(),
            submitted_answer: submitted_answer.to_string(),
            result: grade.result,
            feedback: grade.feedback,
            score,
        }
    }
}

/// Verdict extracted from a grading completion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedGrade {
    pub result: GradeResult,
    pub feedback: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceStatus {
    Submitted,
    Graded,
}

/// One learner's submission and grading state for one test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Performance {
    pub test_id: String,
    pub test_name: String,
    pub submitted_answers: Vec<SubmittedAnswer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graded_answers: Option<Vec<GradedAnswer>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_possible_score: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graded_at: Option<String>,
}

impl Performance {
    pub fn status(&self) -> PerformanceStatus {
        if self.graded_answers.is_some() {
            PerformanceStatus::Graded
        } else {
            PerformanceStatus::Submitted
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub performance: Vec<Performance>,
}

impl Student {
    pub fn performance_for(&self, test_id: &str) -> Option<&Performance> {
        self.performance.iter().find(|p| p.test_id == test_id)
    }
}

/// Result of one grading run, written back as a whole.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradingOutcome {
    pub total_score: u32,
    pub total_possible_score: u32,
    pub graded_answers: Vec<GradedAnswer>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flashcard {
    pub question: String,
    pub answer: String,
}
