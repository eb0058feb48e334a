//! Prompt templates for the completion service.
//!
//! Every template closes with an instruction naming the exact output grammar
//! that `parser` expects; the labels come from `parser` so both sides agree.

use crate::model::{KeyDetail, KeyInfo, QuestionCounts};
use crate::parser::{KeyCategory, ANSWER_LABEL, QUESTION_LABEL};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Phrases mixed into flashcard prompts so repeated calls on one topic differ.
pub const VARIATIONS: &[&str] = &[
    "Focus on a lesser-known aspect of the topic.",
    "Frame it around a real-world business situation.",
    "Target a common misconception learners have.",
    "Make it suitable for a quick interview warm-up.",
    "Emphasise edge cases and tricky details.",
    "Relate it to performance or efficiency concerns.",
    "Compare two related concepts within the topic.",
    "Start from a small concrete example dataset.",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlashcardKind {
    Scenario,
    Theory,
    Coding,
}

impl FlashcardKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlashcardKind::Scenario => "scenario",
            FlashcardKind::Theory => "theory",
            FlashcardKind::Coding => "coding",
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            FlashcardKind::Scenario => {
                "Describe a short practical scenario and ask how the learner would handle it."
            }
            FlashcardKind::Theory => "Ask a conceptual question that tests understanding.",
            FlashcardKind::Coding => {
                "Ask the learner to write a short piece of code or a query; the answer must contain it."
            }
        }
    }
}

impl FromStr for FlashcardKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "scenario" => Ok(FlashcardKind::Scenario),
            "theory" => Ok(FlashcardKind::Theory),
            "coding" => Ok(FlashcardKind::Coding),
            other => Err(format!(
                "unknown question type '{}' (expected scenario|theory|coding)",
                other
            )),
        }
    }
}

pub fn pick_variation<R: Rng + ?Sized>(rng: &mut R) -> &'static str {
    VARIATIONS.choose(rng).copied().unwrap_or(VARIATIONS[0])
}

fn key_categories(detail: KeyDetail) -> &'static [KeyCategory] {
    match detail {
        KeyDetail::Basic => &[KeyCategory::Primary, KeyCategory::Foreign],
        KeyDetail::Extended => &[
            KeyCategory::Candidate,
            KeyCategory::Primary,
            KeyCategory::Foreign,
            KeyCategory::Composite,
        ],
    }
}

pub fn key_identification(tables: &str, detail: KeyDetail) -> String {
    let categories = key_categories(detail);
    let names = categories
        .iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(", ");
    let grammar = categories
        .iter()
        .map(|c| format!("{} [table.column, ...] or {} None found", c.label(), c.label()))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are a relational database expert.\n\n\
         Given the following table schemas:\n\n\
         {tables}\n\n\
         Identify the {names} across these tables.\n\n\
         Respond with exactly one line per key category and nothing else, in this order:\n\
         {grammar}\n\n\
         Use a bracketed list of table.column names, or the literal text None found when a category does not apply. \
         Do not add explanations, headings or any other lines."
    )
}

/// Question generation for one schema, or several tables when key info is given.
pub fn question_generation(
    schema: &str,
    key_info: Option<&KeyInfo>,
    counts: QuestionCounts,
) -> String {
    let mut prompt = String::new();
    match key_info {
        None => {
            prompt.push_str("Given the following SQL table schema:\n\n");
            prompt.push_str(schema);
            prompt.push_str("\n\n");
        }
        Some(keys) => {
            prompt.push_str("Given the following SQL table schemas:\n\n");
            prompt.push_str(schema);
            prompt.push_str("\n\nand the following key information:\n");
            for category in KeyCategory::ALL {
                prompt.push_str(&format!("{} {}\n", category.label(), category.value(keys)));
            }
            prompt.push_str(
                "\nInclude questions that require joining the tables through these keys.\n\n",
            );
        }
    }

    prompt.push_str(&format!(
        "Generate SQL questions based on Bloom's Taxonomy:\n\
         - {} easy questions (Remembering/Understanding)\n\
         - {} medium questions (Applying/Analyzing)\n\
         - {} hard questions (Evaluating/Creating)\n\n\
         Format: a heading line \"Easy Questions:\", \"Medium Questions:\" and \"Hard Questions:\" \
         before each group, then one numbered question per line (1., 2., ...).\n\
         Only generate questions. Do not provide answers, hints or explanations.",
        counts.easy, counts.medium, counts.hard
    ));
    prompt
}

pub fn answer_generation(schema: &str, question: &str) -> String {
    format!(
        "Given the following SQL table schema:\n\n\
         {schema}\n\n\
         Provide the correct SQL answer for the following question:\n\n\
         {question}\n\n\
         Respond with exactly one SQL query and nothing else: no explanation, no comments, no surrounding prose."
    )
}

pub fn grading(schema: &str, question: &str, submitted_answer: &str) -> String {
    format!(
        "You are an SQL expert.\n\n\
         Given the following SQL table schema:\n\n\
         {schema}\n\n\
         Question: {question}\n\n\
         Student Answer: {submitted_answer}\n\n\
         Evaluate the student's answer based on:\n\
         - Logical correctness according to the schema\n\
         - Syntactical correctness of the SQL query\n\n\
         The first line of your response must be exactly one word: Correct or Incorrect.\n\
         If the answer is Correct, write nothing else.\n\
         If the answer is Incorrect, follow the first line with:\n\
         Issue: <what is wrong>\n\
         Fix: <how to correct it>\n\
         Do not include any other text."
    )
}

pub fn flashcard(topic: &str, kind: FlashcardKind, variation: &str) -> String {
    format!(
        "Create one {kind} flashcard about the topic: {topic}.\n\
         {instruction}\n\
         {variation}\n\n\
         Respond only in this exact format and nothing else:\n\
         {QUESTION_LABEL} <the question>\n\
         {ANSWER_LABEL} <the answer>",
        kind = kind.as_str(),
        instruction = kind.instruction(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_key_prompt_mandates_grammar() {
        let p = key_identification("CREATE TABLE a (\n    id INT\n);", KeyDetail::Basic);
        assert!(p.contains("Primary Key:"));
        assert!(p.contains("Foreign Key:"));
        assert!(!p.contains("Candidate Key:"));
        assert!(p.contains("None found"));

        let p = key_identification("CREATE TABLE a (\n    id INT\n);", KeyDetail::Extended);
        assert!(p.contains("Candidate Key:"));
        assert!(p.contains("Composite Key:"));
    }

    #[test]
    fn test_question_prompt_counts_and_no_answers() {
        let counts = QuestionCounts {
            easy: 2,
            medium: 3,
            hard: 4,
        };
        let p = question_generation("CREATE TABLE t (\n    id INT\n);", None, counts);
        assert!(p.contains("2 easy questions"));
        assert!(p.contains("3 medium questions"));
        assert!(p.contains("4 hard questions"));
        assert!(p.contains("Do not provide answers"));
        assert!(!p.contains("key information"));

        let keys = KeyInfo {
            primary_key: "[orders.id]".into(),
            ..KeyInfo::default()
        };
        let p = question_generation("Table: orders", Some(&keys), counts);
        assert!(p.contains("Primary Key: [orders.id]"));
        assert!(p.contains("Foreign Key: None found"));
    }

    #[test]
    fn test_prompts_are_deterministic() {
        assert_eq!(answer_generation("s", "q"), answer_generation("s", "q"));
        let g = grading("s", "List rows", "SELECT * FROM t");
        assert_eq!(g, grading("s", "List rows", "SELECT * FROM t"));
        assert!(g.contains("Student Answer: SELECT * FROM t"));
        assert!(g.contains("Correct or Incorrect"));
    }

    #[test]
    fn test_flashcard_prompt_and_variation() {
        let mut rng = StdRng::seed_from_u64(7);
        let v = pick_variation(&mut rng);
        assert!(VARIATIONS.contains(&v));

        let p = flashcard("window functions", FlashcardKind::Coding, v);
        assert!(p.contains("coding flashcard"));
        assert!(p.contains(v));
        assert!(p.contains("Question: <the question>"));
        assert!(p.contains("Answer: <the answer>"));
    }

    #[test]
    fn test_flashcard_kind_parse() {
        assert_eq!("Theory".parse::<FlashcardKind>(), Ok(FlashcardKind::Theory));
        assert!("essay".parse::<FlashcardKind>().is_err());
    }
}
