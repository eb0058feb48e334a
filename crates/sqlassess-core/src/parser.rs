//! Line-prefix grammar over completion text.
//!
//! Every parser here except `parse_flashcard` is total: unexpected text
//! degrades to a conservative default and is logged as a parse fallback.

use crate::errors::{AssessError, AssessResult};
use crate::model::{
    Difficulty, Flashcard, GeneratedQuestion, GradeResult, KeyInfo, ParsedGrade, NONE_FOUND,
};
use regex::Regex;
use std::sync::OnceLock;

pub const QUESTION_LABEL: &str = "Question:";
pub const ANSWER_LABEL: &str = "Answer:";
pub const VERDICT_CORRECT: &str = "Correct";
pub const VERDICT_INCORRECT: &str = "Incorrect";

/// Feedback attached when a grading response cannot be interpreted.
pub const UNGRADABLE_FEEDBACK: &str =
    "The grading response could not be interpreted, so the answer was marked incorrect.";
pub const NO_FEEDBACK: &str = "No feedback was provided.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCategory {
    Candidate,
    Primary,
    Foreign,
    Composite,
}

impl KeyCategory {
    /// Fixed matching order.
    pub const ALL: [KeyCategory; 4] = [
        KeyCategory::Candidate,
        KeyCategory::Primary,
        KeyCategory::Foreign,
        KeyCategory::Composite,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            KeyCategory::Candidate => "Candidate Key:",
            KeyCategory::Primary => "Primary Key:",
            KeyCategory::Foreign => "Foreign Key:",
            KeyCategory::Composite => "Composite Key:",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            KeyCategory::Candidate => "candidate keys",
            KeyCategory::Primary => "primary keys",
            KeyCategory::Foreign => "foreign keys",
            KeyCategory::Composite => "composite keys",
        }
    }

    pub fn value<'a>(&self, info: &'a KeyInfo) -> &'a str {
        match self {
            KeyCategory::Candidate => &info.candidate_key,
            KeyCategory::Primary => &info.primary_key,
            KeyCategory::Foreign => &info.foreign_key,
            KeyCategory::Composite => &info.composite_key,
        }
    }

    fn slot<'a>(&self, info: &'a mut KeyInfo) -> &'a mut String {
        match self {
            KeyCategory::Candidate => &mut info.candidate_key,
            KeyCategory::Primary => &mut info.primary_key,
            KeyCategory::Foreign => &mut info.foreign_key,
            KeyCategory::Composite => &mut info.composite_key,
        }
    }
}

fn log_fallback(parser: &str, reason: &str) {
    tracing::warn!(
        event = "parser.fallback",
        parser = parser,
        reason = reason,
        "parse fallback in {}: {}",
        parser,
        reason
    );
}

// List bullets and markdown emphasis the model likes to add around labels.
fn strip_decorations(line: &str) -> &str {
    line.trim()
        .trim_start_matches(|c: char| {
            c == '-' || c == '*' || c == '•' || c == '#' || c.is_whitespace()
        })
}

pub fn parse_key_info(text: &str) -> KeyInfo {
    let mut info = KeyInfo::default();
    let mut matched = [false; 4];

    for raw in text.lines() {
        let line = strip_decorations(raw);
        for (idx, category) in KeyCategory::ALL.iter().enumerate() {
            let Some(rest) = line.strip_prefix(category.label()) else {
                continue;
            };
            let value = rest.trim_start_matches('*').trim();
            if !value.is_empty() {
                let slot = category.slot(&mut info);
                if matched[idx] {
                    slot.push_str("; ");
                    slot.push_str(value);
                } else {
                    *slot = value.to_string();
                    matched[idx] = true;
                }
            }
            break;
        }
    }

    if !matched.iter().any(|m| *m) {
        log_fallback("key_info", "no key label found; all categories set to None found");
    }
    info
}

/// Verdict from the first non-empty line. Ambiguous text is graded Incorrect, never Correct.
pub fn parse_grade(text: &str) -> ParsedGrade {
    let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());

    let Some(first) = lines.next() else {
        log_fallback("grade", "empty response");
        return ungradable();
    };

    if first.contains(VERDICT_CORRECT) {
        return ParsedGrade {
            result: GradeResult::Correct,
            feedback: None,
        };
    }

    if first.contains(VERDICT_INCORRECT) {
        let rest = lines.collect::<Vec<_>>().join(" ");
        let feedback = if rest.is_empty() {
            NO_FEEDBACK.to_string()
        } else {
            rest
        };
        return ParsedGrade {
            result: GradeResult::Incorrect,
            feedback: Some(feedback),
        };
    }

    log_fallback("grade", "first line carries no verdict");
    ungradable()
}

fn ungradable() -> ParsedGrade {
    ParsedGrade {
        result: GradeResult::Incorrect,
        feedback: Some(UNGRADABLE_FEEDBACK.to_string()),
    }
}

fn numbered_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\d+\s*[.)]\s*(.+)$").expect("static regex"))
}

fn difficulty_heading(line: &str) -> Option<Difficulty> {
    let lower = line.to_ascii_lowercase();
    if lower.contains("easy questions") {
        Some(Difficulty::Easy)
    } else if lower.contains("medium questions") {
        Some(Difficulty::Medium)
    } else if lower.contains("hard questions") {
        Some(Difficulty::Hard)
    } else {
        None
    }
}

/// Splits a generated question listing into questions tagged by tier heading.
pub fn parse_question_set(text: &str) -> Vec<GeneratedQuestion> {
    let mut tier = None;
    let mut numbered = Vec::new();
    let mut loose = Vec::new();

    for raw in text.lines() {
        let line = raw.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(d) = difficulty_heading(line) {
            tier = Some(d);
            continue;
        }
        if let Some(caps) = numbered_line().captures(line) {
            let body = caps[1].trim().trim_matches('*').trim();
            if !body.is_empty() {
                numbered.push(GeneratedQuestion {
                    difficulty: tier,
                    text: body.to_string(),
                });
            }
        } else {
            loose.push(GeneratedQuestion {
                difficulty: tier,
                text: line.to_string(),
            });
        }
    }

    if numbered.is_empty() && !loose.is_empty() {
        log_fallback("question_set", "no numbered questions; keeping every line");
        return loose;
    }
    numbered
}

/// Info strings accepted after an opening fence.
const FENCE_LANGUAGES: &[&str] = &[
    "sql",
    "mysql",
    "postgresql",
    "postgres",
    "pgsql",
    "sqlite",
    "tsql",
    "plsql",
];

/// Extracts the query from a generated answer, dropping markdown fences.
pub fn parse_sql_answer(text: &str) -> String {
    let trimmed = text.trim();
    let Some(start) = trimmed.find("```") else {
        return trimmed.to_string();
    };
    let after = &trimmed[start + 3..];
    // The info string may be followed by a newline or, on one-line fences, a space.
    let tag_end = after.find(char::is_whitespace).unwrap_or(after.len());
    let body = if FENCE_LANGUAGES
        .iter()
        .any(|lang| after[..tag_end].eq_ignore_ascii_case(lang))
    {
        &after[tag_end..]
    } else {
        after
    };
    match body.find("```") {
        Some(end) => body[..end].trim().to_string(),
        None => body.trim().to_string(),
    }
}

pub fn parse_flashcard(text: &str) -> AssessResult<Flashcard> {
    let Some((before, after)) = text.split_once(ANSWER_LABEL) else {
        return Err(AssessError::Format(format!(
            "flashcard response has no '{}' separator",
            ANSWER_LABEL
        )));
    };

    let question = match before.find(QUESTION_LABEL) {
        Some(idx) => &before[idx + QUESTION_LABEL.len()..],
        None => before,
    }
    .trim();
    let answer = after.trim();

    if question.is_empty() || answer.is_empty() {
        return Err(AssessError::Format(
            "flashcard response has an empty question or answer".into(),
        ));
    }

    Ok(Flashcard {
        question: question.to_string(),
        answer: answer.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_info_basic() {
        let info = parse_key_info(
            "Here are the keys:\nPrimary Key: [orders.id, customers.id]\nForeign Key: [orders.customer_id]\n",
        );
        assert_eq!(info.primary_key, "[orders.id, customers.id]");
        assert_eq!(info.foreign_key, "[orders.customer_id]");
        assert_eq!(info.candidate_key, NONE_FOUND);
        assert_eq!(info.composite_key, NONE_FOUND);
    }

    #[test]
    fn test_key_info_decorated_and_repeated_lines() {
        let info = parse_key_info(
            "- **Primary Key:** [a.id]\n* Composite Key: None found\nPrimary Key: [b.id]\nForeign Key:\n",
        );
        assert_eq!(info.primary_key, "[a.id]; [b.id]");
        assert_eq!(info.composite_key, "None found");
        assert_eq!(info.foreign_key, NONE_FOUND);
    }

    #[test]
    fn test_key_info_garbage_is_all_none_found() {
        assert_eq!(parse_key_info("I cannot help with that."), KeyInfo::default());
        assert_eq!(parse_key_info(""), KeyInfo::default());
    }

    #[test]
    fn test_grade_incorrect_with_feedback() {
        let g = parse_grade("Incorrect\nIssue: wrong join");
        assert_eq!(g.result, GradeResult::Incorrect);
        assert_eq!(g.feedback.as_deref(), Some("Issue: wrong join"));
    }

    #[test]
    fn test_grade_correct() {
        let g = parse_grade("Correct");
        assert_eq!(g.result, GradeResult::Correct);
        assert_eq!(g.feedback, None);

        let g = parse_grade("\n\n  **Correct**\nThe query is fine.");
        assert_eq!(g.result, GradeResult::Correct);
        assert_eq!(g.feedback, None);
    }

    #[test]
    fn test_grade_feedback_joins_lines() {
        let g = parse_grade("Incorrect\n\nIssue: missing GROUP BY\n  Fix: add GROUP BY dept  \n");
        assert_eq!(
            g.feedback.as_deref(),
            Some("Issue: missing GROUP BY Fix: add GROUP BY dept")
        );

        let g = parse_grade("Incorrect");
        assert_eq!(g.feedback.as_deref(), Some(NO_FEEDBACK));
    }

    #[test]
    fn test_grade_is_total_and_fails_closed() {
        for text in ["", "   \n ", "Maybe?", "correct", "The answer looks right\nCorrect"] {
            let g = parse_grade(text);
            assert_eq!(g.result, GradeResult::Incorrect, "input {:?}", text);
            assert_eq!(g.feedback.as_deref(), Some(UNGRADABLE_FEEDBACK));
        }
    }

    #[test]
    fn test_question_set_with_headings() {
        let text = "Easy Questions:\n1. List all orders.\n2) Count customers.\n\n**Medium Questions (Applying):**\n1. Total per customer?\nHard Questions:\n1. **Rank customers by spend.**\n";
        let qs = parse_question_set(text);
        assert_eq!(qs.len(), 4);
        assert_eq!(qs[0].difficulty, Some(Difficulty::Easy));
        assert_eq!(qs[0].text, "List all orders.");
        assert_eq!(qs[1].text, "Count customers.");
        assert_eq!(qs[2].difficulty, Some(Difficulty::Medium));
        assert_eq!(qs[3].difficulty, Some(Difficulty::Hard));
        assert_eq!(qs[3].text, "Rank customers by spend.");
    }

    #[test]
    fn test_question_set_fallback_keeps_lines() {
        let qs = parse_question_set("Which table holds orders?\nHow many rows are there?");
        assert_eq!(qs.len(), 2);
        assert_eq!(qs[0].difficulty, None);
        assert!(parse_question_set("").is_empty());
    }

    #[test]
    fn test_sql_answer_strips_fences() {
        assert_eq!(parse_sql_answer("  SELECT 1;\n"), "SELECT 1;");
        assert_eq!(
            parse_sql_answer("```sql\nSELECT name\nFROM t;\n```"),
            "SELECT name\nFROM t;"
        );
        assert_eq!(
            parse_sql_answer("Here it is:\n```\nSELECT 2;\n```\nHope it helps"),
            "SELECT 2;"
        );
        assert_eq!(parse_sql_answer("```sql SELECT * FROM t;```"), "SELECT * FROM t;");
        assert_eq!(parse_sql_answer("```SQL\tSELECT 3;\n```"), "SELECT 3;");
        assert_eq!(parse_sql_answer("```SELECT 4;```"), "SELECT 4;");
    }

    #[test]
    fn test_flashcard_parse() {
        let card =
            parse_flashcard("Question: What does GROUP BY do?\nAnswer: It groups rows.").unwrap();
        assert_eq!(card.question, "What does GROUP BY do?");
        assert_eq!(card.answer, "It groups rows.");

        let card = parse_flashcard("Sure!\nQuestion: Q?\nAnswer: A. Answer: still A.").unwrap();
        assert_eq!(card.question, "Q?");
        assert_eq!(card.answer, "A. Answer: still A.");
    }

    #[test]
    fn test_flashcard_without_answer_is_format_error() {
        let err = parse_flashcard("Question: What is a view?").unwrap_err();
        assert!(matches!(err, AssessError::Format(_)));
        assert!(matches!(
            parse_flashcard("Question: Q?\nAnswer:   "),
            Err(AssessError::Format(_))
        ));
    }
}
