use crate::model::{GradingOutcome, KeyInfo, Performance, Question, Student, Test, TestDraft};
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Document store over sqlite: students, tests and questions as JSON documents
/// keyed by opaque ids. Only point lookups and field-scoped replaces; concurrent
/// writers to one document race and the last one wins.
#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

// Test document without its questions, which live in their own table.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TestDoc {
    name: String,
    schema: String,
    #[serde(default)]
    key_info: Option<KeyInfo>,
    created_at: String,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("store connection mutex poisoned"))
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    // tests + questions

    /// Creates the test and one question document per draft question, numbered from 1.
    pub fn insert_test(&self, draft: &TestDraft) -> anyhow::Result<Test> {
        let test_id = new_id();
        let created_at = now_rfc3339();
        let doc = TestDoc {
            name: draft.name.clone(),
            schema: draft.schema.clone(),
            key_info: draft.key_info.clone(),
            created_at: created_at.clone(),
        };

        let questions: Vec<Question> = draft
            .questions
            .iter()
            .enumerate()
            .map(|(i, text)| Question {
                id: new_id(),
                test_id: test_id.clone(),
                question_number: (i + 1) as u32,
                question_text: text.clone(),
                marks: 1,
                correct_answer: None,
            })
            .collect();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO tests(id, name, created_at, doc_json) VALUES (?1, ?2, ?3, ?4)",
            params![test_id, doc.name, created_at, serde_json::to_string(&doc)?],
        )?;
        for q in &questions {
            tx.execute(
                "INSERT INTO questions(id, test_id, question_number, doc_json) VALUES (?1, ?2, ?3, ?4)",
                params![q.id, q.test_id, q.question_number, serde_json::to_string(q)?],
            )?;
        }
        tx.commit()?;

        Ok(Test {
            id: test_id,
            name: doc.name,
            schema: doc.schema,
            key_info: doc.key_info,
            created_at,
            questions,
        })
    }

    pub fn get_test(&self, test_id: &str) -> anyhow::Result<Option<Test>> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT doc_json FROM tests WHERE id=?1",
                params![test_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let doc: TestDoc =
            serde_json::from_str(&raw).with_context(|| format!("corrupt test document {}", test_id))?;
        let questions = load_questions(&conn, test_id)?;

        Ok(Some(Test {
            id: test_id.to_string(),
            name: doc.name,
            schema: doc.schema,
            key_info: doc.key_info,
            created_at: doc.created_at,
            questions,
        }))
    }

    pub fn questions_for_test(&self, test_id: &str) -> anyhow::Result<Vec<Question>> {
        let conn = self.lock()?;
        load_questions(&conn, test_id)
    }

    /// Returns false when the question does not exist.
    pub fn set_correct_answer(&self, question_id: &str, answer: &str) -> anyhow::Result<bool> {
        let conn = self.lock()?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT doc_json FROM questions WHERE id=?1",
                params![question_id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            return Ok(false);
        };
        let mut q: Question = serde_json::from_str(&raw)
            .with_context(|| format!("corrupt question document {}", question_id))?;
        q.correct_answer = Some(answer.to_string());
        conn.execute(
            "UPDATE questions SET doc_json=?1 WHERE id=?2",
            params![serde_json::to_string(&q)?, question_id],
        )?;
        Ok(true)
    }

    // students

    pub fn insert_student(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> anyhow::Result<Student> {
        let student = Student {
            id: new_id(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            email: email.to_string(),
            performance: Vec::new(),
        };
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO students(id, email, doc_json) VALUES (?1, ?2, ?3)",
            params![student.id, student.email, serde_json::to_string(&student)?],
        )?;
        Ok(student)
    }

    pub fn get_student(&self, student_id: &str) -> anyhow::Result<Option<Student>> {
        let conn = self.lock()?;
        load_student(&conn, student_id)
    }

    /// Stores a submission; an earlier entry for the same test is replaced, not duplicated.
    pub fn record_submission(
        &self,
        student_id: &str,
        performance: Performance,
    ) -> anyhow::Result<bool> {
        self.update_student(student_id, move |student| {
            match student
                .performance
                .iter_mut()
                .find(|p| p.test_id == performance.test_id)
            {
                Some(existing) => *existing = performance,
                None => student.performance.push(performance),
            }
            true
        })
    }

    /// Replaces the grading fields of one performance entry wholesale.
    /// Returns false when the student or the entry does not exist.
    pub fn replace_grading(
        &self,
        student_id: &str,
        test_id: &str,
        outcome: &GradingOutcome,
    ) -> anyhow::Result<bool> {
        let graded_at = now_rfc3339();
        self.update_student(student_id, |student| {
            let Some(perf) = student
                .performance
                .iter_mut()
                .find(|p| p.test_id == test_id)
            else {
                return false;
            };
            perf.graded_answers = Some(outcome.graded_answers.clone());
            perf.total_score = Some(outcome.total_score);
            perf.total_possible_score = Some(outcome.total_possible_score);
            perf.graded_at = Some(graded_at);
            true
        })
    }

    // Read-modify-write under one lock; `apply` returns false to skip the write.
    fn update_student<F>(&self, student_id: &str, apply: F) -> anyhow::Result<bool>
    where
        F: FnOnce(&mut Student) -> bool,
    {
        let conn = self.lock()?;
        let Some(mut student) = load_student(&conn, student_id)? else {
            return Ok(false);
        };
        if !apply(&mut student) {
            return Ok(false);
        }
        conn.execute(
            "UPDATE students SET doc_json=?1 WHERE id=?2",
            params![serde_json::to_string(&student)?, student_id],
        )?;
        Ok(true)
    }
}

fn load_questions(conn: &Connection, test_id: &str) -> anyhow::Result<Vec<Question>> {
    let mut stmt = conn.prepare(
        "SELECT doc_json FROM questions WHERE test_id=?1 ORDER BY question_number ASC",
    )?;
    let rows = stmt.query_map(params![test_id], |row| row.get::<_, String>(0))?;

    let mut out = Vec::new();
    for raw in rows {
        let q: Question = serde_json::from_str(&raw?).context("corrupt question document")?;
        out.push(q);
    }
    Ok(out)
}

fn load_student(conn: &Connection, student_id: &str) -> anyhow::Result<Option<Student>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT doc_json FROM students WHERE id=?1",
            params![student_id],
            |row| row.get(0),
        )
        .optional()?;
    match raw {
        Some(raw) => Ok(Some(serde_json::from_str(&raw).with_context(|| {
            format!("corrupt student document {}", student_id)
        })?)),
        None => Ok(None),
    }
}

fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
