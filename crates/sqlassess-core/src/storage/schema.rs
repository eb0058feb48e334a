pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS tests (
  id TEXT PRIMARY KEY,
  name TEXT NOT NULL,
  created_at TEXT NOT NULL,
  doc_json TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS questions (
  id TEXT PRIMARY KEY,
  test_id TEXT NOT NULL REFERENCES tests(id),
  question_number INTEGER NOT NULL,
  doc_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_questions_test ON questions(test_id, question_number);

CREATE TABLE IF NOT EXISTS students (
  id TEXT PRIMARY KEY,
  email TEXT,
  doc_json TEXT NOT NULL
);
"#;
