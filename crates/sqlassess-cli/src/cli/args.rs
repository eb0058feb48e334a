use clap::{Args, Parser, Subcommand};
use sqlassess_core::model::QuestionCounts;
use sqlassess_core::prompts::FlashcardKind;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "sqlassess",
    version,
    about = "Generate, answer and grade SQL exercises from tabular datasets"
)]
pub struct Cli {
    #[arg(long, global = true, default_value = "sqlassess.yaml")]
    pub config: PathBuf,

    /// Reject unknown config keys instead of warning.
    #[arg(long, global = true)]
    pub strict: bool,

    /// tracing filter, e.g. `info` or `sqlassess_core=debug`
    #[arg(long, global = true, env = "SQLASSESS_LOG", default_value = "info")]
    pub log_level: String,

    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Write a sample config file
    Init(InitArgs),
    /// Infer schemas from csv files and generate questions
    Upload(UploadArgs),
    GenerateQuestions(GenerateQuestionsArgs),
    CreateTest(CreateTestArgs),
    /// Fill in reference answers for every question of a test
    GenerateAnswers(TestIdArgs),
    AddStudent(AddStudentArgs),
    Submit(SubmitArgs),
    Grade(GradeArgs),
    /// Graded tests of a student, or one test's graded answers
    Results(ResultsArgs),
    Performance(StudentIdArgs),
    Flashcard(FlashcardArgs),
    Version,
}

#[derive(Args, Clone)]
pub struct InitArgs {
    /// Overwrite an existing config file
    #[arg(long)]
    pub force: bool,
}

#[derive(Args, Clone, Copy, Default)]
pub struct CountArgs {
    #[arg(long)]
    pub easy: Option<u32>,
    #[arg(long)]
    pub medium: Option<u32>,
    #[arg(long)]
    pub hard: Option<u32>,
}

impl CountArgs {
    /// None when no flag is set, so configured counts apply; unset tiers become 0 otherwise.
    pub fn resolve(&self) -> Option<QuestionCounts> {
        if self.easy.is_none() && self.medium.is_none() && self.hard.is_none() {
            return None;
        }
        Some(QuestionCounts {
            easy: self.easy.unwrap_or(0),
            medium: self.medium.unwrap_or(0),
            hard: self.hard.unwrap_or(0),
        })
    }
}

#[derive(Args, Clone)]
pub struct UploadArgs {
    /// One file for a single-table schema, several for keys and join questions
    #[arg(required = true, num_args = 1..)]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub counts: CountArgs,
}

#[derive(Args, Clone)]
pub struct GenerateQuestionsArgs {
    /// File holding the schema text
    #[arg(long)]
    pub schema_file: PathBuf,

    /// JSON key info (`{"PrimaryKey": ..., "ForeignKey": ...}`) for multi-table schemas
    #[arg(long)]
    pub key_info_file: Option<PathBuf>,

    #[command(flatten)]
    pub counts: CountArgs,
}

#[derive(Args, Clone)]
pub struct CreateTestArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub schema_file: PathBuf,

    /// Question listing: numbered lines, optionally under difficulty headings
    #[arg(long)]
    pub questions_file: PathBuf,

    #[arg(long)]
    pub key_info_file: Option<PathBuf>,
}

#[derive(Args, Clone)]
pub struct TestIdArgs {
    #[arg(long)]
    pub test_id: String,
}

#[derive(Args, Clone)]
pub struct StudentIdArgs {
    #[arg(long)]
    pub student_id: String,
}

#[derive(Args, Clone)]
pub struct AddStudentArgs {
    #[arg(long)]
    pub first_name: String,
    #[arg(long)]
    pub last_name: String,
    #[arg(long, default_value = "")]
    pub email: String,
}

#[derive(Args, Clone)]
pub struct SubmitArgs {
    #[arg(long)]
    pub test_id: String,
    #[arg(long)]
    pub student_id: String,
    /// JSON array of answers, one per question in test order
    #[arg(long)]
    pub answers_file: PathBuf,
}

#[derive(Args, Clone)]
pub struct GradeArgs {
    #[arg(long)]
    pub test_id: String,
    #[arg(long)]
    pub student_id: String,
}

#[derive(Args, Clone)]
pub struct ResultsArgs {
    #[arg(long)]
    pub student_id: String,
    #[arg(long)]
    pub test_id: Option<String>,
}

#[derive(Args, Clone)]
pub struct FlashcardArgs {
    #[arg(long)]
    pub topic: String,

    /// scenario | theory | coding
    #[arg(long, default_value = "theory")]
    pub kind: FlashcardKind,
}
