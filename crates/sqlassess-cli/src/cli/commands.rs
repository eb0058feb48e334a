use super::args::*;
use serde::Serialize;
use sqlassess_core::config::{load_config, write_sample_config};
use sqlassess_core::dataset::UploadedFile;
use sqlassess_core::model::{KeyInfo, TestDraft};
use sqlassess_core::parser::parse_question_set;
use sqlassess_core::pipeline::{GenerateQuestionsRequest, MEMORY_DATABASE};
use sqlassess_core::{AssessError, AssessResult, AssessmentContext};
use std::io::Write;
use std::path::Path;

pub mod exit_codes {
    pub const OK: i32 = 0;
    pub const INTERNAL: i32 = 1;
    pub const VALIDATION: i32 = 2;
    pub const NOT_FOUND: i32 = 3;
    pub const UPSTREAM: i32 = 4;
    pub const FORMAT: i32 = 5;
}

pub fn exit_code_for(err: &AssessError) -> i32 {
    match err {
        AssessError::Validation(_) | AssessError::Config(_) => exit_codes::VALIDATION,
        AssessError::NotFound(_) => exit_codes::NOT_FOUND,
        AssessError::Upstream(_) => exit_codes::UPSTREAM,
        AssessError::Format(_) => exit_codes::FORMAT,
        AssessError::Internal(_) => exit_codes::INTERNAL,
    }
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => report(cmd_init(&cli.config, args)),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
        cmd => {
            let ctx = match open_context(&cli.config, cli.strict) {
                Ok(ctx) => ctx,
                Err(e) => return report::<()>(Err(e)),
            };
            run(&ctx, cmd).await
        }
    }
}

async fn run(ctx: &AssessmentContext, cmd: Command) -> anyhow::Result<i32> {
    match cmd {
        Command::Upload(args) => report(cmd_upload(ctx, args).await),
        Command::GenerateQuestions(args) => report(cmd_generate_questions(ctx, args).await),
        Command::CreateTest(args) => report(cmd_create_test(ctx, args)),
        Command::GenerateAnswers(args) => report(ctx.generate_answers(&args.test_id).await),
        Command::AddStudent(args) => {
            report(ctx.add_student(&args.first_name, &args.last_name, &args.email))
        }
        Command::Submit(args) => report(cmd_submit(ctx, args)),
        Command::Grade(args) => report(ctx.grade_test(&args.test_id, &args.student_id).await),
        Command::Results(args) => match args.test_id {
            Some(test_id) => report(ctx.test_results(&args.student_id, &test_id)),
            None => report(ctx.graded_tests(&args.student_id)),
        },
        Command::Performance(args) => report(ctx.performance_summary(&args.student_id)),
        Command::Flashcard(args) => report(ctx.flashcard(&args.topic, args.kind).await),
        Command::Init(_) | Command::Version => Ok(exit_codes::OK),
    }
}

// Pretty JSON on stdout for success; the error class picks the exit code.
fn report<T: Serialize>(result: AssessResult<T>) -> anyhow::Result<i32> {
    match result {
        Ok(value) => {
            let mut out = std::io::stdout().lock();
            serde_json::to_writer_pretty(&mut out, &value)?;
            writeln!(out)?;
            Ok(exit_codes::OK)
        }
        Err(e) => {
            tracing::debug!(event = "command.failed", kind = e.kind(), error = %e);
            eprintln!("{}", e);
            Ok(exit_code_for(&e))
        }
    }
}

fn open_context(config: &Path, strict: bool) -> AssessResult<AssessmentContext> {
    let cfg = load_config(config, strict)?;
    if cfg.database != MEMORY_DATABASE {
        ensure_parent_dir(Path::new(&cfg.database))?;
    }
    AssessmentContext::from_config(&cfg)
}

fn ensure_parent_dir(path: &Path) -> AssessResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AssessError::Config(format!(
                    "failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

#[derive(Serialize)]
struct InitReport {
    config: String,
    created: bool,
}

fn cmd_init(config: &Path, args: InitArgs) -> AssessResult<InitReport> {
    if config.exists() && !args.force {
        eprintln!("note: {} already exists", config.display());
        return Ok(InitReport {
            config: config.display().to_string(),
            created: false,
        });
    }
    if let Some(parent) = config.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AssessError::Config(format!("failed to create {}: {}", parent.display(), e)))?;
        }
    }
    write_sample_config(config)?;
    eprintln!("created {}", config.display());
    Ok(InitReport {
        config: config.display().to_string(),
        created: true,
    })
}

fn read_text(path: &Path) -> AssessResult<String> {
    std::fs::read_to_string(path)
        .map_err(|e| AssessError::validation(format!("failed to read {}: {}", path.display(), e)))
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> AssessResult<T> {
    let raw = read_text(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| AssessError::validation(format!("invalid JSON in {}: {}", path.display(), e)))
}

fn read_key_info(path: Option<&Path>) -> AssessResult<Option<KeyInfo>> {
    path.map(read_json::<KeyInfo>).transpose()
}

#[derive(Serialize)]
#[serde(untagged)]
enum UploadOutput {
    Single(sqlassess_core::pipeline::UploadResponse),
    Multiple(sqlassess_core::pipeline::MultiUploadResponse),
}

async fn cmd_upload(ctx: &AssessmentContext, args: UploadArgs) -> AssessResult<UploadOutput> {
    let mut files = Vec::with_capacity(args.files.len());
    for path in &args.files {
        let file = UploadedFile::read(path)
            .map_err(|e| AssessError::validation(format!("{:#}", e)))?;
        files.push(file);
    }

    let counts = args.counts.resolve();
    if files.len() == 1 {
        let file = files.remove(0);
        Ok(UploadOutput::Single(ctx.upload_single(file, counts).await?))
    } else {
        Ok(UploadOutput::Multiple(ctx.upload_multiple(files, counts).await?))
    }
}

async fn cmd_generate_questions(
    ctx: &AssessmentContext,
    args: GenerateQuestionsArgs,
) -> AssessResult<sqlassess_core::pipeline::GenerateQuestionsResponse> {
    let request = GenerateQuestionsRequest {
        schema: read_text(&args.schema_file)?,
        key_info: read_key_info(args.key_info_file.as_deref())?,
        counts: args.counts.resolve(),
    };
    ctx.generate_questions(request).await
}

fn cmd_create_test(
    ctx: &AssessmentContext,
    args: CreateTestArgs,
) -> AssessResult<sqlassess_core::model::Test> {
    let listing = read_text(&args.questions_file)?;
    let draft = TestDraft {
        name: args.name,
        schema: read_text(&args.schema_file)?,
        key_info: read_key_info(args.key_info_file.as_deref())?,
        questions: parse_question_set(&listing)
            .into_iter()
            .map(|q| q.text)
            .collect(),
    };
    ctx.create_test(draft)
}

fn cmd_submit(
    ctx: &AssessmentContext,
    args: SubmitArgs,
) -> AssessResult<sqlassess_core::model::Performance> {
    let answers: Vec<String> = read_json(&args.answers_file)?;
    ctx.submit_answers(&args.test_id, &args.student_id, answers)
}
