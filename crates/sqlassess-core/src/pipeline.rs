//! Pipeline operations over an explicitly constructed [`AssessmentContext`].
//!
//! Each operation validates its inputs, drives the prompt -> completion -> parse
//! sequence and persists through the store. Provider failures surface as
//! [`AssessError::Upstream`]; anything unexpected becomes `Internal`.

use crate::config::{AssessConfig, Settings};
use crate::dataset::{DecoderRegistry, UploadedFile};
use crate::errors::{require_non_blank, AssessError, AssessResult};
use crate::grading::GradingOrchestrator;
use crate::model::{
    Flashcard, GeneratedQuestion, KeyInfo, Performance, QuestionCounts, Question, Student,
    SubmittedAnswer, Test, TestDraft,
};
use crate::parser;
use crate::performance::{self, GradedTestSummary, PerformanceSummary};
use crate::prompts::{self, FlashcardKind};
use crate::providers::llm::{build_client, LlmClient};
use crate::schema::{infer_batch, TableSchema, TableSet};
use crate::storage::Store;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const MEMORY_DATABASE: &str = ":memory:";

#[derive(Debug, Clone, Serialize)]
pub struct UploadResponse {
    pub schema: String,
    /// Raw completion text.
    pub questions: String,
    pub question_list: Vec<GeneratedQuestion>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MultiUploadResponse {
    pub tables: TableSet,
    pub key_info: KeyInfo,
    pub questions: String,
    pub question_list: Vec<GeneratedQuestion>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GenerateQuestionsRequest {
    pub schema: String,
    /// Present for multi-table schemas.
    #[serde(default)]
    pub key_info: Option<KeyInfo>,
    /// Falls back to `settings.question_counts`.
    #[serde(default)]
    pub counts: Option<QuestionCounts>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerateQuestionsResponse {
    pub questions: String,
    pub question_list: Vec<GeneratedQuestion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GradeResponse {
    pub total_score: u32,
    pub total_possible_score: u32,
}

/// Store, completion client, file decoders and settings shared by every operation.
#[derive(Clone)]
pub struct AssessmentContext {
    store: Store,
    client: Arc<dyn LlmClient>,
    decoders: DecoderRegistry,
    settings: Settings,
}

impl AssessmentContext {
    pub fn new(store: Store, client: Arc<dyn LlmClient>, settings: Settings) -> Self {
        Self {
            store,
            client,
            decoders: DecoderRegistry::default(),
            settings,
        }
    }

    /// Opens (and migrates) the configured database and builds the provider.
    pub fn from_config(cfg: &AssessConfig) -> AssessResult<Self> {
        let store = if cfg.database == MEMORY_DATABASE {
            Store::memory()?
        } else {
            Store::open(Path::new(&cfg.database))?
        };
        store.init_schema()?;
        let client =
            build_client(&cfg.provider).map_err(|e| AssessError::Config(format!("{:#}", e)))?;
        Ok(Self::new(store, client, cfg.settings.clone()))
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    async fn complete(&self, prompt: &str) -> AssessResult<String> {
        invoke(
            self.client.as_ref(),
            prompt,
            self.settings.completion_deadline(),
        )
        .await
    }

    // upload + generation

    /// Single table: infer the schema, then ask for questions about it.
    pub async fn upload_single(
        &self,
        file: UploadedFile,
        counts: Option<QuestionCounts>,
    ) -> AssessResult<UploadResponse> {
        require_non_blank("file_name", &file.file_name)?;
        let counts = self.resolve_counts(counts)?;
        let decoder = self.decoders.for_extension(file.extension()).ok_or_else(|| {
            AssessError::validation(format!(
                "unsupported file type '{}' for {}",
                file.extension(),
                file.file_name
            ))
        })?;
        let columns = decoder.decode(&file.bytes).map_err(|e| {
            AssessError::validation(format!("failed to decode {}: {:#}", file.file_name, e))
        })?;
        let schema = TableSchema::infer(file.table_name(), &columns).render();
        tracing::info!(
            event = "upload.schema",
            table = %file.table_name(),
            columns = columns.len()
        );

        let prompt = prompts::question_generation(&schema, None, counts);
        let questions = self.complete(&prompt).await?;
        let question_list = parser::parse_question_set(&questions);
        Ok(UploadResponse {
            schema,
            questions,
            question_list,
        })
    }

    /// Several tables: infer each schema, identify keys, then ask for join questions.
    pub async fn upload_multiple(
        &self,
        files: Vec<UploadedFile>,
        counts: Option<QuestionCounts>,
    ) -> AssessResult<MultiUploadResponse> {
        if files.is_empty() {
            return Err(AssessError::validation("no files uploaded"));
        }
        let counts = self.resolve_counts(counts)?;

        let tables = infer_batch(&files, &self.decoders);
        if tables.is_empty() {
            return Err(AssessError::validation(
                "none of the uploaded files could be decoded",
            ));
        }
        tracing::info!(
            event = "upload.tables",
            uploaded = files.len(),
            decoded = tables.len()
        );
        let rendered = tables.render();

        let key_prompt = prompts::key_identification(&rendered, self.settings.key_detail);
        let key_info = parser::parse_key_info(&self.complete(&key_prompt).await?);

        let prompt = prompts::question_generation(&rendered, Some(&key_info), counts);
        let questions = self.complete(&prompt).await?;
        let question_list = parser::parse_question_set(&questions);

        Ok(MultiUploadResponse {
            tables,
            key_info,
            questions,
            question_list,
        })
    }

    pub async fn generate_questions(
        &self,
        request: GenerateQuestionsRequest,
    ) -> AssessResult<GenerateQuestionsResponse> {
        require_non_blank("schema", &request.schema)?;
        let counts = self.resolve_counts(request.counts)?;

        let prompt =
            prompts::question_generation(&request.schema, request.key_info.as_ref(), counts);
        let questions = self.complete(&prompt).await?;
        let question_list = parser::parse_question_set(&questions);
        Ok(GenerateQuestionsResponse {
            questions,
            question_list,
        })
    }

    fn resolve_counts(&self, counts: Option<QuestionCounts>) -> AssessResult<QuestionCounts> {
        let counts = counts.unwrap_or(self.settings.question_counts);
        if counts.total() == 0 {
            return Err(AssessError::validation(
                "question counts must ask for at least one question",
            ));
        }
        Ok(counts)
    }

    /// Back-fills `correct_answer` on every question of the test, in order.
    pub async fn generate_answers(&self, test_id: &str) -> AssessResult<Vec<Question>> {
        require_non_blank("test_id", test_id)?;
        let test = self.load_test(test_id)?;
        if test.questions.is_empty() {
            return Err(AssessError::not_found(format!(
                "no questions for test '{}'",
                test_id
            )));
        }

        let mut answered = Vec::with_capacity(test.questions.len());
        for mut question in test.questions {
            let prompt = prompts::answer_generation(&test.schema, &question.question_text);
            let answer = parser::parse_sql_answer(&self.complete(&prompt).await?);
            if !self.store.set_correct_answer(&question.id, &answer)? {
                return Err(AssessError::not_found(format!(
                    "question '{}'",
                    question.id
                )));
            }
            question.correct_answer = Some(answer);
            answered.push(question);
        }
        tracing::info!(
            event = "answers.generated",
            test_id = %test_id,
            count = answered.len()
        );
        Ok(answered)
    }

    // tests + students

    pub fn create_test(&self, draft: TestDraft) -> AssessResult<Test> {
        require_non_blank("name", &draft.name)?;
        require_non_blank("schema", &draft.schema)?;
        if draft.questions.is_empty() {
            return Err(AssessError::validation("a test needs at least one question"));
        }
        for (i, q) in draft.questions.iter().enumerate() {
            require_non_blank(&format!("questions[{}]", i), q)?;
        }
        let test = self.store.insert_test(&draft)?;
        tracing::info!(
            event = "test.created",
            test_id = %test.id,
            questions = test.questions.len()
        );
        Ok(test)
    }

    pub fn get_test(&self, test_id: &str) -> AssessResult<Test> {
        require_non_blank("test_id", test_id)?;
        self.load_test(test_id)
    }

    pub fn add_student(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
    ) -> AssessResult<Student> {
        require_non_blank("first_name", first_name)?;
        require_non_blank("last_name", last_name)?;
        Ok(self.store.insert_student(first_name, last_name, email.trim())?)
    }

    /// Records answers in question order; each answer is bound to its question id here.
    /// Resubmitting replaces the earlier submission and its grading.
    pub fn submit_answers(
        &self,
        test_id: &str,
        student_id: &str,
        answers: Vec<String>,
    ) -> AssessResult<Performance> {
        require_non_blank("test_id", test_id)?;
        require_non_blank("student_id", student_id)?;
        let test = self.load_test(test_id)?;
        self.load_student(student_id)?;

        if answers.len() != test.questions.len() {
            return Err(AssessError::validation(format!(
                "test has {} questions but {} answers were given",
                test.questions.len(),
                answers.len()
            )));
        }

        let submitted_answers = test
            .questions
            .iter()
            .zip(answers)
            .map(|(q, answer)| SubmittedAnswer {
                question_id: q.id.clone(),
                question_text: q.question_text.clone(),
                submitted_answer: answer,
            })
            .collect();
        let performance = Performance {
            test_id: test.id.clone(),
            test_name: test.name.clone(),
            submitted_answers,
            graded_answers: None,
            total_score: None,
            total_possible_score: None,
            submitted_at: Some(chrono::Utc::now().to_rfc3339()),
            graded_at: None,
        };

        if !self.store.record_submission(student_id, performance.clone())? {
            return Err(AssessError::not_found(format!("student '{}'", student_id)));
        }
        tracing::info!(
            event = "answers.submitted",
            test_id = %test_id,
            student_id = %student_id
        );
        Ok(performance)
    }

    // grading + read side

    pub async fn grade_test(&self, test_id: &str, student_id: &str) -> AssessResult<GradeResponse> {
        require_non_blank("test_id", test_id)?;
        require_non_blank("student_id", student_id)?;
        let orchestrator = GradingOrchestrator::new(
            self.client.clone(),
            self.settings.parallelism(),
            self.settings.completion_deadline(),
        );
        let outcome = orchestrator
            .grade_test(&self.store, test_id, student_id)
            .await?;
        Ok(GradeResponse {
            total_score: outcome.total_score,
            total_possible_score: outcome.total_possible_score,
        })
    }

    pub fn graded_tests(&self, student_id: &str) -> AssessResult<Vec<GradedTestSummary>> {
        require_non_blank("student_id", student_id)?;
        let student = self.load_student(student_id)?;
        Ok(performance::graded_tests(&student.performance))
    }

    /// The graded performance entry, answers and feedback included.
    pub fn test_results(&self, student_id: &str, test_id: &str) -> AssessResult<Performance> {
        require_non_blank("student_id", student_id)?;
        require_non_blank("test_id", test_id)?;
        let student = self.load_student(student_id)?;
        student
            .performance
            .into_iter()
            .find(|p| p.test_id == test_id && p.graded_answers.is_some())
            .ok_or_else(|| {
                AssessError::not_found(format!(
                    "graded results for test '{}' and student '{}'",
                    test_id, student_id
                ))
            })
    }

    pub fn performance_summary(&self, student_id: &str) -> AssessResult<PerformanceSummary> {
        require_non_blank("student_id", student_id)?;
        let student = self.load_student(student_id)?;
        Ok(performance::summarize(&student.performance))
    }

    pub async fn flashcard(&self, topic: &str, kind: FlashcardKind) -> AssessResult<Flashcard> {
        require_non_blank("topic", topic)?;
        let variation = prompts::pick_variation(&mut rand::thread_rng());
        let prompt = prompts::flashcard(topic.trim(), kind, variation);
        parser::parse_flashcard(&self.complete(&prompt).await?)
    }

    fn load_test(&self, test_id: &str) -> AssessResult<Test> {
        self.store
            .get_test(test_id)?
            .ok_or_else(|| AssessError::not_found(format!("test '{}'", test_id)))
    }

    fn load_student(&self, student_id: &str) -> AssessResult<Student> {
        self.store
            .get_student(student_id)?
            .ok_or_else(|| AssessError::not_found(format!("student '{}'", student_id)))
    }
}

/// One completion call under the optional caller deadline. Every failure is Upstream.
pub(crate) async fn invoke(
    client: &dyn LlmClient,
    prompt: &str,
    deadline: Option<Duration>,
) -> AssessResult<String> {
    let started = Instant::now();
    let call = client.complete(prompt);
    let result = match deadline {
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| {
            AssessError::Upstream(format!(
                "{} did not answer within {:.1}s",
                client.provider_name(),
                limit.as_secs_f64()
            ))
        })?,
        None => call.await,
    };

    match result {
        Ok(resp) => {
            tracing::debug!(
                event = "llm.complete",
                provider = %resp.provider,
                model = %resp.model,
                duration_ms = started.elapsed().as_millis() as u64
            );
            Ok(resp.text)
        }
        Err(e) => {
            tracing::warn!(
                event = "llm.failed",
                provider = client.provider_name(),
                error = %e
            );
            Err(AssessError::upstream(e))
        }
    }
}
