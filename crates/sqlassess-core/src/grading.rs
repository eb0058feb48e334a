use crate::errors::{AssessError, AssessResult};
use crate::model::{GradedAnswer, GradingOutcome, PerformanceStatus, Question, SubmittedAnswer};
use crate::parser::parse_grade;
use crate::pipeline::invoke;
use crate::prompts;
use crate::providers::llm::LlmClient;
use crate::storage::Store;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Grades one learner's submission for one test: Submitted -> Grading -> Graded.
///
/// Questions are graded concurrently (bounded by `parallel`) and reassembled in
/// test order. A malformed verdict degrades that answer to Incorrect; a failed
/// completion call aborts the whole run and nothing is written.
pub struct GradingOrchestrator {
    client: Arc<dyn LlmClient>,
    parallel: usize,
    deadline: Option<Duration>,
}

impl GradingOrchestrator {
    pub fn new(client: Arc<dyn LlmClient>, parallel: usize, deadline: Option<Duration>) -> Self {
        Self {
            client,
            parallel: parallel.max(1),
            deadline,
        }
    }

    pub async fn grade_test(
        &self,
        store: &Store,
        test_id: &str,
        student_id: &str,
    ) -> AssessResult<GradingOutcome> {
        let test = store
            .get_test(test_id)?
            .ok_or_else(|| AssessError::not_found(format!("test '{}'", test_id)))?;
        if test.schema.trim().is_empty() {
            return Err(AssessError::validation(format!(
                "test '{}' has no schema",
                test_id
            )));
        }
        if test.questions.is_empty() {
            return Err(AssessError::validation(format!(
                "test '{}' has no questions",
                test_id
            )));
        }

        let student = store
            .get_student(student_id)?
            .ok_or_else(|| AssessError::not_found(format!("student '{}'", student_id)))?;
        let performance = student.performance_for(test_id).ok_or_else(|| {
            AssessError::not_found(format!(
                "test '{}' was not submitted by student '{}'",
                test_id, student_id
            ))
        })?;

        let pairs = pair_answers(&test.questions, &performance.submitted_answers)?;

        tracing::info!(
            event = "grading.start",
            test_id = %test_id,
            student_id = %student_id,
            questions = pairs.len(),
            regrade = performance.status() == PerformanceStatus::Graded
        );

        let outcome = self.grade_pairs(&test.schema, pairs).await?;

        if !store.replace_grading(student_id, test_id, &outcome)? {
            return Err(AssessError::not_found(format!(
                "performance for test '{}' vanished for student '{}'",
                test_id, student_id
            )));
        }

        tracing::info!(
            event = "grading.done",
            test_id = %test_id,
            student_id = %student_id,
            total_score = outcome.total_score,
            total_possible_score = outcome.total_possible_score
        );
        Ok(outcome)
    }

    /// Grades already-paired answers; order of the output follows the input.
    pub async fn grade_pairs(
        &self,
        schema: &str,
        pairs: Vec<(Question, String)>,
    ) -> AssessResult<GradingOutcome> {
        let total_possible_score = pairs.len() as u32;
        let schema: Arc<str> = Arc::from(schema);
        let sem = Arc::new(Semaphore::new(self.parallel));
        let mut handles = Vec::with_capacity(pairs.len());

        for (question, answer) in pairs {
            let permit = sem
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| AssessError::Internal(format!("grading semaphore closed: {}", e)))?;
            let client = self.client.clone();
            let schema = schema.clone();
            let deadline = self.deadline;
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                grade_one(client.as_ref(), &schema, &question, &answer, deadline).await
            }));
        }

        let mut graded_answers = Vec::with_capacity(handles.len());
        let mut pending = handles.into_iter();
        while let Some(handle) = pending.next() {
            let result = match handle.await {
                Ok(r) => r,
                Err(e) => Err(AssessError::Internal(format!("grading task failed: {}", e))),
            };
            match result {
                Ok(answer) => graded_answers.push(answer),
                Err(e) => {
                    for rest in pending.by_ref() {
                        rest.abort();
                    }
                    return Err(e);
                }
            }
        }

        let total_score = graded_answers.iter().map(|g| g.score).sum();
        Ok(GradingOutcome {
            total_score,
            total_possible_score,
            graded_answers,
        })
    }
}

async fn grade_one(
    client: &dyn LlmClient,
    schema: &str,
    question: &Question,
    submitted_answer: &str,
    deadline: Option<Duration>,
) -> AssessResult<GradedAnswer> {
    let prompt = prompts::grading(schema, &question.question_text, submitted_answer);
    let text = invoke(client, &prompt, deadline).await?;
    let grade = parse_grade(&text);
    tracing::debug!(
        event = "grading.question",
        question_id = %question.id,
        result = ?grade.result
    );
    Ok(GradedAnswer::new(question, submitted_answer, grade))
}

/// Pairs each question with the answer submitted for its id, in question order.
pub fn pair_answers(
    questions: &[Question],
    submitted: &[SubmittedAnswer],
) -> AssessResult<Vec<(Question, String)>> {
    if questions.len() != submitted.len() {
        return Err(AssessError::validation(format!(
            "test has {} questions but {} answers were submitted",
            questions.len(),
            submitted.len()
        )));
    }

    let mut by_id: HashMap<&str, &SubmittedAnswer> = HashMap::with_capacity(submitted.len());
    for answer in submitted {
        if by_id.insert(answer.question_id.as_str(), answer).is_some() {
            return Err(AssessError::validation(format!(
                "question '{}' was answered more than once",
                answer.question_id
            )));
        }
    }

    questions
        .iter()
        .map(|q| {
            by_id
                .get(q.id.as_str())
                .map(|a| (q.clone(), a.submitted_answer.clone()))
                .ok_or_else(|| {
                    AssessError::validation(format!("no submitted answer for question '{}'", q.id))
                })
        })
        .collect()
}
