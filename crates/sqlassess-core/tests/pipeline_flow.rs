use sqlassess_core::config::Settings;
use sqlassess_core::dataset::UploadedFile;
use sqlassess_core::model::{GradeResult, QuestionCounts, TestDraft};
use sqlassess_core::pipeline::GenerateQuestionsRequest;
use sqlassess_core::prompts::FlashcardKind;
use sqlassess_core::providers::llm::fake::FakeClient;
use sqlassess_core::storage::Store;
use sqlassess_core::{AssessError, AssessmentContext};
use std::sync::Arc;

const QUESTION_SET: &str = "Easy Questions:\n1. List all orders.\n2. Count customers.\n\
Medium Questions:\n1. Total per customer.\nHard Questions:\n1. Rank customers by spend.";

fn fake() -> FakeClient {
    FakeClient::new("Incorrect\nIssue: wrong join\nFix: join on customer_id")
        .with_rule("Student Answer: GOOD", "Correct")
        .with_rule(
            "Identify the",
            "- **Primary Key:** [orders.id, customers.id]\nForeign Key: [orders.customer_id]",
        )
        .with_rule("Generate SQL questions", QUESTION_SET)
        .with_rule(
            "Provide the correct SQL answer",
            "```sql\nSELECT * FROM orders;\n```",
        )
        .with_rule("topic: nothing", "Question: What is a view?")
        .with_rule("flashcard", "Question: What is a view?\nAnswer: A stored query.")
}

fn context_with(client: FakeClient) -> anyhow::Result<(AssessmentContext, Arc<FakeClient>)> {
    let store = Store::memory()?;
    store.init_schema()?;
    let client = Arc::new(client);
    Ok((
        AssessmentContext::new(store, client.clone(), Settings::default()),
        client,
    ))
}

fn draft(n: usize) -> TestDraft {
    TestDraft {
        name: "Orders quiz".into(),
        schema: "CREATE TABLE orders (\n    id INT\n);".into(),
        key_info: None,
        questions: (1..=n).map(|i| format!("Question {}", i)).collect(),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_grade_three_of_five_then_regrade_overwrites() -> anyhow::Result<()> {
    let (ctx, _) = context_with(fake())?;
    let test = ctx.create_test(draft(5))?;
    let student = ctx.add_student("Ada", "Lovelace", "ada@example.com")?;

    let answers = vec!["GOOD a", "bad b", "GOOD c", "bad d", "GOOD e"]
        .into_iter()
        .map(String::from)
        .collect();
    ctx.submit_answers(&test.id, &student.id, answers)?;

    let graded = ctx.grade_test(&test.id, &student.id).await?;
    assert_eq!(graded.total_score, 3);
    assert_eq!(graded.total_possible_score, 5);

    let results = ctx.test_results(&student.id, &test.id)?;
    let answers = results.graded_answers.expect("graded");
    assert_eq!(answers.len(), 5);
    assert_eq!(answers[0].result, GradeResult::Correct);
    assert_eq!(answers[0].feedback, None);
    assert_eq!(answers[1].result, GradeResult::Incorrect);
    assert_eq!(
        answers[1].feedback.as_deref(),
        Some("Issue: wrong join Fix: join on customer_id")
    );
    for (answer, question) in answers.iter().zip(&test.questions) {
        assert_eq!(answer.question_id, question.id);
    }

    // Regrading against a service that now accepts everything replaces the result.
    let generous = AssessmentContext::new(
        ctx.store().clone(),
        Arc::new(FakeClient::new("Correct")),
        Settings::default(),
    );
    let regraded = generous.grade_test(&test.id, &student.id).await?;
    assert_eq!(regraded.total_score, 5);

    let student = ctx.store().get_student(&student.id)?.expect("student");
    assert_eq!(student.performance.len(), 1);
    let perf = &student.performance[0];
    assert_eq!(perf.graded_answers.as_ref().map(|g| g.len()), Some(5));
    assert_eq!(perf.total_score, Some(5));
    assert_eq!(perf.total_possible_score, Some(5));
    Ok(())
}

#[tokio::test]
async fn test_grading_preconditions() -> anyhow::Result<()> {
    let (ctx, _) = context_with(fake())?;
    let test = ctx.create_test(draft(2))?;
    let student = ctx.add_student("Alan", "Turing", "")?;

    let err = ctx.grade_test(&test.id, &student.id).await.unwrap_err();
    assert!(matches!(err, AssessError::NotFound(_)), "got {:?}", err);

    let err = ctx.grade_test("missing", &student.id).await.unwrap_err();
    assert!(matches!(err, AssessError::NotFound(_)));

    let err = ctx.grade_test(&test.id, "  ").await.unwrap_err();
    assert!(matches!(err, AssessError::Validation(_)));

    let err = ctx
        .submit_answers(&test.id, &student.id, vec!["only one".into()])
        .unwrap_err();
    assert!(matches!(err, AssessError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn test_upstream_failure_leaves_submission_ungraded() -> anyhow::Result<()> {
    let (ctx, client) = context_with(FakeClient::failing("connection refused"))?;
    let test = ctx.create_test(draft(3))?;
    let student = ctx.add_student("Grace", "Hopper", "")?;
    ctx.submit_answers(&test.id, &student.id, vec!["a".into(), "b".into(), "c".into()])?;

    let err = ctx.grade_test(&test.id, &student.id).await.unwrap_err();
    assert!(matches!(err, AssessError::Upstream(_)));
    assert!(err.to_string().contains("connection refused"));
    assert!(!client.prompts().is_empty());

    assert!(matches!(
        ctx.test_results(&student.id, &test.id),
        Err(AssessError::NotFound(_))
    ));
    let summary = ctx.performance_summary(&student.id)?;
    assert_eq!(summary.total_tests, 0);
    assert_eq!(summary.average_score, None);
    Ok(())
}

#[tokio::test]
async fn test_upload_single_infers_schema_and_questions() -> anyhow::Result<()> {
    let (ctx, client) = context_with(fake())?;
    let file = UploadedFile::new("orders.csv", "id,price,name\n1,2.5,a\n2,3,b\n");

    let resp = ctx.upload_single(file, None).await?;
    assert!(resp.schema.starts_with("CREATE TABLE orders ("));
    assert!(resp.schema.contains("id INT"));
    assert!(resp.schema.contains("price DECIMAL(10,2)"));
    assert!(resp.schema.contains("name VARCHAR(255)"));
    assert_eq!(resp.questions, QUESTION_SET);
    assert_eq!(resp.question_list.len(), 4);

    let prompts = client.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(&resp.schema));
    assert!(prompts[0].contains("5 easy questions"));

    let err = ctx
        .upload_single(UploadedFile::new("orders.txt", "id\n1\n"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AssessError::Validation(_)));

    let err = ctx
        .upload_single(UploadedFile::new("orders.xlsx", vec![0u8, 1, 2]), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AssessError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn test_upload_single_xlsx_workbook() -> anyhow::Result<()> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "id")?;
    sheet.write_string(0, 1, "amount")?;
    sheet.write_string(0, 2, "paid")?;
    sheet.write_number(1, 0, 1.0)?;
    sheet.write_number(1, 1, 12.5)?;
    sheet.write_boolean(1, 2, true)?;
    sheet.write_number(2, 0, 2.0)?;
    sheet.write_number(2, 1, 7.25)?;
    sheet.write_boolean(2, 2, false)?;
    let bytes = workbook.save_to_buffer()?;

    let (ctx, _) = context_with(fake())?;
    let resp = ctx
        .upload_single(UploadedFile::new("payments.xlsx", bytes), None)
        .await?;
    assert_eq!(
        resp.schema,
        "CREATE TABLE payments (\n    id INT,\n    amount DECIMAL(10,2),\n    paid VARCHAR(255)\n);"
    );
    Ok(())
}

#[tokio::test]
async fn test_upload_multiple_skips_broken_files() -> anyhow::Result<()> {
    let (ctx, _) = context_with(fake())?;
    let files = vec![
        UploadedFile::new("orders.csv", "id,customer_id,amount\n1,7,9.5\n"),
        UploadedFile::new("broken.csv", Vec::new()),
        UploadedFile::new("customers.csv", "id,name\n7,Ada\n"),
    ];

    let resp = ctx
        .upload_multiple(
            files,
            Some(QuestionCounts {
                easy: 2,
                medium: 1,
                hard: 1,
            }),
        )
        .await?;
    assert_eq!(resp.tables.table_names(), vec!["orders", "customers"]);
    assert_eq!(resp.key_info.primary_key, "[orders.id, customers.id]");
    assert_eq!(resp.key_info.foreign_key, "[orders.customer_id]");
    assert_eq!(resp.key_info.candidate_key, "None found");
    assert_eq!(resp.question_list.len(), 4);

    let err = ctx
        .upload_multiple(vec![UploadedFile::new("broken.csv", Vec::new())], None)
        .await
        .unwrap_err();
    assert!(matches!(err, AssessError::Validation(_)));
    Ok(())
}

#[tokio::test]
async fn test_generate_questions_and_answers() -> anyhow::Result<()> {
    let (ctx, _) = context_with(fake())?;

    let resp = ctx
        .generate_questions(GenerateQuestionsRequest {
            schema: "CREATE TABLE orders (\n    id INT\n);".into(),
            ..Default::default()
        })
        .await?;
    assert_eq!(resp.question_list[0].text, "List all orders.");

    let err = ctx
        .generate_questions(GenerateQuestionsRequest {
            schema: "CREATE TABLE t (\n    id INT\n);".into(),
            key_info: None,
            counts: Some(QuestionCounts {
                easy: 0,
                medium: 0,
                hard: 0,
            }),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AssessError::Validation(_)));

    let test = ctx.create_test(draft(2))?;
    let answered = ctx.generate_answers(&test.id).await?;
    assert_eq!(answered.len(), 2);
    let stored = ctx.get_test(&test.id)?;
    for q in &stored.questions {
        assert_eq!(q.correct_answer.as_deref(), Some("SELECT * FROM orders;"));
    }

    assert!(matches!(
        ctx.generate_answers("nope").await,
        Err(AssessError::NotFound(_))
    ));
    Ok(())
}

#[tokio::test]
async fn test_flashcards() -> anyhow::Result<()> {
    let (ctx, client) = context_with(fake())?;

    let card = ctx.flashcard("views", FlashcardKind::Theory).await?;
    assert_eq!(card.question, "What is a view?");
    assert_eq!(card.answer, "A stored query.");
    assert!(client.prompts()[0].contains("theory flashcard"));

    let err = ctx
        .flashcard("nothing", FlashcardKind::Scenario)
        .await
        .unwrap_err();
    assert!(matches!(err, AssessError::Format(_)));

    let err = ctx.flashcard("", FlashcardKind::Coding).await.unwrap_err();
    assert!(matches!(err, AssessError::Validation(_)));
    Ok(())
}

#[test]
fn test_create_test_validation() -> anyhow::Result<()> {
    let (ctx, _) = context_with(fake())?;
    let mut d = draft(1);
    d.questions.clear();
    assert!(matches!(ctx.create_test(d), Err(AssessError::Validation(_))));

    let mut d = draft(2);
    d.name = " ".into();
    assert!(matches!(ctx.create_test(d), Err(AssessError::Validation(_))));

    let test = ctx.create_test(draft(3))?;
    let numbers: Vec<u32> = test.questions.iter().map(|q| q.question_number).collect();
    assert_eq!(numbers, vec![1, 2, 3]);
    Ok(())
}
