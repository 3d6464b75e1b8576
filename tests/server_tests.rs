use std::fs;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use actix_web::{App, test, web};
use anyhow::anyhow;
use assert_json_diff::assert_json_include;
use chrono::{Duration as ChronoDuration, SecondsFormat, Utc};
use serde_json::{Value, json};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use codegrade::config::{
    CaseConfig, FallbackConfig, ProviderConfig, ProviderFamily, QuestionConfig, TestConfig,
};
use codegrade::database;
use codegrade::execution::{
    Dispatcher, ExecutionBackend, ExecutionRequest, JudgeResponse, JudgeStatus, ProviderPool,
    RawProviderResponse,
};
use codegrade::routes::{
    get_test_handler, start_test_handler, submit_multi_handler, submit_question_handler,
};
use codegrade::runner::TestCaseRunner;

// Global counter to ensure unique test database names
static TEST_DB_COUNTER: AtomicU32 = AtomicU32::new(0);

async fn create_test_db() -> (SqlitePool, String) {
    let test_id = TEST_DB_COUNTER.fetch_add(1, Ordering::SeqCst);
    let db_path = format!("data/test_codegrade_{}.db", test_id);

    fs::create_dir_all("data").expect("Failed to create data dir");
    let _ = fs::remove_file(&db_path);

    let db_url = format!("sqlite:{}?mode=rwc", db_path);
    let db_pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect(&db_url)
        .await
        .expect("Failed to connect to test database");

    database::init_schema(&db_pool)
        .await
        .expect("Failed to initialize schema");

    (db_pool, db_path)
}

// Test guard that ensures cleanup on drop
struct TestDbGuard {
    db_path: String,
}

impl Drop for TestDbGuard {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.db_path);
        let _ = fs::remove_file(format!("{}-wal", self.db_path));
        let _ = fs::remove_file(format!("{}-shm", self.db_path));
    }
}

/// Backend that echoes each case's stdin back as an accepted judge result.
struct EchoBackend;

impl ExecutionBackend for EchoBackend {
    async fn run_provider(
        &self,
        _provider: &ProviderConfig,
        request: &ExecutionRequest,
    ) -> anyhow::Result<RawProviderResponse> {
        Ok(RawProviderResponse::Judge(JudgeResponse {
            stdout: Some(format!("{}\n", request.stdin)),
            stderr: None,
            compile_output: None,
            status: Some(JudgeStatus {
                id: 3,
                description: Some("Accepted".to_string()),
            }),
            time: Some("0.01".to_string()),
            memory: Some(1024.0),
        }))
    }

    async fn run_fallback(
        &self,
        _fallback: &FallbackConfig,
        _request: &ExecutionRequest,
    ) -> anyhow::Result<RawProviderResponse> {
        Err(anyhow!("fallback unused in tests"))
    }
}

fn echo_runner() -> TestCaseRunner<EchoBackend> {
    let pool = ProviderPool::new(vec![ProviderConfig {
        name: "echo".to_string(),
        family: ProviderFamily::Judge,
        base_url: "https://echo.example.com".to_string(),
        api_key: None,
    }]);
    TestCaseRunner::new(Dispatcher::new(pool, None, EchoBackend), Duration::ZERO)
}

fn case(input: &str, expected: &str, points: f64, hidden: bool) -> CaseConfig {
    CaseConfig {
        input: input.to_string(),
        expected_output: expected.to_string(),
        points,
        hidden,
    }
}

fn tests_config() -> Vec<TestConfig> {
    vec![TestConfig {
        id: "t1".to_string(),
        title: "Sample coding test".to_string(),
        duration_minutes: 30,
        questions: vec![
            QuestionConfig {
                id: "q1".to_string(),
                title: "Echo the input".to_string(),
                marks: 10.0,
                cases: vec![
                    case("1", "1", 1.0, false),
                    // Echo backend cannot satisfy this one
                    case("5", "6", 1.0, false),
                    case("2", "2", 2.0, true),
                ],
            },
            QuestionConfig {
                id: "q2".to_string(),
                title: "Echo again".to_string(),
                marks: 20.0,
                cases: vec![case("3", "3", 1.0, false)],
            },
        ],
    }]
}

macro_rules! test_app {
    ($pool:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($pool.clone()))
                .app_data(web::Data::new(tests_config()))
                .app_data(web::Data::new(echo_runner()))
                .app_data(
                    web::JsonConfig::default()
                        .error_handler(codegrade::routes::json_error_handler),
                )
                .service(
                    web::scope("/coding-test")
                        .route("/{test_id}/start", web::post().to(start_test_handler))
                        .route(
                            "/{test_id}/submit-question",
                            web::post().to(submit_question_handler::<EchoBackend>),
                        )
                        .route(
                            "/{test_id}/submit-multi",
                            web::post().to(submit_multi_handler::<EchoBackend>),
                        )
                        .route("/{test_id}", web::get().to(get_test_handler)),
                ),
        )
        .await
    };
}

#[actix_web::test]
async fn test_start_and_resume_flow() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard { db_path };
    let app = test_app!(pool);

    let req = test::TestRequest::post()
        .uri("/coding-test/t1/start")
        .set_json(json!({ "student_id": "alice" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["state"], "in_progress");
    assert_eq!(body["student_id"], "alice");

    let req = test::TestRequest::get()
        .uri("/coding-test/t1?student_id=alice")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["can_resume"], true);
    assert_eq!(body["session"]["state"], "in_progress");
}

#[actix_web::test]
async fn test_double_start_is_rejected() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard { db_path };
    let app = test_app!(pool);

    let req = test::TestRequest::post()
        .uri("/coding-test/t1/start")
        .set_json(json!({ "student_id": "bob" }))
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let req = test::TestRequest::post()
        .uri("/coding-test/t1/start")
        .set_json(json!({ "student_id": "bob" }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_SESSION_STATE");
    assert_eq!(body["code"], 7);
}

#[actix_web::test]
async fn test_unknown_test_returns_not_found() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard { db_path };
    let app = test_app!(pool);

    let req = test::TestRequest::get()
        .uri("/coding-test/nope?student_id=alice")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
    let body: Value = test::read_body_json(resp).await;
    assert_json_include!(actual: body, expected: json!({ "reason": "ERR_NOT_FOUND", "code": 3 }));
}

#[actix_web::test]
async fn test_hidden_cases_are_suppressed_in_metadata() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard { db_path };
    let app = test_app!(pool);

    let req = test::TestRequest::get()
        .uri("/coding-test/t1?student_id=carol")
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;

    let hidden_case = &body["questions"][0]["cases"][2];
    assert_eq!(hidden_case["hidden"], true);
    assert!(hidden_case.get("input").is_none());
    assert!(hidden_case.get("expected_output").is_none());

    let visible_case = &body["questions"][0]["cases"][0];
    assert_eq!(visible_case["input"], "1");
    assert_eq!(visible_case["expected_output"], "1");
}

#[actix_web::test]
async fn test_submit_question_grades_and_redacts() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard { db_path };
    let app = test_app!(pool);

    let req = test::TestRequest::post()
        .uri("/coding-test/t1/submit-question")
        .set_json(json!({
            "student_id": "alice",
            "question_id": "q1",
            "source_code": "print(input())",
            "language": "python",
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body: Value = test::read_body_json(resp).await;

    // Cases 1 and 3 pass (echo), case 2 expects different output:
    // 2/3 passed, points 3/4, score round(2/3 * 10) = 7.
    let question = &body["question_results"][0];
    assert_eq!(question["score"], 7.0);
    assert_eq!(question["status"], "WrongAnswer");
    assert_eq!(question["verdict"]["passed_cases"], 2);
    assert_eq!(question["verdict"]["total_cases"], 3);
    assert_eq!(question["verdict"]["total_score"], 3.0);
    assert_eq!(question["verdict"]["max_score"], 4.0);
    assert_eq!(question["verdict"]["percentage"], 75.0);

    // Ordinals follow input order
    let outcomes = question["verdict"]["outcomes"].as_array().unwrap();
    let numbers: Vec<i64> = outcomes
        .iter()
        .map(|o| o["case_number"].as_i64().unwrap())
        .collect();
    assert_eq!(numbers, vec![1, 2, 3]);

    // Hidden case output is blanked in the response
    assert_eq!(outcomes[2]["hidden"], true);
    assert_eq!(outcomes[2]["result"]["stdout"], "");
    assert_eq!(outcomes[0]["result"]["stdout"], "1\n");
}

#[actix_web::test]
async fn test_submit_question_unknown_question() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard { db_path };
    let app = test_app!(pool);

    let req = test::TestRequest::post()
        .uri("/coding-test/t1/submit-question")
        .set_json(json!({
            "student_id": "alice",
            "question_id": "q99",
            "source_code": "x",
            "language": "python",
        }))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_web::test]
async fn test_submit_multi_requires_session() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard { db_path };
    let app = test_app!(pool);

    let req = test::TestRequest::post()
        .uri("/coding-test/t1/submit-multi")
        .set_json(json!({
            "student_id": "dave",
            "language": "python",
            "questions": [{ "question_id": "q1", "source_code": "code" }],
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_SESSION_STATE");
}

#[actix_web::test]
async fn test_submit_multi_full_flow() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard { db_path };
    let app = test_app!(pool);

    let req = test::TestRequest::post()
        .uri("/coding-test/t1/start")
        .set_json(json!({ "student_id": "erin" }))
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    let req = test::TestRequest::post()
        .uri("/coding-test/t1/submit-multi")
        .set_json(json!({
            "student_id": "erin",
            "language": "python",
            "questions": [
                { "question_id": "q1", "source_code": "print(input())" },
                { "question_id": "q2", "source_code": "" },
            ],
            "time_taken_seconds": 900,
            "tab_switches": 2,
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let body: Value = test::read_body_json(resp).await;

    // q1: round(2/3 * 10) = 7; q2 empty code: 0 without execution.
    assert_eq!(body["aggregate_score"], 7.0);
    assert_eq!(body["aggregate_max"], 30.0);
    assert_eq!(body["status"], "WrongAnswer");
    assert_eq!(body["question_results"][1]["score"], 0.0);
    assert_eq!(
        body["question_results"][1]["verdict"]["outcomes"]
            .as_array()
            .unwrap()
            .len(),
        0
    );

    // Session is now terminal: resubmission is rejected
    let req = test::TestRequest::post()
        .uri("/coding-test/t1/submit-multi")
        .set_json(json!({
            "student_id": "erin",
            "language": "python",
            "questions": [{ "question_id": "q1", "source_code": "code" }],
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_SESSION_STATE");

    // Snapshot now shows the stored submission
    let req = test::TestRequest::get()
        .uri("/coding-test/t1?student_id=erin")
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["can_resume"], false);
    assert_eq!(body["session"]["state"], "completed");
    assert_eq!(body["submissions"].as_array().unwrap().len(), 1);
    assert_eq!(body["submissions"][0]["aggregate_score"], 7.0);
}

#[actix_web::test]
async fn test_expired_session_is_auto_submitted_on_get() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard { db_path };
    let app = test_app!(pool);

    let req = test::TestRequest::post()
        .uri("/coding-test/t1/start")
        .set_json(json!({ "student_id": "frank" }))
        .to_request();
    assert!(test::call_service(&app, req).await.status().is_success());

    // Backdate the session past the 30-minute duration
    let started = (Utc::now() - ChronoDuration::minutes(31))
        .to_rfc3339_opts(SecondsFormat::Millis, true);
    sqlx::query("UPDATE sessions SET started_at = ? WHERE student_id = 'frank'")
        .bind(started)
        .execute(&pool)
        .await
        .unwrap();

    let req = test::TestRequest::get()
        .uri("/coding-test/t1?student_id=frank")
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["can_resume"], false);
    assert_eq!(body["session"]["state"], "expired_auto_submitted");
    let completed_at = body["session"]["completed_at"].clone();

    // A second check must not rewrite the terminal record
    let req = test::TestRequest::get()
        .uri("/coding-test/t1?student_id=frank")
        .to_request();
    let body: Value = test::read_body_json(test::call_service(&app, req).await).await;
    assert_eq!(body["session"]["completed_at"], completed_at);
}

#[actix_web::test]
async fn test_malformed_json_is_bad_request() {
    let (pool, db_path) = create_test_db().await;
    let _guard = TestDbGuard { db_path };
    let app = test_app!(pool);

    let req = test::TestRequest::post()
        .uri("/coding-test/t1/start")
        .insert_header(("content-type", "application/json"))
        .set_payload("{ not json")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
    let body: Value = test::read_body_json(resp).await;
    assert_eq!(body["reason"], "ERR_INVALID_ARGUMENT");
    assert_eq!(body["code"], 1);
}
