use std::fs;
use std::path::{Path, PathBuf};

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};

use crate::grading::GradedSubmission;

const DATABASE_NAME: &str = "codegrade.sqlite3";

pub fn get_db_path() -> PathBuf {
    use directories::ProjectDirs;

    let proj_dirs = ProjectDirs::from("", "", "codegrade").expect("Unable to find user directory");
    let data_dir = proj_dirs.data_local_dir();

    fs::create_dir_all(data_dir).expect("Failed to create local data dir");

    data_dir.join(DATABASE_NAME)
}

pub async fn init_db(db_path: impl AsRef<Path>) -> sqlx::Result<SqlitePool> {
    let db_url = format!("sqlite://{}?mode=rwc", db_path.as_ref().display()); // rwc = read/write/create
    let db_pool = SqlitePoolOptions::new()
        .max_connections(2)
        .min_connections(0)
        .connect(&db_url)
        .await?;

    // PRAGMA statements cannot run inside a transaction
    for pragma_sql in &[
        "PRAGMA foreign_keys = ON;",
        "PRAGMA busy_timeout = 2000;", // 2 seconds timeout for lock contention
        "PRAGMA journal_mode = WAL;",  // Write-Ahead Logging for better concurrency
        "PRAGMA synchronous = NORMAL;",
    ] {
        sqlx::query(pragma_sql).execute(&db_pool).await?;
    }

    init_schema(&db_pool).await?;

    log::info!("Initialized database at {}", db_path.as_ref().display());

    Ok(db_pool)
}

/// Create tables idempotently. Shared with tests that run against their own
/// pools.
pub async fn init_schema(pool: &SqlitePool) -> sqlx::Result<()> {
    let mut tx = pool.begin().await?;

    for sql in &[
        r"
        CREATE TABLE IF NOT EXISTS sessions (
            id            INTEGER  PRIMARY KEY,
            student_id    TEXT     NOT NULL,
            test_id       TEXT     NOT NULL,
            state         TEXT     NOT NULL,
            started_at    TEXT     NOT NULL,
            completed_at  TEXT,
            comment       TEXT     NOT NULL DEFAULT ''
        );",
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_sessions_student_test
         ON sessions(student_id, test_id);",
        r"
        CREATE TABLE IF NOT EXISTS submissions (
            id               INTEGER  PRIMARY KEY,
            student_id       TEXT     NOT NULL,
            test_id          TEXT     NOT NULL,
            language         TEXT     NOT NULL,
            aggregate_score  REAL     NOT NULL,
            aggregate_max    REAL     NOT NULL,
            percentage       REAL     NOT NULL,
            status           TEXT     NOT NULL,
            submitted_at     TEXT     NOT NULL
        );",
        r"
        CREATE TABLE IF NOT EXISTS submission_question (
            submission_id  INTEGER  NOT NULL,
            question_id    TEXT     NOT NULL,
            score          REAL     NOT NULL,
            marks          REAL     NOT NULL,
            passed_cases   INTEGER  NOT NULL,
            total_cases    INTEGER  NOT NULL,
            status         TEXT     NOT NULL,
            lines_of_code  INTEGER  NOT NULL,
            complexity     TEXT     NOT NULL,
            has_comments   INTEGER  NOT NULL,
            PRIMARY KEY (submission_id, question_id),
            FOREIGN KEY (submission_id)  REFERENCES submissions (id)
        );",
        r"
        CREATE TABLE IF NOT EXISTS submission_case (
            submission_id   INTEGER  NOT NULL,
            question_id     TEXT     NOT NULL,
            case_number     INTEGER  NOT NULL,
            status          TEXT     NOT NULL,
            passed          INTEGER  NOT NULL,
            points_awarded  REAL     NOT NULL,
            time_ms         INTEGER  NOT NULL,
            memory_kb       INTEGER  NOT NULL,
            PRIMARY KEY (submission_id, question_id, case_number),
            FOREIGN KEY (submission_id)  REFERENCES submissions (id)
        );",
    ] {
        sqlx::query(sql).execute(tx.as_mut()).await?;
    }

    tx.commit().await?;
    Ok(())
}

pub fn remove_db(db_path: impl AsRef<Path>) {
    // WAL and SHM files might not exist; ignore errors
    let wal_path = format!("{}-wal", db_path.as_ref().display());
    let shm_path = format!("{}-shm", db_path.as_ref().display());
    let _ = fs::remove_file(wal_path);
    let _ = fs::remove_file(shm_path);

    if let Err(e) = std::fs::remove_file(&db_path) {
        log::warn!(
            "Unable to remove database at {}: {e}",
            db_path.as_ref().display()
        );
    } else {
        log::info!("Removed database at {}", db_path.as_ref().display());
    }
}

/// Persist a finalized grading result: one submission row plus its question
/// and case rows, in a single transaction.
pub async fn save_submission(
    pool: &SqlitePool,
    graded: &GradedSubmission,
) -> sqlx::Result<i64> {
    let mut tx = pool.begin().await?;

    let result = sqlx::query(
        r#"
        INSERT INTO submissions
            (student_id, test_id, language, aggregate_score, aggregate_max,
             percentage, status, submitted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&graded.student_id)
    .bind(&graded.test_id)
    .bind(graded.language.as_str())
    .bind(graded.aggregate_score)
    .bind(graded.aggregate_max)
    .bind(graded.aggregate_percentage)
    .bind(graded.status.as_str())
    .bind(&graded.submitted_at)
    .execute(tx.as_mut())
    .await?;

    let submission_id = result.last_insert_rowid();

    for question in &graded.question_results {
        sqlx::query(
            r#"
            INSERT INTO submission_question
                (submission_id, question_id, score, marks, passed_cases,
                 total_cases, status, lines_of_code, complexity, has_comments)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(submission_id)
        .bind(&question.question_id)
        .bind(question.score)
        .bind(question.marks)
        .bind(question.verdict.passed_cases as i64)
        .bind(question.verdict.total_cases as i64)
        .bind(question.status.as_str())
        .bind(question.quality.lines_of_code as i64)
        .bind(format!("{:?}", question.quality.complexity).to_lowercase())
        .bind(question.quality.has_comments)
        .execute(tx.as_mut())
        .await?;

        for outcome in &question.verdict.outcomes {
            sqlx::query(
                r#"
                INSERT INTO submission_case
                    (submission_id, question_id, case_number, status, passed,
                     points_awarded, time_ms, memory_kb)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(submission_id)
            .bind(&question.question_id)
            .bind(outcome.case_number as i64)
            .bind(outcome.result.status.as_str())
            .bind(outcome.passed)
            .bind(outcome.points_awarded)
            .bind(outcome.result.wall_time_ms as i64)
            .bind(outcome.result.memory_kb as i64)
            .execute(tx.as_mut())
            .await?;
        }
    }

    tx.commit().await?;
    Ok(submission_id)
}

/// Condensed submission row for resume snapshots.
#[derive(Debug, Clone, serde::Serialize)]
pub struct SubmissionSummary {
    pub id: i64,
    pub aggregate_score: f64,
    pub aggregate_max: f64,
    pub percentage: f64,
    pub status: String,
    pub submitted_at: String,
}

pub async fn fetch_submissions(
    pool: &SqlitePool,
    student_id: &str,
    test_id: &str,
) -> sqlx::Result<Vec<SubmissionSummary>> {
    let rows = sqlx::query(
        r#"
        SELECT id, aggregate_score, aggregate_max, percentage, status, submitted_at
        FROM submissions
        WHERE student_id = ? AND test_id = ?
        ORDER BY submitted_at
        "#,
    )
    .bind(student_id)
    .bind(test_id)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| SubmissionSummary {
            id: row.get("id"),
            aggregate_score: row.get("aggregate_score"),
            aggregate_max: row.get("aggregate_max"),
            percentage: row.get("percentage"),
            status: row.get("status"),
            submitted_at: row.get("submitted_at"),
        })
        .collect())
}
