use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use sqlx::Row;
use sqlx::sqlite::SqlitePool;

use crate::create_timestamp;

pub const AUTO_SUBMIT_COMMENT: &str = "Auto-submitted: test duration elapsed";

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    InProgress,
    Completed,
    ExpiredAutoSubmitted,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionState::InProgress => "in_progress",
            SessionState::Completed => "completed",
            SessionState::ExpiredAutoSubmitted => "expired_auto_submitted",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "in_progress" => Some(SessionState::InProgress),
            "completed" => Some(SessionState::Completed),
            "expired_auto_submitted" => Some(SessionState::ExpiredAutoSubmitted),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::ExpiredAutoSubmitted
        )
    }
}

/// One student's attempt at one coding test.
#[derive(Serialize, Debug, Clone)]
pub struct SessionRecord {
    pub id: i64,
    pub student_id: String,
    pub test_id: String,
    pub state: SessionState,
    pub started_at: String,
    pub completed_at: Option<String>,
    pub comment: String,
}

#[derive(Debug)]
pub enum StartOutcome {
    Started(SessionRecord),
    /// A session for this (student, test) already exists, active or
    /// terminal; starting again must not overwrite it.
    AlreadyExists(SessionRecord),
}

#[derive(Debug)]
pub enum ResumeCheck {
    Resumable(SessionRecord),
    NotStarted,
    /// Terminal session, including one auto-submitted by this very check.
    AlreadyCompleted(SessionRecord),
}

#[derive(Debug)]
pub enum CompleteOutcome {
    Completed(SessionRecord),
    /// No in-progress session to complete; terminal states are final.
    NotInProgress(Option<SessionRecord>),
}

pub async fn find_session(
    pool: &SqlitePool,
    student_id: &str,
    test_id: &str,
) -> anyhow::Result<Option<SessionRecord>> {
    let row = sqlx::query(
        r#"
        SELECT id, student_id, test_id, state, started_at, completed_at, comment
        FROM sessions
        WHERE student_id = ? AND test_id = ?
        "#,
    )
    .bind(student_id)
    .bind(test_id)
    .fetch_optional(pool)
    .await?;

    row.map(record_from_row).transpose()
}

fn record_from_row(row: sqlx::sqlite::SqliteRow) -> anyhow::Result<SessionRecord> {
    let state_text: String = row.get("state");
    let state = SessionState::parse(&state_text)
        .ok_or_else(|| anyhow::anyhow!("Unknown session state in store: {state_text}"))?;

    Ok(SessionRecord {
        id: row.get("id"),
        student_id: row.get("student_id"),
        test_id: row.get("test_id"),
        state,
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        comment: row.get("comment"),
    })
}

/// Start an attempt. The uniqueness invariant (at most one session per
/// student and test) is enforced by a single conditional insert, so two
/// concurrent start calls cannot both succeed.
pub async fn start_session(
    pool: &SqlitePool,
    student_id: &str,
    test_id: &str,
) -> anyhow::Result<StartOutcome> {
    let now = create_timestamp();

    let inserted = sqlx::query(
        r#"
        INSERT INTO sessions (student_id, test_id, state, started_at, comment)
        SELECT ?, ?, 'in_progress', ?, ''
        WHERE NOT EXISTS (
            SELECT 1 FROM sessions WHERE student_id = ? AND test_id = ?
        )
        "#,
    )
    .bind(student_id)
    .bind(test_id)
    .bind(&now)
    .bind(student_id)
    .bind(test_id)
    .execute(pool)
    .await?
    .rows_affected();

    let record = find_session(pool, student_id, test_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Session vanished right after start"))?;

    if inserted == 1 {
        log::info!("Started session {} for student {student_id} on test {test_id}", record.id);
        Ok(StartOutcome::Started(record))
    } else {
        log::info!(
            "Rejected duplicate start for student {student_id} on test {test_id} (state {})",
            record.state.as_str()
        );
        Ok(StartOutcome::AlreadyExists(record))
    }
}

/// Check whether an attempt can be resumed.
///
/// If the timer has elapsed, the session is first marked
/// expired-auto-submitted (guarded on the in-progress state) and only then
/// is "already completed" reported, so a repeat check finds the terminal
/// state and never re-triggers anything.
pub async fn check_resume(
    pool: &SqlitePool,
    student_id: &str,
    test_id: &str,
    duration_minutes: u32,
) -> anyhow::Result<ResumeCheck> {
    let Some(record) = find_session(pool, student_id, test_id).await? else {
        return Ok(ResumeCheck::NotStarted);
    };

    if record.state.is_terminal() {
        return Ok(ResumeCheck::AlreadyCompleted(record));
    }

    let started_at = DateTime::parse_from_rfc3339(&record.started_at)
        .map_err(|e| anyhow::anyhow!("Invalid started_at on session {}: {e}", record.id))?
        .with_timezone(&Utc);
    let deadline = started_at + Duration::minutes(i64::from(duration_minutes));

    if Utc::now() < deadline {
        return Ok(ResumeCheck::Resumable(record));
    }

    expire_session(pool, record.id).await?;
    log::info!(
        "Session {} for student {student_id} expired, auto-submitted",
        record.id
    );

    let record = find_session(pool, student_id, test_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("Session vanished during auto-submit"))?;
    Ok(ResumeCheck::AlreadyCompleted(record))
}

/// Mark an overdue in-progress session terminal. Guarded on the current
/// state so it is a no-op once any terminal write has happened.
async fn expire_session(pool: &SqlitePool, session_id: i64) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        UPDATE sessions
        SET state = 'expired_auto_submitted', completed_at = ?, comment = ?
        WHERE id = ? AND state = 'in_progress'
        "#,
    )
    .bind(create_timestamp())
    .bind(AUTO_SUBMIT_COMMENT)
    .bind(session_id)
    .execute(pool)
    .await?;
    Ok(())
}

/// Normal submission path: in_progress -> completed. Conditional update, so
/// completing a terminal session fails instead of overwriting it.
pub async fn complete_session(
    pool: &SqlitePool,
    student_id: &str,
    test_id: &str,
) -> anyhow::Result<CompleteOutcome> {
    let updated = sqlx::query(
        r#"
        UPDATE sessions
        SET state = 'completed', completed_at = ?
        WHERE student_id = ? AND test_id = ? AND state = 'in_progress'
        "#,
    )
    .bind(create_timestamp())
    .bind(student_id)
    .bind(test_id)
    .execute(pool)
    .await?
    .rows_affected();

    let record = find_session(pool, student_id, test_id).await?;

    if updated == 1 {
        let record = record.ok_or_else(|| anyhow::anyhow!("Session vanished on completion"))?;
        log::info!("Completed session {} for student {student_id}", record.id);
        Ok(CompleteOutcome::Completed(record))
    } else {
        Ok(CompleteOutcome::NotInProgress(record))
    }
}

/// One sweep pass for a single test: expire every overdue in-progress
/// session in one conditional update.
pub async fn expire_overdue_sessions(
    pool: &SqlitePool,
    test_id: &str,
    duration_minutes: u32,
) -> anyhow::Result<u64> {
    let cutoff = (Utc::now() - Duration::minutes(i64::from(duration_minutes)))
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true);

    let expired = sqlx::query(
        r#"
        UPDATE sessions
        SET state = 'expired_auto_submitted', completed_at = ?, comment = ?
        WHERE test_id = ? AND state = 'in_progress' AND started_at < ?
        "#,
    )
    .bind(create_timestamp())
    .bind(AUTO_SUBMIT_COMMENT)
    .bind(test_id)
    .bind(&cutoff)
    .execute(pool)
    .await?
    .rows_affected();

    Ok(expired)
}
