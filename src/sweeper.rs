use std::time::Duration;

use sqlx::sqlite::SqlitePool;
use tokio_util::sync::CancellationToken;

use crate::config::TestConfig;
use crate::session;

const SWEEP_INTERVAL: Duration = Duration::from_secs(30);

/// Background task that auto-submits overdue in-progress sessions.
///
/// The resume check performs the same write lazily; this only tightens the
/// window so an abandoned attempt does not sit open until the student next
/// loads the test.
pub async fn sweeper(
    tests: Vec<TestConfig>,
    db_pool: SqlitePool,
    token: CancellationToken,
) -> anyhow::Result<()> {
    log::info!("Session expiry sweeper started");

    loop {
        tokio::select! {
            _ = token.cancelled() => {
                log::info!("Sweeper received shutdown signal, stopping");
                break;
            }

            _ = tokio::time::sleep(SWEEP_INTERVAL) => {
                for test in &tests {
                    match session::expire_overdue_sessions(
                        &db_pool,
                        &test.id,
                        test.duration_minutes,
                    )
                    .await
                    {
                        Ok(0) => {}
                        Ok(expired) => {
                            log::info!(
                                "Auto-submitted {expired} overdue session(s) for test {}",
                                test.id
                            );
                        }
                        Err(e) => {
                            log::error!("Sweep failed for test {}: {e}", test.id);
                        }
                    }
                }
            }
        }
    }

    log::info!("Sweeper has shut down gracefully");
    Ok(())
}
