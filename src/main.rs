use std::time::Duration;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use codegrade::config::{CliArgs, Config};
use codegrade::database as db;
use codegrade::execution::{Dispatcher, HttpBackend, ProviderPool};
use codegrade::runner::TestCaseRunner;
use codegrade::sweeper::sweeper;
use codegrade::web_server::build_server;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let db_path = db::get_db_path();
    let cli = CliArgs::parse();

    let Config {
        server: server_config,
        providers,
        fallback,
        execution,
        tests,
    } = cli.to_config().expect("Failed to load configuration");

    if providers.is_empty() {
        panic!("At least one execution provider must be configured");
    }

    if cli.flush_data {
        db::remove_db(&db_path);
    }

    let db_pool = db::init_db(&db_path)
        .await
        .expect("Failed to initialize database");

    let backend = HttpBackend::new(Duration::from_secs(execution.call_timeout_secs))
        .expect("Failed to build HTTP backend");
    let dispatcher = Dispatcher::new(ProviderPool::new(providers), fallback, backend);
    let runner = TestCaseRunner::new(dispatcher, Duration::from_millis(execution.case_delay_ms));

    let shutdown_token = CancellationToken::new();

    // ======= PREPARATION END, EXECUTION START =======

    let sweeper_task = tokio::spawn(sweeper(
        tests.clone(),
        db_pool.clone(),
        shutdown_token.clone(),
    ));

    let server = build_server(server_config, tests, db_pool, runner)
        .expect("Failed to build server");

    let server_handle = server.handle();
    let server_task = actix_web::rt::spawn(server);

    // ===== EXECUTION END, WAITING FOR SHUTDOWN ======

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            log::info!("Ctrl-c received, shutting down...");
        }
        res_server = server_task => {
            log::error!("Server terminated unexpectedly: {:?}", res_server);
        }
    }

    // 1. Shutdown actix-web server gracefully
    server_handle.stop(true).await;

    // 2. Stop the expiry sweeper
    shutdown_token.cancel();
    log::info!("Shutdown signal sent to sweeper, waiting for it to finish...");

    if let Err(e) = sweeper_task.await {
        if e.is_panic() {
            log::error!("Sweeper handle panicked: {:?}", e);
        } else {
            log::error!("Sweeper handle finished with error: {:?}", e);
        }
    }

    log::info!("Shutdown complete");
    Ok(())
}
