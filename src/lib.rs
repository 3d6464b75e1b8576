pub mod config;
pub mod database;
pub mod execution;
pub mod grading;
pub mod routes;
pub mod runner;
pub mod session;
pub mod sweeper;
pub mod web_server;

pub fn create_timestamp() -> String {
    use chrono::{SecondsFormat, Utc};
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
