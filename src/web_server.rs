use actix_web::{App, HttpServer, dev::Server, middleware, web};
use sqlx::sqlite::SqlitePool;

use crate::config::{ServerConfig, TestConfig};
use crate::execution::HttpBackend;
use crate::routes::{
    get_test_handler, json_error_handler, query_error_handler, start_test_handler,
    submit_multi_handler, submit_question_handler,
};
use crate::runner::TestCaseRunner;

pub fn build_server(
    server_config: ServerConfig,
    tests: Vec<TestConfig>,
    db_pool: SqlitePool,
    runner: TestCaseRunner<HttpBackend>,
) -> std::io::Result<Server> {
    let db_pool = web::Data::new(db_pool);
    let tests = web::Data::new(tests);
    let runner = web::Data::new(runner);

    let server = HttpServer::new(move || {
        App::new()
            .app_data(db_pool.clone())
            .app_data(tests.clone())
            .app_data(runner.clone())
            .app_data(web::JsonConfig::default().error_handler(json_error_handler))
            .app_data(web::QueryConfig::default().error_handler(query_error_handler))
            .wrap(middleware::Logger::default())
            .service(
                web::scope("/coding-test")
                    .route("/{test_id}/start", web::post().to(start_test_handler))
                    .route(
                        "/{test_id}/submit-question",
                        web::post().to(submit_question_handler::<HttpBackend>),
                    )
                    .route(
                        "/{test_id}/submit-multi",
                        web::post().to(submit_multi_handler::<HttpBackend>),
                    )
                    .route("/{test_id}", web::get().to(get_test_handler)),
            )
    })
    .bind((
        server_config
            .bind_address
            .unwrap_or("127.0.0.1".to_string()),
        server_config.bind_port.unwrap_or(12345),
    ))?
    .run();

    Ok(server)
}
