use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::io;
use std::sync::Arc;

use magentic_backend::agents::CompletionTeamFactory;
use magentic_backend::config::{Config, DEFAULT_API_PORT};
use magentic_backend::controllers;
use magentic_backend::db::Database;
use magentic_backend::executor::TaskExecutor;
use magentic_backend::task_queue::TaskQueue;
use magentic_backend::ApiState;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env(DEFAULT_API_PORT).map_err(io::Error::other)?;
    let port = config.port;

    log::info!("Initializing database at {}", config.database_url);
    let db = Arc::new(Database::new(&config.database_url).map_err(io::Error::other)?);

    let executor = Arc::new(TaskExecutor::new(Arc::new(CompletionTeamFactory)));
    let tasks = TaskQueue::new(db, executor, config.providers.clone());

    log::info!("Starting Magentic-One task API on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(ApiState { tasks: tasks.clone() }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::health::config_root)
            .configure(controllers::tasks::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
