use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::io;
use std::sync::Arc;

use magentic_backend::agents::CompletionTeamFactory;
use magentic_backend::config::{Config, DEFAULT_UI_PORT};
use magentic_backend::controllers;
use magentic_backend::executor::TaskExecutor;
use magentic_backend::storage::{ResultSerializer, StorageManager};
use magentic_backend::ui::{SessionStore, UiController};
use magentic_backend::AppState;

#[actix_web::main]
async fn main() -> io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = Config::from_env(DEFAULT_UI_PORT).map_err(io::Error::other)?;
    let port = config.port;

    log::info!("Initializing run result storage");
    let storage = Arc::new(StorageManager::from_config(&config.storage).map_err(io::Error::other)?);

    let executor = Arc::new(TaskExecutor::new(Arc::new(CompletionTeamFactory)));
    let ui = Arc::new(UiController::new(
        executor,
        storage,
        ResultSerializer::new(config.storage.budget_bytes),
        config.clone(),
    ));
    let sessions = Arc::new(SessionStore::new());

    log::info!("Starting Magentic-One UI on port {}", port);

    HttpServer::new(move || {
        let cors = Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .app_data(web::Data::new(AppState {
                config: config.clone(),
                sessions: Arc::clone(&sessions),
                ui: Arc::clone(&ui),
            }))
            .wrap(Logger::default())
            .wrap(cors)
            .configure(controllers::health::config)
            .configure(controllers::ui::config)
    })
    .bind(("0.0.0.0", port))?
    .run()
    .await
}
