use axum::http::HeaderValue;
use log::info;
use rusqlite::Connection;

use timetable_builder::handlers::{router, AppState};
use timetable_builder::progress::ProgressStore;
use timetable_builder::{schema, ServerConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let config = ServerConfig::from_env();

    // Make sure the store has the tables the engine reads and writes.
    schema::create_all(&Connection::open(&config.database)?)?;
    tokio::fs::create_dir_all(&config.progress_dir).await?;

    let state = AppState::new(config.database.clone(), ProgressStore::new(&config.progress_dir));
    let app = router(state, config.allowed_origin.parse::<HeaderValue>()?);

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!("Server running on http://{}", config.bind);
    axum::serve(listener, app).await?;
    Ok(())
}
