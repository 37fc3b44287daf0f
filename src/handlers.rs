use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, Method, StatusCode},
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use hashbrown::HashMap;
use log::{error, warn};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::json;
use tokio::sync::{broadcast, RwLock};
use tower_http::cors::CorsLayer;

use crate::config::RunConfig;
use crate::error::{DataUnavailable, Error, ProgressError};
use crate::models::{ProgressEvent, ProgressRecord, RunReport};
use crate::progress::{self, ProgressStore};
use crate::service;

const RUN_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunResult {
    Finished { report: Box<RunReport> },
    Failed { error: String },
}

#[derive(Clone)]
pub struct AppState {
    pub status_tx: broadcast::Sender<ProgressEvent>,
    pub progress: ProgressStore,
    pub results: Arc<RwLock<HashMap<String, RunResult>>>,
    pub database: PathBuf,
}

impl AppState {
    pub fn new(database: PathBuf, progress: ProgressStore) -> Self {
        let (status_tx, _) = broadcast::channel(1024);
        Self {
            status_tx,
            progress,
            results: Arc::new(RwLock::new(HashMap::new())),
            database,
        }
    }
}

pub fn router(state: AppState, allowed_origin: HeaderValue) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(allowed_origin)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600));

    Router::new()
        .route("/optimize", post(optimize_handler))
        .route("/progress/:token", get(progress_handler))
        .route("/result/:token", get(result_handler))
        .route("/status", get(status_handler))
        .layer(cors)
        .with_state(state)
}

/// Maps the error taxonomy onto HTTP statuses.
pub struct ApiError(Error);

impl<E: Into<Error>> From<E> for ApiError {
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Config(_) | Error::Progress(ProgressError::InvalidToken(_)) => {
                StatusCode::BAD_REQUEST
            }
            Error::Data(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Error::Persistence(_) | Error::Progress(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "success": false, "error": self.0.to_string() }))).into_response()
    }
}

pub async fn optimize_handler(
    State(state): State<AppState>,
    Json(config): Json<RunConfig>,
) -> Result<Response, ApiError> {
    config.validate()?;

    let token = progress::new_token();
    let total = config.generations;
    state
        .progress
        .write(&token, &ProgressRecord::started(total))
        .await?;

    let (run_tx, run_rx) = broadcast::channel(RUN_CHANNEL_CAPACITY);
    let forwarder = progress::spawn_forwarder(
        state.progress.clone(),
        token.clone(),
        run_rx,
        state.status_tx.clone(),
    );

    let run_token = token.clone();
    tokio::spawn(async move {
        let database = state.database.clone();
        let run = tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&database).map_err(DataUnavailable::from)?;
            service::run_scope(&mut conn, config, Some(run_tx))
        })
        .await;

        // The run's sender is gone, so the forwarder drains and stops.
        if let Err(err) = forwarder.await {
            warn!("progress forwarder for run {run_token} panicked: {err}");
        }

        let (result, generation, best) = match run {
            Ok(Ok(report)) => {
                let generation = report.generations;
                let best = report.best_fitness.value;
                (RunResult::Finished { report: Box::new(report) }, generation, best)
            }
            Ok(Err(err)) => {
                error!("run {run_token} failed: {err}");
                (RunResult::Failed { error: err.to_string() }, 0, 0.0)
            }
            Err(err) => {
                error!("run {run_token} aborted: {err}");
                (RunResult::Failed { error: err.to_string() }, 0, 0.0)
            }
        };

        // `done` goes to disk only after the result is fetchable. The map stays
        // locked until then so a fetch cannot remove the record mid-write.
        let mut results = state.results.write().await;
        results.insert(run_token.clone(), result);
        let done = ProgressRecord::finished(generation, total, best);
        if let Err(err) = state.progress.write(&run_token, &done).await {
            warn!("final progress write for run {run_token} failed: {err}");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(json!({ "success": true, "token": token }))).into_response())
}

pub async fn progress_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<ProgressRecord>, ApiError> {
    Ok(Json(state.progress.read(&token).await?))
}

/// Hands out a finished run's report exactly once. Consuming it also removes
/// the run's progress record.
pub async fn result_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Response, ApiError> {
    if !progress::is_valid_token(&token) {
        return Err(ProgressError::InvalidToken(token).into());
    }
    let Some(result) = state.results.write().await.remove(&token) else {
        return Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "run unknown or still in progress" })),
        )
            .into_response());
    };

    if let Err(err) = state.progress.remove(&token).await {
        warn!("could not clean up progress for run {token}: {err}");
    }

    let status = match result {
        RunResult::Finished { .. } => StatusCode::OK,
        RunResult::Failed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
    };
    Ok((status, Json(result)).into_response())
}

pub async fn status_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>> + 'static> {
    let mut rx = state.status_tx.subscribe();

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(data) => {
                        yield Ok(Event::default().data(data).event("progress"));
                    }
                    Err(e) => error!("Serialization error: {}", e),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("status subscriber lagged by {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream)
}
