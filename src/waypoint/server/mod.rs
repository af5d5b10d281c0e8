// SPDX-License-Identifier: MIT

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::stream::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::sdk::error::GraphError;
use crate::waypoint::checkpoint::RunRecord;
use crate::waypoint::runner::{RunResponse, Runner};
use crate::waypoint::workflow::graph::RunEvent;

/// Build the HTTP API around a runner
pub fn router(runner: Arc<Runner>) -> Router {
    Router::new()
        .route("/api/health", get(health_check))
        .route("/api/graphs", get(list_graphs))
        .route("/api/graphs/{name}", get(get_graph))
        .route("/api/runs", post(create_run).get(list_runs))
        .route("/api/runs/stream", post(stream_run))
        .route("/api/runs/{id}", get(get_run).delete(delete_run))
        .route("/api/runs/{id}/resume", post(resume_run))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(runner)
}

pub async fn serve(
    runner: Arc<Runner>,
    host: &str,
    port: u16,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Request traces from TraceLayer; `log` output stays with env_logger
    if tracing::subscriber::set_global_default(tracing_subscriber::fmt().finish()).is_err() {
        log::debug!("A tracing subscriber is already installed");
    }

    let app = router(runner);
    let listener = tokio::net::TcpListener::bind((host, port)).await?;
    log::info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}

/// `GraphError` rendered as `{"error": ...}` with a matching status code
pub struct ApiError(GraphError);

impl From<GraphError> for ApiError {
    fn from(err: GraphError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            GraphError::NoSuchRun(_) | GraphError::UnknownGraph(_) => StatusCode::NOT_FOUND,
            GraphError::ConcurrentResume(_) | GraphError::RunExists(_) => StatusCode::CONFLICT,
            GraphError::InvalidState(_) | GraphError::RunFailed { .. } => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if !self.0.is_client_error() {
            log::error!("Request failed: {}", self.0);
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

async fn health_check(State(runner): State<Arc<Runner>>) -> Json<Value> {
    Json(json!({ "status": "ok", "graphs": runner.graphs().len().await }))
}

async fn list_graphs(State(runner): State<Arc<Runner>>) -> Json<Value> {
    let graphs: Vec<Value> = runner
        .graphs()
        .list()
        .await
        .iter()
        .map(|graph| {
            json!({
                "name": graph.name(),
                "description": graph.description(),
                "start": graph.start(),
                "steps": graph.steps(),
            })
        })
        .collect();
    Json(json!(graphs))
}

async fn get_graph(
    State(runner): State<Arc<Runner>>,
    Path(name): Path<String>,
) -> ApiResult<Json<Value>> {
    let graph = runner
        .graphs()
        .get(&name)
        .await
        .ok_or(GraphError::UnknownGraph(name))?;
    Ok(Json(graph.describe()))
}

#[derive(Deserialize)]
struct StartRequest {
    graph: String,
    #[serde(default)]
    state: Value,
    #[serde(default)]
    run_id: Option<String>,
}

async fn create_run(
    State(runner): State<Arc<Runner>>,
    Json(payload): Json<StartRequest>,
) -> ApiResult<Json<RunResponse>> {
    let response = runner
        .start(&payload.graph, payload.state, payload.run_id)
        .await?;
    Ok(Json(response))
}

async fn list_runs(State(runner): State<Arc<Runner>>) -> ApiResult<Json<Vec<RunRecord>>> {
    Ok(Json(runner.list().await?))
}

async fn get_run(
    State(runner): State<Arc<Runner>>,
    Path(id): Path<String>,
) -> ApiResult<Json<RunRecord>> {
    Ok(Json(runner.get(&id).await?))
}

async fn delete_run(
    State(runner): State<Arc<Runner>>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    runner.discard(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
struct ResumeRequest {
    answer: Value,
}

async fn resume_run(
    State(runner): State<Arc<Runner>>,
    Path(id): Path<String>,
    Json(payload): Json<ResumeRequest>,
) -> ApiResult<Json<RunResponse>> {
    Ok(Json(runner.resume(&id, payload.answer).await?))
}

async fn stream_run(
    State(runner): State<Arc<Runner>>,
    Json(payload): Json<StartRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let StartRequest { graph, state, run_id } = payload;
    if runner.graphs().get(&graph).await.is_none() {
        return Err(GraphError::UnknownGraph(graph).into());
    }

    let (tx, rx) = mpsc::channel(100);
    let run_id = run_id.unwrap_or_else(|| Uuid::new_v4().to_string());

    tokio::spawn(async move {
        log::info!("Starting streaming run {} of graph: {}", run_id, graph);
        let (run_tx, mut run_rx) = mpsc::channel(100);

        let run = async {
            let result = runner
                .start_with_events(
                    &graph,
                    state,
                    Some(run_id.clone()),
                    Some(&run_tx),
                )
                .await;
            drop(run_tx);
            result
        };
        // Keep draining after the client leaves so the run never blocks
        let relay = async {
            let mut failure_sent = false;
            while let Some(event) = run_rx.recv().await {
                failure_sent |= matches!(event, RunEvent::Failed { .. });
                let _ = tx.send(event).await;
            }
            failure_sent
        };
        let (result, failure_sent) = tokio::join!(run, relay);

        // Errors outside step execution never reach the event channel
        if let Err(e) = result {
            if !failure_sent {
                let _ = tx
                    .send(RunEvent::Failed {
                        run_id,
                        step: e.step().map(str::to_string),
                        error: e.to_string(),
                    })
                    .await;
            }
        }
    });

    let stream = ReceiverStream::new(rx).map(|event| {
        Ok(Event::default()
            .json_data(&event)
            .unwrap_or_else(|e| Event::default().event("error").data(e.to_string())))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(1))))
}
