use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use communities::CommunitySummary;
use index::{BuildOutcome, BuildState, GraphIndex, GraphNode, GraphPath, GraphStats, Neighborhood, NodeId};
use pipeline::{ExtractionJob, ExtractionOutcome, ExtractionRequest, JobStarted, PersistenceStatus, PipelineError};
use query::{DiscoveryRequest, RelationshipResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use crate::metrics::{MetricsSnapshot, TimedOperation};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(get_metrics))
        .route("/extractions", post(start_extraction))
        .route("/extractions/:id", get(get_extraction))
        .route("/graph/build", post(build_graph))
        .route("/graph/stats", get(get_graph_stats))
        .route("/graph/communities", get(get_communities))
        .route("/graph/nodes/:id/neighborhood", get(get_neighborhood))
        .route("/graph/path", get(get_path))
        .route("/graph/hubs", get(get_hubs))
        .route("/graph/central", get(get_central))
        .route("/relationships/discover", post(discover_relationships))
        .with_state(state)
}

/// Error body returned by every handler.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(e: PipelineError) -> Self {
        let status = match e {
            PipelineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    pages: usize,
    active_jobs: usize,
    running_work: usize,
    graph: BuildState,
}

async fn health_check(State(state): State<Arc<AppState>>) -> Result<Json<HealthResponse>, ApiError> {
    let pages = state
        .store
        .list_pages()
        .await
        .map_err(|e| ApiError::new(StatusCode::SERVICE_UNAVAILABLE, format!("{:#}", e)))?
        .len();

    Ok(Json(HealthResponse {
        status: "ok",
        pages,
        active_jobs: state.service.jobs().len(),
        running_work: state.service.running().len(),
        graph: state.graph.state(),
    }))
}

async fn get_metrics(State(state): State<Arc<AppState>>) -> Json<MetricsSnapshot> {
    Json(state.metrics.snapshot())
}

async fn start_extraction(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExtractionRequest>,
) -> Result<(StatusCode, Json<JobStarted>), ApiError> {
    let handle = state.service.start_extraction(request)?;
    let started = handle.summary();
    state.metrics.record_extraction_started(started.joined);

    if !started.joined {
        let metrics = state.metrics.clone();
        tokio::spawn(async move {
            let timer = TimedOperation::start();
            match handle.wait().await {
                Ok(ExtractionOutcome::Completed(done)) => {
                    let persisted = !matches!(done.persistence, PersistenceStatus::Failed { .. });
                    metrics.record_extraction_completed(timer.elapsed(), done.knowledge.entities.len(), persisted);
                }
                Ok(ExtractionOutcome::NoContent) => metrics.record_extraction_without_content(),
                Err(e) => {
                    error!("Extraction failed: {}", e);
                    metrics.record_extraction_failed();
                }
            }
        });
    }

    Ok((StatusCode::ACCEPTED, Json(started)))
}

async fn get_extraction(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ExtractionJob>, ApiError> {
    state
        .service
        .jobs()
        .get(&id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Unknown extraction {}", id)))
}

#[derive(Deserialize)]
struct BuildParams {
    #[serde(default)]
    wait: bool,
}

async fn build_graph(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BuildParams>,
) -> Result<Json<BuildOutcome>, ApiError> {
    let timer = TimedOperation::start();
    let result = if params.wait {
        state.graph.build_or_wait(state.store.as_ref()).await
    } else {
        state.graph.build(state.store.as_ref()).await
    };
    let outcome = result.map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)))?;

    let coalesced = !matches!(outcome, BuildOutcome::Built(_));
    state.metrics.record_graph_build(timer.elapsed(), coalesced);
    info!(coalesced, "Graph build request handled");
    Ok(Json(outcome))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GraphStatsResponse {
    state: BuildState,
    #[serde(flatten)]
    stats: GraphStats,
}

async fn get_graph_stats(State(state): State<Arc<AppState>>) -> Json<GraphStatsResponse> {
    Json(GraphStatsResponse {
        state: state.graph.state(),
        stats: state.graph.snapshot().stats(),
    })
}

#[derive(Deserialize)]
struct CommunityParams {
    #[serde(default)]
    level: usize,
}

async fn get_communities(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CommunityParams>,
) -> Json<Vec<CommunitySummary>> {
    let graph = state.graph.snapshot();
    Json(state.summarizer.summarize_all(&graph, params.level))
}

#[derive(Deserialize)]
struct NeighborhoodParams {
    #[serde(default = "default_depth")]
    depth: usize,
    #[serde(default = "default_max_nodes")]
    max_nodes: usize,
}

fn default_depth() -> usize {
    2
}

fn default_max_nodes() -> usize {
    50
}

async fn get_neighborhood(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Query(params): Query<NeighborhoodParams>,
) -> Result<Json<Neighborhood>, ApiError> {
    let graph = state.graph.snapshot();
    let node = resolve_node(&graph, &id)?;
    graph
        .get_neighborhood(node, params.depth, params.max_nodes)
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("Unknown node {}", id)))
}

#[derive(Deserialize)]
struct PathParams {
    from: String,
    to: String,
    #[serde(default = "default_path_depth")]
    max_depth: usize,
}

fn default_path_depth() -> usize {
    6
}

async fn get_path(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PathParams>,
) -> Result<Json<GraphPath>, ApiError> {
    let graph = state.graph.snapshot();
    let from = resolve_node(&graph, &params.from)?;
    let to = resolve_node(&graph, &params.to)?;

    graph
        .find_shortest_path(from, to, params.max_depth)
        .map(Json)
        .ok_or_else(|| {
            ApiError::not_found(format!(
                "No path between {} and {} within {} hops",
                params.from, params.to, params.max_depth
            ))
        })
}

#[derive(Deserialize)]
struct TopParams {
    #[serde(default = "default_top")]
    n: usize,
}

fn default_top() -> usize {
    10
}

async fn get_hubs(State(state): State<Arc<AppState>>, Query(params): Query<TopParams>) -> Json<Vec<GraphNode>> {
    let graph = state.graph.snapshot();
    Json(graph.get_hub_nodes(params.n).into_iter().cloned().collect())
}

async fn get_central(State(state): State<Arc<AppState>>, Query(params): Query<TopParams>) -> Json<Vec<GraphNode>> {
    let graph = state.graph.snapshot();
    Json(graph.get_top_nodes_by_centrality(params.n).into_iter().cloned().collect())
}

async fn discover_relationships(
    State(state): State<Arc<AppState>>,
    Json(request): Json<DiscoveryRequest>,
) -> Json<Vec<RelationshipResult>> {
    let timer = TimedOperation::start();
    let results = state.discovery.discover(&request).await;
    state.metrics.record_discovery(timer.elapsed());
    Json(results)
}

/// Accept either a numeric node id or an entity name.
fn resolve_node(graph: &GraphIndex, key: &str) -> Result<NodeId, ApiError> {
    key.parse::<NodeId>()
        .ok()
        .filter(|id| graph.node(*id).is_some())
        .or_else(|| graph.node_by_name(key).map(|n| n.id))
        .ok_or_else(|| ApiError::not_found(format!("Unknown node {}", key)))
}
