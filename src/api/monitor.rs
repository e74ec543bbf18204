use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    config::Config,
    error::{MonitorError, Result},
    loader::{fetch_series, ChartSnapshot, Dashboard},
    metrics,
    models::{IngestResponse, Sample, SeriesResponse, WorstApps},
    store::{open_store, SampleStore},
    views::{ViewDescriptor, ViewKind},
};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn SampleStore>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(store: Arc<dyn SampleStore>, config: Config) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewParams {
    pub app: Option<String>,
    /// Comma separated instance tags.
    pub tags: Option<String>,
    pub interval: Option<u64>,
}

impl ViewParams {
    fn app(&self) -> Result<&str> {
        match self.app.as_deref() {
            Some(app) if !app.is_empty() => Ok(app),
            _ => Err(MonitorError::InvalidQuery("app is required".to_string())),
        }
    }

    fn tags(&self) -> Vec<String> {
        self.tags
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn descriptor(&self, kind: &str, config: &Config) -> Result<ViewDescriptor> {
        let kind: ViewKind = kind.parse()?;
        let tags = config.tags(&self.tags())?;
        kind.descriptor(self.app()?, &tags)
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct IntervalParams {
    pub interval: Option<u64>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/views", get(list_views))
        .route("/views/:kind", get(get_view))
        .route("/series/:kind", get(get_series))
        .route("/dashboard", get(get_dashboard))
        .route("/worst-apps", get(get_worst_apps))
        .route("/samples", post(ingest_samples))
        .route("/metrics", get(export_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn list_views() -> Json<Vec<ViewKind>> {
    Json(ViewKind::ALL.to_vec())
}

async fn get_view(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<ViewParams>,
) -> Result<Json<ViewDescriptor>> {
    Ok(Json(params.descriptor(&kind, &state.config)?))
}

async fn get_series(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Query(params): Query<ViewParams>,
) -> Result<Json<SeriesResponse>> {
    let view = params.descriptor(&kind, &state.config)?;
    let interval = state.config.interval(params.interval)?;
    info!("Loading {} for {} over {}s", view.kind, view.query.app, interval);

    let records = fetch_series(state.store.as_ref(), &view, interval).await?;
    Ok(Json(SeriesResponse::new(view.keys, records)))
}

async fn get_dashboard(
    State(state): State<AppState>,
    Query(params): Query<ViewParams>,
) -> Result<Json<BTreeMap<ViewKind, ChartSnapshot>>> {
    let app = params.app()?;
    let interval = state.config.interval(params.interval)?;
    info!("Loading dashboard for {} over {}s", app, interval);

    let dashboard = Dashboard::app_performance(state.store.clone(), app)?;
    dashboard.reload(interval).await;
    Ok(Json(dashboard.snapshot()))
}

async fn get_worst_apps(
    State(state): State<AppState>,
    Query(params): Query<IntervalParams>,
) -> Result<Json<WorstApps>> {
    let interval = state.config.interval(params.interval)?;
    Ok(Json(state.store.fetch_worst_apps(interval).await?))
}

async fn ingest_samples(
    State(state): State<AppState>,
    Json(samples): Json<Vec<Sample>>,
) -> Result<Json<IngestResponse>> {
    info!("Ingesting {} samples", samples.len());
    let ingested = state.store.ingest(samples).await?;
    Ok(Json(IngestResponse { ingested }))
}

async fn export_metrics() -> Result<impl IntoResponse> {
    let body = metrics::export()?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}

pub async fn start_server(config: Config) -> Result<()> {
    let store = open_store(&config)?;
    let addr = format!("0.0.0.0:{}", config.port);
    let app = router(AppState::new(store, config));

    info!("Starting monitor on {}", addr);
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        MonitorError::Internal(format!("Failed to bind to address: {}", e))
    })?;

    axum::serve(listener, app)
        .await
        .map_err(|e| MonitorError::Internal(format!("Server error: {}", e)))?;

    Ok(())
}
