use axum::{
    body::Bytes,
    extract::State,
    http::{Request, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::net::TcpListener;
use serde_json::json;
use tracing::{info, error, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod fields;
mod geometry;
mod layer;
mod map_view;
mod marker;
mod models;
mod source;
mod status;
mod style;
mod template_engine;

use config::Config;
use layer::{load_layer, LoadOutcome, Viewer};
use map_view::{MapSurface, MapView};
use marker::MarkerFactory;
use source::{ConfigError, PostgrestSource, SourceOverrides};
use style::StyleClassifier;
use template_engine::TemplateEngine;

struct AppState {
    config: Config,
    source: PostgrestSource,
    factory: MarkerFactory,
    viewer: Mutex<Viewer<MapView>>,
}

impl AppState {
    fn viewer(&self) -> MutexGuard<'_, Viewer<MapView>> {
        // A panicked handler cannot leave the viewer half-updated, keep serving
        self.viewer.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = Config::load()?;
    let thread_count = config.thread_count.unwrap_or_else(num_cpus::get);

    info!("starting server with {} threads", thread_count);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(thread_count)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn log_request_response(
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().to_string();
    info!("incoming request: {} {}", method, path);
    let response = next.run(req).await;
    info!("request result: {} for {} {}", response.status(), method, path);
    response
}

fn build_state(config: Config) -> anyhow::Result<Arc<AppState>> {
    let templates = Arc::new(TemplateEngine::new(config.templates.dir.as_deref())?);
    let factory = MarkerFactory::new(templates, StyleClassifier::new(config.style.default_color.clone()));
    let http_client = reqwest::Client::builder()
        .user_agent(concat!("geovisor/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let view = &config.view;
    let map = MapView::new(view.home(), view.zoom, (view.width, view.height));
    let viewer = Viewer::new(map, view.settings());

    Ok(Arc::new(AppState {
        config,
        source: PostgrestSource::new(http_client),
        factory,
        viewer: Mutex::new(viewer),
    }))
}

fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/layer", get(get_layer).delete(delete_layer))
        .route("/layer.geojson", get(get_layer_geojson))
        .route("/layer/load", post(post_load))
        .route("/status", get(get_status))
        .layer(middleware::from_fn(log_request_response))
        .with_state(state)
}

async fn async_main(config: Config) -> anyhow::Result<()> {
    let addr = config.bind_addr.clone();
    let autoload = config.autoload;
    let state = build_state(config)?;

    if autoload {
        let state = state.clone();
        tokio::spawn(async move {
            match run_load(&state, SourceOverrides::default()).await {
                Ok(outcome) => info!("autoload finished: {:?}", outcome),
                Err(e) => warn!("autoload skipped: {}", e),
            }
        });
    }

    info!("listening on {}", addr);
    let listener = TcpListener::bind(&addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}

// --- Handlers ---

async fn get_layer(State(state): State<Arc<AppState>>) -> Response {
    let viewer = state.viewer();
    let response = Json(viewer.snapshot()).into_response();
    response
}

async fn get_layer_geojson(State(state): State<Arc<AppState>>) -> Response {
    let viewer = state.viewer();
    let features: Vec<serde_json::Value> = viewer
        .active_layer()
        .map(|layer| {
            layer
                .markers
                .iter()
                .map(|m| {
                    json!({
                        "type": "Feature",
                        "geometry": { "type": "Point", "coordinates": [m.position.lng, m.position.lat] },
                        "properties": {
                            "title": m.title,
                            "color": m.color,
                            "image_url": m.image_url,
                            "icon": m.icon,
                            "popup": m.popup,
                        }
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    Json(json!({ "type": "FeatureCollection", "features": features })).into_response()
}

async fn get_status(State(state): State<Arc<AppState>>) -> Response {
    let viewer = state.viewer();
    let response = Json(json!({
        "phase": viewer.phase(),
        "summary": viewer.summary(),
        "status": viewer.status(),
    }))
    .into_response();
    response
}

async fn post_load(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let overrides = if body.iter().all(u8::is_ascii_whitespace) {
        SourceOverrides::default()
    } else {
        match serde_json::from_slice::<SourceOverrides>(&body) {
            Ok(o) => o,
            Err(e) => {
                return (StatusCode::BAD_REQUEST, format!("invalid load request: {}", e)).into_response();
            }
        }
    };

    match run_load(&state, overrides).await {
        Ok(outcome) => {
            let code = match outcome {
                LoadOutcome::Loaded { .. } => StatusCode::OK,
                LoadOutcome::Failed { .. } => StatusCode::BAD_GATEWAY,
                LoadOutcome::Stale => StatusCode::CONFLICT,
            };
            let viewer = state.viewer();
            let response = (code, Json(json!({ "result": outcome, "status": viewer.status() }))).into_response();
            response
        }
        Err(e) => (StatusCode::BAD_REQUEST, Json(json!({ "error": e.to_string() }))).into_response(),
    }
}

async fn delete_layer(State(state): State<Arc<AppState>>) -> Response {
    let mut viewer = state.viewer();
    let cleared = viewer.clear();
    let response = Json(json!({ "cleared": cleared, "viewport": viewer.map().viewport() })).into_response();
    response
}

// --- Core Logic ---

/// Validates, fetches and applies one load. The viewer lock is only taken
/// around the two state transitions.
async fn run_load(state: &AppState, overrides: SourceOverrides) -> Result<LoadOutcome, ConfigError> {
    let config = state.config.source.with_overrides(overrides);
    let ticket = state.viewer().begin_load(&config)?;
    info!("load {} started for table {}", ticket.generation(), ticket.query.table);

    let result = load_layer(&state.source, &ticket.query, &state.factory).await;
    if let Err(e) = &result {
        error!("load {} failed: {}", ticket.generation(), e);
    }
    Ok(state.viewer().complete_load(ticket, result))
}
