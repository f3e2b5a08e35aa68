//! Read-only HTTP API over the outage store.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/grid?lat=&lon=&zoom=` | Outage-density grid as GeoJSON |
//! | `GET`  | `/episodes?lat=&lon=` | Outage episodes at a location |
//! | `GET`  | `/timestamps` | Snapshot timestamps with outages |
//! | `GET`  | `/snapshots/{timestamp}` | Outage polygons at one timestamp |
//!
//! # Error Contract
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "lat must be in [-90, 90], got 91" } }
//! ```
//!
//! Error codes: `bad_request` (400), `not_found` (404), `internal` (500).
//!
//! Grid and episode responses go through the read-through cache in
//! [`crate::cache`]; the other endpoints always hit the store.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so browser map clients
//! can call the API directly.

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use outage_tracker_core::error::Error;
use outage_tracker_core::feature::{FeatureCollection, OutageProperties};
use outage_tracker_core::grid::GridFeatureCollection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::cache::{get_or_compute, new_cache, ResponseCache};
use crate::config::Config;
use crate::db;
use crate::episodes::{episodes_at, EpisodesResponse};
use crate::grid::{grid_around, DEFAULT_ZOOM};
use crate::models::Location;
use crate::sqlite_store::SqliteStore;
use crate::timestamps::{list_timestamps, snapshot_at, TimestampsResponse};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    store: Arc<SqliteStore>,
    cache: ResponseCache,
}

impl AppState {
    pub fn new(store: Arc<SqliteStore>, config: &Config) -> Self {
        Self {
            store,
            cache: new_cache(&config.server),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/grid", get(handle_grid))
        .route("/episodes", get(handle_episodes))
        .route("/timestamps", get(handle_timestamps))
        .route("/snapshots/{timestamp}", get(handle_snapshot))
        .layer(cors)
        .with_state(state)
}

/// Serve until Ctrl-C.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store = Arc::new(SqliteStore::new(db::connect(config).await?));
    let app = router(AppState::new(store.clone(), config));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    println!("outage API listening on http://{}", listener.local_addr()?);
    tracing::info!(bind = %config.server.bind, cache_ttl_secs = config.server.cache_ttl_secs, "server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutting down");
        })
        .await?;

    if let Ok(store) = Arc::try_unwrap(store) {
        store.close().await;
    }
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found".to_string(),
        message: message.into(),
    }
}

/// Map a failed computation to a response. Grids the tiling cannot
/// represent become 400; everything else is a 500.
fn internal(err: anyhow::Error) -> AppError {
    let message = format!("{:#}", err);
    if matches!(err.downcast_ref::<Error>(), Some(Error::Geometry(_))) {
        return bad_request(message);
    }
    tracing::error!(error = %message, "request failed");
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message,
    }
}

fn location_from(query: &LocationQuery) -> Result<Location, AppError> {
    let location = Location::new(query.lat, query.lon);
    location.to_point().map_err(|e| bad_request(e.to_string()))?;
    Ok(location)
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ GET /grid ============

#[derive(Debug, Deserialize)]
struct LocationQuery {
    lat: f64,
    lon: f64,
}

#[derive(Debug, Deserialize)]
struct GridQuery {
    lat: f64,
    lon: f64,
    zoom: Option<u8>,
}

async fn handle_grid(
    State(state): State<AppState>,
    query: Result<Query<GridQuery>, QueryRejection>,
) -> Result<Json<GridFeatureCollection>, AppError> {
    let Query(query) = query.map_err(|e| bad_request(e.body_text()))?;
    let location = location_from(&LocationQuery {
        lat: query.lat,
        lon: query.lon,
    })?;
    let zoom = query.zoom.unwrap_or(DEFAULT_ZOOM);
    let key = format!("grid:{:.6}:{:.6}:{}", location.lat, location.lon, zoom);

    let grid = get_or_compute(&state.cache, &key, || async {
        grid_around(state.store.as_ref(), location, zoom)
            .await
            .map(|g| g.to_feature_collection())
            .map_err(internal)
    })
    .await?;
    Ok(Json(grid))
}

// ============ GET /episodes ============

async fn handle_episodes(
    State(state): State<AppState>,
    query: Result<Query<LocationQuery>, QueryRejection>,
) -> Result<Json<EpisodesResponse>, AppError> {
    let Query(query) = query.map_err(|e| bad_request(e.body_text()))?;
    let location = location_from(&query)?;
    let key = format!("episodes:{:.6}:{:.6}", location.lat, location.lon);

    let response = get_or_compute(&state.cache, &key, || async {
        episodes_at(state.store.as_ref(), location)
            .await
            .map_err(internal)
    })
    .await?;
    Ok(Json(response))
}

// ============ GET /timestamps ============

async fn handle_timestamps(
    State(state): State<AppState>,
) -> Result<Json<TimestampsResponse>, AppError> {
    let response = list_timestamps(state.store.as_ref())
        .await
        .map_err(internal)?;
    Ok(Json(response))
}

// ============ GET /snapshots/{timestamp} ============

async fn handle_snapshot(
    State(state): State<AppState>,
    Path(timestamp): Path<String>,
) -> Result<Json<FeatureCollection<OutageProperties>>, AppError> {
    let timestamp: i64 = timestamp
        .parse()
        .map_err(|_| bad_request(format!("invalid timestamp: {}", timestamp)))?;
    let collection = snapshot_at(state.store.as_ref(), timestamp)
        .await
        .map_err(internal)?
        .ok_or_else(|| not_found(format!("snapshot not found: {}", timestamp)))?;
    Ok(Json(collection))
}
