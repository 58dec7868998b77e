/**
 * API REST SEGWATCH - Serveur HTTP du kernel
 *
 * RÔLE :
 * Expose l'endpoint synthétique de statistiques par segment, plus les vues
 * de lecture sur le store (séries) et le moniteur "en ligne".
 *
 * FONCTIONNEMENT :
 * - Serveur Axum, état unique `AppState` partagé entre handlers
 * - Routes : /health, /system/health, /segment-stats, /timeseries, /monitor
 * - Tout IO disque (inventaire, SQLite) part en `spawn_blocking`
 * - Erreurs : `current_time` illisible => 400, corps JSON invalide ou
 *   paramètre hors bornes => 422, le reste => 500, corps `{"detail": ...}`
 *
 * L'horloge murale n'est lue qu'ici ; le cœur reçoit toujours `now`.
 */

use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, Instrument};

use crate::config::KernelConfig;
use crate::error::SegwatchError;
use crate::health::{HealthTracker, KernelHealth};
use crate::inventory::FleetInventory;
use crate::monitor::{MonitorResult, MonitorState, OnlineMonitor};
use crate::segments::{build_payload, filter_recent, find_segment, SegmentPayload, SegmentStatsRequest};
use crate::state::{new_state, Shared};
use crate::store::{SnapshotStore, StoredRow};

#[derive(Clone)]
pub struct AppState {
    pub inventory: Arc<FleetInventory>,
    pub cfg: Shared<KernelConfig>,
    pub health_tracker: HealthTracker,
}

impl AppState {
    pub fn new(cfg: KernelConfig) -> Self {
        Self {
            inventory: Arc::new(FleetInventory::new(cfg.inventory_path.clone())),
            cfg: new_state(cfg),
            health_tracker: HealthTracker::new(),
        }
    }
}

/// Erreur HTTP : statut + message lisible
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    detail: String,
}

impl ApiError {
    fn new(status: StatusCode, detail: impl Into<String>) -> Self {
        Self { status, detail: detail.into() }
    }
}

impl From<SegwatchError> for ApiError {
    fn from(err: SegwatchError) -> Self {
        if matches!(err, SegwatchError::OutOfRange { .. }) {
            Self::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
        } else if err.is_validation() {
            Self::new(StatusCode::BAD_REQUEST, err.to_string())
        } else {
            error!(error = %err, "request failed");
            Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        error!(error = %err, "blocking task failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal task failure")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(serde_json::json!({ "detail": self.detail }))).into_response()
    }
}

async fn run_blocking<T, F>(work: F) -> Result<T, ApiError>
where
    F: FnOnce() -> crate::error::Result<T> + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(work).await??)
}

// compte les requêtes et les place dans un span avec un id unique
async fn track_requests(State(app): State<AppState>, req: Request, next: Next) -> Response {
    app.health_tracker.record_request();
    let span = tracing::info_span!(
        "http",
        request_id = %uuid::Uuid::new_v4(),
        method = %req.method(),
        path = %req.uri().path(),
    );
    next.run(req).instrument(span).await
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({ "status": "ok" })) }))
        .route("/system/health", get(get_system_health))
        .route("/segment-stats", post(segment_stats))
        .route("/timeseries/segments", get(list_stored_segments))
        .route("/timeseries/{segment}", get(get_segment_series))
        .route("/monitor/online", get(get_online_monitor))
        .layer(middleware::from_fn_with_state(app_state.clone(), track_requests))
        .with_state(app_state)
}

// GET /system/health
async fn get_system_health(State(app): State<AppState>) -> Json<KernelHealth> {
    Json(app.health_tracker.get_health())
}

// POST /segment-stats : heartbeat persisté puis agrégation
async fn segment_stats(State(app): State<AppState>, body: Bytes) -> Result<Json<SegmentPayload>, ApiError> {
    let request: SegmentStatsRequest = if body.iter().all(u8::is_ascii_whitespace) {
        SegmentStatsRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, format!("Invalid request body: {e}")))?
    };

    // validation complète avant tout effet de bord
    let now = request.resolve_now(Utc::now().naive_utc())?;

    let inventory = app.inventory.clone();
    let (payload, fleet_size) = run_blocking(move || {
        let mut rng = rand::thread_rng();
        let devices = inventory.check_in(now, request.update_probability, &mut rng)?;
        let recent = filter_recent(&devices, now, request.window_minutes);
        let payload = build_payload(&recent, now, request.window_minutes, request.frequency_minutes);
        Ok((payload, devices.len()))
    })
    .await?;

    app.health_tracker.record_payload(&payload.generated_at, fleet_size);
    info!(
        generated_at = %payload.generated_at,
        in_window = payload.device_count_in_window,
        fleet = fleet_size,
        "segment stats served"
    );
    Ok(Json(payload))
}

// GET /timeseries/segments
async fn list_stored_segments(State(app): State<AppState>) -> Result<Json<Vec<String>>, ApiError> {
    let store_path = app.cfg.lock().store_path.clone();
    let segments = run_blocking(move || match SnapshotStore::open_existing(&store_path)? {
        Some(store) => store.list_segments(),
        None => Ok(Vec::new()),
    })
    .await?;
    Ok(Json(segments))
}

// GET /timeseries/{segment}
async fn get_segment_series(
    State(app): State<AppState>,
    Path(segment): Path<String>,
) -> Result<Json<Vec<StoredRow>>, ApiError> {
    if find_segment(&segment).is_none() {
        return Err(ApiError::new(StatusCode::NOT_FOUND, format!("Unknown segment: {segment}")));
    }

    let store_path = app.cfg.lock().store_path.clone();
    let rows = run_blocking(move || match SnapshotStore::open_existing(&store_path)? {
        Some(store) => store.segment_series(&[segment]),
        None => Ok(Vec::new()),
    })
    .await?;
    Ok(Json(rows))
}

#[derive(Debug, Serialize)]
struct MonitorView {
    state: MonitorState,
    #[serde(flatten)]
    result: MonitorResult,
}

// GET /monitor/online : lecture seule, jamais de ligne dans le journal d'alertes
async fn get_online_monitor(State(app): State<AppState>) -> Result<Json<MonitorView>, ApiError> {
    let settings = app.cfg.lock().monitor_settings(false);
    let result = run_blocking(move || OnlineMonitor::new(settings).evaluate_latest(Utc::now())).await?;
    Ok(Json(MonitorView {
        state: result.state(),
        result,
    }))
}
