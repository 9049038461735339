//! HTTP API for ingestion, device queries, alert streaming and health/metrics

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::{DateTime, Duration, Utc};
use monitor_lib::{
    alert::{Notifier, PING, PONG},
    health::{ComponentStatus, HealthRegistry},
    ingest::Ingestor,
    models::{Classification, DeviceStatus, ReadingInput, ReadingValue},
    observability::{MonitorMetrics, StructuredLogger},
    store::{AlertFilter, ReadingStore},
    MonitorError,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::json;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// Hard cap on rows returned by the records endpoint
const RECORDS_LIMIT: i64 = 100;
/// Default lookback for records and alerts queries
const DEFAULT_QUERY_HOURS: i64 = 24;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ReadingStore>,
    pub ingestor: Arc<Ingestor>,
    pub notifier: Notifier,
    pub health_registry: HealthRegistry,
    pub metrics: MonitorMetrics,
    pub logger: StructuredLogger,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ReadingStore>,
        ingestor: Arc<Ingestor>,
        notifier: Notifier,
        health_registry: HealthRegistry,
    ) -> Self {
        Self {
            store,
            ingestor,
            notifier,
            health_registry,
            metrics: MonitorMetrics::new(),
            logger: StructuredLogger::new("energy-monitor"),
        }
    }
}

fn error_response(err: MonitorError) -> Response {
    let status = match &err {
        MonitorError::UnknownDevice(_) | MonitorError::UnknownAlert(_) => StatusCode::NOT_FOUND,
        MonitorError::DuplicateOrOutOfOrder { .. } => StatusCode::CONFLICT,
        MonitorError::MalformedReading(_) => StatusCode::BAD_REQUEST,
        MonitorError::TransientStore(_) => StatusCode::SERVICE_UNAVAILABLE,
        MonitorError::Config(_) | MonitorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": message.into() })),
    )
        .into_response()
}

/// Request body for the ingestion endpoint; exactly one of the two value
/// fields must be present
#[derive(Debug, Deserialize)]
struct IngestBody {
    timestamp: Option<DateTime<Utc>>,
    cumulative_value: Option<f64>,
    delta_value: Option<f64>,
}

async fn ingest_reading(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<i64>,
    Json(body): Json<IngestBody>,
) -> Response {
    let value = match (body.cumulative_value, body.delta_value) {
        (Some(v), None) => ReadingValue::Cumulative(v),
        (None, Some(d)) => ReadingValue::ExplicitDelta(d),
        (Some(_), Some(_)) => {
            return error_response(MonitorError::MalformedReading(
                "cumulative_value and delta_value are mutually exclusive".to_string(),
            ))
        }
        (None, None) => {
            return error_response(MonitorError::MalformedReading(
                "either cumulative_value or delta_value is required".to_string(),
            ))
        }
    };

    let input = ReadingInput {
        timestamp: body.timestamp.unwrap_or_else(Utc::now),
        value,
    };

    match state.ingestor.ingest(device_id, input).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "record": {
                    "timestamp": outcome.reading.timestamp,
                    "cumulative_value": outcome.reading.cumulative_value,
                    "delta": outcome.reading.delta,
                    "classification": outcome.reading.classification,
                    "reason": outcome.reading.reason,
                },
                "alerts_triggered": outcome.alerts.len(),
            })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct DevicesQuery {
    status: Option<String>,
}

async fn list_devices(
    State(state): State<Arc<AppState>>,
    Query(query): Query<DevicesQuery>,
) -> Response {
    let status = match query.status.as_deref() {
        Some(raw) => match DeviceStatus::from_str(raw) {
            Ok(status) => Some(status),
            Err(msg) => return bad_request(msg),
        },
        None => None,
    };

    match state.store.devices(status).await {
        Ok(devices) => Json(devices).into_response(),
        Err(err) => error_response(err),
    }
}

async fn device_status(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<i64>,
) -> Response {
    let device = match state.store.device(device_id).await {
        Ok(Some(device)) => device,
        Ok(None) => return error_response(MonitorError::UnknownDevice(device_id)),
        Err(err) => return error_response(err),
    };
    let latest = match state.store.latest_reading(device_id).await {
        Ok(latest) => latest,
        Err(err) => return error_response(err),
    };

    Json(json!({
        "device_id": device.id,
        "device_code": device.device_code,
        "device_name": device.device_name,
        "status": device.status,
        "last_reading": latest.as_ref().map(|r| r.timestamp),
        "cumulative_value": latest.as_ref().map(|r| r.cumulative_value),
        "delta": latest.as_ref().and_then(|r| r.delta),
        "classification": latest.as_ref().map(|r| r.classification),
    }))
    .into_response()
}

#[derive(Debug, Deserialize)]
struct RecordsQuery {
    hours: Option<i64>,
    classification: Option<String>,
}

async fn device_records(
    State(state): State<Arc<AppState>>,
    Path(device_id): Path<i64>,
    Query(query): Query<RecordsQuery>,
) -> Response {
    let classification = match query.classification.as_deref() {
        Some(raw) => match Classification::from_str(raw) {
            Ok(classification) => Some(classification),
            Err(msg) => return bad_request(msg),
        },
        None => None,
    };

    let hours = query.hours.unwrap_or(DEFAULT_QUERY_HOURS).max(0);
    let since = Utc::now() - Duration::hours(hours);

    match state
        .store
        .readings_since(device_id, since, classification, RECORDS_LIMIT)
        .await
    {
        Ok(readings) => Json(readings).into_response(),
        Err(err) => error_response(err),
    }
}

#[derive(Debug, Deserialize)]
struct AlertsQuery {
    device_id: Option<i64>,
    resolved: Option<bool>,
    hours: Option<i64>,
}

async fn list_alerts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AlertsQuery>,
) -> Response {
    let hours = query.hours.unwrap_or(DEFAULT_QUERY_HOURS).max(0);
    let filter = AlertFilter {
        device_id: query.device_id,
        resolved: query.resolved,
        since: Utc::now() - Duration::hours(hours),
    };

    match state.store.alerts(&filter).await {
        Ok(alerts) => Json(alerts).into_response(),
        Err(err) => error_response(err),
    }
}

async fn resolve_alert(
    State(state): State<Arc<AppState>>,
    Path(alert_id): Path<i64>,
) -> Response {
    match state.store.resolve_alert(alert_id).await {
        Ok(alert) => Json(alert).into_response(),
        Err(err) => error_response(err),
    }
}

async fn quality_statistics(State(state): State<Arc<AppState>>) -> Response {
    match state.store.quality_summary().await {
        Ok(summary) => Json(summary).into_response(),
        Err(err) => error_response(err),
    }
}

/// WebSocket subscription to the live alert feed
async fn ws_alerts(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_subscriber(socket, state))
}

async fn handle_subscriber(mut socket: WebSocket, state: Arc<AppState>) {
    let mut rx = state.notifier.subscribe();
    state
        .metrics
        .set_subscribers_connected(state.notifier.subscriber_count() as i64);
    state
        .logger
        .log_subscriber_change(true, state.notifier.subscriber_count());

    loop {
        tokio::select! {
            frame = socket.recv() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        if text == PING
                            && socket.send(Message::Text(PONG.to_string())).await.is_err()
                        {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
            alert = rx.recv() => {
                match alert {
                    Ok(payload) => {
                        if socket.send(Message::Text(payload.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        // Slow consumer: the channel already dropped its
                        // oldest payloads, account for them and carry on.
                        state.metrics.inc_notifier_dropped(missed);
                        warn!(missed, "Subscriber lagging, oldest alerts dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    drop(rx);
    state
        .metrics
        .set_subscribers_connected(state.notifier.subscriber_count() as i64);
    state
        .logger
        .log_subscriber_change(false, state.notifier.subscriber_count());
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder.encode(&metric_families, &mut buffer).unwrap();

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/devices/:id/ingest", post(ingest_reading))
        .route("/api/devices", get(list_devices))
        .route("/api/devices/:id/status", get(device_status))
        .route("/api/devices/:id/records", get(device_records))
        .route("/api/alerts", get(list_alerts))
        .route("/api/alerts/:id/resolve", put(resolve_alert))
        .route("/api/statistics/quality", get(quality_statistics))
        .route("/ws/alerts", get(ws_alerts))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
