//! ==============================================================================
//! http.rs - device and dashboard http surface
//! ==============================================================================
//!
//! purpose:
//!     a thin axum layer over the coordinator. handlers parse, call one
//!     coordinator operation and render json; no state lives here.
//!
//! routes:
//!
//! ```text
//!     device
//!       GET/POST /device/checkin              poll (POST may carry a reading)
//!       POST     /data                        legacy: poll that must carry a reading
//!       POST     /device/communication-test   device confirms a communication test
//!
//!     operator
//!       POST     /api/actuator                {"action": "on|off|blink|toggle"}
//!       POST     /api/communication-test      queue a communication test
//!       POST     /api/data-request            queue an on-demand reading
//!
//!     dashboard
//!       GET      /                            minimal html status page
//!       GET      /api/status                  snapshot + liveness + activity
//!       GET      /api/latest                  reconcile from the store first
//!       GET      /api/history?limit=N         store rows, newest first
//!       GET      /api/chart?limit=N           store rows as chart series
//!       GET      /api/logs                    activity log
//!       GET      /api/connection              liveness detail
//! ```
//!
//! ==============================================================================

use crate::coordinator::{CheckInReply, Coordinator, EnqueueReceipt, ReconcileOutcome};
use crate::domain::{ReadingPayload, Snapshot, StoredReading};
use crate::error::{CommandError, ValidationError};
use crate::inbox::{ActuatorAction, Command};

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

const DEFAULT_HISTORY_LIMIT: usize = 20;
const DEFAULT_CHART_LIMIT: usize = 50;
const MAX_HISTORY_LIMIT: usize = 500;
const DEFAULT_ACTIVITY_LIMIT: usize = 20;
const LOGS_LIMIT: usize = 50;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self { coordinator }
    }
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(dashboard_handler))
        .route("/device/checkin", get(checkin_get).post(checkin_post))
        .route("/data", post(legacy_data_handler))
        .route("/device/communication-test", post(communication_ack_handler))
        .route("/api/actuator", post(actuator_handler))
        .route("/api/communication-test", post(communication_test_handler))
        .route("/api/data-request", post(data_request_handler))
        .route("/api/status", get(status_handler))
        .route("/api/latest", get(latest_handler))
        .route("/api/history", get(history_handler))
        .route("/api/chart", get(chart_handler))
        .route("/api/logs", get(logs_handler))
        .route("/api/connection", get(connection_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ==============================================================================
// errors
// ==============================================================================

#[derive(Debug)]
pub enum ApiError {
    Validation(ValidationError),
    Command(CommandError),
    /// a body or query string we could not decode
    BadRequest(String),
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::Validation(e)
    }
}

impl From<CommandError> for ApiError {
    fn from(e: CommandError) -> Self {
        ApiError::Command(e)
    }
}

impl From<QueryRejection> for ApiError {
    fn from(e: QueryRejection) -> Self {
        ApiError::BadRequest(e.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            ApiError::Validation(e) => e.to_string(),
            ApiError::Command(e) => e.to_string(),
            ApiError::BadRequest(message) => message.clone(),
        };
        (StatusCode::BAD_REQUEST, Json(json!({"status": "error", "message": message}))).into_response()
    }
}

// ==============================================================================
// device endpoints
// ==============================================================================

async fn checkin_get(State(state): State<AppState>) -> Result<Json<CheckInReply>, ApiError> {
    let check_in = state.coordinator.check_in(None).await?;
    Ok(Json(check_in.reply))
}

/// parse a device body; a body we cannot read still counts as a heartbeat
async fn device_payload(state: &AppState, body: &[u8]) -> Result<Option<ReadingPayload>, ApiError> {
    match ReadingPayload::from_body(body) {
        Ok(payload) => Ok(payload),
        Err(e) => {
            state.coordinator.heartbeat().await;
            Err(e.into())
        }
    }
}

/// a body with no known channel is a plain heartbeat, not a bad reading
async fn checkin_post(State(state): State<AppState>, body: Bytes) -> Result<Json<CheckInReply>, ApiError> {
    let payload = device_payload(&state, &body).await?.filter(|p| !p.is_empty());
    let check_in = state.coordinator.check_in(payload.as_ref()).await?;
    Ok(Json(check_in.reply))
}

#[derive(Serialize)]
struct LegacyDataReply {
    message: &'static str,
    #[serde(flatten)]
    reply: CheckInReply,
}

async fn legacy_data_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<LegacyDataReply>, ApiError> {
    let payload = device_payload(&state, &body).await?.unwrap_or_default();
    let check_in = state.coordinator.check_in(Some(&payload)).await?;
    Ok(Json(LegacyDataReply { message: "Sensor data received", reply: check_in.reply }))
}

async fn communication_ack_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let at = state.coordinator.acknowledge_communication_test().await;
    Json(json!({
        "status": "success",
        "message": "Communication test received",
        "timestamp": at,
    }))
}

// ==============================================================================
// operator endpoints
// ==============================================================================

#[derive(Deserialize, Default)]
struct ActuatorParams {
    action: Option<String>,
}

#[derive(Serialize)]
struct EnqueueReply {
    status: &'static str,
    message: String,
    #[serde(flatten)]
    receipt: EnqueueReceipt,
}

/// no body or no `action` means toggle
async fn actuator_handler(State(state): State<AppState>, body: Bytes) -> Result<Json<EnqueueReply>, ApiError> {
    let params: ActuatorParams = if body.iter().all(u8::is_ascii_whitespace) {
        ActuatorParams::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(format!("malformed JSON body: {e}")))?
    };
    let action = match params.action.as_deref() {
        Some(raw) => raw.parse::<ActuatorAction>()?,
        None => ActuatorAction::Toggle,
    };
    let receipt = state.coordinator.enqueue(Command::Actuator(action)).await;
    Ok(Json(EnqueueReply {
        status: "success",
        message: format!("LED command queued: {action}"),
        receipt,
    }))
}

async fn communication_test_handler(State(state): State<AppState>) -> Json<EnqueueReply> {
    let receipt = state.coordinator.enqueue(Command::CommunicationTest).await;
    Json(EnqueueReply {
        status: "success",
        message: "Communication test request queued".to_string(),
        receipt,
    })
}

async fn data_request_handler(State(state): State<AppState>) -> Json<EnqueueReply> {
    let receipt = state.coordinator.enqueue(Command::DataRequest).await;
    Json(EnqueueReply {
        status: "success",
        message: "Data request queued, the device will send data on its next check-in".to_string(),
        receipt,
    })
}

// ==============================================================================
// dashboard endpoints
// ==============================================================================

#[derive(Deserialize, Default)]
struct LimitParams {
    limit: Option<usize>,
}

impl LimitParams {
    fn resolve(&self, default: usize) -> usize {
        self.limit.unwrap_or(default).clamp(1, MAX_HISTORY_LIMIT)
    }
}

async fn status_handler(
    State(state): State<AppState>,
    params: Result<Query<LimitParams>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(params) = params?;
    let view = state.coordinator.dashboard(params.resolve(DEFAULT_ACTIVITY_LIMIT)).await;
    let mut body = serde_json::to_value(&view).unwrap_or_else(|_| json!({}));
    if let Some(obj) = body.as_object_mut() {
        obj.insert("status".into(), json!("success"));
    }
    Ok(Json(body))
}

async fn latest_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let outcome = state.coordinator.reconcile().await;
    let snapshot = state.coordinator.current().await;
    let status = match outcome {
        ReconcileOutcome::StoreFailed { .. } => "error",
        _ => "success",
    };
    let updated = last_update(snapshot.as_ref());
    Json(json!({
        "status": status,
        "reconcile": outcome,
        "sensor_data": snapshot,
        "last_update": updated,
    }))
}

async fn history_handler(
    State(state): State<AppState>,
    params: Result<Query<LimitParams>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(params) = params?;
    let body = match state.coordinator.history(params.resolve(DEFAULT_HISTORY_LIMIT)).await {
        Ok(rows) => json!({"status": "success", "data": rows}),
        Err(e) => json!({
            "status": "error",
            "store_error": e.kind(),
            "message": e.to_string(),
            "data": [],
        }),
    };
    Ok(Json(body))
}

/// oldest-first series for a time chart
#[derive(Serialize, Default, Debug, PartialEq)]
pub struct ChartSeries {
    pub labels: Vec<String>,
    pub temperature1: Vec<f64>,
    pub humidity1: Vec<f64>,
    pub temperature2: Vec<f64>,
    pub humidity2: Vec<f64>,
    pub soil_moisture1: Vec<f64>,
    pub soil_moisture2: Vec<f64>,
    pub uv_index: Vec<f64>,
}

impl ChartSeries {
    /// `rows` newest first, as the gateway returns them
    pub fn from_newest_first(rows: &[StoredReading]) -> Self {
        let mut series = ChartSeries::default();
        for row in rows.iter().rev() {
            series.labels.push(row.timestamp.format("%Y-%m-%d %H:%M:%S").to_string());
            series.temperature1.push(row.temperature1);
            series.humidity1.push(row.humidity1);
            series.temperature2.push(row.temperature2);
            series.humidity2.push(row.humidity2);
            series.soil_moisture1.push(row.soil_moisture1);
            series.soil_moisture2.push(row.soil_moisture2);
            series.uv_index.push(row.uv_index);
        }
        series
    }
}

async fn chart_handler(
    State(state): State<AppState>,
    params: Result<Query<LimitParams>, QueryRejection>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let Query(params) = params?;
    let (status, series) = match state.coordinator.history(params.resolve(DEFAULT_CHART_LIMIT)).await {
        Ok(rows) => ("success", ChartSeries::from_newest_first(&rows)),
        Err(_) => ("error", ChartSeries::default()),
    };
    let mut body = serde_json::to_value(&series).unwrap_or_else(|_| json!({}));
    if let Some(obj) = body.as_object_mut() {
        obj.insert("status".into(), json!(status));
    }
    Ok(Json(body))
}

async fn logs_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let (logs, total) = state.coordinator.activity(LOGS_LIMIT).await;
    Json(json!({"status": "success", "logs": logs, "total_logs": total}))
}

async fn connection_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let report = state.coordinator.liveness().await;
    Json(json!({
        "status": "success",
        "connected": report.connected,
        "connection_status": report.status,
        "seconds_since_last_data": report.seconds_since_contact,
        "last_heartbeat": report.last_heartbeat,
        "last_data_received": report.last_reading_at,
        "last_communication_test": report.last_communication_test,
        "timeout_seconds": report.timeout_seconds,
    }))
}

fn last_update(snapshot: Option<&Snapshot>) -> String {
    snapshot
        .map(|s| s.captured_at.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "N/A".to_string())
}

// ==============================================================================
// html page
// ==============================================================================
// status at a glance; the full dashboard is a separate frontend on /api/*.

async fn dashboard_handler(State(state): State<AppState>) -> Html<String> {
    let view = state.coordinator.dashboard(10).await;

    let rows: String = match &view.snapshot {
        Some(snapshot) => snapshot
            .reading
            .channels()
            .iter()
            .map(|(name, value)| format!("<tr><td>{}</td><td>{:.2}</td></tr>", html_escape(name), value))
            .collect(),
        None => "<tr><td colspan=\"2\">N/A</td></tr>".to_string(),
    };
    let activity: String = view
        .activity
        .iter()
        .map(|e| {
            format!(
                "<li>{} [{:?}] {}</li>",
                e.timestamp.format("%H:%M:%S"),
                e.level,
                html_escape(&e.message)
            )
        })
        .collect();
    let since = view
        .liveness
        .seconds_since_contact
        .map(|s| format!("{s:.0}s ago"))
        .unwrap_or_else(|| "never".to_string());

    Html(format!(
        r#"<!doctype html>
<html>
<head><title>shadow hub</title><meta http-equiv="refresh" content="10"></head>
<body style="font-family: system-ui; padding: 2rem; background: #1a1a2e; color: #eee;">
    <h1>device: {status}</h1>
    <p>last contact: {since} &middot; last reading: {updated} &middot; led: {led:?}</p>
    <table>{rows}</table>
    <h2>activity</h2>
    <ul>{activity}</ul>
</body>
</html>"#,
        status = view.liveness.status.as_str(),
        since = since,
        updated = html_escape(&view.last_update),
        led = view.display.led_status,
        rows = rows,
        activity = activity,
    ))
}

/// escape html special characters to prevent xss
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::parse_timestamp;

    #[test]
    fn escapes_markup() {
        assert_eq!(html_escape("<b>\"x\" & y</b>"), "&lt;b&gt;&quot;x&quot; &amp; y&lt;/b&gt;");
    }

    #[test]
    fn chart_series_run_oldest_first() {
        let row = |ts: &str, t: f64| StoredReading {
            timestamp: parse_timestamp(ts).unwrap(),
            device_id: None,
            temperature1: t,
            humidity1: 50.0,
            temperature2: 0.0,
            humidity2: 0.0,
            soil_moisture1: 0.0,
            soil_moisture2: 0.0,
            uv_index: 0.0,
        };
        let rows = vec![row("2025-01-01T10:02:00Z", 22.0), row("2025-01-01T10:01:00Z", 21.0)];
        let series = ChartSeries::from_newest_first(&rows);
        assert_eq!(series.labels, vec!["2025-01-01 10:01:00", "2025-01-01 10:02:00"]);
        assert_eq!(series.temperature1, vec![21.0, 22.0]);
    }
}
