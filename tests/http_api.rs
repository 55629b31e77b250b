// tests/http_api.rs
//
// full round trips over a real socket: axum on 127.0.0.1:0, reqwest as the
// device and as the dashboard.

use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;

use shadow_hub::clock::ManualClock;
use shadow_hub::http::{build_router, AppState};
use shadow_hub::{Coordinator, CoordinatorSettings, MemoryGateway};

struct Hub {
    base: String,
    client: reqwest::Client,
    store: Arc<MemoryGateway>,
    clock: Arc<ManualClock>,
}

impl Hub {
    async fn start() -> Self {
        let store = Arc::new(MemoryGateway::new());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 6, 1, 8, 0, 0).unwrap()));
        let coordinator = Arc::new(Coordinator::with_clock(
            store.clone(),
            CoordinatorSettings::default(),
            clock.clone(),
        ));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let app = build_router(AppState::new(coordinator));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Hub { base: format!("http://{addr}"), client: reqwest::Client::new(), store, clock }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.client.get(self.url(path)).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn post_json(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self.client.post(self.url(path)).json(&body).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn post_raw(&self, path: &str, body: &'static str) -> (u16, Value) {
        let resp = self.client.post(self.url(path)).body(body).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }
}

#[tokio::test]
async fn device_reading_shows_up_on_the_dashboard() {
    let hub = Hub::start().await;

    let (code, body) = hub
        .post_json(
            "/device/checkin",
            json!({"temperature1": 23.5, "humidity1": 60, "soil_moisture1": "410"}),
        )
        .await;
    assert_eq!(code, 200);
    assert_eq!(body["status"], "success");
    assert_eq!(body["reading_accepted"], true);
    assert_eq!(body["data"]["temperature1"], 23.5);

    let (code, status) = hub.get("/api/status").await;
    assert_eq!(code, 200);
    assert_eq!(status["status"], "success");
    assert_eq!(status["snapshot"]["humidity1"], 60.0);
    assert_eq!(status["snapshot"]["soil_moisture1"], 410.0);
    assert_eq!(status["snapshot"]["uv_index"], 0.0);
    assert_eq!(status["liveness"]["status"], "connected");
    assert_eq!(status["last_update"], "2025-06-01 08:00:00");
}

#[tokio::test]
async fn missing_mandatory_channel_is_a_400_that_names_it() {
    let hub = Hub::start().await;

    let (code, body) = hub.post_json("/data", json!({"temperature1": 20.0})).await;
    assert_eq!(code, 400);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().contains("humidity1"));

    let (_, status) = hub.get("/api/status").await;
    assert!(status["snapshot"].is_null());
    // the rejected poll still proved the device is alive
    assert_eq!(status["liveness"]["status"], "connected");
}

#[tokio::test]
async fn malformed_body_is_rejected_but_counts_as_contact() {
    let hub = Hub::start().await;

    let (code, body) = hub.post_raw("/device/checkin", "{not json").await;
    assert_eq!(code, 400);
    assert_eq!(body["status"], "error");

    let (_, conn) = hub.get("/api/connection").await;
    assert_eq!(conn["connected"], true);
    assert!(conn["last_data_received"].is_null());
}

#[tokio::test]
async fn queued_commands_ride_the_next_poll_exactly_once() {
    let hub = Hub::start().await;

    let (code, receipt) = hub.post_json("/api/actuator", json!({"action": "ON"})).await;
    assert_eq!(code, 200);
    assert_eq!(receipt["class"], "actuator");
    assert_eq!(receipt["replaced"], false);
    assert_eq!(receipt["led_state"], true);

    let (_, receipt) = hub.post_json("/api/actuator", json!({"action": "blink"})).await;
    assert_eq!(receipt["replaced"], true);
    assert_eq!(receipt["led_status"], "BLINKING");

    let (code, _) = hub.post_json("/api/data-request", json!({})).await;
    assert_eq!(code, 200);

    let (_, first) = hub.get("/device/checkin").await;
    assert_eq!(first["actuator"], "blink");
    assert_eq!(first["data_request"], true);
    assert!(first.get("communication_test").is_none());

    let (_, second) = hub.get("/device/checkin").await;
    assert!(second.get("actuator").is_none());
    assert!(second.get("data_request").is_none());
}

#[tokio::test]
async fn unknown_actuator_action_is_rejected() {
    let hub = Hub::start().await;
    let (code, body) = hub.post_json("/api/actuator", json!({"action": "explode"})).await;
    assert_eq!(code, 400);
    assert!(body["message"].as_str().unwrap().contains("explode"));

    let (_, poll) = hub.get("/device/checkin").await;
    assert!(poll.get("actuator").is_none());
}

#[tokio::test]
async fn communication_test_round_trip() {
    let hub = Hub::start().await;
    hub.post_json("/api/communication-test", json!({})).await;

    let (_, poll) = hub.get("/device/checkin").await;
    assert_eq!(poll["communication_test"], true);

    hub.clock.advance(ChronoDuration::seconds(2));
    let (code, ack) = hub.post_json("/device/communication-test", json!({})).await;
    assert_eq!(code, 200);
    assert_eq!(ack["status"], "success");

    let (_, conn) = hub.get("/api/connection").await;
    assert_eq!(conn["last_communication_test"], ack["timestamp"]);
}

#[tokio::test]
async fn connection_goes_stale_after_the_timeout() {
    let hub = Hub::start().await;

    let (_, conn) = hub.get("/api/connection").await;
    assert_eq!(conn["connection_status"], "never_seen");
    assert_eq!(conn["connected"], false);
    assert_eq!(conn["timeout_seconds"], 420);

    hub.get("/device/checkin").await;
    hub.clock.advance(ChronoDuration::seconds(421));

    let (_, conn) = hub.get("/api/connection").await;
    assert_eq!(conn["connection_status"], "disconnected");
    assert_eq!(conn["seconds_since_last_data"], 421.0);
}

#[tokio::test]
async fn history_and_chart_come_from_the_store() {
    let hub = Hub::start().await;
    for (i, t) in [20.0, 21.0, 22.0].iter().enumerate() {
        hub.clock.advance(ChronoDuration::minutes(i as i64));
        let (code, _) = hub.post_json("/data", json!({"temperature1": t, "humidity1": 50})).await;
        assert_eq!(code, 200);
    }

    // check-in writes run in the background
    for _ in 0..50 {
        if hub.store.rows().await.len() == 3 {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }

    let (_, history) = hub.get("/api/history?limit=2").await;
    assert_eq!(history["status"], "success");
    let temps: Vec<f64> = history["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["temperature1"].as_f64().unwrap())
        .collect();
    assert_eq!(temps, vec![22.0, 21.0]);

    let (_, chart) = hub.get("/api/chart").await;
    assert_eq!(chart["status"], "success");
    assert_eq!(chart["temperature1"], json!([20.0, 21.0, 22.0]));
    assert_eq!(chart["labels"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn store_outage_degrades_history_but_not_the_device() {
    let hub = Hub::start().await;
    hub.store.set_unavailable(true);

    let (code, body) = hub
        .post_json("/device/checkin", json!({"temperature1": 19.0, "humidity1": 40.0}))
        .await;
    assert_eq!(code, 200);
    assert_eq!(body["reading_accepted"], true);

    let (code, history) = hub.get("/api/history").await;
    assert_eq!(code, 200);
    assert_eq!(history["status"], "error");
    assert_eq!(history["data"], json!([]));

    let (_, latest) = hub.get("/api/latest").await;
    assert_eq!(latest["status"], "error");
    // the in-memory shadow is still served
    assert_eq!(latest["sensor_data"]["temperature1"], 19.0);
}

#[tokio::test]
async fn logs_and_html_page_render() {
    let hub = Hub::start().await;
    hub.post_json("/api/data-request", json!({})).await;

    let (_, logs) = hub.get("/api/logs").await;
    assert_eq!(logs["status"], "success");
    assert!(logs["total_logs"].as_u64().unwrap() >= 1);
    assert!(logs["logs"][0]["message"].as_str().unwrap().contains("data request"));

    let page = hub.client.get(hub.url("/")).send().await.unwrap();
    assert_eq!(page.status().as_u16(), 200);
    let html = page.text().await.unwrap();
    assert!(html.contains("device: never_seen"));
}

#[tokio::test]
async fn actuator_without_an_action_toggles() {
    let hub = Hub::start().await;

    let resp = hub.client.post(hub.url("/api/actuator")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);
    let receipt: Value = resp.json().await.unwrap();
    assert_eq!(receipt["led_state"], true);
    assert_eq!(receipt["led_status"], "ON");

    let (code, receipt) = hub.post_json("/api/actuator", json!({})).await;
    assert_eq!(code, 200);
    assert_eq!(receipt["led_state"], false);

    let (_, poll) = hub.get("/device/checkin").await;
    assert_eq!(poll["actuator"], "toggle");
}

#[tokio::test]
async fn undecodable_operator_input_gets_the_json_error_shape() {
    let hub = Hub::start().await;

    let (code, body) = hub.post_raw("/api/actuator", "{\"action\":").await;
    assert_eq!(code, 400);
    assert_eq!(body["status"], "error");
    assert!(body["message"].as_str().unwrap().starts_with("malformed JSON body"));

    for path in ["/api/history?limit=abc", "/api/chart?limit=-1", "/api/status?limit=x"] {
        let (code, body) = hub.get(path).await;
        assert_eq!(code, 400, "{path}");
        assert_eq!(body["status"], "error", "{path}");
        assert!(body["message"].is_string(), "{path}");
    }
}
