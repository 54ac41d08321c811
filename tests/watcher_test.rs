mod common;

use axum::http::StatusCode;
use common::{callback_body, mount_push_accepted, mount_token, test_config};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stk_relay::database::InMemoryPaymentStore;
use stk_relay::models::payment::PaymentStatus;
use stk_relay::watcher::{ApiClient, MemoryPersistence, PaymentWatcher, WatchError, WatchPersistence};
use stk_relay::{build_router, AppState};
use wiremock::MockServer;

const PUBLIC_ID: &str = "2b0f6f0e-55a4-4a8e-8d1e-2f8a1c9e7b31";

struct RunningRelay {
    base_url: String,
    provider: MockServer,
    http: reqwest::Client,
}

async fn start_relay() -> RunningRelay {
    let provider = MockServer::start().await;
    let store = Arc::new(InMemoryPaymentStore::new());
    let state = AppState::new(&test_config(&provider.uri()), store).expect("app state");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, build_router(state)).await.unwrap();
    });

    RunningRelay {
        base_url: format!("http://{}", addr),
        provider,
        http: reqwest::Client::new(),
    }
}

impl RunningRelay {
    async fn session_for(&self, public_id: &str) -> String {
        let body: Value = self
            .http
            .post(format!("{}/session", self.base_url))
            .json(&json!({ "public_id": public_id }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        body["token"].as_str().unwrap().to_string()
    }

    async fn callback(&self, public_id: &str, result_code: i64) -> StatusCode {
        let response = self
            .http
            .post(format!("{}/callback?public_id={}", self.base_url, public_id))
            .json(&callback_body(result_code))
            .send()
            .await
            .unwrap();
        StatusCode::from_u16(response.status().as_u16()).unwrap()
    }
}

#[tokio::test]
async fn status_reads_are_scoped_to_the_session_payment() {
    let relay = start_relay().await;
    let url = format!("{}/payments/{}", relay.base_url, PUBLIC_ID);

    let response = relay.http.get(&url).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 401);

    let other = relay.session_for("9d7c6b5a-4321-4fed-8cba-0123456789ab").await;
    let response = relay.http.get(&url).bearer_auth(&other).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 403);

    let own = relay.session_for(PUBLIC_ID).await;
    let response = relay.http.get(&url).bearer_auth(&own).send().await.unwrap();
    assert_eq!(response.status().as_u16(), 404);

    let response = relay
        .http
        .get(format!("{}/events?token={}", url, own))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
async fn session_requires_a_uuid() {
    let relay = start_relay().await;

    let response = relay
        .http
        .post(format!("{}/session", relay.base_url))
        .json(&json!({ "public_id": "abc" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
async fn watcher_follows_payment_from_push_to_success() {
    let relay = start_relay().await;
    mount_token(&relay.provider, 1).await;
    mount_push_accepted(&relay.provider).await;

    let client = ApiClient::new(&relay.base_url).unwrap();
    let public_id = client.initiate("0712345678", 50).await.unwrap();

    let watcher = PaymentWatcher::new(client, MemoryPersistence::default());
    let seen = Arc::new(Mutex::new(Vec::new()));
    let recorder = seen.clone();

    let callback_url = format!("{}/callback?public_id={}", relay.base_url, public_id);
    let http = relay.http.clone();
    let callback = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        http.post(callback_url)
            .json(&callback_body(0))
            .send()
            .await
            .map(|response| response.status().as_u16())
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(10),
        watcher.track(&public_id, move |status| recorder.lock().unwrap().push(status)),
    )
    .await
    .expect("watcher finished")
    .unwrap();

    assert_eq!(callback.await.unwrap().unwrap(), 200);
    assert_eq!(outcome, PaymentStatus::Success);

    let seen = seen.lock().unwrap().clone();
    assert_eq!(seen.first(), Some(&PaymentStatus::Pending));
    assert_eq!(seen.last(), Some(&PaymentStatus::Success));
    assert!(watcher.persistence().get().is_none());
}

#[tokio::test]
async fn resume_resolves_an_already_finished_payment() {
    let relay = start_relay().await;
    mount_token(&relay.provider, 1).await;
    mount_push_accepted(&relay.provider).await;

    let client = ApiClient::new(&relay.base_url).unwrap();
    let public_id = client.initiate("0712345678", 50).await.unwrap();
    assert_eq!(relay.callback(&public_id, 1032).await, StatusCode::OK);

    let watcher = PaymentWatcher::new(client, MemoryPersistence::with(&public_id));
    let outcome = watcher.resume(|_| {}).await.unwrap();

    assert_eq!(outcome, Some(PaymentStatus::Failed));
    assert!(watcher.persistence().get().is_none());
}

#[tokio::test]
async fn watching_an_unknown_payment_clears_persistence() {
    let relay = start_relay().await;
    let watcher = PaymentWatcher::new(
        ApiClient::new(&relay.base_url).unwrap(),
        MemoryPersistence::with(PUBLIC_ID),
    );

    let err = watcher.resume(|_| {}).await.unwrap_err();

    assert!(matches!(err, WatchError::UnknownPayment(id) if id == PUBLIC_ID));
    assert!(watcher.persistence().get().is_none());
}

#[tokio::test]
async fn initiate_failure_carries_server_message() {
    let relay = start_relay().await;
    let client = ApiClient::new(&relay.base_url).unwrap();

    let err = client.initiate("", 50).await.unwrap_err();

    assert_eq!(err.to_string(), "Missing phone or amount");
}

#[tokio::test]
async fn event_stream_token_is_percent_decoded() {
    let relay = start_relay().await;
    let token = relay.session_for(PUBLIC_ID).await;
    let events = format!("{}/payments/{}/events", relay.base_url, PUBLIC_ID);

    let encoded = token.replace('.', "%2E");
    let response = relay
        .http
        .get(format!("{}?token={}", events, encoded))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);

    let response = relay
        .http
        .get(format!("{}?token=", events))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 401);
}
