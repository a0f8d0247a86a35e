use problem_hub::api::{self, AppState};
use problem_hub_core::{accounts::Accounts, config::HubConfig, events::EventBus, storage::JsonStore};
use serde_json::{json, Value};
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

async fn start(dir: &tempfile::TempDir) -> (SocketAddr, JoinHandle<Result<(), std::io::Error>>) {
    let store = Arc::new(JsonStore::new(dir.path().join("data")).unwrap());
    let mut config = HubConfig::default();
    config.backup_dir = dir.path().join("backups");
    config.token_secret = "server-test".into();
    let state = AppState::new(store.clone(), &config, EventBus::new())
        .with_accounts(Accounts::with_cost(store, 8, 1).unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = tokio::spawn(axum::serve(listener, api::router(state)).into_future());
    tokio::time::sleep(Duration::from_millis(100)).await;
    (addr, server)
}

#[tokio::test]
async fn server_health_endpoint() {
    let tempdir = tempfile::tempdir().unwrap();
    let (addr, server) = start(&tempdir).await;

    let resp = reqwest::get(format!("http://{}/health", addr))
        .await
        .unwrap();
    assert!(resp.status().is_success());
    assert_eq!(resp.text().await.unwrap(), "OK");

    server.abort();
}

#[tokio::test]
async fn bearer_token_session_over_http() {
    let tempdir = tempfile::tempdir().unwrap();
    let (addr, server) = start(&tempdir).await;
    let client = reqwest::Client::new();
    let base = format!("http://{}", addr);

    let resp = client
        .post(format!("{base}/register"))
        .json(&json!({ "username": "dana", "email": "dana@example.com", "password": "pw" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);

    let login: Value = client
        .post(format!("{base}/login"))
        .json(&json!({ "username": "dana", "password": "pw" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(login["user_id"], "dana");
    let token = login["token"].as_str().unwrap().to_string();

    let created: Value = client
        .post(format!("{base}/problems"))
        .bearer_auth(&token)
        .json(&json!({ "title": "Renew passport", "category": "admin", "due_date": "2030-01-15" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(created["owner_id"], "dana");

    let listed: Value = client
        .get(format!("{base}/problems"))
        .bearer_auth(&token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let resp = client
        .get(format!("{base}/problems"))
        .bearer_auth("not-a-token")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);

    server.abort();
}
