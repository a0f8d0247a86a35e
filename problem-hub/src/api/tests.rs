use super::*;
use axum::{
    body::{self, Body},
    http::Request,
};
use chrono::Duration;
use problem_hub_core::model::{today, Role};
use serde_json::{json, Value};
use tower::util::ServiceExt;

struct TestApp {
    _dir: tempfile::TempDir,
    state: AppState,
    app: Router,
    alice: String,
    bob: String,
}

impl TestApp {
    /// Password login followed by token issue, as `/login` does.
    fn token_for(&self, username: &str) -> String {
        let ctx = self.state.accounts.login(username, "pw").unwrap();
        self.state.tokens.issue(&ctx).unwrap()
    }
}

fn test_app() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(JsonStore::new(dir.path().join("data")).unwrap());
    let mut config = HubConfig::default();
    config.backup_dir = dir.path().join("backups");
    config.token_secret = "secret".into();
    let state = AppState::new(store.clone(), &config, EventBus::new())
        .with_accounts(Accounts::with_cost(store, 8, 1).unwrap());
    for name in ["alice", "bob"] {
        state
            .accounts
            .register(name, &format!("{name}@example.com"), "pw")
            .unwrap();
    }
    let mut t = TestApp {
        app: router(state.clone()),
        state,
        _dir: dir,
        alice: String::new(),
        bob: String::new(),
    };
    t.alice = t.token_for("alice");
    t.bob = t.token_for("bob");
    t
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn call(app: &Router, method: &str, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header("Authorization", format!("Bearer {token}"));
    }
    let req = match body {
        Some(body) => req
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };
    send(app, req).await
}

fn new_problem(title: &str) -> Value {
    json!({
        "title": title,
        "category": "home",
        "description": "kitchen",
        "due_date": (today() + Duration::days(3)).to_string(),
        "tags": ["plumbing"]
    })
}

#[tokio::test]
async fn requests_without_identity_are_unauthorized() {
    let t = test_app();
    let (status, body) = call(&t.app, "GET", "/problems", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "authentication failed");

    let (status, _) = call(&t.app, "GET", "/problems", Some("not-a-token"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn user_id_header_alone_grants_nothing() {
    let t = test_app();
    t.state.accounts.set_role("alice", Role::Admin).unwrap();
    let (_, created) = call(&t.app, "POST", "/problems", Some(t.bob.as_str()), Some(new_problem("Fix sink"))).await;
    let uri = format!("/problems/{}", created["id"]);

    for (method, uri) in [("DELETE", uri.as_str()), ("POST", "/backup"), ("GET", "/problems")] {
        let req = Request::builder()
            .method(method)
            .uri(uri)
            .header("X-User-Id", "alice")
            .body(Body::empty())
            .unwrap();
        let (status, _) = send(&t.app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
    }

    let (status, _) = call(&t.app, "GET", &uri, Some(t.bob.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(t.state.maintenance.backups().list().unwrap().is_empty());
}

#[tokio::test]
async fn problem_crud_and_sub_entities() {
    let t = test_app();
    let (status, created) = call(&t.app, "POST", "/problems", Some(t.alice.as_str()), Some(new_problem("Fix sink"))).await;
    assert_eq!(status, StatusCode::OK);
    let id = created["id"].as_u64().unwrap();
    assert_eq!(created["status"], "open");
    assert_eq!(created["history"][0]["action"], "created");

    let (status, _) = call(&t.app, "POST", "/problems", Some(t.alice.as_str()), Some(json!({ "category": "home" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let uri = format!("/problems/{id}/subtasks");
    let (status, subtask) = call(&t.app, "POST", &uri, Some(t.alice.as_str()), Some(json!({ "title": "buy washer" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(subtask["id"], 1);

    let uri = format!("/problems/{id}/subtasks/1/toggle");
    let (_, subtask) = call(&t.app, "POST", &uri, Some(t.alice.as_str()), None).await;
    assert_eq!(subtask["status"], "completed");

    let uri = format!("/problems/{id}/time_logs");
    let (status, _) = call(&t.app, "POST", &uri, Some(t.alice.as_str()), Some(json!({ "minutes": 0 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    call(&t.app, "POST", &uri, Some(t.alice.as_str()), Some(json!({ "minutes": 25 }))).await;

    let uri = format!("/problems/{id}/status");
    let (status, _) = call(&t.app, "POST", &uri, Some(t.alice.as_str()), Some(json!({ "status": "done" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, problem) = call(&t.app, "POST", &uri, Some(t.alice.as_str()), Some(json!({ "status": "closed" }))).await;
    assert_eq!(problem["status"], "closed");
    assert_eq!(problem["total_time"], 25);

    let uri = format!("/problems/{id}");
    let (status, _) = call(&t.app, "DELETE", &uri, Some(t.alice.as_str()), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, body) = call(&t.app, "GET", &uri, Some(t.alice.as_str()), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn sharing_controls_access() {
    let t = test_app();
    let (_, created) = call(&t.app, "POST", "/problems", Some(t.alice.as_str()), Some(new_problem("Fix sink"))).await;
    let id = created["id"].as_u64().unwrap();
    let uri = format!("/problems/{id}");

    let (status, _) = call(&t.app, "GET", &uri, Some(t.bob.as_str()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let share = format!("/problems/{id}/share");
    let (status, _) = call(&t.app, "POST", &share, Some(t.alice.as_str()), Some(json!({ "username": "bob", "permission_type": "owner" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = call(&t.app, "POST", &share, Some(t.alice.as_str()), Some(json!({ "username": "zed", "permission_type": "read" }))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, grant) = call(&t.app, "POST", &share, Some(t.alice.as_str()), Some(json!({ "username": "bob", "permission_type": "read" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(grant["permission_type"], "read");

    let (status, problem) = call(&t.app, "GET", &uri, Some(t.bob.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(problem["visibility"], "shared");
    let comments = format!("/problems/{id}/comments");
    let (status, comment) = call(&t.app, "POST", &comments, Some(t.bob.as_str()), Some(json!({ "text": "@alice try the valve" }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(comment["mentions"], json!(["alice"]));
    let (status, _) = call(&t.app, "DELETE", &uri, Some(t.bob.as_str()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, sharing) = call(&t.app, "GET", &format!("/problems/{id}/sharing"), Some(t.alice.as_str()), None).await;
    assert_eq!(sharing.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn login_issues_a_usable_bearer_token() {
    let t = test_app();
    let (status, _) = call(&t.app, "POST", "/register", None, Some(json!({ "username": "alice", "email": "x", "password": "pw" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = call(&t.app, "POST", "/login", None, Some(json!({ "username": "alice", "password": "nope" }))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, login) = call(&t.app, "POST", "/login", None, Some(json!({ "username": "alice", "password": "pw" }))).await;
    assert_eq!(status, StatusCode::OK);
    let token = login["token"].as_str().unwrap();

    let req = Request::builder()
        .uri("/problems")
        .header("Authorization", format!("Bearer {token}"))
        .body(Body::empty())
        .unwrap();
    let resp = t.app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn views_are_scoped_to_the_caller() {
    let t = test_app();
    call(&t.app, "POST", "/problems", Some(t.alice.as_str()), Some(new_problem("Fix sink"))).await;
    call(&t.app, "POST", "/problems", Some(t.alice.as_str()), Some(new_problem("Paint fence"))).await;

    let (_, stats) = call(&t.app, "GET", "/stats", Some(t.alice.as_str()), None).await;
    assert_eq!(stats["total"], 2);
    assert_eq!(stats["by_status"]["open"], 2);
    let (_, stats) = call(&t.app, "GET", "/stats", Some(t.bob.as_str()), None).await;
    assert_eq!(stats["total"], 0);

    let (_, board) = call(&t.app, "GET", "/kanban", Some(t.alice.as_str()), None).await;
    assert_eq!(board["open"].as_array().unwrap().len(), 2);
    let (_, reminders) = call(&t.app, "GET", "/reminders", Some(t.alice.as_str()), None).await;
    assert_eq!(reminders[0]["priority"], "high");
    let (_, notices) = call(&t.app, "GET", "/notifications", Some(t.alice.as_str()), None).await;
    assert_eq!(notices[0]["type"], "due_date");
    let (status, _) = call(&t.app, "GET", "/calendar?year=2024&month=13", Some(t.alice.as_str()), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (_, month) = call(&t.app, "GET", "/calendar?year=2024&month=2", Some(t.alice.as_str()), None).await;
    assert_eq!(month["month_name"], "February");

    let (_, found) = call(&t.app, "GET", "/search?q=fence&tags=plumbing", Some(t.alice.as_str()), None).await;
    assert_eq!(found.as_array().unwrap().len(), 1);
    let (_, filtered) = call(&t.app, "GET", "/filter?category=all&status=open", Some(t.alice.as_str()), None).await;
    assert_eq!(filtered.as_array().unwrap().len(), 2);
    let (_, tags) = call(&t.app, "GET", "/tags/autocomplete?q=PLUM", Some(t.alice.as_str()), None).await;
    assert_eq!(tags, json!(["plumbing"]));
    let (_, activity) = call(&t.app, "GET", "/activity", Some(t.alice.as_str()), None).await;
    assert_eq!(activity.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn groups_and_templates() {
    let t = test_app();
    let (_, group) = call(&t.app, "POST", "/groups", Some(t.alice.as_str()), Some(json!({ "name": "family" }))).await;
    let gid = group["id"].as_u64().unwrap();
    let members = format!("/groups/{gid}/members");
    let (status, _) = call(&t.app, "POST", &members, Some(t.alice.as_str()), Some(json!({ "username": "bob" }))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = call(&t.app, "POST", &members, Some(t.alice.as_str()), Some(json!({ "username": "bob" }))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (_, groups) = call(&t.app, "GET", "/groups", Some(t.bob.as_str()), None).await;
    assert_eq!(groups.as_array().unwrap().len(), 1);
    let (status, _) = call(&t.app, "DELETE", &format!("/groups/{gid}"), Some(t.bob.as_str()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&t.app, "DELETE", &format!("/groups/{gid}"), Some(t.alice.as_str()), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (_, created) = call(&t.app, "POST", "/problems", Some(t.alice.as_str()), Some(new_problem("Fix sink"))).await;
    let id = created["id"].as_u64().unwrap();
    let (_, template) = call(&t.app, "POST", &format!("/problems/{id}/template"), Some(t.alice.as_str()), Some(json!({ "name": "Sink" }))).await;
    let tid = template["id"].as_u64().unwrap();
    let due = (today() + Duration::days(14)).to_string();
    let (status, copy) = call(&t.app, "POST", &format!("/templates/{tid}/problems"), Some(t.bob.as_str()), Some(json!({ "due_date": due }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(copy["owner_id"], "bob");
    assert_eq!(copy["title"], "Sink");
}

#[tokio::test]
async fn backup_endpoint_is_admin_only() {
    let t = test_app();
    let (status, _) = call(&t.app, "POST", "/backup", Some(t.alice.as_str()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    t.state.accounts.set_role("alice", Role::Admin).unwrap();
    let (status, _) = call(&t.app, "POST", "/backup", Some(t.alice.as_str()), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let admin = t.token_for("alice");
    let (status, report) = call(&t.app, "POST", "/backup", Some(admin.as_str()), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["job"], "backup");
    assert_eq!(t.state.maintenance.backups().list().unwrap().len(), 1);
}
