use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use backup_monitor::{
    collect, BackupStatus, CollectError, CollectionOutcome, CollectionResult, Machine,
    SqliteStore, TargetSettings,
};

const PASSWORD: &str = "secret";
const TOKEN: &str = "tok-123";

#[derive(Default)]
struct MockServer {
    system_info: Value,
    jobs: Vec<(String, String)>,
    logs: HashMap<String, Vec<Value>>,
    failing_logs: HashSet<String>,
    requests: AtomicUsize,
    page_sizes: Mutex<Vec<String>>,
}

impl MockServer {
    fn new() -> Self {
        Self {
            system_info: json!({
                "MachineName": "nas01",
                "Options": [
                    {"Name": "machine-name", "DefaultValue": "nas01"},
                    {"Name": "machine-id", "DefaultValue": "4f1c2a"}
                ]
            }),
            ..Self::default()
        }
    }

    fn job(mut self, id: &str, name: &str, messages: Vec<Value>) -> Self {
        self.jobs.push((id.to_string(), name.to_string()));
        let entries = messages
            .into_iter()
            .enumerate()
            .map(|(i, message)| json!({"ID": i, "Type": "Result", "Message": message.to_string()}))
            .collect();
        self.logs.insert(id.to_string(), entries);
        self
    }

    fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

fn authorized(headers: &HeaderMap) -> bool {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        == Some(format!("Bearer {}", TOKEN).as_str())
}

async fn login(State(state): State<Arc<MockServer>>, Json(body): Json<Value>) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if body["Password"] == PASSWORD && body["RememberMe"] == true {
        Json(json!({"AccessToken": TOKEN})).into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

async fn system_info(State(state): State<Arc<MockServer>>, headers: HeaderMap) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    Json(state.system_info.clone()).into_response()
}

async fn backups(State(state): State<Arc<MockServer>>, headers: HeaderMap) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    let list: Vec<Value> = state
        .jobs
        .iter()
        .map(|(id, name)| json!({"Backup": {"ID": id, "Name": name}, "Schedule": null}))
        .collect();
    Json(Value::Array(list)).into_response()
}

async fn backup_log(
    State(state): State<Arc<MockServer>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Response {
    state.requests.fetch_add(1, Ordering::SeqCst);
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if let Some(size) = query.get("pagesize") {
        state.page_sizes.lock().unwrap().push(size.clone());
    }
    if state.failing_logs.contains(&id) {
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }
    let entries = state.logs.get(&id).cloned().unwrap_or_default();
    Json(Value::Array(entries)).into_response()
}

async fn spawn_server(state: MockServer) -> (SocketAddr, Arc<MockServer>) {
    let state = Arc::new(state);
    let app = Router::new()
        .route("/api/v1/auth/login", post(login))
        .route("/api/v1/systeminfo", get(system_info))
        .route("/api/v1/backups", get(backups))
        .route("/api/v1/backup/{id}/log", get(backup_log))
        .with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

fn settings(addr: SocketAddr) -> TargetSettings {
    TargetSettings {
        hostname: addr.ip().to_string(),
        port: addr.port(),
        scheme: "http".to_string(),
        allow_self_signed: false,
    }
}

fn backup_result(begin: &str, parsed_result: &str, warnings: i64) -> Value {
    json!({
        "MainOperation": "Backup",
        "ParsedResult": parsed_result,
        "Version": "2.0.8.1",
        "BeginTime": begin,
        "EndTime": "2024-05-01T23:59:00Z",
        "Duration": "00:02:30.5",
        "WarningsActualLength": warnings,
        "ExaminedFiles": 100,
        "AddedFiles": 3,
        "BackendStatistics": {"BytesUploaded": 10240, "KnownFileCount": 12}
    })
}

fn completed(outcome: CollectionOutcome) -> CollectionResult {
    match outcome {
        CollectionOutcome::Completed(result) => result,
        other => panic!("expected completed outcome, got {:?}", other),
    }
}

#[tokio::test]
async fn collects_over_http_and_skips_known_runs_on_second_pass() {
    let mut mock = MockServer::new()
        .job(
            "1",
            "Documents",
            vec![
                backup_result("2024-05-01T08:00:00Z", "Success", 0),
                json!({"MainOperation": "Compact", "ParsedResult": "Success"}),
                backup_result("2024-05-02T08:00:00Z", "Success", 4),
            ],
        )
        .job("2", "Photos", vec![backup_result("2024-05-01T09:00:00Z", "Success", 0)])
        .job("3", "Mail", vec![backup_result("2024-05-01T10:00:00Z", "Error", 0)]);
    mock.failing_logs.insert("2".to_string());
    let (addr, server) = spawn_server(mock).await;
    let store = SqliteStore::open_in_memory().unwrap();

    let first = completed(collect(&settings(addr), PASSWORD, &store).await.unwrap());
    assert_eq!(
        first,
        CollectionResult {
            processed_count: 3,
            skipped_count: 0,
            error_count: 1
        }
    );

    let second = completed(collect(&settings(addr), PASSWORD, &store).await.unwrap());
    assert_eq!(
        second,
        CollectionResult {
            processed_count: 0,
            skipped_count: 3,
            error_count: 1
        }
    );

    let page_sizes = server.page_sizes.lock().unwrap().clone();
    assert!(page_sizes.iter().all(|size| size == "999"));
    assert_eq!(page_sizes.len(), 6);

    let runs = store.list_backup_runs("4f1c2a").await.unwrap();
    assert_eq!(runs.len(), 3);
    let statuses: Vec<(String, BackupStatus)> = runs
        .iter()
        .map(|run| (run.backup_name.clone(), run.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("Documents".to_string(), BackupStatus::Warning),
            ("Mail".to_string(), BackupStatus::Error),
            ("Documents".to_string(), BackupStatus::Success),
        ]
    );
    assert_eq!(runs[0].duration_seconds, 150);
    assert_eq!(runs[0].sizes.uploaded_bytes, 10240);
    assert_eq!(runs[0].backend.known_file_count, 12);
    assert_eq!(runs[0].counts.deleted_files, 0);
}

#[tokio::test]
async fn wrong_password_is_an_auth_error() {
    let (addr, server) = spawn_server(MockServer::new()).await;
    let store = SqliteStore::open_in_memory().unwrap();

    let result = collect(&settings(addr), "nope", &store).await;
    assert!(matches!(result, Err(CollectError::Auth(_))));
    assert_eq!(server.request_count(), 1);
}

#[tokio::test]
async fn server_without_jobs_reports_no_backups() {
    let (addr, _server) = spawn_server(MockServer::new()).await;
    let store = SqliteStore::open_in_memory().unwrap();

    let outcome = collect(&settings(addr), PASSWORD, &store).await.unwrap();
    assert_eq!(
        outcome,
        CollectionOutcome::NoBackups {
            machine: Machine::new("4f1c2a", "nas01")
        }
    );
}

#[tokio::test]
async fn missing_machine_id_option_is_a_data_error() {
    let mock = MockServer {
        system_info: json!({"MachineName": "nas01", "Options": []}),
        ..MockServer::new()
    };
    let (addr, _server) = spawn_server(mock).await;
    let store = SqliteStore::open_in_memory().unwrap();

    let result = collect(&settings(addr), PASSWORD, &store).await;
    assert!(matches!(result, Err(CollectError::Data(_))));
    assert!(store.list_machines().await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_scheme_never_reaches_the_server() {
    let (addr, server) = spawn_server(MockServer::new()).await;
    let store = SqliteStore::open_in_memory().unwrap();
    let mut target = settings(addr);
    target.scheme = "ftp".to_string();

    let result = collect(&target, PASSWORD, &store).await;
    assert!(matches!(result, Err(CollectError::Configuration(_))));
    assert_eq!(server.request_count(), 0);
}

#[tokio::test]
async fn renamed_machine_updates_the_stored_name() {
    let (addr, _server) = spawn_server(MockServer::new()).await;
    let store = SqliteStore::open_in_memory().unwrap();
    collect(&settings(addr), PASSWORD, &store).await.unwrap();

    let renamed = MockServer {
        system_info: json!({
            "MachineName": "nas01-renamed",
            "Options": [{"Name": "machine-id", "DefaultValue": "4f1c2a"}]
        }),
        ..MockServer::new()
    };
    let (addr, _server) = spawn_server(renamed).await;
    collect(&settings(addr), PASSWORD, &store).await.unwrap();

    let machines = store.list_machines().await.unwrap();
    assert_eq!(machines.len(), 1);
    assert_eq!(machines[0].name, "nas01-renamed");
}
