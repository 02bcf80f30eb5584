// Request binder integration tests

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, Request, StatusCode};
use axum::response::Json;
use axum::routing::post;
use axum::{Extension, Router};
use sentinel_guard::api::middleware::{taint_binder, TaintedBody};
use sentinel_guard::api::{create_router, AppState};
use sentinel_guard::state::flow;
use sentinel_guard::{load_policy_str, SinkGuard};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

const POLICY: &str = r#"
validators:
  - id: shell_safe
    type: string
    params:
      deny_substrings: [";", "&&", "|"]
sinks:
  - id: shell
    function: subprocess.run
    require: [shell_safe]
"#;

fn test_guard() -> SinkGuard {
    SinkGuard::new(Arc::new(load_policy_str(POLICY).unwrap()))
}

/// Probe handler that reports the flow stack and whether enforcement fired,
/// instead of mapping the violation to a status code.
async fn exec_probe(
    State(guard): State<SinkGuard>,
    Extension(body): Extension<TaintedBody>,
) -> Json<Value> {
    flow::record_flowpoint("handlers:exec");
    let command = body
        .0
        .as_ref()
        .and_then(|b| b.get("command"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let violation = match &command {
        Some(cmd) => guard.run_shell(cmd).err().map(|e| e.to_string()),
        None => None,
    };
    Json(json!({
        "flow": flow::current_flow(),
        "violation": violation,
        "tainted": body.0.is_some(),
    }))
}

fn probe_app() -> Router {
    Router::new()
        .route("/exec", post(exec_probe))
        .layer(axum::middleware::from_fn(taint_binder))
        .with_state(test_guard())
}

async fn response_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn json_request(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn flow_stack_records_the_full_path_to_the_sink() {
    let response = probe_app()
        .oneshot(json_request("/exec", r#"{"command": "echo HACK; rm -rf /"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let value = response_json(response).await;
    assert!(value["violation"].as_str().unwrap().contains("shell_safe"));
    assert_eq!(
        value["flow"],
        json!([
            "http_request",
            "middleware:json_parsing",
            "handlers:exec",
            "subprocess.run"
        ])
    );
}

#[tokio::test]
async fn json_bodies_arrive_tainted() {
    let response = probe_app()
        .oneshot(json_request("/exec", r#"{"command": "echo ok"}"#))
        .await
        .unwrap();
    let value = response_json(response).await;
    assert_eq!(value["tainted"], json!(true));
    assert_eq!(value["violation"], Value::Null);
}

#[tokio::test]
async fn non_json_bodies_are_not_tainted() {
    let request = Request::builder()
        .method("POST")
        .uri("/exec")
        .header(header::CONTENT_TYPE, "text/plain")
        .body(Body::from("just text"))
        .unwrap();
    let response = probe_app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let value = response_json(response).await;
    assert_eq!(value["tainted"], json!(false));
    assert_eq!(value["flow"], json!(["http_request", "handlers:exec"]));
}

#[tokio::test]
async fn malformed_json_never_fails_the_request() {
    let response = probe_app()
        .oneshot(json_request("/exec", "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let value = response_json(response).await;
    assert_eq!(value["tainted"], json!(false));
}

#[tokio::test]
async fn demo_exec_endpoint_maps_violations_to_403() {
    let tmp = tempfile::tempdir().unwrap();
    let app = create_router(AppState {
        guard: test_guard(),
        upload_dir: tmp.path().to_path_buf(),
    });

    let response = app
        .clone()
        .oneshot(json_request("/exec", r#"{"command": "echo HACK; rm -rf /"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let value = response_json(response).await;
    assert!(value["error"].as_str().unwrap().contains("shell_safe"));

    let response = app
        .oneshot(json_request("/exec", r#"{"command": "echo hello"}"#))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let value = response_json(response).await;
    assert_eq!(value["stdout"].as_str().unwrap().trim(), "hello");
}

#[tokio::test]
async fn demo_upload_endpoint_guards_file_writes() {
    let tmp = tempfile::tempdir().unwrap();
    let uploads = tmp.path().join("uploads");
    std::fs::create_dir_all(&uploads).unwrap();

    let doc = format!(
        r#"
validators:
  - id: safe_filename
    type: string
    params:
      deny_substrings: ["../", "..\\", "/"]
  - id: path_in_uploads
    type: path
    params:
      allowed_roots: ["{}"]
      deny_subdirectories: true
sinks:
  - id: file_write
    function: builtins.open
    require:
      - safe_filename
      - id: path_in_uploads
        target: fullpath
"#,
        uploads.display()
    );
    let guard = SinkGuard::new(Arc::new(load_policy_str(&doc).unwrap()));
    let app = create_router(AppState {
        guard,
        upload_dir: uploads.clone(),
    });

    let response = app
        .clone()
        .oneshot(json_request(
            "/upload",
            r#"{"filename": "report.txt", "content": "hello"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        std::fs::read_to_string(uploads.join("report.txt")).unwrap(),
        "hello"
    );

    let response = app
        .oneshot(json_request(
            "/upload",
            r#"{"filename": "../escape.txt", "content": "hack"}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(!tmp.path().join("escape.txt").exists());
}

#[tokio::test]
async fn missing_json_body_is_a_client_error() {
    let tmp = tempfile::tempdir().unwrap();
    let app = create_router(AppState {
        guard: test_guard(),
        upload_dir: tmp.path().to_path_buf(),
    });

    let request = Request::builder()
        .method("POST")
        .uri("/exec")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
