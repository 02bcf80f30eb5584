// Request handlers for the demo endpoints
//
// Every handler reads its input from the tainted body installed by the
// request binder, records its own flowpoint, and drives the corresponding
// sink guard method. Policy violations surface as HTTP 403.

use crate::api::middleware::TaintedBody;
use crate::api::responses::ApiError;
use crate::api::AppState;
use crate::core::errors::GuardError;
use crate::core::taint::TaintedValue;
use crate::sinks::guard::OpenMode;
use crate::state::flow;
use axum::extract::State;
use axum::response::Json;
use axum::Extension;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tracing::info;

/// Root endpoint listing the demo surface.
pub async fn index() -> Json<Value> {
    Json(json!({
        "message": "sentinel-guard demo",
        "endpoints": [
            "/upload - file write (path traversal protection)",
            "/exec - shell execution (shell injection protection)",
            "/query - SQL query (SQL injection protection)",
            "/fetch - outbound HTTP (SSRF protection)",
            "/template - template rendering (template injection protection)",
        ],
    }))
}

fn tainted_body(body: &TaintedBody) -> Result<&Arc<TaintedValue>, ApiError> {
    body.0
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("expected an application/json body"))
}

fn required_str<'a>(body: &'a TaintedValue, key: &str) -> Result<&'a str, ApiError> {
    body.get(key)
        .and_then(TaintedValue::as_str)
        .ok_or_else(|| ApiError::bad_request(format!("missing '{key}'")))
}

/// Write an uploaded file under the configured upload directory.
pub async fn upload(
    State(state): State<AppState>,
    Extension(body): Extension<TaintedBody>,
) -> Result<Json<Value>, ApiError> {
    flow::record_flowpoint("handlers:upload");
    let body = tainted_body(&body)?;
    let filename = required_str(body, "filename")?;
    let content = body.get("content").and_then(TaintedValue::as_str).unwrap_or_default();

    let destination = state.upload_dir.join(filename);
    let mut file = state.guard.open(&destination, OpenMode::Write)?;
    file.write_all(content.as_bytes()).map_err(GuardError::from)?;

    info!(path = %destination.display(), "file written");
    Ok(Json(json!({
        "status": "ok",
        "path": destination.to_string_lossy(),
    })))
}

/// Run a shell command line.
pub async fn exec(
    State(state): State<AppState>,
    Extension(body): Extension<TaintedBody>,
) -> Result<Json<Value>, ApiError> {
    flow::record_flowpoint("handlers:exec");
    let body = tainted_body(&body)?;
    let command = required_str(body, "command")?;

    let output = state.guard.run_shell(command)?;
    Ok(Json(json!({
        "status": output.status.code(),
        "stdout": String::from_utf8_lossy(&output.stdout),
        "stderr": String::from_utf8_lossy(&output.stderr),
    })))
}

/// Look up users by name in a throwaway database. The statement is built by
/// string interpolation on purpose: the guard, not the query style, is the
/// protection being demonstrated.
pub async fn query(
    State(state): State<AppState>,
    Extension(body): Extension<TaintedBody>,
) -> Result<Json<Value>, ApiError> {
    flow::record_flowpoint("handlers:query");
    let body = tainted_body(&body)?;
    let name = required_str(body, "name")?;

    let conn = state.guard.connect_sqlite(":memory:")?;
    conn.execute("CREATE TABLE users (id INTEGER, name TEXT)", [])?;
    conn.execute_many(
        "INSERT INTO users (id, name) VALUES (?1, ?2)",
        [(1i64, "alice"), (2, "bob")],
    )?;

    let sql = format!("SELECT id, name FROM users WHERE name = '{name}'");
    let rows = conn.query(&sql, [], |row| {
        Ok(json!({
            "id": row.get::<_, i64>(0)?,
            "name": row.get::<_, String>(1)?,
        }))
    })?;

    Ok(Json(json!({ "rows": rows })))
}

/// Fetch a URL and report the response status.
pub async fn fetch(
    State(state): State<AppState>,
    Extension(body): Extension<TaintedBody>,
) -> Result<Json<Value>, ApiError> {
    flow::record_flowpoint("handlers:fetch");
    let body = tainted_body(&body)?;
    let url = required_str(body, "url")?;

    let response = state.guard.http_get(url).await?;
    let status = response.status().as_u16();
    let body_text = response.text().await.map_err(GuardError::from)?;
    let preview: String = body_text.chars().take(256).collect();

    Ok(Json(json!({ "status": status, "preview": preview })))
}

/// Render a template with a caller-supplied name.
pub async fn template(
    State(state): State<AppState>,
    Extension(body): Extension<TaintedBody>,
) -> Result<Json<Value>, ApiError> {
    flow::record_flowpoint("handlers:template");
    let body = tainted_body(&body)?;
    let source = required_str(body, "template")?;
    let name = required_str(body, "name")?;

    let mut context = serde_json::Map::new();
    context.insert("name".to_string(), Value::String(name.to_string()));
    let rendered = state.guard.render_template(source, &context)?;

    Ok(Json(json!({ "rendered": rendered })))
}
