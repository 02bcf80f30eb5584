// Request binder - installs the per-request flow stack and taints JSON bodies

use crate::core::taint::{taint_recursive, TaintedValue};
use crate::state::flow;
use axum::body::{to_bytes, Body};
use axum::extract::Request;
use axum::http::header::CONTENT_TYPE;
use axum::middleware::Next;
use axum::response::Response;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::info_span;
use uuid::Uuid;

/// Taint tags attached to every string leaf of an incoming JSON body.
pub const REQUEST_TAINT_TAGS: [&str; 2] = ["untrusted", "http"];

/// Largest body the binder will buffer for tainting.
const BODY_LIMIT_BYTES: usize = 2 * 1024 * 1024;

/// The parsed-and-tainted request body, stored in request extensions.
/// `None` when the body was absent, not JSON, or failed to parse.
#[derive(Clone, Default)]
pub struct TaintedBody(pub Option<Arc<TaintedValue>>);

/// Establish a fresh flow stack for the request and taint its JSON body.
///
/// The binder never fails a request: any body-buffering or parsing problem
/// just leaves the tainted body empty and lets the handler proceed.
pub async fn taint_binder(request: Request, next: Next) -> Response {
    flow::with_flow(vec!["http_request".to_string()], bind_and_run(request, next)).await
}

async fn bind_and_run(request: Request, next: Next) -> Response {
    let (mut parts, body) = request.into_parts();

    let is_json = parts
        .headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);

    let mut tainted = TaintedBody::default();
    let body = if is_json {
        match to_bytes(body, BODY_LIMIT_BYTES).await {
            Ok(bytes) => {
                if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&bytes) {
                    tainted =
                        TaintedBody(Some(Arc::new(taint_recursive(&value, &REQUEST_TAINT_TAGS))));
                    flow::record_flowpoint("middleware:json_parsing");
                }
                Body::from(bytes)
            }
            Err(_) => Body::empty(),
        }
    } else {
        body
    };

    parts.extensions.insert(tainted);
    next.run(Request::from_parts(parts, body)).await
}

/// Tracing middleware: one span per request with a generated request id.
pub fn tracing_layer() -> TraceLayer<
    tower_http::classify::SharedClassifier<tower_http::classify::ServerErrorsAsFailures>,
    impl Fn(&Request) -> tracing::Span + Clone,
    tower_http::trace::DefaultOnRequest,
    impl Fn(&Response, Duration, &tracing::Span) + Clone,
> {
    TraceLayer::new_for_http()
        .make_span_with(|request: &Request| {
            let request_id = Uuid::new_v4();
            info_span!(
                "http_request",
                method = %request.method(),
                path = %request.uri().path(),
                request_id = %request_id
            )
        })
        .on_response(
            |_response: &Response, latency: Duration, _span: &tracing::Span| {
                tracing::info!(latency = ?latency, "request completed");
            },
        )
}

/// Body size limit middleware.
pub fn body_size_limit_layer() -> RequestBodyLimitLayer {
    RequestBodyLimitLayer::new(BODY_LIMIT_BYTES)
}
