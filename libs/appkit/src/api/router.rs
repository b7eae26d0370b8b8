use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{MatchedPath, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde_json::{json, Value};
use tower_http::{
    limit::RequestBodyLimitLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use utoipa::openapi::OpenApi;

use super::openapi::build_openapi;
use super::problem::Problem;
use crate::binder::BoundService;

/// HTTP-level knobs applied around every endpoint.
#[derive(Debug, Clone)]
pub struct ApiOptions {
    pub request_timeout: Duration,
    pub body_limit_bytes: usize,
}

impl Default for ApiOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(30),
            body_limit_bytes: 16 * 1024 * 1024,
        }
    }
}

/// `POST {path}` per endpoint, plus `GET /health` and `GET /openapi.json`.
pub fn router(service: Arc<BoundService>, opts: &ApiOptions) -> Router {
    let openapi = Arc::new(build_openapi(&service));

    let mut router = Router::new();
    for route in service.routes() {
        router = router.route(&route.endpoint.path, post(invoke_endpoint));
    }
    let router = router
        .route("/health", get(health))
        .route("/openapi.json", get(openapi_json))
        .layer(Extension(openapi))
        .with_state(service);

    apply_middleware_stack(router, opts)
}

// Outermost to innermost: RequestId(Set -> Propagate) -> Trace -> Timeout -> BodyLimit -> Router
fn apply_middleware_stack(mut router: Router, opts: &ApiOptions) -> Router {
    router = router.layer(RequestBodyLimitLayer::new(opts.body_limit_bytes));
    router = router.layer(TimeoutLayer::with_status_code(
        StatusCode::REQUEST_TIMEOUT,
        opts.request_timeout,
    ));
    router = router.layer(
        TraceLayer::new_for_http()
            .make_span_with(|req: &axum::http::Request<axum::body::Body>| {
                let rid = req
                    .headers()
                    .get("x-request-id")
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or("n/a");
                tracing::info_span!(
                    "http_request",
                    method = %req.method(),
                    uri = %req.uri().path(),
                    request_id = %rid,
                    status = tracing::field::Empty,
                    latency_ms = tracing::field::Empty,
                )
            })
            .on_response(
                |res: &axum::http::Response<axum::body::Body>,
                 latency: Duration,
                 span: &tracing::Span| {
                    span.record("status", res.status().as_u16());
                    span.record("latency_ms", latency.as_millis() as u64);
                },
            ),
    );
    router = router.layer(PropagateRequestIdLayer::x_request_id());
    router.layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
}

/// Single stateless handler for every endpoint; the route is resolved by its matched path.
async fn invoke_endpoint(
    State(service): State<Arc<BoundService>>,
    matched: MatchedPath,
    body: Bytes,
) -> Result<Json<Value>, Problem> {
    let path = matched.as_str().to_owned();
    let input: Value = serde_json::from_slice(&body).map_err(|e| {
        Problem::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "Unprocessable Entity",
            format!("request body is not valid JSON: {e}"),
        )
        .with_instance(path.clone())
    })?;

    let output = tokio::task::spawn_blocking(move || service.dispatch(&path, input))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Endpoint task failed");
            Problem::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error",
                e.to_string(),
            )
        })?
        .map_err(Problem::from)?;
    Ok(Json(output))
}

async fn health(State(service): State<Arc<BoundService>>) -> (StatusCode, Json<Value>) {
    let state = service.state();
    let status = if service.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({ "app": service.app_name(), "status": state.to_string() })),
    )
}

async fn openapi_json(Extension(doc): Extension<Arc<OpenApi>>) -> Json<OpenApi> {
    Json(doc.as_ref().clone())
}
