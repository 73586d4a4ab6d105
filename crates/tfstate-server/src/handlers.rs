//! HTTP handlers for the state server.
//!
//! Implements:
//! - GET|POST|LOCK|UNLOCK /state/{name} - Terraform HTTP backend protocol
//! - GET /health - Health check endpoint

use std::sync::Arc;

use axum::extract::rejection::QueryRejection;
use axum::extract::{DefaultBodyLimit, Path, Query, State};
use axum::http::{header, HeaderMap, Method};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get};
use axum::{Json, Router};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tfstate_core::{LockProtocol, StateRequest, Verb};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::error::{ApiError, Result};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub protocol: Arc<LockProtocol>,
    pub backend: &'static str,
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/state/{*name}", any(state_handler))
        // State documents are opaque and often several megabytes
        .layer(DefaultBodyLimit::disable())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub version: &'static str,
    pub backend: &'static str,
    pub sessions: u64,
}

/// GET /health - Health check endpoint.
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        healthy: true,
        version: env!("CARGO_PKG_VERSION"),
        backend: state.backend,
        sessions: state.protocol.pool().session_count().await,
    })
}

/// Query parameters of a state request.
#[derive(Debug, Default, Deserialize)]
pub struct StateQuery {
    /// Lock ID Terraform sends along with a store.
    #[serde(rename = "ID")]
    pub id: Option<String>,
}

/// Extract the credential from a `Basic` Authorization header.
fn extract_basic_credential(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Basic "))
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Map an HTTP method to a protocol verb.
fn verb_for(method: &Method) -> Option<Verb> {
    match method.as_str() {
        "GET" => Some(Verb::Load),
        "POST" => Some(Verb::Store),
        "LOCK" => Some(Verb::Lock),
        "UNLOCK" => Some(Verb::Unlock),
        _ => None,
    }
}

/// /state/{name} - One verb of the Terraform HTTP backend protocol.
pub async fn state_handler(
    State(state): State<AppState>,
    method: Method,
    Path(name): Path<String>,
    query: std::result::Result<Query<StateQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let credential = extract_basic_credential(&headers).ok_or(ApiError::Unauthorized)?;
    let Query(query) = query.map_err(|e| ApiError::InvalidQuery(e.body_text()))?;

    let verb = verb_for(&method).ok_or_else(|| {
        warn!(state = %name, "Method {} not allowed", method);
        ApiError::MethodNotAllowed(method.clone())
    })?;

    let reply = state
        .protocol
        .handle(StateRequest {
            verb,
            name,
            credential: credential.to_string(),
            body,
            lock_id: query.id,
        })
        .await?;

    if reply.is_json() {
        Ok(([(header::CONTENT_TYPE, "application/json")], reply.body).into_response())
    } else {
        Ok(reply.body.into_response())
    }
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tfstate_core::{MemoryStoreFactory, SessionPool};
    use tower::ServiceExt;

    use super::*;

    const AUTH: &str = "Basic dGVzdElE";

    fn app() -> Router {
        let pool = Arc::new(SessionPool::new(MemoryStoreFactory::new()));
        router(AppState {
            protocol: Arc::new(LockProtocol::new(pool)),
            backend: "memory",
        })
    }

    fn request(method: &str, uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method(Method::from_bytes(method.as_bytes()).unwrap())
            .uri(uri)
            .header(header::AUTHORIZATION, AUTH)
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Option<String>, String) {
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .map(|v| v.to_str().unwrap().to_string());
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, content_type, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_unauthorised() {
        let app = app();
        let req = Request::builder()
            .uri("/state/sample")
            .body(Body::empty())
            .unwrap();

        let (status, _, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let req = Request::builder()
            .uri("/state/sample")
            .header(header::AUTHORIZATION, "Bearer dGVzdElE")
            .body(Body::empty())
            .unwrap();

        let (status, _, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_state_not_found() {
        let app = app();

        let (status, _, body) = send(&app, request("GET", "/state/sample", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, "Not Found");
    }

    #[tokio::test]
    async fn test_method_not_allowed() {
        let app = app();

        let (status, _, _) = send(&app, request("PUT", "/state/sample", "{}")).await;
        assert_eq!(status, StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_happy_path() {
        let app = app();
        let lock = r#"{"ID":"L1"}"#;
        let state = r#"{"test":"value"}"#;

        let (status, _, _) = send(&app, request("LOCK", "/state/sample", lock)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = send(&app, request("POST", "/state/sample?ID=L1", state)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, content_type, body) = send(&app, request("GET", "/state/sample", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        assert_eq!(body, state);

        let (status, _, _) = send(&app, request("UNLOCK", "/state/sample", lock)).await;
        assert_eq!(status, StatusCode::OK);

        // Lock is gone: storing with the old ID finds nothing to validate against
        let (status, _, _) = send(&app, request("POST", "/state/sample?ID=L1", state)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        // State survives the session eviction
        let (status, _, body) = send(&app, request("GET", "/state/sample", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, state);
    }

    #[tokio::test]
    async fn test_locked_state() {
        let app = app();
        let lock = r#"{"ID": "sampleLocked2", "Operation": "OperationTypeApply"}"#;

        let (status, _, _) = send(&app, request("LOCK", "/state/sample2", lock)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, content_type, body) = send(
            &app,
            request("POST", "/state/sample2?ID=wrongvalue", r#"{"test": "value2"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::LOCKED);
        assert_eq!(content_type.as_deref(), Some("application/json"));
        assert_eq!(body, lock);

        let (status, _, body) = send(
            &app,
            request("LOCK", "/state/sample2", r#"{"ID": "sampleLocked3"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, lock);

        let (status, _, _) = send(&app, request("GET", "/state/sample2", "")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_store_state_without_locking() {
        let app = app();

        let (status, _, _) = send(
            &app,
            request("POST", "/state/sample3", r#"{"test": "value3"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unlocking_wrong_state() {
        let app = app();
        let lock = r#"{"ID": "sampleLocked"}"#;

        let (status, _, _) = send(&app, request("LOCK", "/state/sample", lock)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = send(&app, request("UNLOCK", "/state/sample2", lock)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

        let (status, _, body) = send(
            &app,
            request("UNLOCK", "/state/sample", r#"{"ID": "someoneElse"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, lock);

        let (status, _, _) = send(&app, request("UNLOCK", "/state/sample", "nope")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_nested_state_names() {
        let app = app();
        let lock = r#"{"ID":"L1"}"#;

        let (status, _, _) = send(&app, request("LOCK", "/state/env/prod", lock)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = send(&app, request("POST", "/state/env/prod?ID=L1", "{}")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, body) = send(&app, request("GET", "/state/env/prod", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "{}");
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let app = app();

        let (status, _, _) = send(&app, request("LOCK", "/state/sample", r#"{"ID":"L1"}"#)).await;
        assert_eq!(status, StatusCode::OK);

        // Same name, different credential: no lock there
        let req = Request::builder()
            .method(Method::from_bytes(b"LOCK").unwrap())
            .uri("/state/sample")
            .header(header::AUTHORIZATION, "Basic b3RoZXJJRA==")
            .body(Body::from(r#"{"ID":"L2"}"#))
            .unwrap();
        let (status, _, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_query_checked_after_credential() {
        let app = app();

        let req = Request::builder()
            .method(Method::POST)
            .uri("/state/sample?ID=L1&ID=L2")
            .body(Body::from("{}"))
            .unwrap();
        let (status, _, _) = send(&app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _, _) = send(&app, request("POST", "/state/sample?ID=L1&ID=L2", "{}")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_large_state_round_trip() {
        let app = app();
        let lock = r#"{"ID":"L1"}"#;
        let state = format!(r#"{{"padding":"{}"}}"#, "x".repeat(3 * 1024 * 1024));

        let (status, _, _) = send(&app, request("LOCK", "/state/big", lock)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = send(&app, request("POST", "/state/big?ID=L1", &state)).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, body) = send(&app, request("GET", "/state/big", "")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.len(), state.len());
        assert!(body == state);
    }

    #[tokio::test]
    async fn test_health() {
        let app = app();
        send(&app, request("GET", "/state/sample", "")).await;

        let req = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();
        let (status, _, body) = send(&app, req).await;
        assert_eq!(status, StatusCode::OK);

        let health: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(health["healthy"], true);
        assert_eq!(health["backend"], "memory");
        assert_eq!(health["sessions"], 1);
    }
}
