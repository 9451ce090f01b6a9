//! Admin HTTP API for filesystem lifecycle operations.
//!
//! JSON over axum. When `admin_token` is configured, the `/v1` surface
//! requires `Authorization: Bearer <token>`.

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, Request, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::error::ControlError;
use crate::plane::ControlPlane;
use crate::types::FilesystemSpec;

/// JSON error body returned by every failing handler.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human-readable cause.
    pub error: String,
}

/// Body for the replica scaling endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ScaleRequest {
    /// Desired metadata replica count.
    pub replicas: u32,
}

/// Body returned by the delete endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct DeleteResponse {
    /// Always "deleting".
    pub status: String,
}

fn error_response(err: &ControlError) -> Response {
    let status = match err {
        ControlError::Validation { .. } => StatusCode::BAD_REQUEST,
        ControlError::ResourceConflict { .. }
        | ControlError::FilesystemInUse { .. }
        | ControlError::StaleGeneration { .. } => StatusCode::CONFLICT,
        ControlError::NotFound { .. } => StatusCode::NOT_FOUND,
        ControlError::TransientInfra { .. } | ControlError::DrainTimeout { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    };
    (
        status,
        Json(ErrorBody {
            error: err.to_string(),
        }),
    )
        .into_response()
}

/// Build the admin router over an assembled control plane.
pub fn router(plane: Arc<ControlPlane>) -> Router {
    let v1 = Router::new()
        .route("/filesystems", post(create_filesystem).get(list_filesystems))
        .route(
            "/filesystems/:name",
            get(get_filesystem).delete(delete_filesystem),
        )
        .route("/filesystems/:name/replicas", put(scale_replicas))
        .route("/tombstones", get(list_tombstones))
        .layer(from_fn_with_state(plane.clone(), require_token))
        .with_state(plane);
    Router::new().route("/healthz", get(healthz)).nest("/v1", v1)
}

async fn require_token(
    State(plane): State<Arc<ControlPlane>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let expected = match plane.config().admin_token.as_deref() {
        None => return next.run(req).await,
        Some(token) => token,
    };
    let provided = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    let authorized = provided
        .map(|p| bool::from(p.as_bytes().ct_eq(expected.as_bytes())))
        .unwrap_or(false);
    if authorized {
        next.run(req).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorBody {
                error: "unauthorized".to_string(),
            }),
        )
            .into_response()
    }
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn create_filesystem(
    State(plane): State<Arc<ControlPlane>>,
    Json(spec): Json<FilesystemSpec>,
) -> Response {
    match plane.create_filesystem(spec).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn list_filesystems(State(plane): State<Arc<ControlPlane>>) -> Response {
    let records = plane.list_filesystems().await;
    (StatusCode::OK, Json(records)).into_response()
}

async fn get_filesystem(
    State(plane): State<Arc<ControlPlane>>,
    Path(name): Path<String>,
) -> Response {
    match plane.get_filesystem(&name).await {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn delete_filesystem(
    State(plane): State<Arc<ControlPlane>>,
    Path(name): Path<String>,
) -> Response {
    match plane.delete_filesystem(&name).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(DeleteResponse {
                status: "deleting".to_string(),
            }),
        )
            .into_response(),
        Err(err) => error_response(&err),
    }
}

async fn scale_replicas(
    State(plane): State<Arc<ControlPlane>>,
    Path(name): Path<String>,
    Json(body): Json<ScaleRequest>,
) -> Response {
    match plane.scale_replicas(&name, body.replicas).await {
        Ok(_) => match plane.get_filesystem(&name).await {
            Ok(record) => (StatusCode::OK, Json(record)).into_response(),
            Err(err) => error_response(&err),
        },
        Err(err) => error_response(&err),
    }
}

async fn list_tombstones(State(plane): State<Arc<ControlPlane>>) -> Response {
    let tombstones = plane.list_tombstones().await;
    (StatusCode::OK, Json(tombstones)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ControlConfig;
    use fsorch_pool::{InMemorySubstrate, ReplicationPolicy};
    use fsorch_sched::{NodeId, RoundRobinPlacement};
    use tower::ServiceExt;

    fn plane(token: Option<&str>) -> Arc<ControlPlane> {
        let config = ControlConfig {
            admin_token: token.map(|t| t.to_string()),
            ..Default::default()
        };
        let storage = Arc::new(InMemorySubstrate::new(1 << 40));
        let placement = Arc::new(RoundRobinPlacement::new(vec![NodeId::new(1)]));
        Arc::new(ControlPlane::new(config, storage, placement))
    }

    fn spec_body(name: &str) -> Vec<u8> {
        let spec = FilesystemSpec {
            name: name.to_string(),
            data_replication: ReplicationPolicy::Replicated { count: 1 },
            metadata_replication: ReplicationPolicy::Replicated { count: 1 },
            metadata_replicas: 1,
            capacity_bytes: 1 << 30,
        };
        serde_json::to_vec(&spec).unwrap()
    }

    fn post_filesystem(name: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/v1/filesystems")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(spec_body(name)))
            .unwrap()
    }

    #[tokio::test]
    async fn test_healthz() {
        let app = router(plane(None));
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_create_filesystem() {
        let app = router(plane(None));
        let response = app.oneshot(post_filesystem("testfs")).await.unwrap();
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test]
    async fn test_create_invalid_spec_is_bad_request() {
        let app = router(plane(None));
        let response = app.oneshot(post_filesystem("BAD_NAME")).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_get_unknown_is_not_found() {
        let app = router(plane(None));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/filesystems/missing")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_list_filesystems() {
        let plane = plane(None);
        let app = router(plane.clone());
        app.clone().oneshot(post_filesystem("testfs")).await.unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/filesystems")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let records: Vec<serde_json::Value> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_while_mounted_is_conflict() {
        let plane = plane(None);
        let app = router(plane.clone());
        app.clone().oneshot(post_filesystem("testfs")).await.unwrap();
        plane.exports().publish_export("testfs", "node-1:2049");
        plane.exports().register_mount("testfs", "client-1").unwrap();

        let response = app
            .oneshot(
                Request::builder()
                    .method("DELETE")
                    .uri("/v1/filesystems/testfs")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_token_required_when_configured() {
        let app = router(plane(Some("secret")));
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/v1/filesystems")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/v1/filesystems")
                    .header(header::AUTHORIZATION, "Bearer secret")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_healthz_open_without_token() {
        let app = router(plane(Some("secret")));
        let response = app
            .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
