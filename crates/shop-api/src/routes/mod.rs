//! API 라우트.
//!
//! 모든 라우트는 인가 파이프라인 뒤에 놓입니다. 공개 여부는 라우터가 아니라
//! [`crate::auth::PathPolicy`]가 결정합니다.

pub mod admin;
pub mod auth;
pub mod health;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub use admin::admin_router;
pub use auth::auth_router;
pub use health::health_router;

use crate::error::ApiErrorResponse;
use crate::middleware::{metrics_layer, pipeline_middleware};
use crate::state::AppState;

/// 요청 전체 타임아웃.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// API 라우터 생성 (상태 미적용).
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/health", health_router())
        .nest("/auth", auth_router())
        .nest("/api/admin-dashboard", admin_router())
}

/// /metrics 엔드포인트 핸들러.
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

async fn not_found() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ApiErrorResponse::new("NOT_FOUND", "Resource not found")),
    )
}

/// 전체 라우터 생성.
///
/// 레이어 순서 (바깥쪽부터): 타임아웃 → 트레이스 → HTTP 메트릭 → 인가 파이프라인 → 핸들러.
/// `metrics_handle`이 없으면 `/metrics`를 노출하지 않습니다.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let pipeline = state.pipeline();

    let mut router = create_api_router()
        .fallback(not_found)
        .with_state(Arc::new(state));

    if let Some(handle) = metrics_handle {
        let metrics_router = Router::new()
            .route("/metrics", get(metrics_handler))
            .with_state(handle);
        router = router.merge(metrics_router);
    }

    router
        .layer(middleware::from_fn_with_state(pipeline, pipeline_middleware))
        .layer(middleware::from_fn(metrics_layer))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            REQUEST_TIMEOUT,
        ))
}
