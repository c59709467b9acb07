//! 관리자 대시보드 endpoint.
//!
//! 경로 정책이 `/api/admin-dashboard/`를 admin 역할로 제한합니다.
//!
//! - `POST /api/admin-dashboard/users/{id}/revoke-tokens/` - 사용자의 모든 토큰 폐기
//! - `POST /api/admin-dashboard/users/{id}/deactivate/` - 비활성화 + 토큰 폐기
//! - `POST /api/admin-dashboard/users/{id}/role/` - 역할 변경 (기존 토큰에 즉시 반영)

use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use super::auth::MessageResponse;
use crate::auth::store::bounded;
use crate::auth::{CurrentIdentity, Role};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

async fn ensure_exists(state: &AppState, id: Uuid) -> ApiResult<()> {
    bounded(state.store_timeout(), state.credentials.find_by_id(id))
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::NotFound("user".to_string()))
}

/// 사용자의 세션 토큰과 기존 서명 토큰을 모두 폐기합니다.
///
/// POST /api/admin-dashboard/users/{id}/revoke-tokens/
pub async fn revoke_tokens(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(admin): CurrentIdentity,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    ensure_exists(&state, id).await?;
    state.verifier.revoke_all(id).await?;

    info!(admin_id = %admin.identity.id, target_id = %id, "Tokens revoked by admin");

    Ok(Json(MessageResponse::new("All tokens revoked.")))
}

/// 사용자를 비활성화합니다. 레코드는 삭제하지 않습니다.
///
/// POST /api/admin-dashboard/users/{id}/deactivate/
pub async fn deactivate(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(admin): CurrentIdentity,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<MessageResponse>> {
    if id == admin.identity.id {
        return Err(ApiError::field(
            "non_field_errors",
            "You cannot deactivate your own account.",
        ));
    }

    bounded(state.store_timeout(), state.credentials.set_active(id, false)).await?;
    state.verifier.revoke_all(id).await?;

    info!(admin_id = %admin.identity.id, target_id = %id, "Identity deactivated by admin");

    Ok(Json(MessageResponse::new("User deactivated.")))
}

#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    pub role: Role,
}

/// 사용자의 역할을 바꿉니다. 인가 판정은 매 요청 저장소의 역할을 읽습니다.
///
/// POST /api/admin-dashboard/users/{id}/role/
pub async fn set_role(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(admin): CurrentIdentity,
    Path(id): Path<Uuid>,
    Json(req): Json<SetRoleRequest>,
) -> ApiResult<Json<MessageResponse>> {
    if id == admin.identity.id {
        return Err(ApiError::field(
            "non_field_errors",
            "You cannot change your own role.",
        ));
    }

    bounded(state.store_timeout(), state.credentials.set_role(id, req.role)).await?;

    info!(
        admin_id = %admin.identity.id,
        target_id = %id,
        role = %req.role,
        "Role changed by admin"
    );

    Ok(Json(MessageResponse::new("Role updated.")))
}

/// 관리자 라우터 생성.
pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users/{id}/revoke-tokens/", post(revoke_tokens))
        .route("/users/{id}/deactivate/", post(deactivate))
        .route("/users/{id}/role/", post(set_role))
}
