//! 인증 endpoint.
//!
//! # 엔드포인트
//!
//! - `POST /auth/signup/` - 회원가입 (201)
//! - `POST /auth/login/` - 이메일/비밀번호 로그인
//! - `POST /auth/jwt/create/` - access/refresh 토큰 발급
//! - `POST /auth/jwt/refresh/` - access 토큰 재발급
//! - `POST /auth/jwt/verify/` - 토큰 유효성 확인
//! - `POST /auth/forgot-password/` - 비밀번호 재설정 요청 (항상 200)
//! - `POST /auth/change-password/` - 비밀번호 변경 + 자격증명 교체 (인증 필요)
//! - `POST /auth/logout/` - refresh 토큰 폐기 + 세션 종료 (인증 필요, 205)
//! - `GET /auth/me/` - 현재 사용자 (인증 필요)

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::{info, warn};
use validator::{Validate, ValidationError};

use crate::auth::store::bounded;
use crate::auth::{
    hash_password_blocking, validate_password_strength, verify_password_blocking, AuthError,
    CurrentIdentity, Identity, PasswordError, Revocation, Role, TokenKind,
};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

// ==================== 요청/응답 타입 ====================

/// 회원가입 요청.
#[derive(Debug, Deserialize, Validate)]
pub struct SignupRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, max = 150, message = "This field may not be blank."))]
    pub first_name: String,
    #[validate(length(min = 1, max = 150, message = "This field may not be blank."))]
    pub last_name: String,
    #[validate(custom(function = "password_strength"))]
    pub password: String,
    /// 기본값 customer. admin은 가입으로 만들 수 없습니다.
    #[serde(default)]
    pub role: Option<Role>,
}

/// 로그인 / JWT 발급 요청.
#[derive(Debug, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ChangePasswordRequest {
    #[validate(length(min = 1, message = "This field may not be blank."))]
    pub old_password: String,
    #[validate(custom(function = "password_strength"))]
    pub new_password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ForgotPasswordRequest {
    #[validate(email(message = "Enter a valid email address."))]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub token: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogoutRequest {
    #[serde(default)]
    pub refresh: Option<String>,
}

/// 서명 토큰 쌍.
#[derive(Debug, Serialize, Deserialize)]
pub struct JwtPair {
    pub access: String,
    pub refresh: String,
}

/// 회원가입/로그인 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    /// 불투명 세션 토큰
    pub token: String,
    pub jwt: JwtPair,
    pub user: Identity,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

fn password_strength(password: &str) -> Result<(), ValidationError> {
    validate_password_strength(password).map_err(|message| {
        ValidationError::new("password_strength").with_message(Cow::Borrowed(message))
    })
}

// ==================== 핸들러 ====================

/// 회원가입.
///
/// POST /auth/signup/
pub async fn signup(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<impl IntoResponse> {
    req.validate()?;

    let role = req.role.unwrap_or(Role::Customer);
    if role == Role::Admin {
        return Err(ApiError::field("role", "\"admin\" is not a valid choice."));
    }

    let password_hash = hash_password_blocking(req.password).await?;
    let identity = Identity::new(&req.email, req.first_name, req.last_name, role).verified();

    let identity = bounded(
        state.store_timeout(),
        state.credentials.create(identity, password_hash),
    )
    .await?;
    let pair = state.issuer.issue(&identity).await?;

    info!(identity_id = %identity.id, role = %identity.role, "Identity registered");

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token: pair.session_token,
            jwt: JwtPair {
                access: pair.access_token,
                refresh: pair.refresh_token,
            },
            user: identity,
        }),
    ))
}

/// 로그인.
///
/// POST /auth/login/
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<SessionResponse>> {
    req.validate()?;

    let identity = authenticate(&state, &req.email, req.password).await?;
    let pair = state.issuer.issue(&identity).await?;

    info!(identity_id = %identity.id, "Login succeeded");

    Ok(Json(SessionResponse {
        token: pair.session_token,
        jwt: JwtPair {
            access: pair.access_token,
            refresh: pair.refresh_token,
        },
        user: identity,
    }))
}

/// 서명 토큰 쌍 발급. 세션 토큰은 건드리지 않습니다.
///
/// POST /auth/jwt/create/
pub async fn jwt_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<JwtPair>> {
    req.validate()?;

    let identity = authenticate(&state, &req.email, req.password).await?;

    Ok(Json(JwtPair {
        access: state.issuer.mint_access(&identity)?,
        refresh: state.issuer.mint_refresh(identity.id)?,
    }))
}

/// 유효한 refresh 토큰으로 access 토큰을 다시 발급합니다.
///
/// POST /auth/jwt/refresh/
pub async fn jwt_refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> ApiResult<impl IntoResponse> {
    let identity = state.verifier.verify(&req.refresh, TokenKind::Refresh).await?;
    let access = state.issuer.mint_access(&identity)?;

    Ok(Json(json!({ "access": access })))
}

/// access 또는 refresh 토큰의 유효성 확인.
///
/// POST /auth/jwt/verify/
pub async fn jwt_verify(
    State(state): State<Arc<AppState>>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<impl IntoResponse> {
    match state.verifier.verify(&req.token, TokenKind::Access).await {
        Ok(_) => {}
        Err(AuthError::MalformedToken) => {
            state
                .verifier
                .verify(&req.token, TokenKind::Refresh)
                .await?;
        }
        Err(e) => return Err(e.into()),
    }
    Ok(Json(json!({})))
}

/// 비밀번호 재설정 요청.
///
/// 계정 존재 여부를 드러내지 않도록 항상 같은 응답을 반환합니다.
///
/// POST /auth/forgot-password/
pub async fn forgot_password(
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;

    info!("Password reset requested");

    Ok(Json(MessageResponse::new(
        "If an account exists, a reset link has been sent.",
    )))
}

/// 비밀번호 변경.
///
/// 성공하면 이 신원의 기존 토큰이 모두 폐기됩니다.
///
/// POST /auth/change-password/
pub async fn change_password(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(auth): CurrentIdentity,
    Json(req): Json<ChangePasswordRequest>,
) -> ApiResult<Json<MessageResponse>> {
    req.validate()?;
    let identity_id = auth.identity.id;

    let current_hash = bounded(
        state.store_timeout(),
        state.credentials.password_hash(identity_id),
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("user".to_string()))?;

    match verify_password_blocking(req.old_password, current_hash).await {
        Ok(()) => {}
        Err(PasswordError::VerificationFailed) => return Err(ApiError::wrong_password()),
        Err(e) => return Err(e.into()),
    }

    let new_hash = hash_password_blocking(req.new_password).await?;
    bounded(
        state.store_timeout(),
        state.credentials.update_password(identity_id, new_hash),
    )
    .await?;
    state.verifier.revoke_all(identity_id).await?;

    info!(identity_id = %identity_id, "Password changed, credentials rotated");

    Ok(Json(MessageResponse::new("Password updated successfully.")))
}

/// 로그아웃.
///
/// 본문에 `refresh`가 있으면 해당 토큰을 폐기하고, 세션 토큰을 삭제합니다.
/// 다른 사용자의 refresh 토큰이면 아무 것도 폐기하지 않고 거부합니다.
///
/// POST /auth/logout/
pub async fn logout(
    State(state): State<Arc<AppState>>,
    CurrentIdentity(auth): CurrentIdentity,
    body: Bytes,
) -> ApiResult<StatusCode> {
    let req: LogoutRequest = if body.is_empty() {
        LogoutRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|_| ApiError::field("non_field_errors", "Malformed request body."))?
    };
    let identity_id = auth.identity.id;

    if let Some(refresh) = req.refresh {
        let outcome = state.verifier.revoke(&refresh, identity_id).await?;
        if outcome == Revocation::NotOwner {
            warn!(identity_id = %identity_id, "Logout presented another identity's refresh token");
            return Err(ApiError::TokenNotValid(
                "Token does not belong to this user".to_string(),
            ));
        }
    }
    state.verifier.end_session(identity_id).await?;

    info!(identity_id = %identity_id, "Logged out");

    Ok(StatusCode::RESET_CONTENT)
}

/// 현재 사용자.
///
/// GET /auth/me/
pub async fn me(CurrentIdentity(auth): CurrentIdentity) -> Json<Identity> {
    Json(auth.identity)
}

/// 이메일/비밀번호 확인. 실패 사유는 구분하지 않습니다.
async fn authenticate(state: &AppState, email: &str, password: String) -> ApiResult<Identity> {
    let credential = bounded(state.store_timeout(), state.credentials.find_by_email(email))
        .await?
        .ok_or_else(ApiError::invalid_credentials)?;

    match verify_password_blocking(password, credential.password_hash).await {
        Ok(()) => {}
        Err(PasswordError::VerificationFailed) => return Err(ApiError::invalid_credentials()),
        Err(e) => return Err(e.into()),
    }

    if !credential.identity.is_active {
        info!(identity_id = %credential.identity.id, "Login refused for inactive identity");
        return Err(ApiError::invalid_credentials());
    }

    Ok(credential.identity)
}

/// 인증 라우터 생성.
pub fn auth_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/signup/", post(signup))
        .route("/login/", post(login))
        .route("/jwt/create/", post(jwt_create))
        .route("/jwt/refresh/", post(jwt_refresh))
        .route("/jwt/verify/", post(jwt_verify))
        .route("/forgot-password/", post(forgot_password))
        .route("/change-password/", post(change_password))
        .route("/logout/", post(logout))
        .route("/me/", get(me))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signup_validation() {
        let req = SignupRequest {
            email: "not-an-email".to_string(),
            first_name: String::new(),
            last_name: "Doe".to_string(),
            password: "short".to_string(),
            role: None,
        };
        let errors = req.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("first_name"));
        assert!(fields.contains_key("password"));
        assert!(!fields.contains_key("last_name"));
    }

    #[test]
    fn test_password_strength_message() {
        let err = password_strength("letters-only").unwrap_err();
        assert_eq!(
            err.message.as_deref(),
            Some("Password must contain at least one digit.")
        );
    }

    #[test]
    fn test_logout_body_is_optional() {
        let req: LogoutRequest = serde_json::from_str("{}").unwrap();
        assert!(req.refresh.is_none());
    }
}
