//! 토큰 검증 에러와 인가 거부 응답.

use axum::{
    http::{header::WWW_AUTHENTICATE, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::store::StoreError;
use super::Role;

/// 토큰 검증 에러.
///
/// 미들웨어가 401/403 중 하나로 접어 응답하며, 구분은 로그와 메트릭에만 남습니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("토큰이 만료되었습니다")]
    ExpiredToken,
    #[error("토큰 서명이 유효하지 않습니다")]
    InvalidSignature,
    #[error("폐기된 토큰입니다")]
    RevokedToken,
    #[error("잘못된 토큰 형식")]
    MalformedToken,
    #[error("알 수 없는 토큰")]
    UnknownToken,
    #[error("비활성화된 계정입니다")]
    InactiveIdentity,
    #[error("자격증명 저장소를 사용할 수 없습니다: {0}")]
    StoreUnavailable(String),
}

impl AuthError {
    /// 로그/메트릭용 짧은 라벨.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::ExpiredToken => "expired",
            AuthError::InvalidSignature => "invalid_signature",
            AuthError::RevokedToken => "revoked",
            AuthError::MalformedToken => "malformed",
            AuthError::UnknownToken => "unknown",
            AuthError::InactiveIdentity => "inactive",
            AuthError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => AuthError::UnknownToken,
            other => AuthError::StoreUnavailable(other.to_string()),
        }
    }
}

/// 인가 거부.
///
/// 응답 본문은 클라이언트 호환을 위해 `{"error": "Unauthorized"}` /
/// `{"error": "Forbidden"}`로 고정됩니다.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("인증이 필요합니다")]
    Unauthenticated {
        /// 자격증명이 있었지만 검증에 실패한 경우의 원인
        cause: Option<AuthError>,
    },
    #[error("역할 '{role}'은(는) 이 경로에 접근할 수 없습니다")]
    Forbidden { role: Role },
}

impl Rejection {
    pub fn unauthenticated() -> Self {
        Rejection::Unauthenticated { cause: None }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::Unauthenticated { .. } => StatusCode::UNAUTHORIZED,
            Rejection::Forbidden { .. } => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for Rejection {
    fn into_response(self) -> Response {
        match self {
            Rejection::Unauthenticated { cause } => {
                let challenge = match cause {
                    Some(AuthError::ExpiredToken) => HeaderValue::from_static(
                        r#"Bearer error="invalid_token", error_description="token expired""#,
                    ),
                    Some(_) => HeaderValue::from_static(r#"Bearer error="invalid_token""#),
                    None => HeaderValue::from_static("Bearer"),
                };
                let mut response = (
                    StatusCode::UNAUTHORIZED,
                    Json(json!({ "error": "Unauthorized" })),
                )
                    .into_response();
                response.headers_mut().insert(WWW_AUTHENTICATE, challenge);
                response
            }
            Rejection::Forbidden { .. } => {
                (StatusCode::FORBIDDEN, Json(json!({ "error": "Forbidden" }))).into_response()
            }
        }
    }
}
