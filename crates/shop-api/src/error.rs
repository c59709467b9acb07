//! API 에러 응답 타입.
//!
//! 두 가지 형식을 사용합니다.
//! - 입력 검증/자격증명 실패: 기존 클라이언트 호환 필드 맵 (`{"email": ["..."]}`)
//! - 그 외 서버 측 에러: [`ApiErrorResponse`] (`{"code", "message", ...}`)
//!
//! 인가 미들웨어의 401/403은 [`crate::auth::Rejection`]이 담당합니다.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{error, warn};
use validator::ValidationErrors;

use crate::auth::{AuthError, IssueError, PasswordError, StoreError};

/// 서버 측 에러 응답.
///
/// ```json
/// {
///   "code": "SERVICE_UNAVAILABLE",
///   "message": "Credential store is unavailable",
///   "timestamp": 1738300800
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "NOT_FOUND", "INTERNAL_ERROR")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 에러 발생 타임스탬프 (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ApiErrorResponse {
    /// 기본 에러 생성 (타임스탬프 포함).
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// 핸들러 에러.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// 요청 본문 검증 실패 (400)
    #[error("입력 검증 실패")]
    Validation(#[from] ValidationErrors),

    /// 특정 필드에 대한 실패 (400)
    #[error("{field}: {message}")]
    Field {
        field: &'static str,
        message: String,
    },

    /// 제시된 토큰을 받아들일 수 없음 (401)
    #[error("토큰이 유효하지 않습니다: {0}")]
    TokenNotValid(String),

    #[error("찾을 수 없습니다: {0}")]
    NotFound(String),

    /// 저장소 장애 (503)
    #[error("서비스를 사용할 수 없습니다: {0}")]
    Unavailable(String),

    /// 내부 에러 (500). 상세는 로그에만 남습니다.
    #[error("내부 에러: {0}")]
    Internal(String),
}

/// API 핸들러 Result 타입.
pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn field(field: &'static str, message: impl Into<String>) -> Self {
        ApiError::Field {
            field,
            message: message.into(),
        }
    }

    pub fn invalid_credentials() -> Self {
        Self::field("non_field_errors", "Invalid credentials or inactive account.")
    }

    pub fn wrong_password() -> Self {
        Self::field("old_password", "Wrong password.")
    }

    pub fn email_taken() -> Self {
        Self::field("email", "user with this email already exists.")
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::Field { .. } => StatusCode::BAD_REQUEST,
            ApiError::TokenNotValid(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// `{"field": ["message", ...]}` 형태로 변환합니다.
fn field_errors_body(errors: &ValidationErrors) -> Value {
    let mut body = Map::new();
    for (field, field_errors) in errors.field_errors() {
        let messages = field_errors
            .iter()
            .map(|e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("Invalid value ({}).", e.code))
            })
            .map(Value::String)
            .collect();
        body.insert(field.to_string(), Value::Array(messages));
    }
    Value::Object(body)
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation(errors) => {
                (status, Json(field_errors_body(&errors))).into_response()
            }
            ApiError::Field { field, message } => {
                let mut body = Map::new();
                body.insert(field.to_string(), json!([message]));
                (status, Json(Value::Object(body))).into_response()
            }
            ApiError::TokenNotValid(detail) => (
                status,
                Json(json!({ "detail": detail, "code": "token_not_valid" })),
            )
                .into_response(),
            ApiError::NotFound(what) => (
                status,
                Json(ApiErrorResponse::new("NOT_FOUND", format!("{} not found", what))),
            )
                .into_response(),
            ApiError::Unavailable(detail) => {
                warn!(error = %detail, "Request failed: backing store unavailable");
                (
                    status,
                    Json(ApiErrorResponse::new(
                        "SERVICE_UNAVAILABLE",
                        "Service temporarily unavailable",
                    )),
                )
                    .into_response()
            }
            ApiError::Internal(detail) => {
                error!(error = %detail, "Request failed with internal error");
                (
                    status,
                    Json(ApiErrorResponse::new("INTERNAL_ERROR", "Internal server error")),
                )
                    .into_response()
            }
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::DuplicateEmail => ApiError::email_taken(),
            StoreError::NotFound => ApiError::NotFound("user".to_string()),
            StoreError::Unavailable(detail) => ApiError::Unavailable(detail),
            StoreError::Corrupt(detail) => ApiError::Internal(detail),
        }
    }
}

impl From<PasswordError> for ApiError {
    fn from(err: PasswordError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<IssueError> for ApiError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::Store(e) => e.into(),
            IssueError::Signing(e) => ApiError::Internal(e.to_string()),
        }
    }
}

/// 토큰 엔드포인트(refresh/verify)용 변환. 저장소 장애는 401이 아니라 503입니다.
impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::StoreUnavailable(detail) => ApiError::Unavailable(detail),
            AuthError::ExpiredToken => ApiError::TokenNotValid("Token is expired".to_string()),
            AuthError::RevokedToken => ApiError::TokenNotValid("Token is blacklisted".to_string()),
            AuthError::InactiveIdentity => {
                ApiError::TokenNotValid("User is inactive".to_string())
            }
            AuthError::UnknownToken => ApiError::TokenNotValid("User not found".to_string()),
            AuthError::InvalidSignature | AuthError::MalformedToken => {
                ApiError::TokenNotValid("Token is invalid".to_string())
            }
        }
    }
}
