//! # Shop API
//!
//! 스토어프런트 인증/인가 백엔드.
//!
//! 모든 요청은 인가 파이프라인을 거칩니다:
//! 1. [`auth::PathPolicy`]로 경로를 공개/보호/미매칭으로 분류
//! 2. 보호 경로면 [`auth::TokenVerifier`]로 신원을 확인
//! 3. 역할이 규칙의 허용 집합에 있으면 통과, 아니면 401/403
//!
//! 통과한 요청의 신원은 [`auth::CurrentIdentity`]로 핸들러에 전달됩니다.

pub mod auth;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod repository;
pub mod routes;
pub mod state;

pub use error::{ApiError, ApiErrorResponse, ApiResult};
pub use routes::create_router;
pub use state::AppState;
