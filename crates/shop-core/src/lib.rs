//! # Shop Core
//!
//! 스토어프런트 백엔드 전반에서 공유되는 기반 타입을 제공합니다:
//! - 설정 관리 (경로 접근 정책, 토큰 수명, 서명 키)
//! - 로깅 인프라
//! - 부트스트랩 에러

pub mod config;
pub mod error;
pub mod logging;

pub use config::*;
pub use error::*;
pub use logging::*;
