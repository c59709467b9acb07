//! 설정 및 부트스트랩 에러 타입.

use thiserror::Error;

/// 설정 로드/검증 에러.
///
/// 시작 시점에만 발생하며, 발생하면 프로세스는 기동하지 않습니다.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 설정 소스(파일, 환경 변수) 로드 실패
    #[error("설정 로드 실패: {0}")]
    Load(#[from] config::ConfigError),

    /// JWT 서명 키 미설정
    #[error("JWT 서명 키가 설정되지 않았습니다 (JWT_SECRET 또는 SHOP__AUTH__JWT_SECRET)")]
    MissingSecret,

    /// JWT 서명 키가 너무 짧음
    #[error("JWT 서명 키는 최소 {min}바이트 이상이어야 합니다 (현재 {actual}바이트)")]
    WeakSecret { min: usize, actual: usize },

    /// 토큰 수명 설정 오류
    #[error("토큰 수명이 유효하지 않습니다: {0}")]
    InvalidTtl(String),

    /// 접근 규칙 설정 오류
    #[error("접근 규칙이 유효하지 않습니다: {0}")]
    InvalidAccessRule(String),
}

/// 설정 작업을 위한 Result 타입.
pub type ConfigResult<T> = Result<T, ConfigError>;
