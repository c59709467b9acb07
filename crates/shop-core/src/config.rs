//! 설정 관리.
//!
//! 시작 시 한 번 로드되어 프로세스 전역에서 읽기 전용으로 공유되는 설정입니다.
//! 로드 순서: 기본값 → `config/default.toml`(선택) → `SHOP__` 환경 변수 →
//! 잘 알려진 단일 환경 변수(`JWT_SECRET`, `DATABASE_URL` 등).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{ConfigError, ConfigResult};

/// HS256 서명 키 최소 길이 (바이트).
pub const MIN_SECRET_LEN: usize = 32;

/// 허용되는 최대 시계 오차 (초).
pub const MAX_LEEWAY_SECS: u64 = 300;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// 데이터베이스 설정
    pub database: DatabaseConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
    /// 토큰 발급/검증 설정
    pub auth: AuthConfig,
    /// 경로 접근 정책 설정
    pub access: AccessConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

/// 데이터베이스 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL 연결 URL. 없으면 인메모리 저장소를 사용합니다.
    pub url: Option<String>,
    /// 최대 연결 수
    pub max_connections: u32,
    /// 연결 타임아웃 (초)
    pub connection_timeout_secs: u64,
    /// 시작 시 마이그레이션 실행 여부
    pub run_migrations: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            connection_timeout_secs: 10,
            run_migrations: true,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨 필터 (`RUST_LOG`가 있으면 그것이 우선)
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "shop_api=info,shop_core=info,tower_http=info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 토큰 설정.
#[derive(Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HS256 서명 키
    pub jwt_secret: String,
    /// Access Token 수명 (분)
    pub access_token_ttl_minutes: i64,
    /// Refresh Token 수명 (일)
    pub refresh_token_ttl_days: i64,
    /// 만료 검사 시 허용하는 시계 오차 (초)
    pub leeway_secs: u64,
    /// 불투명 세션 토큰을 담는 쿠키 이름
    pub session_cookie: String,
    /// 토큰/자격증명 저장소 호출 타임아웃 (밀리초)
    pub store_timeout_ms: u64,
    /// 만료된 블랙리스트 항목 정리 주기 (초)
    pub blacklist_purge_interval_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            access_token_ttl_minutes: 60,
            refresh_token_ttl_days: 7,
            leeway_secs: 30,
            session_cookie: "session_token".to_string(),
            store_timeout_ms: 2_000,
            blacklist_purge_interval_secs: 3_600,
        }
    }
}

// 서명 키가 로그에 남지 않도록 직접 구현
impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("access_token_ttl_minutes", &self.access_token_ttl_minutes)
            .field("refresh_token_ttl_days", &self.refresh_token_ttl_days)
            .field("leeway_secs", &self.leeway_secs)
            .field("session_cookie", &self.session_cookie)
            .field("store_timeout_ms", &self.store_timeout_ms)
            .field(
                "blacklist_purge_interval_secs",
                &self.blacklist_purge_interval_secs,
            )
            .finish()
    }
}

impl AuthConfig {
    /// 서명 키와 토큰 수명 조합을 검증합니다.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.jwt_secret.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if self.jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret {
                min: MIN_SECRET_LEN,
                actual: self.jwt_secret.len(),
            });
        }
        if self.access_token_ttl_minutes <= 0 || self.refresh_token_ttl_days <= 0 {
            return Err(ConfigError::InvalidTtl(
                "token lifetimes must be positive".to_string(),
            ));
        }
        if self.access_token_ttl_minutes >= self.refresh_token_ttl_days * 24 * 60 {
            return Err(ConfigError::InvalidTtl(format!(
                "access token ({} min) must expire before refresh token ({} days)",
                self.access_token_ttl_minutes, self.refresh_token_ttl_days
            )));
        }
        if self.leeway_secs > MAX_LEEWAY_SECS
            || self.leeway_secs as i64 >= self.access_token_ttl_minutes * 60
        {
            return Err(ConfigError::InvalidTtl(format!(
                "leeway {}s exceeds the allowed window",
                self.leeway_secs
            )));
        }
        Ok(())
    }
}

/// 매칭되지 않은 경로에 대한 기본 정책.
///
/// `Allow`는 기존 동작과의 호환을 위한 값이며 보안상 민감합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DefaultPolicy {
    /// 규칙이 없으면 통과
    #[default]
    Allow,
    /// 규칙이 없으면 빈 역할 집합으로 보호
    Deny,
}

/// 경로 prefix → 허용 역할 규칙.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AccessRuleConfig {
    /// 경로 prefix
    pub prefix: String,
    /// 허용 역할 이름 (소문자)
    pub roles: Vec<String>,
}

impl AccessRuleConfig {
    pub fn new(prefix: impl Into<String>, roles: &[&str]) -> Self {
        Self {
            prefix: prefix.into(),
            roles: roles.iter().map(|r| (*r).to_string()).collect(),
        }
    }
}

/// 경로 접근 정책 설정.
///
/// `public_paths`와 `rules`는 모두 선언 순서가 유지되어야 합니다.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AccessConfig {
    /// 인증 없이 통과하는 경로 prefix 목록 (세그먼트 경계에서 매칭)
    pub public_paths: Vec<String>,
    /// 역할 규칙 목록 (선언 순서대로 첫 매칭이 적용됨)
    pub rules: Vec<AccessRuleConfig>,
    /// 매칭되지 않은 경로의 처리
    pub default_policy: DefaultPolicy,
}

impl Default for AccessConfig {
    fn default() -> Self {
        const ALL: &[&str] = &["customer", "seller", "admin"];

        Self {
            public_paths: vec![
                "/health".to_string(),
                "/metrics".to_string(),
                "/auth/signup/".to_string(),
                "/auth/login/".to_string(),
                "/auth/jwt/create/".to_string(),
                "/auth/jwt/refresh/".to_string(),
                "/auth/jwt/verify/".to_string(),
                "/auth/forgot-password/".to_string(),
            ],
            rules: vec![
                AccessRuleConfig::new("/admin/", &["admin"]),
                AccessRuleConfig::new("/auth/", ALL),
                AccessRuleConfig::new("/api/admin-dashboard/", &["admin"]),
                AccessRuleConfig::new("/seller/", &["seller", "admin"]),
                AccessRuleConfig::new("/orders/", ALL),
                AccessRuleConfig::new("/products/", ALL),
                AccessRuleConfig::new("/wishlist/", &["customer"]),
                AccessRuleConfig::new("/cart/", &["customer"]),
            ],
            default_policy: DefaultPolicy::Allow,
        }
    }
}

impl AccessConfig {
    /// prefix 형식과 역할 목록을 검증합니다. 역할 이름 자체는 정책 생성 시 검증됩니다.
    pub fn validate(&self) -> ConfigResult<()> {
        for prefix in &self.public_paths {
            if !prefix.starts_with('/') {
                return Err(ConfigError::InvalidAccessRule(format!(
                    "public path '{}' must start with '/'",
                    prefix
                )));
            }
        }
        for rule in &self.rules {
            if !rule.prefix.starts_with('/') {
                return Err(ConfigError::InvalidAccessRule(format!(
                    "rule prefix '{}' must start with '/'",
                    rule.prefix
                )));
            }
            if rule.roles.is_empty() {
                return Err(ConfigError::InvalidAccessRule(format!(
                    "rule '{}' has no allowed roles",
                    rule.prefix
                )));
            }
        }
        Ok(())
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드하고 검증합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("SHOP")
                    .separator("__")
                    .try_parsing(true),
            )
            .set_override_option("auth.jwt_secret", std::env::var("JWT_SECRET").ok())?
            .set_override_option(
                "auth.access_token_ttl_minutes",
                std::env::var("ACCESS_TOKEN_TTL_MINUTES").ok(),
            )?
            .set_override_option(
                "auth.refresh_token_ttl_days",
                std::env::var("REFRESH_TOKEN_TTL_DAYS").ok(),
            )?
            .set_override_option("database.url", std::env::var("DATABASE_URL").ok())?
            .set_override_option("server.host", std::env::var("API_HOST").ok())?
            .set_override_option("server.port", std::env::var("API_PORT").ok())?;

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> ConfigResult<Self> {
        Self::load("config/default.toml")
    }

    /// 전체 설정을 검증합니다.
    pub fn validate(&self) -> ConfigResult<()> {
        self.auth.validate()?;
        self.access.validate()
    }
}
