//! 모든 핸들러에서 공유되는 애플리케이션 상태.
//!
//! 설정과 경로 정책은 시작 시 한 번 만들어져 `Arc`로 공유되며 이후 변경되지 않습니다.

use chrono::{DateTime, Utc};
use std::sync::Arc;

use shop_core::{AppConfig, ConfigResult};

use crate::auth::{
    Clock, CredentialStore, InMemoryCredentialStore, InMemoryTokenStore, JwtKeys, PathPolicy,
    SystemClock, TokenIssuer, TokenSettings, TokenStore, TokenVerifier,
};
use crate::middleware::{AuthorizationStage, Authorizer, Interceptor, InterceptorPipeline};

/// 애플리케이션 공유 상태.
#[derive(Clone)]
pub struct AppState {
    /// 읽기 전용 설정
    pub config: Arc<AppConfig>,
    /// 경로 접근 정책
    pub policy: Arc<PathPolicy>,
    /// 신원 저장소
    pub credentials: Arc<dyn CredentialStore>,
    /// 세션 토큰 / 블랙리스트 저장소
    pub tokens: Arc<dyn TokenStore>,
    pub issuer: TokenIssuer,
    pub verifier: TokenVerifier,
    pub clock: Arc<dyn Clock>,
    /// 데이터베이스 연결 풀 (PostgreSQL)
    pub db_pool: Option<sqlx::PgPool>,
    /// 서버 시작 시간
    pub started_at: DateTime<Utc>,
    /// API 버전
    pub version: String,
}

impl AppState {
    /// 설정을 검증하고 상태를 구성합니다.
    pub fn new(
        config: AppConfig,
        credentials: Arc<dyn CredentialStore>,
        tokens: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
    ) -> ConfigResult<Self> {
        config.validate()?;
        let policy = Arc::new(PathPolicy::from_config(&config.access)?);

        let keys = Arc::new(JwtKeys::from_secret(&config.auth.jwt_secret));
        let settings = TokenSettings::from_config(&config.auth);
        let issuer = TokenIssuer::new(keys.clone(), tokens.clone(), clock.clone(), settings);
        let verifier = TokenVerifier::new(
            keys,
            credentials.clone(),
            tokens.clone(),
            clock.clone(),
            settings,
        );

        Ok(Self {
            config: Arc::new(config),
            policy,
            credentials,
            tokens,
            issuer,
            verifier,
            clock,
            db_pool: None,
            started_at: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }

    /// 인메모리 저장소로 상태를 구성합니다.
    pub fn in_memory(config: AppConfig, clock: Arc<dyn Clock>) -> ConfigResult<Self> {
        Self::new(
            config,
            Arc::new(InMemoryCredentialStore::new()),
            Arc::new(InMemoryTokenStore::new()),
            clock,
        )
    }

    /// 시스템 시계와 인메모리 저장소로 상태를 구성합니다.
    pub fn in_memory_with_system_clock(config: AppConfig) -> ConfigResult<Self> {
        Self::in_memory(config, Arc::new(SystemClock))
    }

    /// 데이터베이스 풀 설정 (헬스 체크용).
    pub fn with_db_pool(mut self, pool: sqlx::PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    pub fn authorizer(&self) -> Authorizer {
        Authorizer::new(self.policy.clone(), self.verifier.clone())
    }

    /// 요청 인터셉터 파이프라인.
    pub fn pipeline(&self) -> InterceptorPipeline {
        let authorization: Arc<dyn Interceptor> = Arc::new(AuthorizationStage::new(
            self.authorizer(),
            self.config.auth.session_cookie.clone(),
        ));
        InterceptorPipeline::new(vec![authorization])
    }

    /// 저장소 호출 타임아웃.
    pub fn store_timeout(&self) -> std::time::Duration {
        self.issuer.settings().store_timeout
    }

    /// 서버 업타임(초) 반환.
    pub fn uptime_secs(&self) -> i64 {
        Utc::now().signed_duration_since(self.started_at).num_seconds()
    }

    /// 데이터베이스 연결 상태 확인.
    pub async fn is_db_healthy(&self) -> bool {
        match &self.db_pool {
            Some(pool) => sqlx::query("SELECT 1").fetch_one(pool).await.is_ok(),
            None => false,
        }
    }
}

/// 테스트용 서명 키.
#[cfg(test)]
pub const TEST_SECRET: &str = "test-secret-key-that-is-at-least-32-bytes";

/// 테스트용 AppState 생성. 인메모리 저장소와 수동 시계를 사용합니다.
#[cfg(test)]
pub fn create_test_state() -> (AppState, Arc<crate::auth::ManualClock>) {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = TEST_SECRET.to_string();

    let clock = Arc::new(crate::auth::ManualClock::starting_now());
    let state = AppState::in_memory(config, clock.clone()).expect("valid test config");
    (state, clock)
}
