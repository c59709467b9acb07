//! 토큰 발급.

use chrono::{DateTime, Duration, Utc};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use shop_core::AuthConfig;

use super::clock::Clock;
use super::jwt::{AccessClaims, JwtKeys, RefreshClaims};
use super::store::{bounded, StoreError, TokenStore};
use super::Identity;

/// 세션 토큰 원본 바이트 수 (160비트).
pub const SESSION_TOKEN_BYTES: usize = 20;

/// 인증 성공 시 발급되는 토큰 묶음.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    /// 불투명 세션 토큰 (서버에 저장됨)
    pub session_token: String,
    /// Access Token
    pub access_token: String,
    /// Refresh Token
    pub refresh_token: String,
    /// Access Token 만료까지 남은 시간 (초)
    pub access_expires_in: i64,
    /// 항상 "Bearer"
    pub token_type: String,
}

/// 토큰 수명과 저장소 호출 제한.
#[derive(Debug, Clone, Copy)]
pub struct TokenSettings {
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    /// 만료 판정 시 허용 오차 (초)
    pub leeway_secs: i64,
    pub store_timeout: std::time::Duration,
}

impl TokenSettings {
    pub fn from_config(auth: &AuthConfig) -> Self {
        Self {
            access_ttl: Duration::minutes(auth.access_token_ttl_minutes),
            refresh_ttl: Duration::days(auth.refresh_token_ttl_days),
            leeway_secs: auth.leeway_secs as i64,
            store_timeout: std::time::Duration::from_millis(auth.store_timeout_ms),
        }
    }
}

/// 토큰 발급 에러.
#[derive(Debug, thiserror::Error)]
pub enum IssueError {
    #[error("토큰 서명 실패: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("세션 토큰 저장 실패: {0}")]
    Store(#[from] StoreError),
}

/// 검증된 신원에 대해 토큰 쌍을 발급합니다.
#[derive(Clone)]
pub struct TokenIssuer {
    keys: Arc<JwtKeys>,
    tokens: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    settings: TokenSettings,
}

impl TokenIssuer {
    pub fn new(
        keys: Arc<JwtKeys>,
        tokens: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
        settings: TokenSettings,
    ) -> Self {
        Self {
            keys,
            tokens,
            clock,
            settings,
        }
    }

    pub fn settings(&self) -> &TokenSettings {
        &self.settings
    }

    /// 세션 토큰(기존 것이 있으면 재사용)과 새 access/refresh 토큰을 발급합니다.
    pub async fn issue(&self, identity: &Identity) -> Result<TokenPair, IssueError> {
        let session_token = bounded(
            self.settings.store_timeout,
            self.tokens
                .get_or_create_session(identity.id, generate_session_token()),
        )
        .await?;

        let now = self.clock.now();
        let access_token = self.sign_access(identity, now)?;
        let refresh_token = self.sign_refresh(identity.id, now)?;

        info!(identity_id = %identity.id, role = %identity.role, "Token pair issued");

        Ok(TokenPair {
            session_token,
            access_token,
            refresh_token,
            access_expires_in: self.settings.access_ttl.num_seconds(),
            token_type: "Bearer".to_string(),
        })
    }

    /// Access Token만 새로 발급합니다 (refresh 흐름).
    pub fn mint_access(&self, identity: &Identity) -> Result<String, IssueError> {
        let token = self.sign_access(identity, self.clock.now())?;
        debug!(identity_id = %identity.id, "Access token minted");
        Ok(token)
    }

    /// Refresh Token만 새로 발급합니다.
    pub fn mint_refresh(&self, identity_id: Uuid) -> Result<String, IssueError> {
        self.sign_refresh(identity_id, self.clock.now())
    }

    fn sign_access(&self, identity: &Identity, now: DateTime<Utc>) -> Result<String, IssueError> {
        let claims = AccessClaims::new(identity, now, self.settings.access_ttl);
        Ok(self.keys.sign(&claims)?)
    }

    fn sign_refresh(&self, identity_id: Uuid, now: DateTime<Utc>) -> Result<String, IssueError> {
        let claims = RefreshClaims::new(identity_id, now, self.settings.refresh_ttl);
        Ok(self.keys.sign(&claims)?)
    }
}

/// OS 난수로 160비트 세션 토큰을 만들어 16진수(40자)로 인코딩합니다.
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
