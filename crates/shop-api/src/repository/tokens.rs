//! Token Repository
//!
//! 불투명 세션 토큰, refresh 토큰 블랙리스트, 신원별 토큰 폐기 기준 시각을 저장합니다.
//! 시각 컬럼은 JWT 클레임과 같은 Unix 초(BIGINT)입니다.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::map_sqlx_error;
use crate::auth::{StoreError, TokenStore};

/// Token Repository
pub struct TokenRepository;

impl TokenRepository {
    // ============================================================================================
    // Session tokens
    // ============================================================================================

    /// 신원당 하나의 세션 토큰. 이미 있으면 기존 값을 반환합니다.
    pub async fn upsert_session(
        pool: &PgPool,
        user_id: Uuid,
        candidate: &str,
    ) -> Result<String, sqlx::Error> {
        sqlx::query_scalar::<_, String>(
            r#"
            INSERT INTO session_tokens (key, user_id)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING key
            "#,
        )
        .bind(candidate)
        .bind(user_id)
        .fetch_one(pool)
        .await
    }

    pub async fn find_session_owner(
        pool: &PgPool,
        key: &str,
    ) -> Result<Option<Uuid>, sqlx::Error> {
        sqlx::query_scalar::<_, Uuid>("SELECT user_id FROM session_tokens WHERE key = $1")
            .bind(key)
            .fetch_optional(pool)
            .await
    }

    pub async fn delete_session(pool: &PgPool, user_id: Uuid) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM session_tokens WHERE user_id = $1")
            .bind(user_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ============================================================================================
    // Refresh token blacklist
    // ============================================================================================

    /// 이미 등록된 jti는 그대로 둡니다.
    pub async fn insert_blacklist(
        pool: &PgPool,
        jti: &str,
        user_id: Uuid,
        expires_at: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO refresh_token_blacklist (jti, user_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (jti) DO NOTHING
            "#,
        )
        .bind(jti)
        .bind(user_id)
        .bind(expires_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn is_blacklisted(pool: &PgPool, jti: &str) -> Result<bool, sqlx::Error> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM refresh_token_blacklist WHERE jti = $1)",
        )
        .bind(jti)
        .fetch_one(pool)
        .await
    }

    /// 만료 시각이 `now` 이하인 항목 삭제.
    pub async fn purge_blacklist(pool: &PgPool, now: i64) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("DELETE FROM refresh_token_blacklist WHERE expires_at <= $1")
            .bind(now)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ============================================================================================
    // Revocation cutoffs
    // ============================================================================================

    /// 기준 시각(Unix 밀리초)은 앞으로만 이동합니다.
    pub async fn upsert_cutoff(
        pool: &PgPool,
        user_id: Uuid,
        cutoff_ms: i64,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO token_revocation_cutoffs (user_id, revoked_before_ms)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET revoked_before_ms = GREATEST(token_revocation_cutoffs.revoked_before_ms, EXCLUDED.revoked_before_ms)
            "#,
        )
        .bind(user_id)
        .bind(cutoff_ms)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_cutoff(pool: &PgPool, user_id: Uuid) -> Result<Option<i64>, sqlx::Error> {
        sqlx::query_scalar::<_, i64>(
            "SELECT revoked_before_ms FROM token_revocation_cutoffs WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(pool)
        .await
    }
}

/// PostgreSQL 기반 [`TokenStore`].
#[derive(Clone)]
pub struct PgTokenStore {
    pool: PgPool,
}

impl PgTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TokenStore for PgTokenStore {
    async fn get_or_create_session(
        &self,
        identity_id: Uuid,
        candidate: String,
    ) -> Result<String, StoreError> {
        TokenRepository::upsert_session(&self.pool, identity_id, &candidate)
            .await
            .map_err(map_sqlx_error)
    }

    async fn resolve_session(&self, token: &str) -> Result<Option<Uuid>, StoreError> {
        TokenRepository::find_session_owner(&self.pool, token)
            .await
            .map_err(map_sqlx_error)
    }

    async fn delete_session(&self, identity_id: Uuid) -> Result<(), StoreError> {
        TokenRepository::delete_session(&self.pool, identity_id)
            .await
            .map(|_| ())
            .map_err(map_sqlx_error)
    }

    async fn blacklist(
        &self,
        jti: &str,
        identity_id: Uuid,
        expires_at: i64,
    ) -> Result<(), StoreError> {
        TokenRepository::insert_blacklist(&self.pool, jti, identity_id, expires_at)
            .await
            .map_err(map_sqlx_error)
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool, StoreError> {
        TokenRepository::is_blacklisted(&self.pool, jti)
            .await
            .map_err(map_sqlx_error)
    }

    async fn set_revocation_cutoff(
        &self,
        identity_id: Uuid,
        cutoff_ms: i64,
    ) -> Result<(), StoreError> {
        TokenRepository::upsert_cutoff(&self.pool, identity_id, cutoff_ms)
            .await
            .map_err(map_sqlx_error)
    }

    async fn revocation_cutoff(&self, identity_id: Uuid) -> Result<Option<i64>, StoreError> {
        TokenRepository::find_cutoff(&self.pool, identity_id)
            .await
            .map_err(map_sqlx_error)
    }

    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        TokenRepository::purge_blacklist(&self.pool, now)
            .await
            .map_err(map_sqlx_error)
    }
}
