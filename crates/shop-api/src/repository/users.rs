//! User Repository
//!
//! 신원 레코드와 비밀번호 해시를 저장합니다. 이메일은 소문자로 정규화되어 저장됩니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use super::map_sqlx_error;
use crate::auth::{normalize_email, CredentialStore, Identity, Role, StoreError, StoredCredential};

// ================================================================================================
// Types
// ================================================================================================

/// users 테이블 레코드
#[derive(Debug, Clone, FromRow)]
pub struct UserRecord {
    pub id: Uuid,
    pub public_user_id: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub role: String,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl UserRecord {
    /// 역할 문자열이 알 수 없는 값이면 손상된 레코드입니다.
    pub fn into_credential(self) -> Result<StoredCredential, StoreError> {
        let role = Role::parse(&self.role).ok_or_else(|| {
            StoreError::Corrupt(format!("user {} has unknown role '{}'", self.id, self.role))
        })?;

        Ok(StoredCredential {
            identity: Identity {
                id: self.id,
                public_user_id: self.public_user_id,
                email: self.email,
                first_name: self.first_name,
                last_name: self.last_name,
                role,
                is_active: self.is_active,
                is_email_verified: self.is_email_verified,
                created_at: self.created_at,
            },
            password_hash: self.password_hash,
        })
    }
}

// ================================================================================================
// Repository
// ================================================================================================

/// User Repository
pub struct UserRepository;

impl UserRepository {
    /// 사용자 생성
    pub async fn insert(
        pool: &PgPool,
        identity: &Identity,
        password_hash: &str,
    ) -> Result<UserRecord, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>(
            r#"
            INSERT INTO users (
                id, public_user_id, email, password_hash, first_name, last_name,
                role, is_active, is_email_verified, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id, public_user_id, email, password_hash, first_name, last_name,
                      role, is_active, is_email_verified, created_at
            "#,
        )
        .bind(identity.id)
        .bind(&identity.public_user_id)
        .bind(normalize_email(&identity.email))
        .bind(password_hash)
        .bind(&identity.first_name)
        .bind(&identity.last_name)
        .bind(identity.role.as_str())
        .bind(identity.is_active)
        .bind(identity.is_email_verified)
        .bind(identity.created_at)
        .fetch_one(pool)
        .await
    }

    /// ID로 조회
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<UserRecord>, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, public_user_id, email, password_hash, first_name, last_name,
                   role, is_active, is_email_verified, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(pool)
        .await
    }

    /// 이메일로 조회 (정규화된 값으로 비교)
    pub async fn find_by_email(
        pool: &PgPool,
        email: &str,
    ) -> Result<Option<UserRecord>, sqlx::Error> {
        sqlx::query_as::<_, UserRecord>(
            r#"
            SELECT id, public_user_id, email, password_hash, first_name, last_name,
                   role, is_active, is_email_verified, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(normalize_email(email))
        .fetch_optional(pool)
        .await
    }

    /// 비밀번호 해시 변경
    pub async fn update_password(
        pool: &PgPool,
        id: Uuid,
        password_hash: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE users SET password_hash = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(password_hash)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// 활성 상태 변경 (소프트 비활성화)
    pub async fn set_active(pool: &PgPool, id: Uuid, active: bool) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE users SET is_active = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(active)
                .execute(pool)
                .await?;

        Ok(result.rows_affected() > 0)
    }

    pub async fn set_role(pool: &PgPool, id: Uuid, role: Role) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("UPDATE users SET role = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(role.as_str())
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

/// PostgreSQL 기반 [`CredentialStore`].
#[derive(Clone)]
pub struct PgCredentialStore {
    pool: PgPool,
}

impl PgCredentialStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for PgCredentialStore {
    async fn create(
        &self,
        identity: Identity,
        password_hash: String,
    ) -> Result<Identity, StoreError> {
        let record = UserRepository::insert(&self.pool, &identity, &password_hash)
            .await
            .map_err(map_sqlx_error)?;
        Ok(record.into_credential()?.identity)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        UserRepository::find_by_id(&self.pool, id)
            .await
            .map_err(map_sqlx_error)?
            .map(|record| record.into_credential().map(|c| c.identity))
            .transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<StoredCredential>, StoreError> {
        UserRepository::find_by_email(&self.pool, email)
            .await
            .map_err(map_sqlx_error)?
            .map(UserRecord::into_credential)
            .transpose()
    }

    async fn password_hash(&self, id: Uuid) -> Result<Option<String>, StoreError> {
        let hash = sqlx::query_scalar::<_, String>("SELECT password_hash FROM users WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        Ok(hash)
    }

    async fn update_password(&self, id: Uuid, password_hash: String) -> Result<(), StoreError> {
        let updated = UserRepository::update_password(&self.pool, id, &password_hash)
            .await
            .map_err(map_sqlx_error)?;
        if updated {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let updated = UserRepository::set_active(&self.pool, id, active)
            .await
            .map_err(map_sqlx_error)?;
        if updated {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<(), StoreError> {
        let updated = UserRepository::set_role(&self.pool, id, role)
            .await
            .map_err(map_sqlx_error)?;
        if updated {
            Ok(())
        } else {
            Err(StoreError::NotFound)
        }
    }
}
