//! Repository pattern for database operations.
//!
//! 모든 Repository는 `&PgPool`을 받는 static methods 패턴을 사용하며,
//! `PgCredentialStore` / `PgTokenStore`가 이를 저장소 trait에 연결합니다.

pub mod tokens;
pub mod users;

pub use tokens::{PgTokenStore, TokenRepository};
pub use users::{PgCredentialStore, UserRecord, UserRepository};

use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;

use shop_core::DatabaseConfig;

use crate::auth::StoreError;

/// PostgreSQL unique_violation
const UNIQUE_VIOLATION: &str = "23505";

/// 연결 풀 생성.
pub async fn connect(url: &str, config: &DatabaseConfig) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.connection_timeout_secs))
        .connect(url)
        .await
}

/// `/migrations`의 스키마 마이그레이션 실행.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

/// sqlx 에러를 저장소 에러로 변환합니다.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            StoreError::DuplicateEmail
        }
        sqlx::Error::Decode(e) => StoreError::Corrupt(e.to_string()),
        sqlx::Error::ColumnDecode { index, source } => {
            StoreError::Corrupt(format!("column {}: {}", index, source))
        }
        other => StoreError::Unavailable(other.to_string()),
    }
}
