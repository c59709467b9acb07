//! 자격증명 저장소와 토큰 저장소.
//!
//! 두 저장소 모두 trait으로 추상화되어 있으며, 인메모리 구현(테스트/DB 미설정 시)과
//! PostgreSQL 구현([`crate::repository`])이 있습니다.

use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::identity::normalize_email;
use super::{Identity, Role};

/// 저장소 에러.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// 저장소에 도달할 수 없음 (연결 실패, 타임아웃)
    #[error("저장소에 연결할 수 없습니다: {0}")]
    Unavailable(String),
    /// 이미 사용 중인 이메일
    #[error("이미 등록된 이메일입니다")]
    DuplicateEmail,
    /// 대상 레코드 없음
    #[error("레코드를 찾을 수 없습니다")]
    NotFound,
    /// 저장된 데이터가 도메인 불변식을 위반함
    #[error("저장된 데이터가 손상되었습니다: {0}")]
    Corrupt(String),
}

/// 신원과 비밀번호 해시.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub identity: Identity,
    pub password_hash: String,
}

/// 신원 레코드 저장소.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// 새 신원을 저장합니다. 이메일이 중복되면 [`StoreError::DuplicateEmail`].
    async fn create(&self, identity: Identity, password_hash: String)
        -> Result<Identity, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError>;

    /// 이메일로 자격증명 조회 (대소문자 무시).
    async fn find_by_email(&self, email: &str) -> Result<Option<StoredCredential>, StoreError>;

    async fn password_hash(&self, id: Uuid) -> Result<Option<String>, StoreError>;

    async fn update_password(&self, id: Uuid, password_hash: String) -> Result<(), StoreError>;

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError>;

    /// 역할 변경 (관리자 전용). 다음 검증부터 새 역할이 적용됩니다.
    async fn set_role(&self, id: Uuid, role: Role) -> Result<(), StoreError>;
}

/// 불투명 세션 토큰, refresh 블랙리스트, 자격증명 교체 기준 시각 저장소.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// 신원의 세션 토큰을 반환합니다. 없으면 `candidate`를 저장하고 반환합니다.
    async fn get_or_create_session(
        &self,
        identity_id: Uuid,
        candidate: String,
    ) -> Result<String, StoreError>;

    async fn resolve_session(&self, token: &str) -> Result<Option<Uuid>, StoreError>;

    async fn delete_session(&self, identity_id: Uuid) -> Result<(), StoreError>;

    /// refresh 토큰 `jti`를 `expires_at`(Unix 초)까지 블랙리스트에 올립니다.
    async fn blacklist(
        &self,
        jti: &str,
        identity_id: Uuid,
        expires_at: i64,
    ) -> Result<(), StoreError>;

    async fn is_blacklisted(&self, jti: &str) -> Result<bool, StoreError>;

    /// 이 시각(Unix 밀리초) 이하에 발급된 서명 토큰은 모두 폐기된 것으로 간주됩니다.
    async fn set_revocation_cutoff(&self, identity_id: Uuid, cutoff_ms: i64)
        -> Result<(), StoreError>;

    async fn revocation_cutoff(&self, identity_id: Uuid) -> Result<Option<i64>, StoreError>;

    /// 만료된 블랙리스트 항목을 삭제하고 삭제 수를 반환합니다.
    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError>;
}

/// 저장소 호출에 상한 시간을 적용합니다. 시간 초과는 `Unavailable`입니다.
pub async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(timeout, fut)
        .await
        .map_err(|_| StoreError::Unavailable(format!("timed out after {:?}", timeout)))?
}

// ================================================================================================
// In-memory implementations
// ================================================================================================

#[derive(Default)]
struct CredentialTable {
    by_id: HashMap<Uuid, StoredCredential>,
    by_email: HashMap<String, Uuid>,
}

/// 인메모리 자격증명 저장소.
#[derive(Default)]
pub struct InMemoryCredentialStore {
    table: RwLock<CredentialTable>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn create(
        &self,
        mut identity: Identity,
        password_hash: String,
    ) -> Result<Identity, StoreError> {
        identity.email = normalize_email(&identity.email);

        let mut table = self.table.write().await;
        if table.by_email.contains_key(&identity.email) {
            return Err(StoreError::DuplicateEmail);
        }
        table.by_email.insert(identity.email.clone(), identity.id);
        table.by_id.insert(
            identity.id,
            StoredCredential {
                identity: identity.clone(),
                password_hash,
            },
        );
        Ok(identity)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Identity>, StoreError> {
        let table = self.table.read().await;
        Ok(table.by_id.get(&id).map(|c| c.identity.clone()))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<StoredCredential>, StoreError> {
        let table = self.table.read().await;
        Ok(table
            .by_email
            .get(&normalize_email(email))
            .and_then(|id| table.by_id.get(id))
            .cloned())
    }

    async fn password_hash(&self, id: Uuid) -> Result<Option<String>, StoreError> {
        let table = self.table.read().await;
        Ok(table.by_id.get(&id).map(|c| c.password_hash.clone()))
    }

    async fn update_password(&self, id: Uuid, password_hash: String) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        let credential = table.by_id.get_mut(&id).ok_or(StoreError::NotFound)?;
        credential.password_hash = password_hash;
        Ok(())
    }

    async fn set_active(&self, id: Uuid, active: bool) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        let credential = table.by_id.get_mut(&id).ok_or(StoreError::NotFound)?;
        credential.identity.is_active = active;
        Ok(())
    }

    async fn set_role(&self, id: Uuid, role: Role) -> Result<(), StoreError> {
        let mut table = self.table.write().await;
        let credential = table.by_id.get_mut(&id).ok_or(StoreError::NotFound)?;
        credential.identity.role = role;
        Ok(())
    }
}

#[derive(Default)]
struct TokenTables {
    sessions_by_token: HashMap<String, Uuid>,
    sessions_by_identity: HashMap<Uuid, String>,
    /// jti → (identity, expires_at)
    blacklist: HashMap<String, (Uuid, i64)>,
    /// identity → 폐기 기준 시각 (Unix 밀리초)
    cutoffs: HashMap<Uuid, i64>,
}

/// 인메모리 토큰 저장소.
#[derive(Default)]
pub struct InMemoryTokenStore {
    tables: RwLock<TokenTables>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 블랙리스트 항목 수.
    pub async fn blacklist_len(&self) -> usize {
        self.tables.read().await.blacklist.len()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn get_or_create_session(
        &self,
        identity_id: Uuid,
        candidate: String,
    ) -> Result<String, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.sessions_by_identity.get(&identity_id) {
            return Ok(existing.clone());
        }
        tables
            .sessions_by_token
            .insert(candidate.clone(), identity_id);
        tables
            .sessions_by_identity
            .insert(identity_id, candidate.clone());
        Ok(candidate)
    }

    async fn resolve_session(&self, token: &str) -> Result<Option<Uuid>, StoreError> {
        Ok(self.tables.read().await.sessions_by_token.get(token).copied())
    }

    async fn delete_session(&self, identity_id: Uuid) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(token) = tables.sessions_by_identity.remove(&identity_id) {
            tables.sessions_by_token.remove(&token);
        }
        Ok(())
    }

    async fn blacklist(
        &self,
        jti: &str,
        identity_id: Uuid,
        expires_at: i64,
    ) -> Result<(), StoreError> {
        self.tables
            .write()
            .await
            .blacklist
            .insert(jti.to_string(), (identity_id, expires_at));
        Ok(())
    }

    async fn is_blacklisted(&self, jti: &str) -> Result<bool, StoreError> {
        Ok(self.tables.read().await.blacklist.contains_key(jti))
    }

    async fn set_revocation_cutoff(
        &self,
        identity_id: Uuid,
        cutoff_ms: i64,
    ) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let entry = tables.cutoffs.entry(identity_id).or_insert(cutoff_ms);
        // 기준 시각은 뒤로 가지 않음
        *entry = (*entry).max(cutoff_ms);
        Ok(())
    }

    async fn revocation_cutoff(&self, identity_id: Uuid) -> Result<Option<i64>, StoreError> {
        Ok(self.tables.read().await.cutoffs.get(&identity_id).copied())
    }

    async fn purge_expired(&self, now: i64) -> Result<u64, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.blacklist.len();
        tables.blacklist.retain(|_, (_, expires_at)| *expires_at > now);
        Ok((before - tables.blacklist.len()) as u64)
    }
}
