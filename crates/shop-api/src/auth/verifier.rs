//! 토큰 검증과 폐기.
//!
//! 검증 순서: 서명/형식 → 종류 → 만료 → 블랙리스트/교체 기준 시각 → 신원 재조회.
//! 신원은 항상 저장소에서 다시 읽으며, 저장된 역할과 활성 상태가 클레임보다 우선합니다.

use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::clock::Clock;
use super::issuer::TokenSettings;
use super::jwt::{AccessClaims, JwtKeys, RefreshClaims, TokenKind};
use super::store::{bounded, CredentialStore, TokenStore};
use super::{AuthError, Identity};
use crate::metrics::record_token_verification;

/// [`TokenVerifier::revoke`] 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revocation {
    /// 블랙리스트에 등록됨
    Revoked,
    /// 이미 만료되어 등록하지 않음
    AlreadyExpired,
    /// 다른 신원의 토큰. 아무 것도 기록하지 않음
    NotOwner,
}

/// 제시된 토큰에서 신원을 복원합니다.
#[derive(Clone)]
pub struct TokenVerifier {
    keys: Arc<JwtKeys>,
    credentials: Arc<dyn CredentialStore>,
    tokens: Arc<dyn TokenStore>,
    clock: Arc<dyn Clock>,
    settings: TokenSettings,
}

impl TokenVerifier {
    pub fn new(
        keys: Arc<JwtKeys>,
        credentials: Arc<dyn CredentialStore>,
        tokens: Arc<dyn TokenStore>,
        clock: Arc<dyn Clock>,
        settings: TokenSettings,
    ) -> Self {
        Self {
            keys,
            credentials,
            tokens,
            clock,
            settings,
        }
    }

    /// 토큰을 검증하고 현재 신원을 반환합니다.
    pub async fn verify(&self, presented: &str, kind: TokenKind) -> Result<Identity, AuthError> {
        let started = Instant::now();
        let result = match kind {
            TokenKind::Access => self.verify_access(presented).await,
            TokenKind::Refresh => self.verify_refresh(presented).await,
            TokenKind::Opaque => self.verify_opaque(presented).await,
        };

        let elapsed = started.elapsed().as_secs_f64();
        match &result {
            Ok(identity) => {
                record_token_verification(kind, "ok", elapsed);
                debug!(kind = %kind, identity_id = %identity.id, "Token verified");
            }
            Err(AuthError::StoreUnavailable(detail)) => {
                record_token_verification(kind, "store_unavailable", elapsed);
                error!(kind = %kind, error = %detail, "Token store unavailable during verification");
            }
            Err(e) => {
                record_token_verification(kind, e.reason(), elapsed);
                debug!(kind = %kind, reason = e.reason(), "Token rejected");
            }
        }
        result
    }

    /// `owner`의 refresh 토큰 `jti`를 만료 시각까지 블랙리스트에 올립니다.
    ///
    /// 주체가 `owner`가 아니면 저장소를 건드리지 않고 [`Revocation::NotOwner`]를 돌려줍니다.
    /// 이미 만료된 토큰은 기록 없이 성공합니다.
    pub async fn revoke(&self, refresh_token: &str, owner: Uuid) -> Result<Revocation, AuthError> {
        let claims: RefreshClaims = self.decode_claims(refresh_token, TokenKind::Refresh)?;
        let identity_id = parse_subject(&claims.sub)?;

        if identity_id != owner {
            return Ok(Revocation::NotOwner);
        }

        if self.check_expiry(claims.exp).is_err() {
            debug!(identity_id = %identity_id, "Expired refresh token revocation ignored");
            return Ok(Revocation::AlreadyExpired);
        }

        bounded(
            self.settings.store_timeout,
            self.tokens.blacklist(&claims.jti, identity_id, claims.exp),
        )
        .await?;

        info!(identity_id = %identity_id, jti = %claims.jti, "Refresh token revoked");
        Ok(Revocation::Revoked)
    }

    /// 자격증명 교체: 세션 토큰을 지우고, 지금(밀리초 단위)까지 발급된 서명 토큰을 모두 무효화합니다.
    pub async fn revoke_all(&self, identity_id: Uuid) -> Result<(), AuthError> {
        let timeout = self.settings.store_timeout;
        bounded(timeout, self.tokens.delete_session(identity_id)).await?;
        bounded(
            timeout,
            self.tokens
                .set_revocation_cutoff(identity_id, self.clock.now().timestamp_millis()),
        )
        .await?;

        info!(identity_id = %identity_id, "All tokens revoked for identity");
        Ok(())
    }

    /// 세션 토큰만 삭제합니다 (로그아웃).
    pub async fn end_session(&self, identity_id: Uuid) -> Result<(), AuthError> {
        bounded(
            self.settings.store_timeout,
            self.tokens.delete_session(identity_id),
        )
        .await?;
        Ok(())
    }

    /// 만료된 블랙리스트 항목을 정리합니다.
    pub async fn purge_expired(&self) -> Result<u64, AuthError> {
        let purged = bounded(
            self.settings.store_timeout,
            self.tokens.purge_expired(self.clock.timestamp()),
        )
        .await?;
        Ok(purged)
    }

    async fn verify_access(&self, presented: &str) -> Result<Identity, AuthError> {
        let claims: AccessClaims = self.decode_claims(presented, TokenKind::Access)?;
        self.check_expiry(claims.exp)?;
        let identity_id = parse_subject(&claims.sub)?;
        self.check_cutoff(identity_id, claims.issued_at_ms()).await?;
        self.load_identity(identity_id).await
    }

    async fn verify_refresh(&self, presented: &str) -> Result<Identity, AuthError> {
        let claims: RefreshClaims = self.decode_claims(presented, TokenKind::Refresh)?;
        self.check_expiry(claims.exp)?;
        let identity_id = parse_subject(&claims.sub)?;

        let blacklisted = bounded(
            self.settings.store_timeout,
            self.tokens.is_blacklisted(&claims.jti),
        )
        .await?;
        if blacklisted {
            return Err(AuthError::RevokedToken);
        }

        self.check_cutoff(identity_id, claims.issued_at_ms()).await?;
        self.load_identity(identity_id).await
    }

    async fn verify_opaque(&self, presented: &str) -> Result<Identity, AuthError> {
        if presented.is_empty() {
            return Err(AuthError::MalformedToken);
        }
        let identity_id = bounded(
            self.settings.store_timeout,
            self.tokens.resolve_session(presented),
        )
        .await?
        .ok_or(AuthError::UnknownToken)?;

        self.load_identity(identity_id).await
    }

    fn decode_claims<T: DeserializeOwned>(
        &self,
        presented: &str,
        kind: TokenKind,
    ) -> Result<T, AuthError> {
        let payload = self.keys.decode(presented)?;

        let token_type = payload.get("token_type").and_then(|v| v.as_str());
        if token_type != Some(kind.as_str()) {
            return Err(AuthError::MalformedToken);
        }

        serde_json::from_value(payload).map_err(|_| AuthError::MalformedToken)
    }

    /// `now < exp + leeway`여야 유효합니다.
    fn check_expiry(&self, exp: i64) -> Result<(), AuthError> {
        if self.clock.timestamp() >= exp.saturating_add(self.settings.leeway_secs) {
            return Err(AuthError::ExpiredToken);
        }
        Ok(())
    }

    /// 기준 시각과 같은 밀리초에 발급된 토큰도 폐기된 것으로 봅니다.
    async fn check_cutoff(&self, identity_id: Uuid, issued_at_ms: i64) -> Result<(), AuthError> {
        let cutoff = bounded(
            self.settings.store_timeout,
            self.tokens.revocation_cutoff(identity_id),
        )
        .await?;

        match cutoff {
            Some(cutoff_ms) if issued_at_ms <= cutoff_ms => Err(AuthError::RevokedToken),
            _ => Ok(()),
        }
    }

    async fn load_identity(&self, identity_id: Uuid) -> Result<Identity, AuthError> {
        let identity = bounded(
            self.settings.store_timeout,
            self.credentials.find_by_id(identity_id),
        )
        .await?
        .ok_or(AuthError::UnknownToken)?;

        if !identity.is_active {
            return Err(AuthError::InactiveIdentity);
        }
        Ok(identity)
    }
}

fn parse_subject(sub: &str) -> Result<Uuid, AuthError> {
    Uuid::parse_str(sub).map_err(|_| AuthError::MalformedToken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::clock::ManualClock;
    use crate::auth::issuer::TokenIssuer;
    use crate::auth::store::{InMemoryCredentialStore, InMemoryTokenStore};
    use crate::auth::Role;
    use chrono::Duration;

    const SECRET: &str = "unit-test-secret-with-at-least-32-bytes!";

    struct Harness {
        issuer: TokenIssuer,
        verifier: TokenVerifier,
        credentials: Arc<InMemoryCredentialStore>,
        tokens: Arc<InMemoryTokenStore>,
        clock: Arc<ManualClock>,
    }

    fn harness() -> Harness {
        let keys = Arc::new(JwtKeys::from_secret(SECRET));
        let credentials = Arc::new(InMemoryCredentialStore::new());
        let tokens = Arc::new(InMemoryTokenStore::new());
        let clock = Arc::new(ManualClock::starting_now());
        let settings = TokenSettings {
            access_ttl: Duration::minutes(60),
            refresh_ttl: Duration::days(7),
            leeway_secs: 30,
            store_timeout: std::time::Duration::from_secs(1),
        };

        Harness {
            issuer: TokenIssuer::new(keys.clone(), tokens.clone(), clock.clone(), settings),
            verifier: TokenVerifier::new(
                keys,
                credentials.clone(),
                tokens.clone(),
                clock.clone(),
                settings,
            ),
            credentials,
            tokens,
            clock,
        }
    }

    async fn register(h: &Harness, role: Role) -> Identity {
        h.credentials
            .create(
                Identity::new("someone@example.com", "Some", "One", role),
                "hash".to_string(),
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_access_round_trip_then_expiry() {
        let h = harness();
        let identity = register(&h, Role::Seller).await;
        let pair = h.issuer.issue(&identity).await.unwrap();

        let verified = h
            .verifier
            .verify(&pair.access_token, TokenKind::Access)
            .await
            .unwrap();
        assert_eq!(verified.id, identity.id);
        assert_eq!(verified.role, Role::Seller);

        // TTL은 지났지만 leeway 안쪽
        h.clock.advance(Duration::minutes(60) + Duration::seconds(10));
        assert!(h
            .verifier
            .verify(&pair.access_token, TokenKind::Access)
            .await
            .is_ok());

        h.clock.advance(Duration::seconds(20));
        assert_eq!(
            h.verifier
                .verify(&pair.access_token, TokenKind::Access)
                .await
                .unwrap_err(),
            AuthError::ExpiredToken
        );
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_malformed() {
        let h = harness();
        let identity = register(&h, Role::Customer).await;
        let pair = h.issuer.issue(&identity).await.unwrap();

        assert_eq!(
            h.verifier
                .verify(&pair.refresh_token, TokenKind::Access)
                .await
                .unwrap_err(),
            AuthError::MalformedToken
        );
        assert_eq!(
            h.verifier
                .verify(&pair.access_token, TokenKind::Refresh)
                .await
                .unwrap_err(),
            AuthError::MalformedToken
        );
    }

    #[tokio::test]
    async fn test_revoked_refresh_token_is_terminal() {
        let h = harness();
        let identity = register(&h, Role::Customer).await;
        let pair = h.issuer.issue(&identity).await.unwrap();

        assert!(h
            .verifier
            .verify(&pair.refresh_token, TokenKind::Refresh)
            .await
            .is_ok());

        assert_eq!(
            h.verifier
                .revoke(&pair.refresh_token, identity.id)
                .await
                .unwrap(),
            Revocation::Revoked
        );
        assert_eq!(
            h.verifier
                .verify(&pair.refresh_token, TokenKind::Refresh)
                .await
                .unwrap_err(),
            AuthError::RevokedToken
        );
        // 두 번 폐기해도 에러가 아님
        assert!(h.verifier.revoke(&pair.refresh_token, identity.id).await.is_ok());
    }

    #[tokio::test]
    async fn test_revoke_with_foreign_refresh_writes_nothing() {
        let h = harness();
        let owner = register(&h, Role::Customer).await;
        let other = h
            .credentials
            .create(
                Identity::new("other@example.com", "Other", "One", Role::Customer),
                "hash".to_string(),
            )
            .await
            .unwrap();
        let pair = h.issuer.issue(&owner).await.unwrap();

        assert_eq!(
            h.verifier.revoke(&pair.refresh_token, other.id).await.unwrap(),
            Revocation::NotOwner
        );
        assert_eq!(h.tokens.blacklist_len().await, 0);
        assert!(h
            .verifier
            .verify(&pair.refresh_token, TokenKind::Refresh)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_revoking_expired_refresh_is_noop() {
        let h = harness();
        let identity = register(&h, Role::Customer).await;
        let pair = h.issuer.issue(&identity).await.unwrap();

        h.clock.advance(Duration::days(8));
        assert_eq!(
            h.verifier
                .revoke(&pair.refresh_token, identity.id)
                .await
                .unwrap(),
            Revocation::AlreadyExpired
        );
        assert_eq!(h.tokens.blacklist_len().await, 0);
    }

    #[tokio::test]
    async fn test_revoke_all_invalidates_earlier_tokens() {
        let h = harness();
        let identity = register(&h, Role::Customer).await;
        let pair = h.issuer.issue(&identity).await.unwrap();

        h.clock.advance(Duration::seconds(5));
        h.verifier.revoke_all(identity.id).await.unwrap();

        for (token, kind) in [
            (&pair.access_token, TokenKind::Access),
            (&pair.refresh_token, TokenKind::Refresh),
        ] {
            assert_eq!(
                h.verifier.verify(token, kind).await.unwrap_err(),
                AuthError::RevokedToken
            );
        }
        assert_eq!(
            h.verifier
                .verify(&pair.session_token, TokenKind::Opaque)
                .await
                .unwrap_err(),
            AuthError::UnknownToken
        );

        // 교체 이후 발급된 토큰은 유효
        h.clock.advance(Duration::seconds(1));
        let fresh = h.issuer.issue(&identity).await.unwrap();
        assert!(h
            .verifier
            .verify(&fresh.access_token, TokenKind::Access)
            .await
            .is_ok());
        assert_ne!(fresh.session_token, pair.session_token);
    }

    #[tokio::test]
    async fn test_revoke_all_covers_tokens_from_the_same_instant() {
        let h = harness();
        let identity = register(&h, Role::Customer).await;
        let pair = h.issuer.issue(&identity).await.unwrap();

        h.verifier.revoke_all(identity.id).await.unwrap();

        for (token, kind) in [
            (&pair.access_token, TokenKind::Access),
            (&pair.refresh_token, TokenKind::Refresh),
        ] {
            assert_eq!(
                h.verifier.verify(token, kind).await.unwrap_err(),
                AuthError::RevokedToken
            );
        }

        h.clock.advance(Duration::milliseconds(1));
        let fresh = h.issuer.issue(&identity).await.unwrap();
        assert!(h
            .verifier
            .verify(&fresh.refresh_token, TokenKind::Refresh)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_inactive_identity_is_rejected() {
        let h = harness();
        let identity = register(&h, Role::Admin).await;
        let pair = h.issuer.issue(&identity).await.unwrap();

        h.credentials.set_active(identity.id, false).await.unwrap();

        for (token, kind) in [
            (&pair.access_token, TokenKind::Access),
            (&pair.session_token, TokenKind::Opaque),
        ] {
            assert_eq!(
                h.verifier.verify(token, kind).await.unwrap_err(),
                AuthError::InactiveIdentity
            );
        }
    }

    #[tokio::test]
    async fn test_role_is_reread_from_store() {
        let h = harness();
        let identity = register(&h, Role::Customer).await;
        let pair = h.issuer.issue(&identity).await.unwrap();

        h.credentials
            .set_role(identity.id, Role::Seller)
            .await
            .unwrap();

        for (token, kind) in [
            (&pair.access_token, TokenKind::Access),
            (&pair.refresh_token, TokenKind::Refresh),
            (&pair.session_token, TokenKind::Opaque),
        ] {
            let verified = h.verifier.verify(token, kind).await.unwrap();
            assert_eq!(verified.id, identity.id);
            assert_eq!(verified.role, Role::Seller);
        }
    }

    #[tokio::test]
    async fn test_unknown_opaque_token() {
        let h = harness();
        assert_eq!(
            h.verifier
                .verify("0000000000000000000000000000000000000000", TokenKind::Opaque)
                .await
                .unwrap_err(),
            AuthError::UnknownToken
        );
    }

    #[tokio::test]
    async fn test_purge_drops_expired_blacklist_entries() {
        let h = harness();
        let identity = register(&h, Role::Customer).await;
        let pair = h.issuer.issue(&identity).await.unwrap();
        h.verifier
            .revoke(&pair.refresh_token, identity.id)
            .await
            .unwrap();

        assert_eq!(h.verifier.purge_expired().await.unwrap(), 0);
        h.clock.advance(Duration::days(8));
        assert_eq!(h.verifier.purge_expired().await.unwrap(), 1);
    }
}
