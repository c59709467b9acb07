//! JWT 토큰 처리.
//!
//! Access Token 및 Refresh Token 클레임과 HS256 서명/디코딩.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{AuthError, Identity, Role};

/// 검증 대상 토큰 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// 서명된 단기 토큰
    Access,
    /// 서명된 장기 토큰 (Access Token 재발급용)
    Refresh,
    /// 서버 측 조회가 필요한 무작위 세션 토큰
    Opaque,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
            TokenKind::Opaque => "opaque",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT Access Token 페이로드.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Subject - 신원 ID
    pub sub: String,
    pub email: String,
    /// 발급 시점의 역할. 인가 판단에는 저장소의 현재 역할이 쓰입니다.
    pub role: Role,
    /// 항상 `"access"`
    pub token_type: String,
    /// Issued At (Unix timestamp)
    pub iat: i64,
    /// 발급 시각 (Unix 밀리초). 자격증명 교체 기준 비교에 사용됩니다.
    #[serde(default)]
    pub iat_ms: i64,
    /// Expiration (Unix timestamp)
    pub exp: i64,
    /// JWT ID
    pub jti: String,
}

impl AccessClaims {
    pub fn new(identity: &Identity, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: identity.id.to_string(),
            email: identity.email.clone(),
            role: identity.role,
            token_type: TokenKind::Access.as_str().to_string(),
            iat: now.timestamp(),
            iat_ms: now.timestamp_millis(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn issued_at_ms(&self) -> i64 {
        issued_at_ms(self.iat, self.iat_ms)
    }
}

/// Refresh Token 페이로드.
///
/// `jti`는 로그아웃/폐기 시 블랙리스트 키로 사용됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshClaims {
    pub sub: String,
    /// 항상 `"refresh"`
    pub token_type: String,
    pub iat: i64,
    #[serde(default)]
    pub iat_ms: i64,
    pub exp: i64,
    pub jti: String,
}

impl RefreshClaims {
    pub fn new(identity_id: Uuid, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            sub: identity_id.to_string(),
            token_type: TokenKind::Refresh.as_str().to_string(),
            iat: now.timestamp(),
            iat_ms: now.timestamp_millis(),
            exp: (now + ttl).timestamp(),
            jti: Uuid::new_v4().simple().to_string(),
        }
    }

    pub fn issued_at_ms(&self) -> i64 {
        issued_at_ms(self.iat, self.iat_ms)
    }
}

/// `iat_ms`가 없는 토큰은 `iat`의 초 단위 시각으로 대체합니다.
fn issued_at_ms(iat: i64, iat_ms: i64) -> i64 {
    if iat_ms > 0 {
        iat_ms
    } else {
        iat.saturating_mul(1000)
    }
}

/// HS256 서명/검증 키.
///
/// 만료는 주입된 시계로 직접 판정하므로 라이브러리의 `exp` 검사는 끕니다.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtKeys").finish_non_exhaustive()
    }
}

impl JwtKeys {
    pub fn from_secret(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// 클레임을 HS256으로 서명합니다.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, jsonwebtoken::errors::Error> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
    }

    /// 서명과 필수 클레임만 검사하고 페이로드를 돌려줍니다.
    pub fn decode(&self, token: &str) -> Result<serde_json::Value, AuthError> {
        decode::<serde_json::Value>(token, &self.decoding, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => {
                    AuthError::InvalidSignature
                }
                _ => AuthError::MalformedToken,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "unit-test-secret-with-at-least-32-bytes!";

    fn identity() -> Identity {
        Identity::new("buyer@example.com", "Ada", "Lovelace", Role::Customer)
    }

    #[test]
    fn test_access_claims_round_trip() {
        let keys = JwtKeys::from_secret(SECRET);
        let now = Utc::now();
        let claims = AccessClaims::new(&identity(), now, Duration::minutes(60));

        let token = keys.sign(&claims).unwrap();
        let payload = keys.decode(&token).unwrap();
        let decoded: AccessClaims = serde_json::from_value(payload).unwrap();

        assert_eq!(decoded, claims);
        assert_eq!(decoded.exp - decoded.iat, 3600);
        assert_eq!(decoded.token_type, "access");
        assert_eq!(decoded.issued_at_ms(), now.timestamp_millis());
    }

    #[test]
    fn test_issued_at_ms_falls_back_to_seconds() {
        let payload = serde_json::json!({
            "sub": Uuid::new_v4().to_string(),
            "token_type": "refresh",
            "iat": 1_700_000_000,
            "exp": 1_700_000_600,
            "jti": "abc",
        });
        let claims: RefreshClaims = serde_json::from_value(payload).unwrap();
        assert_eq!(claims.iat_ms, 0);
        assert_eq!(claims.issued_at_ms(), 1_700_000_000_000);
    }

    #[test]
    fn test_expired_token_still_decodes() {
        let keys = JwtKeys::from_secret(SECRET);
        let long_ago = Utc::now() - Duration::days(30);
        let claims = RefreshClaims::new(Uuid::new_v4(), long_ago, Duration::days(7));

        let token = keys.sign(&claims).unwrap();
        assert!(keys.decode(&token).is_ok());
    }

    #[test]
    fn test_wrong_secret_is_invalid_signature() {
        let keys = JwtKeys::from_secret(SECRET);
        let other = JwtKeys::from_secret("another-secret-that-is-also-32-bytes-long");
        let token = other
            .sign(&AccessClaims::new(&identity(), Utc::now(), Duration::minutes(5)))
            .unwrap();

        assert_eq!(keys.decode(&token).unwrap_err(), AuthError::InvalidSignature);
    }

    #[test]
    fn test_other_algorithm_is_rejected() {
        let keys = JwtKeys::from_secret(SECRET);
        let claims = AccessClaims::new(&identity(), Utc::now(), Duration::minutes(5));
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();

        assert_eq!(keys.decode(&token).unwrap_err(), AuthError::InvalidSignature);
    }

    #[test]
    fn test_garbage_is_malformed() {
        let keys = JwtKeys::from_secret(SECRET);
        assert_eq!(keys.decode("not-a-jwt").unwrap_err(), AuthError::MalformedToken);
        assert_eq!(keys.decode("").unwrap_err(), AuthError::MalformedToken);
    }

    #[test]
    fn test_missing_exp_is_malformed() {
        let keys = JwtKeys::from_secret(SECRET);
        let token = keys
            .sign(&serde_json::json!({ "sub": "someone", "token_type": "access" }))
            .unwrap();

        assert_eq!(keys.decode(&token).unwrap_err(), AuthError::MalformedToken);
    }
}
