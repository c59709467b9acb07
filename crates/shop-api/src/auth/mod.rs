//! 인증 및 권한 부여.
//!
//! # 구성 요소
//!
//! - [`CredentialStore`] / [`TokenStore`]: 신원과 토큰 상태 저장소
//! - [`TokenIssuer`]: 세션 토큰 + access/refresh 토큰 발급
//! - [`TokenVerifier`]: 토큰 검증, 폐기, 자격증명 교체
//! - [`PathPolicy`]: 경로 → 공개/역할 규칙 분류
//! - [`CurrentIdentity`]: 핸들러용 신원 추출기
//!
//! 요청 단위 인가 판정은 [`crate::middleware`]에 있습니다.

pub mod clock;
mod error;
mod extractor;
mod identity;
mod issuer;
mod jwt;
mod password;
mod policy;
mod roles;
pub mod store;
mod verifier;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{AuthError, Rejection};
pub use extractor::{AuthenticatedIdentity, CredentialSource, CurrentIdentity};
pub use identity::{generate_public_user_id, normalize_email, Identity};
pub use issuer::{generate_session_token, IssueError, TokenIssuer, TokenPair, TokenSettings};
pub use jwt::{AccessClaims, JwtKeys, RefreshClaims, TokenKind};
pub use password::{
    hash_password, hash_password_blocking, validate_password_strength, verify_password,
    verify_password_blocking, PasswordError,
};
pub use policy::{canonicalize_path, PathClass, PathPolicy, PathRule};
pub use roles::{Role, RoleSet, UnknownRole};
pub use store::{
    CredentialStore, InMemoryCredentialStore, InMemoryTokenStore, StoreError, StoredCredential,
    TokenStore,
};
pub use verifier::{Revocation, TokenVerifier};
