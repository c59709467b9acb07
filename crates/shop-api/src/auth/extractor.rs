//! 핸들러용 인증 신원 추출기.
//!
//! 인가 미들웨어가 요청 extensions에 넣어 둔 [`AuthenticatedIdentity`]를 꺼냅니다.
//! 핸들러는 인가를 다시 판단하지 않습니다.
//!
//! ```rust,ignore
//! async fn me(CurrentIdentity(auth): CurrentIdentity) -> impl IntoResponse {
//!     Json(auth.identity)
//! }
//! ```

use axum::{extract::FromRequestParts, http::request::Parts};

use super::{Identity, Rejection};

/// 신원을 확인한 자격증명의 출처.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// `Authorization: Bearer <access>`
    Bearer,
    /// `Authorization: Token <opaque>`
    TokenHeader,
    /// 세션 쿠키
    Cookie,
}

/// 인가를 통과한 요청의 신원.
#[derive(Debug, Clone)]
pub struct AuthenticatedIdentity {
    pub identity: Identity,
    pub source: CredentialSource,
}

/// 인증된 신원 추출기.
#[derive(Debug, Clone)]
pub struct CurrentIdentity(pub AuthenticatedIdentity);

impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = Rejection;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedIdentity>()
            .cloned()
            .map(CurrentIdentity)
            .ok_or_else(Rejection::unauthenticated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use axum::http::{Request, StatusCode};
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn test_extracts_identity_from_extensions() {
        let identity = Identity::new("buyer@example.com", "B", "C", Role::Customer);
        let mut request = Request::builder().uri("/auth/me/").body(()).unwrap();
        request.extensions_mut().insert(AuthenticatedIdentity {
            identity: identity.clone(),
            source: CredentialSource::Cookie,
        });
        let (mut parts, _) = request.into_parts();

        let CurrentIdentity(auth) = CurrentIdentity::from_request_parts(&mut parts, &())
            .await
            .unwrap();
        assert_eq!(auth.identity, identity);
        assert_eq!(auth.source, CredentialSource::Cookie);
    }

    #[tokio::test]
    async fn test_missing_identity_is_unauthorized() {
        let (mut parts, _) = Request::builder().uri("/").body(()).unwrap().into_parts();

        let rejection = CurrentIdentity::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert_eq!(rejection.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
