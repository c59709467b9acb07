//! 요청 단위 인가 판정.
//!
//! 경로를 분류한 뒤, 보호 경로에 한해 요청의 자격증명으로 신원을 확인하고 역할을 검사합니다.
//! 검증 실패 원인은 모두 401로 접히며, 원인은 로그와 메트릭에만 남습니다.

use async_trait::async_trait;
use axum::{
    extract::Request,
    http::{
        header::{AUTHORIZATION, COOKIE},
        HeaderMap,
    },
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

use shop_core::DefaultPolicy;

use super::pipeline::{Flow, Interceptor};
use crate::auth::{
    AuthError, AuthenticatedIdentity, CredentialSource, PathClass, PathPolicy, Rejection, RoleSet,
    TokenKind, TokenVerifier,
};
use crate::metrics::record_authorization;

/// 요청에서 찾은 자격증명.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresentedCredentials {
    /// `Authorization: Bearer` access token
    pub bearer: Option<String>,
    /// 불투명 세션 토큰. `Authorization: Token`이 쿠키보다 우선합니다.
    pub opaque: Option<(String, CredentialSource)>,
}

impl PresentedCredentials {
    pub fn from_headers(headers: &HeaderMap, cookie_name: &str) -> Self {
        let mut credentials = Self::default();

        if let Some(value) = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
            if let Some((scheme, token)) = value.trim().split_once(' ') {
                let token = token.trim();
                if !token.is_empty() {
                    if scheme.eq_ignore_ascii_case("Bearer") {
                        credentials.bearer = Some(token.to_string());
                    } else if scheme.eq_ignore_ascii_case("Token") {
                        credentials.opaque =
                            Some((token.to_string(), CredentialSource::TokenHeader));
                    }
                }
            }
        }

        if credentials.opaque.is_none() {
            credentials.opaque = find_cookie(headers, cookie_name)
                .map(|token| (token, CredentialSource::Cookie));
        }

        credentials
    }

    pub fn is_empty(&self) -> bool {
        self.bearer.is_none() && self.opaque.is_none()
    }
}

fn find_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.trim_matches('"').to_string())
}

/// 인가 판정 결과.
#[derive(Debug, Clone)]
pub enum Decision {
    /// 통과. 보호 경로였다면 확인된 신원이 함께 전달됩니다.
    Allow(Option<AuthenticatedIdentity>),
    Reject(Rejection),
}

impl Decision {
    pub fn is_allow(&self) -> bool {
        matches!(self, Decision::Allow(_))
    }
}

/// 경로 정책과 토큰 검증기를 묶은 인가 판정기.
#[derive(Clone)]
pub struct Authorizer {
    policy: Arc<PathPolicy>,
    verifier: TokenVerifier,
}

impl Authorizer {
    pub fn new(policy: Arc<PathPolicy>, verifier: TokenVerifier) -> Self {
        Self { policy, verifier }
    }

    /// 경로와 자격증명으로 통과 여부를 판정합니다. 토큰/신원 상태는 바꾸지 않습니다.
    pub async fn authorize(&self, path: &str, credentials: &PresentedCredentials) -> Decision {
        match self.policy.classify(path) {
            PathClass::Public => {
                record_authorization("public", "public_path");
                Decision::Allow(None)
            }
            PathClass::Protected { prefix, roles } => {
                self.authorize_protected(path, prefix, roles, credentials)
                    .await
            }
            PathClass::Unmatched => match self.policy.default_policy() {
                DefaultPolicy::Allow => {
                    warn!(path, "No access rule matches path, allowed by default policy");
                    record_authorization("default_allow", "policy_gap");
                    Decision::Allow(None)
                }
                DefaultPolicy::Deny => {
                    self.authorize_protected(path, "<default>", RoleSet::empty(), credentials)
                        .await
                }
            },
        }
    }

    async fn authorize_protected(
        &self,
        path: &str,
        rule: &str,
        roles: RoleSet,
        credentials: &PresentedCredentials,
    ) -> Decision {
        let auth = match self.resolve(credentials).await {
            Ok(auth) => auth,
            Err(cause) => {
                let reason = cause.as_ref().map_or("missing_credential", AuthError::reason);
                info!(path, rule, outcome = "unauthorized", reason, "Request rejected");
                record_authorization("unauthorized", reason);
                return Decision::Reject(Rejection::Unauthenticated { cause });
            }
        };

        let role = auth.identity.role;
        if !roles.contains(role) {
            info!(
                path,
                rule,
                outcome = "forbidden",
                identity_id = %auth.identity.id,
                role = %role,
                allowed = %roles,
                "Request rejected"
            );
            record_authorization("forbidden", "role_not_allowed");
            return Decision::Reject(Rejection::Forbidden { role });
        }

        debug!(
            path,
            rule,
            outcome = "allow",
            identity_id = %auth.identity.id,
            role = %role,
            "Request authorized"
        );
        record_authorization("allow", "role_allowed");
        Decision::Allow(Some(auth))
    }

    /// Bearer access token을 먼저 시도하고, 실패하면 불투명 세션 토큰으로 대체합니다.
    ///
    /// 둘 다 실패하면 먼저 시도한 쪽의 에러를 돌려줍니다.
    async fn resolve(
        &self,
        credentials: &PresentedCredentials,
    ) -> Result<AuthenticatedIdentity, Option<AuthError>> {
        let mut first_error = None;

        if let Some(token) = &credentials.bearer {
            match self.verifier.verify(token, TokenKind::Access).await {
                Ok(identity) => {
                    return Ok(AuthenticatedIdentity {
                        identity,
                        source: CredentialSource::Bearer,
                    })
                }
                Err(e) => first_error = Some(e),
            }
        }

        if let Some((token, source)) = &credentials.opaque {
            match self.verifier.verify(token, TokenKind::Opaque).await {
                Ok(identity) => {
                    return Ok(AuthenticatedIdentity {
                        identity,
                        source: *source,
                    })
                }
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        Err(first_error)
    }
}

/// 파이프라인용 인가 단계.
///
/// 통과한 요청에는 [`AuthenticatedIdentity`]를 extensions에 추가합니다.
#[derive(Clone)]
pub struct AuthorizationStage {
    authorizer: Authorizer,
    cookie_name: String,
}

impl AuthorizationStage {
    pub fn new(authorizer: Authorizer, cookie_name: impl Into<String>) -> Self {
        Self {
            authorizer,
            cookie_name: cookie_name.into(),
        }
    }
}

#[async_trait]
impl Interceptor for AuthorizationStage {
    fn name(&self) -> &'static str {
        "authorization"
    }

    async fn intercept(&self, request: &mut Request) -> Flow {
        let credentials = PresentedCredentials::from_headers(request.headers(), &self.cookie_name);
        let path = request.uri().path().to_owned();

        match self.authorizer.authorize(&path, &credentials).await {
            Decision::Allow(Some(auth)) => {
                request.extensions_mut().insert(auth);
                Flow::Continue
            }
            Decision::Allow(None) => Flow::Continue,
            Decision::Reject(rejection) => Flow::Respond(rejection.into_response()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.append(*name, HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_bearer_header() {
        let creds = PresentedCredentials::from_headers(
            &headers(&[("authorization", "Bearer abc.def.ghi")]),
            "session_token",
        );
        assert_eq!(creds.bearer.as_deref(), Some("abc.def.ghi"));
        assert!(creds.opaque.is_none());
    }

    #[test]
    fn test_token_header_wins_over_cookie() {
        let creds = PresentedCredentials::from_headers(
            &headers(&[
                ("authorization", "token deadbeef"),
                ("cookie", "session_token=cafebabe"),
            ]),
            "session_token",
        );
        assert_eq!(
            creds.opaque,
            Some(("deadbeef".to_string(), CredentialSource::TokenHeader))
        );
    }

    #[test]
    fn test_bearer_and_cookie_together() {
        let creds = PresentedCredentials::from_headers(
            &headers(&[
                ("authorization", "Bearer jwt"),
                ("cookie", "theme=dark; session_token=cafebabe"),
                ("cookie", "other=1"),
            ]),
            "session_token",
        );
        assert_eq!(creds.bearer.as_deref(), Some("jwt"));
        assert_eq!(
            creds.opaque,
            Some(("cafebabe".to_string(), CredentialSource::Cookie))
        );
    }

    #[test]
    fn test_unusable_headers_are_absent() {
        for value in ["Basic dXNlcjpwYXNz", "Bearer", "Bearer   ", "garbage"] {
            let creds = PresentedCredentials::from_headers(
                &headers(&[("authorization", value), ("cookie", "session_token=")]),
                "session_token",
            );
            assert!(creds.is_empty(), "{value}");
        }
    }
}
