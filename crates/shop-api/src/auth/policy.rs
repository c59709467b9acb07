//! 경로 접근 정책.
//!
//! 시작 시 한 번 만들어지고 이후에는 읽기 전용으로 공유됩니다. I/O 없이 경로 문자열만으로
//! 판정합니다.
//!
//! # 판정 규칙
//!
//! 1. prefix는 세그먼트 경계에서만 맞습니다. `/health`는 `/health`와 `/health/...`에 맞고
//!    `/healthcheck`에는 맞지 않습니다.
//! 2. 공개 경로 prefix가 하나라도 맞으면 `Public`. 역할 규칙보다 항상 우선합니다.
//! 3. 역할 규칙은 선언 순서대로 검사하며 처음 맞는 규칙이 적용됩니다.
//!    구체성(길이) 기준으로 정렬하지 않습니다.
//! 4. 아무 것도 맞지 않으면 `Unmatched`. 처리 방식은 [`DefaultPolicy`]가 정합니다.
//!
//! 라우터는 원래 경로로 라우팅하므로, 정규화가 필요한 경로(`.`/`..` 세그먼트, 빈 세그먼트,
//! 인코딩된 구분자)는 공개로 분류하지 않습니다. 이런 경로는 원래 경로와 정규화된 경로에
//! 각각 맞는 규칙의 허용 역할 교집합을 적용합니다.

use std::borrow::Cow;

use shop_core::{AccessConfig, ConfigError, DefaultPolicy};

use super::RoleSet;

/// prefix와 허용 역할 집합.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRule {
    pub prefix: String,
    pub roles: RoleSet,
}

impl PathRule {
    pub fn new(prefix: impl Into<String>, roles: RoleSet) -> Self {
        Self {
            prefix: prefix.into(),
            roles,
        }
    }
}

/// 경로 분류 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathClass<'a> {
    /// 인증 불필요
    Public,
    /// 인증 필요, 역할이 `roles`에 속해야 함
    Protected { prefix: &'a str, roles: RoleSet },
    /// 어떤 규칙에도 해당하지 않음
    Unmatched,
}

/// 공개 경로 목록과 역할 규칙.
#[derive(Debug, Clone)]
pub struct PathPolicy {
    public_paths: Vec<String>,
    rules: Vec<PathRule>,
    default_policy: DefaultPolicy,
}

impl PathPolicy {
    pub fn new(
        public_paths: Vec<String>,
        rules: Vec<PathRule>,
        default_policy: DefaultPolicy,
    ) -> Self {
        Self {
            public_paths,
            rules,
            default_policy,
        }
    }

    /// 설정에서 정책을 만듭니다. 알 수 없는 역할 이름은 설정 에러입니다.
    pub fn from_config(config: &AccessConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let rules = config
            .rules
            .iter()
            .map(|rule| {
                RoleSet::parse_names(&rule.roles)
                    .map(|roles| PathRule::new(rule.prefix.clone(), roles))
                    .map_err(|e| {
                        ConfigError::InvalidAccessRule(format!(
                            "rule '{}' names unknown role '{}'",
                            rule.prefix, e.0
                        ))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(
            config.public_paths.clone(),
            rules,
            config.default_policy,
        ))
    }

    pub fn default_policy(&self) -> DefaultPolicy {
        self.default_policy
    }

    pub fn public_paths(&self) -> &[String] {
        &self.public_paths
    }

    pub fn rules(&self) -> &[PathRule] {
        &self.rules
    }

    /// 요청 경로를 분류합니다.
    pub fn classify(&self, path: &str) -> PathClass<'_> {
        if !needs_normalization(path) {
            if self.is_public(path) {
                return PathClass::Public;
            }
            return self.first_rule(path).map_or(PathClass::Unmatched, protected);
        }

        let canonical = canonicalize_path(path);
        match (self.first_rule(path), self.first_rule(&canonical)) {
            (Some(raw), Some(resolved)) => PathClass::Protected {
                prefix: resolved.prefix.as_str(),
                roles: raw.roles.intersection(resolved.roles),
            },
            (Some(rule), None) | (None, Some(rule)) => protected(rule),
            (None, None) => PathClass::Unmatched,
        }
    }

    fn is_public(&self, path: &str) -> bool {
        self.public_paths
            .iter()
            .any(|prefix| prefix_matches(path, prefix))
    }

    fn first_rule(&self, path: &str) -> Option<&PathRule> {
        self.rules
            .iter()
            .find(|rule| prefix_matches(path, &rule.prefix))
    }
}

fn protected(rule: &PathRule) -> PathClass<'_> {
    PathClass::Protected {
        prefix: rule.prefix.as_str(),
        roles: rule.roles,
    }
}

/// `/`로 끝나는 prefix는 그대로, 아니면 경로 전체이거나 다음 문자가 `/`일 때만 맞습니다.
fn prefix_matches(path: &str, prefix: &str) -> bool {
    if prefix.ends_with('/') {
        return path.starts_with(prefix);
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// 라우터가 보는 경로와 정규화된 경로가 달라질 수 있는지 여부.
fn needs_normalization(path: &str) -> bool {
    if !is_canonical(path) || path.contains('\\') {
        return true;
    }
    let lower = path.to_ascii_lowercase();
    ["%2e", "%2f", "%5c"]
        .iter()
        .any(|encoded| lower.contains(encoded))
}

/// 요청 경로를 정규화합니다.
///
/// 결과는 항상 `/`로 시작하고, 빈 세그먼트와 `.`/`..` 세그먼트를 포함하지 않습니다.
/// 원래 경로가 슬래시로 끝났으면 결과도 슬래시로 끝납니다. 루트 위로 올라가는 `..`는
/// 무시합니다.
pub fn canonicalize_path(path: &str) -> Cow<'_, str> {
    let decoded = decode_separators(path);
    if is_canonical(&decoded) {
        return decoded;
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in decoded.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let trailing = decoded.ends_with('/')
        || decoded.ends_with("/.")
        || decoded.ends_with("/..")
        || decoded == "."
        || decoded == "..";

    let mut canonical = String::with_capacity(decoded.len() + 1);
    for segment in &segments {
        canonical.push('/');
        canonical.push_str(segment);
    }
    if canonical.is_empty() || trailing {
        canonical.push('/');
    }
    Cow::Owned(canonical)
}

/// `%2e`와 `%2f`(대소문자 무관)만 디코딩합니다.
fn decode_separators(path: &str) -> Cow<'_, str> {
    if !path.contains('%') {
        return Cow::Borrowed(path);
    }

    let bytes = path.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() && bytes[i + 1] == b'2' {
            let decoded = match bytes[i + 2].to_ascii_lowercase() {
                b'e' => Some(b'.'),
                b'f' => Some(b'/'),
                _ => None,
            };
            if let Some(byte) = decoded {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    // ASCII 바이트만 치환했으므로 UTF-8이 유지됨
    String::from_utf8(out).map_or(Cow::Borrowed(path), Cow::Owned)
}

fn is_canonical(path: &str) -> bool {
    path.starts_with('/')
        && !path.contains("//")
        && !path[1..]
            .split('/')
            .any(|segment| segment == "." || segment == "..")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Role;
    use proptest::prelude::*;
    use shop_core::AccessRuleConfig;

    fn policy() -> PathPolicy {
        PathPolicy::from_config(&AccessConfig::default()).unwrap()
    }

    fn roles(list: &[Role]) -> RoleSet {
        list.iter().copied().collect()
    }

    #[test]
    fn test_public_paths_win_over_rules() {
        let policy = policy();
        // "/auth/" 규칙보다 공개 경로가 우선
        assert_eq!(policy.classify("/auth/login/"), PathClass::Public);
        assert_eq!(policy.classify("/auth/jwt/refresh/"), PathClass::Public);
        assert_eq!(
            policy.classify("/auth/change-password/"),
            PathClass::Protected {
                prefix: "/auth/",
                roles: RoleSet::all()
            }
        );
    }

    #[test]
    fn test_rule_roles() {
        let policy = policy();
        assert_eq!(
            policy.classify("/cart/123"),
            PathClass::Protected {
                prefix: "/cart/",
                roles: roles(&[Role::Customer])
            }
        );
        assert_eq!(
            policy.classify("/seller/products/9/"),
            PathClass::Protected {
                prefix: "/seller/",
                roles: roles(&[Role::Seller, Role::Admin])
            }
        );
        assert_eq!(policy.classify("/checkout/"), PathClass::Unmatched);
        assert_eq!(policy.classify("/cart"), PathClass::Unmatched);
    }

    #[test]
    fn test_public_prefix_respects_segment_boundary() {
        let policy = policy();
        assert_eq!(policy.classify("/health"), PathClass::Public);
        assert_eq!(policy.classify("/health/ready"), PathClass::Public);
        assert_eq!(policy.classify("/metrics"), PathClass::Public);
        assert_eq!(policy.classify("/healthcheck-admin/"), PathClass::Unmatched);
        assert_eq!(policy.classify("/metrics-export/"), PathClass::Unmatched);

        let strict = PathPolicy::new(
            vec!["/health".to_string()],
            vec![PathRule::new("/", roles(&[Role::Admin]))],
            DefaultPolicy::Deny,
        );
        assert_eq!(
            strict.classify("/healthcheck-admin/"),
            PathClass::Protected {
                prefix: "/",
                roles: roles(&[Role::Admin])
            }
        );
    }

    #[test]
    fn test_prefix_matches() {
        assert!(prefix_matches("/cart/1", "/cart/"));
        assert!(!prefix_matches("/cart", "/cart/"));
        assert!(prefix_matches("/health", "/health"));
        assert!(prefix_matches("/health/", "/health"));
        assert!(!prefix_matches("/healthz", "/health"));
    }

    #[test]
    fn test_encoded_traversal_to_public_path_stays_protected() {
        let policy = policy();
        let customer_only = roles(&[Role::Customer]);

        // 라우터는 "/cart/{id}"로 보냄
        assert_eq!(
            policy.classify("/cart/..%2f..%2fauth%2flogin%2f"),
            PathClass::Protected {
                prefix: "/auth/",
                roles: customer_only
            }
        );
        assert_eq!(
            policy.classify("/cart/%2E%2E/%2e%2e/auth/login/"),
            PathClass::Protected {
                prefix: "/auth/",
                roles: customer_only
            }
        );
        assert_eq!(
            policy.classify("/health/..%2f..%2fcart%2f1"),
            PathClass::Protected {
                prefix: "/cart/",
                roles: customer_only
            }
        );
        assert_eq!(
            policy.classify("/cart/..%2f..%2fhealth"),
            PathClass::Protected {
                prefix: "/cart/",
                roles: customer_only
            }
        );
        // 인코딩된 구분자만 있어도 공개 경로가 아님
        assert_ne!(policy.classify("/auth/login%2f"), PathClass::Public);
        assert_ne!(policy.classify("/auth/login/..%5cx"), PathClass::Public);
    }

    #[test]
    fn test_conflicting_rules_intersect_to_nobody() {
        let policy = policy();
        assert_eq!(
            policy.classify("/wishlist/..%2f..%2fseller%2fdashboard"),
            PathClass::Protected {
                prefix: "/seller/",
                roles: RoleSet::empty()
            }
        );
    }

    #[test]
    fn test_first_declared_rule_wins() {
        let broad = PathRule::new("/shop/", roles(&[Role::Customer]));
        let narrow = PathRule::new("/shop/admin/", roles(&[Role::Admin]));
        let policy = PathPolicy::new(
            Vec::new(),
            vec![broad.clone(), narrow.clone()],
            DefaultPolicy::Allow,
        );

        assert_eq!(
            policy.classify("/shop/admin/settings"),
            PathClass::Protected {
                prefix: "/shop/",
                roles: broad.roles
            }
        );

        let reversed = PathPolicy::new(Vec::new(), vec![narrow.clone(), broad], DefaultPolicy::Allow);
        assert_eq!(
            reversed.classify("/shop/admin/settings"),
            PathClass::Protected {
                prefix: "/shop/admin/",
                roles: narrow.roles
            }
        );
    }

    #[test]
    fn test_dot_segments_cannot_reach_public_prefix() {
        let policy = policy();
        for path in [
            "/auth/login/../../cart/1",
            "/auth/login/%2e%2e/%2E%2E/cart/1",
            "/auth/login/..%2f..%2fcart/1",
            "//cart/1",
            "/./cart/./1",
        ] {
            assert_eq!(
                policy.classify(path),
                PathClass::Protected {
                    prefix: "/cart/",
                    roles: roles(&[Role::Customer])
                },
                "path {path}"
            );
        }
    }

    #[test]
    fn test_canonicalize_path() {
        assert_eq!(canonicalize_path("/orders/"), "/orders/");
        assert!(matches!(canonicalize_path("/orders/1"), Cow::Borrowed(_)));
        assert_eq!(canonicalize_path("/a//b///c"), "/a/b/c");
        assert_eq!(canonicalize_path("/a/b/.."), "/a/");
        assert_eq!(canonicalize_path("/../../etc"), "/etc");
        assert_eq!(canonicalize_path(""), "/");
        assert_eq!(canonicalize_path("cart/1"), "/cart/1");
        assert_eq!(canonicalize_path("/caf%C3%A9/%41"), "/caf%C3%A9/%41");
        assert_eq!(canonicalize_path("/café/%2e/x"), "/café/x");
        assert_eq!(canonicalize_path("/x%2"), "/x%2");
    }

    #[test]
    fn test_unknown_role_is_config_error() {
        let config = AccessConfig {
            rules: vec![AccessRuleConfig::new("/vip/", &["gold"])],
            ..AccessConfig::default()
        };
        let err = PathPolicy::from_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidAccessRule(msg) if msg.contains("gold")));
    }

    proptest! {
        #[test]
        fn prop_public_prefix_always_public(suffix in "([a-z0-9]{1,8}/){0,3}[a-z0-9]{0,8}") {
            let policy = policy();
            let path = format!("/auth/login/{suffix}");
            prop_assert_eq!(policy.classify(&path), PathClass::Public);
        }

        #[test]
        fn prop_encoded_separator_is_never_public(
            head in "[a-z]{0,8}",
            sep in "(%2f|%2F|%2e|%2E|%5c)",
            tail in "[a-z/]{0,8}",
        ) {
            let policy = policy();
            let path = format!("/auth/login/{head}{sep}{tail}");
            prop_assert_ne!(policy.classify(&path), PathClass::Public);
        }

        #[test]
        fn prop_canonical_form_is_stable(path in "(/|\\.|\\.\\.|%2e|%2f|[a-z]){0,32}") {
            let once = canonicalize_path(&path).into_owned();
            prop_assert!(once.starts_with('/'));
            prop_assert!(!once.contains("//"));
            prop_assert!(!once.split('/').any(|s| s == "." || s == ".."));
            let twice = canonicalize_path(&once).into_owned();
            prop_assert_eq!(twice, once);
        }
    }
}
