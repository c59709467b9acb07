//! 사용자 역할 및 역할 집합.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 사용자 역할.
///
/// 모든 신원은 정확히 하나의 역할을 가집니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// 구매자
    Customer,
    /// 판매자 / 직원
    Seller,
    /// 관리자
    Admin,
}

/// 알 수 없는 역할 이름.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("알 수 없는 역할: {0}")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 3] = [Role::Customer, Role::Seller, Role::Admin];

    /// 소문자 역할 이름.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Seller => "seller",
            Role::Admin => "admin",
        }
    }

    /// 문자열에서 역할 파싱 (대소문자 무시).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "customer" => Some(Role::Customer),
            "seller" => Some(Role::Seller),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }

    fn bit(self) -> u8 {
        match self {
            Role::Customer => 0b001,
            Role::Seller => 0b010,
            Role::Admin => 0b100,
        }
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::parse(s).ok_or_else(|| UnknownRole(s.to_string()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 경로 규칙에서 허용하는 역할 집합.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoleSet(u8);

impl RoleSet {
    /// 어떤 역할도 허용하지 않는 집합.
    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Role::ALL.into_iter().collect()
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, role: Role) {
        self.0 |= role.bit();
    }

    /// 두 집합 모두에 속한 역할.
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// 역할 이름 목록에서 집합 생성. 알 수 없는 이름이 있으면 실패합니다.
    pub fn parse_names<S: AsRef<str>>(names: &[S]) -> Result<Self, UnknownRole> {
        names
            .iter()
            .map(|name| name.as_ref().parse::<Role>())
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL.into_iter().filter(|role| self.contains(*role))
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let mut set = RoleSet::empty();
        for role in iter {
            set.insert(role);
        }
        set
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|r| r.as_str()).collect();
        write!(f, "[{}]", names.join(","))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_from_str() {
        assert_eq!(Role::parse("customer"), Some(Role::Customer));
        assert_eq!(Role::parse("SELLER"), Some(Role::Seller));
        assert_eq!(Role::parse(" Admin "), Some(Role::Admin));
        assert_eq!(Role::parse("owner"), None);
        assert_eq!("trader".parse::<Role>(), Err(UnknownRole("trader".to_string())));
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_string(&Role::Seller).unwrap();
        assert_eq!(json, "\"seller\"");

        let parsed: Role = serde_json::from_str("\"admin\"").unwrap();
        assert_eq!(parsed, Role::Admin);
        assert!(serde_json::from_str::<Role>("\"root\"").is_err());
    }

    #[test]
    fn test_role_set_membership() {
        let set = RoleSet::parse_names(&["seller", "admin"]).unwrap();
        assert!(set.contains(Role::Seller));
        assert!(set.contains(Role::Admin));
        assert!(!set.contains(Role::Customer));
        assert_eq!(set.to_string(), "[seller,admin]");

        assert!(RoleSet::empty().is_empty());
        assert_eq!(RoleSet::all().iter().count(), 3);
    }

    #[test]
    fn test_role_set_rejects_unknown_name() {
        let err = RoleSet::parse_names(&["customer", "staff"]).unwrap_err();
        assert_eq!(err.0, "staff");
    }
}
