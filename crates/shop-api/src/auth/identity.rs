//! 인증된 주체(Identity).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Role;

/// 인증된 주체.
///
/// 역할은 필수 필드이며, `is_active == false`인 신원은 토큰 유효성과 무관하게
/// 인가를 통과할 수 없습니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// 내부 식별자
    pub id: Uuid,
    /// 외부 노출용 식별자 (`USR-xxxxxxxx`)
    pub public_user_id: String,
    /// 이메일 (소문자로 정규화, 고유)
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role: Role,
    pub is_active: bool,
    pub is_email_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl Identity {
    /// 새 신원 생성. 식별자는 자동으로 할당됩니다.
    pub fn new(
        email: &str,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        role: Role,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            public_user_id: generate_public_user_id(),
            email: normalize_email(email),
            first_name: first_name.into(),
            last_name: last_name.into(),
            role,
            is_active: true,
            is_email_verified: false,
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn verified(mut self) -> Self {
        self.is_email_verified = true;
        self
    }
}

/// `USR-` + UUID 앞 8자리 16진수.
pub fn generate_public_user_id() -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("USR-{}", &hex[..8])
}

/// 이메일 비교는 대소문자를 구분하지 않습니다.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
