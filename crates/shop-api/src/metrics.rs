//! Prometheus 메트릭 설정 및 유틸리티.
//!
//! HTTP 요청 메트릭과 인가/토큰 검증 메트릭을 수집하고 `/metrics` 엔드포인트로 노출합니다.

use metrics::{counter, histogram};
use metrics_exporter_prometheus::{BuildError, Matcher, PrometheusBuilder, PrometheusHandle};

use crate::auth::TokenKind;

const LATENCY_BUCKETS: &[f64] = &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0];

/// Prometheus 메트릭 레코더를 설치하고 핸들을 반환합니다.
///
/// 레코더가 이미 설치되어 있으면 에러를 반환합니다.
pub fn setup_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .set_buckets_for_metric(
            Matcher::Full("auth_token_verification_duration_seconds".to_string()),
            LATENCY_BUCKETS,
        )?
        .install_recorder()
}

// ============================================================================
// HTTP 메트릭 헬퍼 함수
// ============================================================================

/// HTTP 응답 카운터 증가.
pub fn record_http_response(method: &str, path: &str, status: u16) {
    counter!(
        "http_responses_total",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// HTTP 요청 지속 시간 기록.
pub fn record_http_duration(method: &str, path: &str, duration_secs: f64) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string()
    )
    .record(duration_secs);
}

// ============================================================================
// 인가 메트릭 헬퍼 함수
// ============================================================================

/// 인가 판정 카운터 증가.
///
/// `outcome`: public, allow, default_allow, unauthorized, forbidden
pub fn record_authorization(outcome: &'static str, reason: &'static str) {
    counter!("auth_decisions_total", "outcome" => outcome, "reason" => reason).increment(1);
}

/// 토큰 검증 결과와 소요 시간 기록.
pub fn record_token_verification(kind: TokenKind, outcome: &'static str, duration_secs: f64) {
    counter!(
        "auth_token_verifications_total",
        "kind" => kind.as_str(),
        "outcome" => outcome
    )
    .increment(1);
    histogram!("auth_token_verification_duration_seconds", "kind" => kind.as_str())
        .record(duration_secs);
}

// ============================================================================
// 경로 정규화 유틸리티
// ============================================================================

/// 경로에서 동적 파라미터를 정규화합니다.
///
/// 예: `/api/admin-dashboard/users/123e4567-e89b-12d3-a456-426614174000/deactivate/`
/// → `/api/admin-dashboard/users/:id/deactivate/`
pub fn normalize_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            let is_uuid =
                segment.len() == 36 && segment.chars().filter(|c| *c == '-').count() == 4;
            let is_numeric = !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit());

            if is_uuid || is_numeric {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path_uuid() {
        let path = "/api/admin-dashboard/users/123e4567-e89b-12d3-a456-426614174000/deactivate/";
        assert_eq!(
            normalize_path(path),
            "/api/admin-dashboard/users/:id/deactivate/"
        );
    }

    #[test]
    fn test_normalize_path_numeric() {
        assert_eq!(normalize_path("/cart/12345"), "/cart/:id");
        assert_eq!(normalize_path("/orders/"), "/orders/");
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_authorization("allow", "role_ok");
        record_token_verification(TokenKind::Access, "ok", 0.001);
    }
}
