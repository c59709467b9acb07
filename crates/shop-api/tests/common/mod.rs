//! 통합 테스트 공용 헬퍼

#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, Response};
use serde_json::Value;

use shop_api::auth::{hash_password, Identity, ManualClock, Role};
use shop_api::AppState;
use shop_core::AppConfig;

pub const SECRET: &str = "integration-test-secret-key-32-bytes-min";
pub const PASSWORD: &str = "Sneakers2024";

pub fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = SECRET.to_string();
    config
}

pub fn state_with(config: AppConfig) -> (AppState, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::starting_now());
    let state = AppState::in_memory(config, clock.clone()).unwrap();
    (state, clock)
}

/// 비밀번호 `PASSWORD`로 신원을 직접 저장합니다.
pub async fn register(state: &AppState, email: &str, role: Role) -> Identity {
    let identity = Identity::new(email, "Test", "User", role).verified();
    state
        .credentials
        .create(identity, hash_password(PASSWORD).unwrap())
        .await
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn get_with(uri: &str, name: header::HeaderName, value: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(name, value)
        .body(Body::empty())
        .unwrap()
}

pub fn bearer(uri: &str, token: &str) -> Request<Body> {
    get_with(uri, header::AUTHORIZATION, &format!("Bearer {token}"))
}

pub fn post_json(uri: &str, body: Value, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

pub async fn body_json(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(&bytes).unwrap()
}
