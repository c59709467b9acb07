//! 요청 인터셉터 파이프라인.
//!
//! 선언 순서대로 각 단계를 실행하며, 처음으로 응답을 돌려준 단계에서 멈춥니다.
//! 모든 단계가 `Continue`이면 요청은 다음 핸들러로 전달되고, 그 응답은 그대로 반환됩니다.

use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tracing::debug;

/// 인터셉터 단계의 결과.
#[derive(Debug)]
pub enum Flow {
    /// 다음 단계로 진행
    Continue,
    /// 이 응답으로 요청을 종료
    Respond(Response),
}

/// 파이프라인의 한 단계.
///
/// 요청을 읽고 extensions에 값을 추가할 수 있지만, 본문은 소비하지 않아야 합니다.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// 로그에 쓰이는 단계 이름.
    fn name(&self) -> &'static str;

    async fn intercept(&self, request: &mut Request) -> Flow;
}

/// 순서가 고정된 인터셉터 목록.
#[derive(Clone)]
pub struct InterceptorPipeline {
    stages: Arc<[Arc<dyn Interceptor>]>,
}

impl InterceptorPipeline {
    pub fn new(stages: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            stages: stages.into(),
        }
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    /// 단계를 순서대로 실행합니다. 단락된 경우 그 응답을 반환합니다.
    pub async fn run(&self, request: &mut Request) -> Option<Response> {
        for stage in self.stages.iter() {
            if let Flow::Respond(response) = stage.intercept(request).await {
                debug!(
                    stage = stage.name(),
                    status = response.status().as_u16(),
                    "Request short-circuited"
                );
                return Some(response);
            }
        }
        None
    }
}

/// 파이프라인을 axum 미들웨어로 실행합니다.
///
/// `axum::middleware::from_fn_with_state(pipeline, pipeline_middleware)`로 등록합니다.
pub async fn pipeline_middleware(
    State(pipeline): State<InterceptorPipeline>,
    mut request: Request,
    next: Next,
) -> Response {
    match pipeline.run(&mut request).await {
        Some(response) => response,
        None => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::StatusCode,
        middleware,
        response::IntoResponse,
        routing::get,
        Router,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    struct Counting {
        name: &'static str,
        hits: Arc<AtomicUsize>,
        respond_with: Option<StatusCode>,
    }

    #[async_trait]
    impl Interceptor for Counting {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn intercept(&self, request: &mut Request) -> Flow {
            self.hits.fetch_add(1, Ordering::SeqCst);
            request.extensions_mut().insert(self.name);
            match self.respond_with {
                Some(status) => Flow::Respond(status.into_response()),
                None => Flow::Continue,
            }
        }
    }

    fn stage(
        name: &'static str,
        respond_with: Option<StatusCode>,
    ) -> (Arc<dyn Interceptor>, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        let stage = Arc::new(Counting {
            name,
            hits: hits.clone(),
            respond_with,
        });
        (stage, hits)
    }

    fn app(pipeline: InterceptorPipeline) -> Router {
        Router::new()
            .route("/", get(|| async { "downstream" }))
            .layer(middleware::from_fn_with_state(pipeline, pipeline_middleware))
    }

    fn request() -> Request {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_all_continue_reaches_handler() {
        let (first, first_hits) = stage("first", None);
        let (second, second_hits) = stage("second", None);
        let pipeline = InterceptorPipeline::new(vec![first, second]);
        assert_eq!(pipeline.stage_names(), vec!["first", "second"]);

        let response = app(pipeline).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(first_hits.load(Ordering::SeqCst), 1);
        assert_eq!(second_hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_short_circuit_wins() {
        let (first, _) = stage("first", Some(StatusCode::UNAUTHORIZED));
        let (second, second_hits) = stage("second", Some(StatusCode::FORBIDDEN));
        let pipeline = InterceptorPipeline::new(vec![first, second]);

        let response = app(pipeline).oneshot(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(second_hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stage_sees_earlier_extensions() {
        let (first, _) = stage("first", None);
        let pipeline = InterceptorPipeline::new(vec![first]);

        let mut request = request();
        assert!(pipeline.run(&mut request).await.is_none());
        assert_eq!(request.extensions().get::<&'static str>(), Some(&"first"));
    }
}
