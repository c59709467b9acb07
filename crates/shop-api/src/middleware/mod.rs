//! API 서버용 HTTP middleware.
//!
//! 요청 처리 파이프라인에 적용되는 middleware 모듈.

mod authorization;
mod metrics;
mod pipeline;

pub use authorization::{AuthorizationStage, Authorizer, Decision, PresentedCredentials};
pub use metrics::metrics_layer;
pub use pipeline::{pipeline_middleware, Flow, Interceptor, InterceptorPipeline};
