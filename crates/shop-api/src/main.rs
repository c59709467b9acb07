//! 스토어프런트 인증 API 서버.
//!
//! 설정 로드 → 로깅 → 메트릭 → 저장소 연결 → 인가 파이프라인 순으로 기동합니다.
//! 설정이 유효하지 않으면(서명 키 누락 등) 서버는 시작하지 않습니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use shop_api::auth::{CredentialStore, SystemClock, TokenStore, TokenVerifier};
use shop_api::metrics::setup_metrics_recorder;
use shop_api::repository::{self, PgCredentialStore, PgTokenStore};
use shop_api::routes::create_router;
use shop_api::state::AppState;
use shop_core::{init_logging, AppConfig, DefaultPolicy, LogConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일은 선택 사항
    let _ = dotenvy::dotenv();

    let config = AppConfig::load_default().context("invalid configuration")?;

    init_logging(LogConfig::from(&config.logging))
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;

    info!("Starting storefront API server...");

    let metrics_handle = match setup_metrics_recorder() {
        Ok(handle) => {
            info!("Prometheus metrics recorder initialized");
            Some(handle)
        }
        Err(e) => {
            warn!(error = %e, "Failed to install metrics recorder, /metrics disabled");
            None
        }
    };

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .map_err(|e| {
            error!(
                host = %config.server.host,
                port = config.server.port,
                error = %e,
                "Invalid socket address. Check API_HOST and API_PORT"
            );
            e
        })?;

    if config.access.default_policy == DefaultPolicy::Allow {
        warn!("default_policy=allow: paths without an access rule are served without authentication");
    }
    info!(
        public_paths = config.access.public_paths.len(),
        rules = config.access.rules.len(),
        default_policy = ?config.access.default_policy,
        "Access policy loaded"
    );

    let state = create_app_state(config).await?;
    info!(
        version = %state.version,
        has_db = state.db_pool.is_some(),
        "Application state initialized"
    );

    let shutdown_token = CancellationToken::new();

    let purge_interval =
        Duration::from_secs(state.config.auth.blacklist_purge_interval_secs.max(1));
    let purge_handle = tokio::spawn(run_blacklist_purge(
        state.verifier.clone(),
        purge_interval,
        shutdown_token.clone(),
    ));

    let app = create_router(state, metrics_handle);

    info!(%addr, "API server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_token.clone()))
        .await?;

    info!("Server shutdown initiated, cleaning up...");
    shutdown_token.cancel();

    if tokio::time::timeout(Duration::from_secs(10), purge_handle)
        .await
        .is_err()
    {
        warn!("Cleanup timeout, forcing shutdown");
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// 데이터베이스 URL이 있으면 PostgreSQL 저장소, 없으면 인메모리 저장소를 사용합니다.
async fn create_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let clock = Arc::new(SystemClock);

    let Some(url) = config.database.url.clone() else {
        warn!("DATABASE_URL not set, using in-memory stores (data is lost on restart)");
        return Ok(AppState::in_memory(config, clock)?);
    };

    let pool = repository::connect(&url, &config.database)
        .await
        .context("failed to connect to database")?;
    info!("Connected to PostgreSQL successfully");

    if config.database.run_migrations {
        repository::run_migrations(&pool)
            .await
            .context("failed to run database migrations")?;
        info!("Database migrations applied");
    }

    let credentials: Arc<dyn CredentialStore> = Arc::new(PgCredentialStore::new(pool.clone()));
    let tokens: Arc<dyn TokenStore> = Arc::new(PgTokenStore::new(pool.clone()));

    Ok(AppState::new(config, credentials, tokens, clock)?.with_db_pool(pool))
}

/// 만료된 refresh 블랙리스트 항목을 주기적으로 삭제합니다.
async fn run_blacklist_purge(
    verifier: TokenVerifier,
    period: Duration,
    shutdown_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(period);
    // 첫 tick은 즉시 완료됨
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = shutdown_token.cancelled() => {
                info!("Blacklist purge task stopped");
                break;
            }
            _ = ticker.tick() => {
                match verifier.purge_expired().await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "Purged expired blacklist entries"),
                    Err(e) => warn!(error = %e, "Blacklist purge failed"),
                }
            }
        }
    }
}

/// Ctrl+C 또는 SIGTERM을 수신하면 종료 토큰을 취소합니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }

    shutdown_token.cancel();
    info!("Shutdown signal propagated to background tasks");
}
