//! Market API 서버 진입점.
//!
//! 업스트림 피드, REST 폴러, AI 분석 스케줄러를 띄우고
//! REST API와 브라우저 WebSocket을 제공합니다.

use std::sync::Arc;

use anyhow::Context;
use axum::{extract::State, http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use market_api::metrics::setup_metrics_recorder;
use market_api::repository::{PgMarketStore, PgStrategyStore};
use market_api::routes::create_api_router;
use market_api::services::{AnalysisProvider, AnalysisScheduler, AnalysisService, OpenRouterClient};
use market_api::websocket::{websocket_router, WsState};
use market_api::AppState;
use market_core::{
    init_logging, AppConfig, DatabaseConfig, FanoutHub, InMemoryMarketStore,
    InMemoryStrategyStore, LogConfig, SharedMarketStore, SharedStrategyStore,
};
use market_feed::{PollingRefresher, TickerClient, UpstreamFeedClient};

/// 저장소 구성. DB 연결에 실패하면 메모리 저장소로 동작합니다.
async fn create_stores(
    config: &DatabaseConfig,
) -> (SharedMarketStore, SharedStrategyStore, Option<sqlx::PgPool>) {
    if let Some(database_url) = config.url.as_deref() {
        match PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout())
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                // 연결 테스트
                if sqlx::query("SELECT 1").fetch_one(&pool).await.is_ok() {
                    info!("Connected to PostgreSQL successfully");
                    let store: SharedMarketStore = Arc::new(PgMarketStore::new(pool.clone()));
                    let strategies: SharedStrategyStore =
                        Arc::new(PgStrategyStore::new(pool.clone()));
                    return (store, strategies, Some(pool));
                }
                error!("Failed to verify database connection");
            }
            Err(e) => {
                error!("Failed to connect to database: {}", e);
            }
        }
    } else {
        warn!("DATABASE_URL not set, using in-memory stores");
    }

    let store: SharedMarketStore = Arc::new(InMemoryMarketStore::new());
    let strategies: SharedStrategyStore = Arc::new(InMemoryStrategyStore::new());
    (store, strategies, None)
}

/// 분석 제공자 생성. API 키가 없으면 on-demand 요청은 중립 결과를 반환합니다.
fn create_analysis_provider(config: &AppConfig) -> Option<Arc<dyn AnalysisProvider>> {
    match OpenRouterClient::from_config(&config.analysis) {
        Ok(client) => {
            info!(model = %config.analysis.model, "Analysis provider configured");
            let provider: Arc<dyn AnalysisProvider> = Arc::new(client);
            Some(provider)
        }
        Err(e) => {
            warn!(error = %e, "Analysis provider disabled");
            None
        }
    }
}

/// CORS 레이어.
///
/// 허용 origin 목록이 비어 있으면 개발 모드로 간주하여 모든 origin을 허용합니다.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let parsed: Vec<_> = origins
        .iter()
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let allow_origin = if parsed.is_empty() {
        if !origins.is_empty() {
            warn!("CORS origins configured but none are valid, allowing any");
        }
        AllowOrigin::any()
    } else {
        info!("CORS configured with {} allowed origins", parsed.len());
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers([axum::http::header::CONTENT_TYPE])
}

/// Prometheus 메트릭 핸들러.
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> String {
    handle.render()
}

/// 전체 라우터 생성.
fn create_router(
    state: Arc<AppState>,
    metrics_handle: PrometheusHandle,
    config: &AppConfig,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(metrics_handle);

    let ws_state = WsState::from(state.as_ref());
    let api_router = create_api_router().with_state(state);

    Router::new()
        .merge(metrics_router)
        .merge(api_router)
        .nest("/ws", websocket_router(ws_state))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            config.server.request_timeout(),
        ))
        .layer(cors_layer(&config.server.cors_origins))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    let config = AppConfig::load_default().context("failed to load configuration")?;

    init_logging(LogConfig::from(&config.logging))
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    info!("Starting Market API server...");

    let metrics_handle = setup_metrics_recorder().context("failed to install metrics recorder")?;
    info!("Prometheus metrics recorder initialized");

    let shutdown_token = CancellationToken::new();

    let (store, strategies, db_pool) = create_stores(&config.database).await;
    let hub = FanoutHub::shared();

    // 분석 서비스 (REST 티커를 시세 컨텍스트 보조 소스로 사용)
    let ticker = TickerClient::new(
        config.polling.rest_base_url.clone(),
        config.polling.request_timeout(),
    )?;
    let analysis = Arc::new(
        AnalysisService::new(
            create_analysis_provider(&config),
            store.clone(),
            strategies.clone(),
        )
        .with_ticker(ticker),
    );

    let mut state = AppState::new(store.clone(), strategies, hub.clone(), analysis.clone())
        .with_client_queue_capacity(config.server.client_queue_capacity);
    if let Some(pool) = db_pool {
        state = state.with_db_pool(pool);
    }

    // 업스트림 WebSocket 피드
    if config.feed.enabled {
        let feed = Arc::new(
            UpstreamFeedClient::new(config.feed.clone(), store.clone(), hub.clone())
                .with_shutdown(&shutdown_token),
        );
        feed.initialize();
        state = state.with_feed(feed);
    } else {
        warn!("Upstream feed disabled by configuration");
    }

    // REST 폴러 (첫 주기는 즉시 실행)
    if config.polling.enabled {
        let poller = Arc::new(
            PollingRefresher::new(config.polling.clone(), store.clone())?
                .with_shutdown(&shutdown_token),
        );
        let initial = Arc::clone(&poller);
        tokio::spawn(async move {
            if let Some(stats) = initial.initialize().await {
                info!(
                    succeeded = stats.succeeded,
                    failed = stats.failed,
                    "Initial polling cycle completed"
                );
            }
        });
        state = state.with_poller(poller);
    }

    // 주기 분석 스케줄러
    if config.analysis.enabled && analysis.is_configured() {
        let scheduler = Arc::new(
            AnalysisScheduler::new(
                analysis,
                config.analysis.symbols.clone(),
                config.analysis.interval(),
            )
            .with_shutdown(&shutdown_token),
        );
        scheduler.initialize();
        state = state.with_scheduler(scheduler);
    } else {
        warn!("Periodic analysis disabled (not enabled or no API key)");
    }

    let state = Arc::new(state);
    info!(
        version = %state.version,
        store = state.store.backend(),
        has_feed = state.feed.is_some(),
        has_poller = state.poller.is_some(),
        has_scheduler = state.scheduler.is_some(),
        "Application state initialized"
    );

    let app = create_router(state.clone(), metrics_handle, &config);

    let addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    info!(%addr, "API server listening");
    info!("Metrics available at http://{}/metrics", addr);
    info!("WebSocket available at ws://{}/ws", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_token.clone()))
        .await?;

    info!("Server shutdown initiated, cleaning up...");
    shutdown_token.cancel();

    // 정리 작업에 최대 10초 대기
    let cleanup = tokio::time::timeout(
        std::time::Duration::from_secs(10),
        state.shutdown_components(),
    )
    .await;
    if cleanup.is_err() {
        warn!("Cleanup timeout, forcing shutdown");
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Graceful shutdown 시그널 대기.
///
/// Ctrl+C 또는 SIGTERM 시그널을 수신하면 종료 토큰을 취소합니다.
async fn shutdown_signal(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
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
