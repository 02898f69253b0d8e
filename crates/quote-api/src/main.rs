//! 시세 프록시 API 서버.
//!
//! 설정을 읽고 저장소, 제공자, 오케스트레이터를 구성한 뒤 Axum 서버를 시작합니다.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use axum::{http::StatusCode, Router};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use quote_api::routes::create_api_router;
use quote_api::state::AppState;
use quote_core::{
    init_logging, AppConfig, CacheBackend, CacheConfig, DatasetKind, ExchangeCalendar, LogConfig,
    MarketContext, SystemClock,
};
use quote_data::{
    DatasetHub, FileStore, FinnhubProvider, FredProvider, KeyValueStore, MemoryStore,
    OrchestratorDeps, OrchestratorSettings, RedisStore, RefreshOrchestrator, SeedCatalog,
    SelectionPolicy, TokenRotator,
};

/// Finnhub API 키 환경 변수.
const FINNHUB_KEY_VARS: [&str; 4] = ["FINN_1_KEY", "FINN_2_KEY", "FINN_3_KEY", "FINN_4_KEY"];

/// FRED API 키 환경 변수.
const FRED_KEY_VARS: [&str; 1] = ["FRED_API_KEY"];

/// 설정된 백엔드로 저장소를 생성합니다.
async fn build_store(config: &CacheConfig) -> anyhow::Result<Arc<dyn KeyValueStore>> {
    let store: Arc<dyn KeyValueStore> = match config.backend {
        CacheBackend::File => Arc::new(FileStore::new(&config.directory)),
        CacheBackend::Redis => {
            let url = config
                .redis_url
                .as_deref()
                .context("cache.redis_url is required for the redis backend")?;
            let store = RedisStore::connect(url, config.key_prefix.clone()).await?;
            if !store.health_check().await.unwrap_or(false) {
                warn!("Redis health check failed, continuing with degraded cache");
            }
            Arc::new(store)
        }
        CacheBackend::Memory => Arc::new(MemoryStore::new()),
    };

    info!(backend = store.backend(), "Cache store initialized");
    Ok(store)
}

/// 데이터셋별 오케스트레이터를 구성합니다.
fn build_hub(
    config: &AppConfig,
    store: Arc<dyn KeyValueStore>,
    market: &MarketContext,
) -> anyhow::Result<DatasetHub> {
    let seed = Arc::new(SeedCatalog::builtin());
    let settings = OrchestratorSettings::from_config(config);
    let timeout = Duration::from_secs(config.refresh.request_timeout_secs);

    let stocks = RefreshOrchestrator::new(
        DatasetKind::Stocks,
        OrchestratorDeps {
            store: Arc::clone(&store),
            seed: Arc::clone(&seed),
            provider: Arc::new(FinnhubProvider::new(timeout)?),
            tokens: Arc::new(TokenRotator::from_env(
                &FINNHUB_KEY_VARS,
                SelectionPolicy::RoundRobin,
            )),
            market: market.clone(),
        },
        settings.clone(),
    );

    let indicators = RefreshOrchestrator::new(
        DatasetKind::EconomicIndicators,
        OrchestratorDeps {
            store,
            seed,
            provider: Arc::new(FredProvider::new(timeout)?),
            tokens: Arc::new(TokenRotator::from_env(
                &FRED_KEY_VARS,
                SelectionPolicy::RoundRobin,
            )),
            market: market.clone(),
        },
        settings,
    );

    Ok(DatasetHub::new().with(stocks).with(indicators))
}

/// CORS 레이어 설정.
///
/// - `CORS_ORIGINS`: 쉼표로 구분된 허용 origin 목록. 없으면 모두 허용
fn cors_layer() -> CorsLayer {
    let allow_origin = match std::env::var("CORS_ORIGINS") {
        Ok(origins) if !origins.is_empty() => {
            let origins: Vec<_> = origins
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();

            if origins.is_empty() {
                warn!("CORS_ORIGINS is set but contains no valid origins, allowing any");
                AllowOrigin::any()
            } else {
                info!("CORS configured with {} allowed origins", origins.len());
                AllowOrigin::list(origins)
            }
        }
        _ => {
            warn!("CORS_ORIGINS not set, allowing any origin (development mode)");
            AllowOrigin::any()
        }
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

fn create_app(state: Arc<AppState>, request_timeout: Duration) -> Router {
    create_api_router()
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(cors_layer())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env 파일 로드 (있는 경우)
    let _ = dotenvy::dotenv();

    let config = AppConfig::load_default()?;
    init_logging(LogConfig::from_settings(&config.logging))
        .map_err(|e| anyhow::anyhow!("logging init failed: {}", e))?;

    info!("Starting quote API server...");

    let calendar = ExchangeCalendar::from_config(&config.calendar)?;
    let market = MarketContext::new(Arc::new(calendar), Arc::new(SystemClock));
    info!(
        timezone = market.timezone_name(),
        is_market_open = market.is_market_open(),
        "Market calendar loaded"
    );

    let store = build_store(&config.cache).await?;
    let hub = build_hub(&config, store, &market)?;

    let admin_key = AppState::admin_key_from_env();
    if admin_key.is_none() {
        warn!("ADMIN_SECRET_KEY not set, admin endpoints will reject every request");
    }

    let state = Arc::new(AppState::new(hub.clone(), market, admin_key));
    info!(version = %state.version, datasets = ?hub.datasets(), "Application state initialized");

    let app = create_app(
        state,
        Duration::from_secs(config.server.request_timeout_secs),
    );

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("invalid server.host/server.port")?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown initiated, waiting for refresh tasks...");
    if tokio::time::timeout(Duration::from_secs(10), hub.wait_idle())
        .await
        .is_err()
    {
        warn!("Refresh tasks still running, forcing shutdown");
    }

    info!("Server stopped gracefully");
    Ok(())
}

/// Ctrl+C 또는 SIGTERM 대기.
async fn shutdown_signal() {
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
}
