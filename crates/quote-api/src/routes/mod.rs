//! API 라우트.
//!
//! # 라우트 구조
//!
//! - `/health` - 헬스 체크 (liveness)
//! - `/health/ready` - 상세 헬스 체크 (readiness)
//! - `/api/v1/datasets` - 데이터셋 조회
//! - `/api/v1/market` - 시장 상태
//! - `/api/v1/admin` - 캐시 관리, 제공자 진단 (관리자 키 필요)

pub mod admin;
pub mod dataset;
pub mod health;
pub mod market;

pub use admin::{
    admin_router, AdminQuery, CacheDebugResponse, ClearCacheResponse, ProviderTestQuery,
};
pub use dataset::{dataset_router, DatasetListResponse};
pub use health::{health_router, HealthResponse};
pub use market::{market_router, MarketStatusResponse};

use axum::Router;
use std::sync::Arc;

use crate::state::AppState;

/// 전체 API 라우터 생성.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/health", health_router())
        .nest("/api/v1/datasets", dataset_router())
        .nest("/api/v1/market", market_router())
        .nest("/api/v1/admin", admin_router())
}
