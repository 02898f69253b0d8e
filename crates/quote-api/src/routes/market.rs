//! 시장 상태 endpoint.
//!
//! - `GET /api/v1/market/status` - 현재 정규장 개장 여부

use axum::{extract::State, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::state::AppState;

/// 시장 상태 응답.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketStatusResponse {
    /// 정규장 개장 여부
    pub is_market_open: bool,
    /// 마감 임박 여부
    pub is_near_close: bool,
    /// 현재 시각 (ISO 8601, UTC)
    pub current_time: String,
    /// 거래소 시간대
    pub timezone: String,
}

/// 시장 상태 조회.
///
/// GET /api/v1/market/status
pub async fn get_market_status(State(state): State<Arc<AppState>>) -> Json<MarketStatusResponse> {
    Json(MarketStatusResponse {
        is_market_open: state.market.is_market_open(),
        is_near_close: state.market.is_near_close(),
        current_time: state.market.now().to_rfc3339(),
        timezone: state.market.timezone_name().to_string(),
    })
}

/// 시장 라우터 생성.
pub fn market_router() -> Router<Arc<AppState>> {
    Router::new().route("/status", get(get_market_status))
}
