//! 데이터셋 endpoint.
//!
//! # 엔드포인트
//!
//! - `GET /api/v1/datasets` - 제공 중인 데이터셋 목록
//! - `GET /api/v1/datasets/{name}` - 데이터셋 조회 (캐시 우선, 새로고침은 기다리지 않음)

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use quote_data::DatasetResponse;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::error::{data_error, ApiResult};
use crate::state::AppState;

/// 데이터셋 목록 응답.
#[derive(Debug, Serialize, Deserialize)]
pub struct DatasetListResponse {
    pub datasets: Vec<String>,
}

/// 데이터셋 목록.
///
/// GET /api/v1/datasets
pub async fn list_datasets(State(state): State<Arc<AppState>>) -> Json<DatasetListResponse> {
    Json(DatasetListResponse {
        datasets: state
            .hub
            .datasets()
            .iter()
            .map(|d| d.to_string())
            .collect(),
    })
}

/// 데이터셋 조회.
///
/// GET /api/v1/datasets/{name}
pub async fn get_dataset(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> ApiResult<Json<DatasetResponse>> {
    let response = state.hub.get_dataset(&name).await.map_err(data_error)?;
    debug!(
        dataset = %name,
        count = response.items.len(),
        in_progress = response.update_status.is_background_update_in_progress,
        "데이터셋 응답"
    );
    Ok(Json(response))
}

/// 데이터셋 라우터 생성.
pub fn dataset_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_datasets))
        .route("/{name}", get(get_dataset))
}
