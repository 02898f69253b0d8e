//! 관리자 캐시 endpoint.
//!
//! 모든 요청은 `?key=` 쿼리로 `ADMIN_SECRET_KEY`와 일치하는 키를 보내야 합니다.
//!
//! # 엔드포인트
//!
//! - `POST /api/v1/admin/clear-cache?key=&type=cache|full|defensive[&dataset=]`
//! - `GET /api/v1/admin/cache-debug?key=[&dataset=]`
//! - `GET /api/v1/admin/test-provider?key=[&dataset=stocks&symbol=&type=single|multi|sequential&count=5]`

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use quote_core::DatasetKind;
use quote_data::{CacheDebugReport, ClearMode, DiagnosticMode, DiagnosticReport};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{api_error, data_error, ApiResult};
use crate::state::AppState;

/// 관리자 쿼리 파라미터.
#[derive(Debug, Default, Deserialize)]
pub struct AdminQuery {
    /// 관리자 키
    pub key: Option<String>,
    /// 삭제 방식 (기본값 cache)
    #[serde(rename = "type")]
    pub mode: Option<String>,
    /// 대상 데이터셋 (생략 시 전체)
    pub dataset: Option<String>,
}

/// 제공자 진단 쿼리 파라미터.
#[derive(Debug, Default, Deserialize)]
pub struct ProviderTestQuery {
    pub key: Option<String>,
    /// 대상 데이터셋 (기본값 stocks)
    pub dataset: Option<String>,
    /// 조회할 심볼 (생략 시 시드 테이블의 첫 심볼)
    pub symbol: Option<String>,
    /// 진단 방식 (기본값 single)
    #[serde(rename = "type")]
    pub mode: Option<String>,
    /// sequential 호출 횟수 (기본값 5)
    pub count: Option<usize>,
}

/// 캐시 삭제 응답.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearCacheResponse {
    pub success: bool,
    pub message: String,
    /// 처리 시각 (epoch millis)
    pub timestamp: i64,
    pub cleared_items: Vec<String>,
}

/// 캐시 상태 응답.
#[derive(Debug, Serialize)]
pub struct CacheDebugResponse {
    pub datasets: Vec<CacheDebugReport>,
}

/// 로그용으로 키 앞 4자만 남깁니다.
fn mask_key(key: &str) -> String {
    let prefix: String = key.chars().take(4).collect();
    format!("{}***", prefix)
}

/// 관리자 키 검증.
fn authorize(state: &AppState, provided: Option<&str>) -> ApiResult<()> {
    let Some(expected) = state.admin_key.as_ref() else {
        return Err(api_error(
            StatusCode::INTERNAL_SERVER_ERROR,
            "ADMIN_NOT_CONFIGURED",
            "Admin secret key not configured",
        ));
    };

    let provided = match provided {
        Some(key) if !key.is_empty() => key,
        _ => {
            return Err(api_error(
                StatusCode::BAD_REQUEST,
                "ADMIN_KEY_REQUIRED",
                "Admin key required. Use ?key=YOUR_ADMIN_KEY",
            ))
        }
    };

    if provided != expected.expose_secret() {
        warn!(key = %mask_key(provided), "잘못된 관리자 키로 접근 시도");
        return Err(api_error(
            StatusCode::FORBIDDEN,
            "FORBIDDEN",
            "Invalid admin key",
        ));
    }

    Ok(())
}

fn parse_dataset(name: Option<&str>) -> ApiResult<Option<DatasetKind>> {
    match name {
        None | Some("") => Ok(None),
        Some(name) => name.parse().map(Some).map_err(|_| {
            api_error(
                StatusCode::BAD_REQUEST,
                "INVALID_INPUT",
                format!("Unknown dataset: {}", name),
            )
        }),
    }
}

/// 캐시 삭제.
///
/// POST /api/v1/admin/clear-cache
pub async fn clear_cache(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> ApiResult<Json<ClearCacheResponse>> {
    authorize(&state, query.key.as_deref())?;

    let mode: ClearMode = query
        .mode
        .as_deref()
        .unwrap_or("cache")
        .parse()
        .map_err(data_error)?;
    let dataset = parse_dataset(query.dataset.as_deref())?;

    info!(mode = %mode, dataset = ?dataset, "관리자 캐시 삭제 요청");
    let report = state
        .hub
        .clear_cache(mode, dataset)
        .await
        .map_err(data_error)?;

    Ok(Json(ClearCacheResponse {
        success: true,
        message: format!("Cache cleared successfully ({} mode)", mode),
        timestamp: state.market.now().timestamp_millis(),
        cleared_items: report.cleared_items,
    }))
}

/// 캐시 상태 조회.
///
/// GET /api/v1/admin/cache-debug
pub async fn cache_debug(
    State(state): State<Arc<AppState>>,
    Query(query): Query<AdminQuery>,
) -> ApiResult<Json<CacheDebugResponse>> {
    authorize(&state, query.key.as_deref())?;
    let dataset = parse_dataset(query.dataset.as_deref())?;

    let datasets = state
        .hub
        .read_cache_debug(dataset)
        .await
        .map_err(data_error)?;
    Ok(Json(CacheDebugResponse { datasets }))
}

/// 업스트림 제공자 키별 진단.
///
/// GET /api/v1/admin/test-provider
pub async fn test_provider(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ProviderTestQuery>,
) -> ApiResult<Json<DiagnosticReport>> {
    authorize(&state, query.key.as_deref())?;

    let mode: DiagnosticMode = query
        .mode
        .as_deref()
        .unwrap_or("single")
        .parse()
        .map_err(data_error)?;
    let dataset = parse_dataset(query.dataset.as_deref())?.unwrap_or(DatasetKind::Stocks);
    let symbol = query.symbol.as_deref().filter(|s| !s.is_empty());

    info!(dataset = %dataset, symbol = ?symbol, mode = %mode, "관리자 제공자 진단 요청");
    let report = state
        .hub
        .diagnose_provider(dataset, symbol, mode, query.count.unwrap_or(5))
        .await
        .map_err(data_error)?;
    Ok(Json(report))
}

/// 관리자 라우터 생성.
pub fn admin_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/clear-cache", post(clear_cache))
        .route("/cache-debug", get(cache_debug))
        .route("/test-provider", get(test_provider))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::create_test_state;
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    fn app(admin_key: Option<&str>) -> Router {
        Router::new()
            .nest("/api/v1/admin", admin_router())
            .with_state(Arc::new(create_test_state(admin_key)))
    }

    async fn send(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap_or_default())
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("supersecret"), "supe***");
        assert_eq!(mask_key("ab"), "ab***");
    }

    #[tokio::test]
    async fn test_admin_key_not_configured() {
        let (status, body) = send(app(None), "POST", "/api/v1/admin/clear-cache?key=x").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["code"], "ADMIN_NOT_CONFIGURED");
    }

    #[tokio::test]
    async fn test_admin_key_missing() {
        let (status, _) = send(app(Some("secret")), "POST", "/api/v1/admin/clear-cache").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_admin_key_invalid() {
        let (status, body) = send(
            app(Some("secret")),
            "POST",
            "/api/v1/admin/clear-cache?key=wrong",
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Invalid admin key");
    }

    #[tokio::test]
    async fn test_clear_cache_rejects_unknown_mode() {
        let (status, _) = send(
            app(Some("secret")),
            "POST",
            "/api/v1/admin/clear-cache?key=secret&type=everything",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_clear_cache_defaults_to_cache_mode() {
        let (status, body) = send(
            app(Some("secret")),
            "POST",
            "/api/v1/admin/clear-cache?key=secret&dataset=stocks",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["message"], "Cache cleared successfully (cache mode)");
        assert_eq!(
            body["clearedItems"],
            serde_json::json!(["stocks:persistent_cache", "stocks:memory_cache"])
        );
    }

    #[tokio::test]
    async fn test_clear_cache_full_covers_all_datasets() {
        let (status, body) = send(
            app(Some("secret")),
            "POST",
            "/api/v1/admin/clear-cache?key=secret&type=full",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let items = body["clearedItems"].as_array().unwrap();
        assert_eq!(items.len(), 6);
        assert!(items.contains(&serde_json::json!("economic-indicators:update_state")));
    }

    #[tokio::test]
    async fn test_cache_debug_rejects_unknown_dataset() {
        let (status, _) = send(
            app(Some("secret")),
            "GET",
            "/api/v1/admin/cache-debug?key=secret&dataset=crypto",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_cache_debug_reports_each_dataset() {
        let (status, body) = send(
            app(Some("secret")),
            "GET",
            "/api/v1/admin/cache-debug?key=secret",
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let datasets = body["datasets"].as_array().unwrap();
        assert_eq!(datasets.len(), 2);
        assert_eq!(datasets[0]["backend"], "memory");
        assert_eq!(datasets[0]["cacheKey"], "stocks");
    }

    #[tokio::test]
    async fn test_provider_requires_admin_key() {
        let (status, _) = send(
            app(Some("secret")),
            "GET",
            "/api/v1/admin/test-provider?key=wrong",
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_provider_rejects_unknown_type() {
        let (status, body) = send(
            app(Some("secret")),
            "GET",
            "/api/v1/admin/test-provider?key=secret&type=burst",
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_provider_without_credentials_is_unavailable() {
        let (status, body) = send(
            app(Some("secret")),
            "GET",
            "/api/v1/admin/test-provider?key=secret&type=multi&dataset=economic-indicators",
        )
        .await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "NO_CREDENTIALS");
    }
}
