//! 통합 API 에러 응답 타입.
//!
//! 모든 엔드포인트가 같은 JSON 에러 형식을 씁니다.

use axum::http::StatusCode;
use axum::Json;
use quote_data::DataError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

/// 통합 API 에러 응답.
///
/// ```json
/// {
///   "code": "DATASET_NOT_FOUND",
///   "message": "알 수 없는 데이터셋: crypto",
///   "timestamp": 1738300800
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    /// 에러 코드 (예: "INVALID_INPUT", "FORBIDDEN")
    pub code: String,
    /// 사람이 읽을 수 있는 에러 메시지
    pub message: String,
    /// 추가 상세 정보
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// 에러 발생 시각 (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl ApiErrorResponse {
    /// 타임스탬프 포함 에러 생성.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            details: None,
            timestamp: Some(chrono::Utc::now().timestamp()),
        }
    }

    /// 상세 정보 포함 에러 생성.
    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: Value,
    ) -> Self {
        Self {
            details: Some(details),
            ..Self::new(code, message)
        }
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ApiErrorResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiErrorResponse {}

/// API 핸들러 Result 타입 별칭.
pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiErrorResponse>)>;

/// 상태 코드와 에러 본문을 묶습니다.
pub fn api_error(
    status: StatusCode,
    code: &str,
    message: impl Into<String>,
) -> (StatusCode, Json<ApiErrorResponse>) {
    (status, Json(ApiErrorResponse::new(code, message)))
}

/// 데이터 계층 에러를 HTTP 응답으로 변환합니다.
///
/// 업스트림 개별 실패는 여기까지 올라오지 않습니다. API 키가 없으면 503입니다.
pub fn data_error(err: DataError) -> (StatusCode, Json<ApiErrorResponse>) {
    match err {
        DataError::UnknownDataset(name) => api_error(
            StatusCode::NOT_FOUND,
            "DATASET_NOT_FOUND",
            format!("알 수 없는 데이터셋: {}", name),
        ),
        DataError::Config(message) => api_error(StatusCode::BAD_REQUEST, "INVALID_INPUT", message),
        DataError::NoCredentialsAvailable => api_error(
            StatusCode::SERVICE_UNAVAILABLE,
            "NO_CREDENTIALS",
            "No upstream API keys configured",
        ),
        other => {
            error!(error = %other, "데이터 계층 오류");
            api_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                other.to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_error_response_new() {
        let error = ApiErrorResponse::new("TEST_ERROR", "Test message");
        assert_eq!(error.code(), "TEST_ERROR");
        assert_eq!(error.message(), "Test message");
        assert!(error.timestamp.is_some());
        assert!(error.details.is_none());
    }

    #[test]
    fn test_json_skips_empty_details() {
        let error = ApiErrorResponse::new("NOT_FOUND", "Resource not found");
        let json = serde_json::to_string(&error).unwrap();
        assert!(!json.contains("details"));
        assert!(json.contains(r#""code":"NOT_FOUND""#));

        let detailed = ApiErrorResponse::with_details(
            "INVALID_INPUT",
            "bad",
            serde_json::json!({"field": "type"}),
        );
        assert_eq!(detailed.details.unwrap()["field"], "type");
    }

    #[test]
    fn test_data_error_status_mapping() {
        let (status, body) = data_error(DataError::UnknownDataset("crypto".into()));
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.code, "DATASET_NOT_FOUND");

        let (status, _) = data_error(DataError::Config("invalid reset type".into()));
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = data_error(DataError::NoCredentialsAvailable);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body.code, "NO_CREDENTIALS");

        let (status, body) = data_error(DataError::MissingSeed("stocks".into()));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.code, "INTERNAL_ERROR");
    }
}
