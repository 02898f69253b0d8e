//! 데이터 모듈 오류 타입.

use thiserror::Error;

/// 캐시/새로고침 관련 오류.
#[derive(Debug, Error)]
pub enum DataError {
    /// 저장소 읽기/쓰기 오류
    #[error("Store error: {0}")]
    Store(String),

    /// 직렬화/역직렬화 오류
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 사용 가능한 API 키 없음
    #[error("No upstream credentials available")]
    NoCredentialsAvailable,

    /// 모든 API 키가 요청 한도/인증 오류로 실패
    #[error("All {count} upstream credentials exhausted")]
    CredentialsExhausted { count: usize },

    /// 등록되지 않은 데이터셋
    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    /// 시드 테이블 없음
    #[error("Seed table missing for dataset: {0}")]
    MissingSeed(String),

    /// 설정 오류
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<redis::RedisError> for DataError {
    fn from(err: redis::RedisError) -> Self {
        DataError::Store(err.to_string())
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for DataError {
    fn from(err: std::io::Error) -> Self {
        DataError::Store(err.to_string())
    }
}

impl From<quote_core::CoreError> for DataError {
    fn from(err: quote_core::CoreError) -> Self {
        match err {
            quote_core::CoreError::InvalidDataset(name) => DataError::UnknownDataset(name),
            other => DataError::Config(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
