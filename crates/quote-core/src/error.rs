//! 프록시 핵심 에러 타입.

use thiserror::Error;

/// 핵심 에러.
#[derive(Debug, Error)]
pub enum CoreError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 캘린더 에러 (시간대, 거래 시간 파싱 등)
    #[error("캘린더 에러: {0}")]
    Calendar(String),

    /// 알 수 없는 데이터셋 이름
    #[error("알 수 없는 데이터셋: {0}")]
    InvalidDataset(String),
}

/// 핵심 작업용 Result 타입.
pub type CoreResult<T> = Result<T, CoreError>;

impl From<config::ConfigError> for CoreError {
    fn from(err: config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}
