//! 업스트림 시세 제공자.
//!
//! 제공자는 "심볼 + API 키 → 현재값/변동률 또는 실패"만 책임집니다.
//! 요청 한도와 인증 실패는 [`ProviderError::triggers_rotation`]으로 구분되어
//! 호출자가 다음 키로 넘어가게 합니다.

pub mod finnhub;
pub mod fred;

pub use finnhub::FinnhubProvider;
pub use fred::FredProvider;

use async_trait::async_trait;
use quote_core::LiveQuote;
use thiserror::Error;

use crate::token::Credential;

/// 업스트림 요청 실패.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// 요청 한도 초과 (429)
    #[error("Rate limit exceeded")]
    RateLimited,

    /// 인증 실패 (401/403, 잘못된 키)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 기타 HTTP 오류
    #[error("HTTP error {status}: {message}")]
    Http { status: u16, message: String },

    /// 네트워크/연결 오류
    #[error("Network error: {0}")]
    Network(String),

    /// 요청 타임아웃
    #[error("Request timeout: {0}")]
    Timeout(String),

    /// 응답 파싱 오류
    #[error("Parse error: {0}")]
    Parse(String),

    /// 응답에 값이 없음 (알 수 없는 심볼 등)
    #[error("No data for symbol: {0}")]
    NoData(String),
}

impl ProviderError {
    /// 다음 API 키로 순환해야 하는 오류인지 확인.
    pub fn triggers_rotation(&self) -> bool {
        matches!(
            self,
            ProviderError::RateLimited | ProviderError::Unauthorized(_)
        )
    }

    /// reqwest 오류 분류.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(err.to_string())
        } else if err.is_decode() {
            ProviderError::Parse(err.to_string())
        } else {
            ProviderError::Network(err.to_string())
        }
    }
}

/// 시세 제공자.
#[async_trait]
pub trait QuoteProvider: Send + Sync {
    /// 제공자 이름 (로그용).
    fn name(&self) -> &str;

    /// 심볼 하나의 현재값과 변동률을 조회합니다.
    async fn fetch_quote(
        &self,
        symbol: &str,
        credential: &Credential<'_>,
    ) -> Result<LiveQuote, ProviderError>;
}
