//! Finnhub 시세 API.
//!
//! `GET /api/v1/quote?symbol=<SYMBOL>` + `X-Finnhub-Token` 헤더.
//! 응답의 `c`(현재가), `dp`(변동률 %)를 사용합니다.

use async_trait::async_trait;
use quote_core::LiveQuote;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{ProviderError, QuoteProvider};
use crate::token::Credential;

const DEFAULT_BASE_URL: &str = "https://finnhub.io";

/// Finnhub quote 응답.
#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    /// 현재가
    #[serde(default)]
    c: f64,
    /// 변동률 (%)
    #[serde(default)]
    dp: Option<f64>,
    /// 전일 종가
    #[serde(default)]
    pc: f64,
    /// 타임스탬프 (초)
    #[serde(default)]
    t: i64,
}

/// Finnhub 클라이언트.
#[derive(Debug, Clone)]
pub struct FinnhubProvider {
    client: reqwest::Client,
    base_url: String,
}

impl FinnhubProvider {
    /// 기본 엔드포인트로 생성합니다.
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

    /// 엔드포인트를 지정해 생성합니다.
    pub fn with_base_url(base_url: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::from_reqwest)?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl QuoteProvider for FinnhubProvider {
    fn name(&self) -> &str {
        "finnhub"
    }

    #[instrument(skip(self, credential), fields(provider = "finnhub"))]
    async fn fetch_quote(
        &self,
        symbol: &str,
        credential: &Credential<'_>,
    ) -> Result<LiveQuote, ProviderError> {
        let url = format!("{}/api/v1/quote", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol)])
            .header("X-Finnhub-Token", credential.expose())
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        match status {
            StatusCode::TOO_MANY_REQUESTS => return Err(ProviderError::RateLimited),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Unauthorized(body));
            }
            s if !s.is_success() => {
                let body = response.text().await.unwrap_or_default();
                return Err(ProviderError::Http {
                    status: s.as_u16(),
                    message: body,
                });
            }
            _ => {}
        }

        let quote: FinnhubQuote = response.json().await.map_err(ProviderError::from_reqwest)?;

        // 알 수 없는 심볼은 200 + 전부 0으로 응답
        if quote.c == 0.0 && quote.t == 0 {
            return Err(ProviderError::NoData(symbol.to_string()));
        }

        let change_percent = match quote.dp {
            Some(dp) => dp,
            None if quote.pc != 0.0 => (quote.c - quote.pc) / quote.pc * 100.0,
            None => 0.0,
        };

        debug!(symbol, current = quote.c, change_percent, "Finnhub 시세 수신");

        Ok(LiveQuote::new(quote.c, change_percent))
    }
}
