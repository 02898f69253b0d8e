//! FRED (St. Louis Fed) 경제 지표 API.
//!
//! 최근 1년 관측치를 받아 마지막 두 개의 수치 관측치로 현재값과 변동률을 계산합니다.
//! 결측치는 `"."`로 내려오므로 건너뜁니다. 최신 관측 일자와 시리즈 단위를 붙인 표시 값도 함께 반환합니다.

use async_trait::async_trait;
use chrono::{Months, NaiveDate, Utc};
use quote_core::{IndicatorUnit, LiveQuote};
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

use super::{ProviderError, QuoteProvider};
use crate::token::Credential;

const DEFAULT_BASE_URL: &str = "https://api.stlouisfed.org";

#[derive(Debug, Deserialize)]
struct ObservationsResponse {
    #[serde(default)]
    observations: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    #[serde(default)]
    date: String,
    value: String,
}

/// 최신 수치 관측치.
#[derive(Debug, PartialEq)]
struct Latest {
    value: f64,
    change_percent: f64,
    date: Option<NaiveDate>,
}

/// FRED 클라이언트.
#[derive(Debug, Clone)]
pub struct FredProvider {
    client: reqwest::Client,
    base_url: String,
}

impl FredProvider {
    pub fn new(timeout: Duration) -> Result<Self, ProviderError> {
        Self::with_base_url(DEFAULT_BASE_URL, timeout)
    }

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

    fn window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
        let start = today.checked_sub_months(Months::new(12)).unwrap_or(today);
        (start, today)
    }
}

/// 관측치 목록에서 최신값, 변동률, 관측 일자를 계산합니다.
fn latest_change(observations: &[Observation]) -> Option<Latest> {
    let mut numeric = observations.iter().rev().filter_map(|o| {
        o.value
            .trim()
            .parse::<f64>()
            .ok()
            .map(|value| (value, o.date.as_str()))
    });

    let (value, date) = numeric.next()?;
    let change_percent = match numeric.next() {
        Some((previous, _)) if previous != 0.0 => (value - previous) / previous * 100.0,
        _ => 0.0,
    };
    Some(Latest {
        value,
        change_percent,
        date: NaiveDate::parse_from_str(date, "%Y-%m-%d").ok(),
    })
}

#[async_trait]
impl QuoteProvider for FredProvider {
    fn name(&self) -> &str {
        "fred"
    }

    #[instrument(skip(self, credential), fields(provider = "fred"))]
    async fn fetch_quote(
        &self,
        symbol: &str,
        credential: &Credential<'_>,
    ) -> Result<LiveQuote, ProviderError> {
        let (start, end) = Self::window(Utc::now().date_naive());
        let url = format!("{}/fred/series/observations", self.base_url);
        let start = start.format("%Y-%m-%d").to_string();
        let end = end.format("%Y-%m-%d").to_string();

        let response = self
            .client
            .get(&url)
            .query(&[
                ("series_id", symbol),
                ("api_key", credential.expose()),
                ("file_type", "json"),
                ("observation_start", start.as_str()),
                ("observation_end", end.as_str()),
            ])
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ProviderError::RateLimited);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            // 잘못된 키는 400 + "api_key" 메시지로 응답
            if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
                || (status == StatusCode::BAD_REQUEST && body.contains("api_key"))
            {
                return Err(ProviderError::Unauthorized(body));
            }
            return Err(ProviderError::Http {
                status: status.as_u16(),
                message: body,
            });
        }

        let payload: ObservationsResponse =
            response.json().await.map_err(ProviderError::from_reqwest)?;
        let latest = latest_change(&payload.observations)
            .ok_or_else(|| ProviderError::NoData(symbol.to_string()))?;

        debug!(
            series = symbol,
            current_value = latest.value,
            change_percent = latest.change_percent,
            date = ?latest.date,
            "FRED 관측치 수신"
        );

        Ok(LiveQuote {
            observed_on: latest.date,
            display_value: Some(IndicatorUnit::for_series(symbol).format(latest.value)),
            ..LiveQuote::new(latest.value, latest.change_percent)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token::{SelectionPolicy, TokenRotator};
    use mockito::Matcher;

    fn obs(values: &[&str]) -> Vec<Observation> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| Observation {
                date: format!("2025-0{}-01", i + 1),
                value: v.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_latest_change_skips_missing() {
        let latest = latest_change(&obs(&["4.0", "5.0", "."])).unwrap();
        assert_eq!(latest.value, 5.0);
        assert!((latest.change_percent - 25.0).abs() < 1e-9);
        // 결측 관측치의 일자가 아니라 마지막 수치 관측치의 일자
        assert_eq!(latest.date, NaiveDate::from_ymd_opt(2025, 2, 1));

        let latest = latest_change(&obs(&["4.2"])).unwrap();
        assert_eq!(latest.value, 4.2);
        assert_eq!(latest.change_percent, 0.0);

        assert!(latest_change(&obs(&[".", "."])).is_none());
    }

    #[test]
    fn test_window_is_one_year() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let (start, end) = FredProvider::window(today);
        assert_eq!(start, NaiveDate::from_ymd_opt(2024, 6, 2).unwrap());
        assert_eq!(end, today);
    }

    #[tokio::test]
    async fn test_fetch_observations() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/fred/series/observations")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("series_id".into(), "UNRATE".into()),
                Matcher::UrlEncoded("api_key".into(), "fred-key".into()),
                Matcher::UrlEncoded("file_type".into(), "json".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"observations":[
                    {"date":"2025-03-01","value":"4.2"},
                    {"date":"2025-04-01","value":"4.0"},
                    {"date":"2025-05-01","value":"."}
                ]}"#,
            )
            .create_async()
            .await;

        let provider =
            FredProvider::with_base_url(server.url(), Duration::from_secs(5)).unwrap();
        let tokens = TokenRotator::new(["fred-key"], SelectionPolicy::RoundRobin);
        let quote = provider
            .fetch_quote("UNRATE", &tokens.current().unwrap())
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(quote.current_value, 4.0);
        assert!((quote.change_percent - (-0.2 / 4.2 * 100.0)).abs() < 1e-9);
        assert_eq!(quote.observed_on, NaiveDate::from_ymd_opt(2025, 4, 1));
        assert_eq!(quote.display_value.as_deref(), Some("4%"));
    }

    #[tokio::test]
    async fn test_bad_api_key_is_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/fred/series/observations")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error_code":400,"error_message":"Bad Request.  The value for variable api_key is not registered."}"#)
            .create_async()
            .await;

        let provider =
            FredProvider::with_base_url(server.url(), Duration::from_secs(5)).unwrap();
        let tokens = TokenRotator::new(["bad"], SelectionPolicy::RoundRobin);
        let err = provider
            .fetch_quote("GDP", &tokens.current().unwrap())
            .await
            .unwrap_err();
        assert!(err.triggers_rotation());
    }

    #[tokio::test]
    async fn test_empty_observations_is_no_data() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/fred/series/observations")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"observations":[]}"#)
            .create_async()
            .await;

        let provider =
            FredProvider::with_base_url(server.url(), Duration::from_secs(5)).unwrap();
        let tokens = TokenRotator::new(["fred-key"], SelectionPolicy::RoundRobin);
        let err = provider
            .fetch_quote("GDP", &tokens.current().unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::NoData(_)));
    }
}
