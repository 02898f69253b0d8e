//! 대시보드에 노출되는 레코드.
//!
//! 레코드는 정적 시드 테이블(심볼, 섹터, 표시 이름, 기준 고점)과
//! 업스트림에서 받은 실시간 필드(현재값, 변동률)를 합친 결과입니다.
//! 삭제되지 않으며, 실시간 조회가 성공할 때마다 필드 단위로 갱신됩니다.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 한국어/영어 표시 이름.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedString {
    pub ko: String,
    pub en: String,
}

impl LocalizedString {
    pub fn new(ko: impl Into<String>, en: impl Into<String>) -> Self {
        Self {
            ko: ko.into(),
            en: en.into(),
        }
    }
}

/// 업스트림에서 받은 실시간 값.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveQuote {
    /// 현재값 (주가, 지표 값)
    pub current_value: f64,
    /// 전일(직전 관측치) 대비 변동률 (%)
    pub change_percent: f64,
    /// 관측 일자 (지표)
    pub observed_on: Option<NaiveDate>,
    /// 단위를 붙인 표시 값 (지표)
    pub display_value: Option<String>,
}

impl LiveQuote {
    pub fn new(current_value: f64, change_percent: f64) -> Self {
        Self {
            current_value,
            change_percent,
            observed_on: None,
            display_value: None,
        }
    }
}

/// 시세/지표 레코드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// 심볼 또는 시리즈 ID (예: "AAPL", "UNRATE")
    pub symbol: String,
    /// 현재값
    pub current_value: f64,
    /// 변동률 (%)
    pub change_percent: f64,
    /// 기준 고점
    pub reference_high: f64,
    /// 기준 고점 대비 위치 (%)
    pub percent_from_reference_high: f64,
    /// 섹터 또는 지표 분류
    pub sector: String,
    /// 표시 이름
    pub display_name: LocalizedString,
    /// 마지막 실시간 갱신 시각 (시드 상태면 None)
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub last_updated: Option<DateTime<Utc>>,
    /// 지표 관측 일자 (`YYYY-MM-DD`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation_date: Option<NaiveDate>,
    /// 단위를 붙인 표시 값 (예: "4.2%")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_value: Option<String>,
}

impl Record {
    /// 시드 레코드 생성.
    pub fn seed(
        symbol: impl Into<String>,
        sector: impl Into<String>,
        display_name: LocalizedString,
        current_value: f64,
        reference_high: f64,
    ) -> Self {
        let mut record = Self {
            symbol: symbol.into(),
            current_value,
            change_percent: 0.0,
            reference_high,
            percent_from_reference_high: 0.0,
            sector: sector.into(),
            display_name,
            last_updated: None,
            observation_date: None,
            display_value: None,
        };
        record.percent_from_reference_high = record.calculate_percent_from_high();
        record
    }

    /// 표시 값을 붙입니다.
    pub fn with_display_value(mut self, display_value: impl Into<String>) -> Self {
        self.display_value = Some(display_value.into());
        self
    }

    /// 실시간 값을 반영합니다. 관측 일자와 표시 값은 제공자가 준 경우에만 바뀝니다.
    pub fn apply_quote(&mut self, quote: &LiveQuote, at: DateTime<Utc>) {
        self.current_value = quote.current_value;
        self.change_percent = quote.change_percent;
        if quote.observed_on.is_some() {
            self.observation_date = quote.observed_on;
        }
        if let Some(display) = &quote.display_value {
            self.display_value = Some(display.clone());
        }
        self.percent_from_reference_high = self.calculate_percent_from_high();
        self.last_updated = Some(at);
    }

    /// `window` 이내에 갱신된 레코드인지 확인.
    pub fn is_fresh(&self, now: DateTime<Utc>, window: Duration) -> bool {
        match self.last_updated {
            Some(at) => now - at < window,
            None => false,
        }
    }

    fn calculate_percent_from_high(&self) -> f64 {
        if self.reference_high == 0.0 {
            return 0.0;
        }
        (self.current_value - self.reference_high) / self.reference_high * 100.0
    }
}
