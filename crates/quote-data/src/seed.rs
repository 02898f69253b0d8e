//! 데이터셋별 정적 시드 테이블.
//!
//! 캐시가 전혀 없을 때 즉시 응답할 수 있도록 심볼, 섹터, 표시 이름, 기준 고점과
//! 마지막으로 알려진 값을 담고 있습니다. 실시간 값은 새로고침이 덮어씁니다.

use quote_core::{DatasetKind, IndicatorUnit, LocalizedString, Record};
use std::collections::HashMap;

use crate::error::{DataError, Result};

/// 데이터셋 이름으로 조회하는 시드 카탈로그.
#[derive(Debug, Clone, Default)]
pub struct SeedCatalog {
    tables: HashMap<DatasetKind, Vec<Record>>,
}

impl SeedCatalog {
    /// 빈 카탈로그.
    pub fn new() -> Self {
        Self::default()
    }

    /// 내장 시드 테이블 (나스닥 대형주 + FRED 주요 지표).
    pub fn builtin() -> Self {
        Self::new()
            .with_dataset(DatasetKind::Stocks, builtin_stocks())
            .with_dataset(DatasetKind::EconomicIndicators, builtin_indicators())
    }

    /// 데이터셋 시드를 등록합니다. 기존 항목은 교체됩니다.
    pub fn with_dataset(mut self, kind: DatasetKind, records: Vec<Record>) -> Self {
        self.tables.insert(kind, records);
        self
    }

    /// 데이터셋 시드.
    pub fn get(&self, kind: DatasetKind) -> Result<&[Record]> {
        self.tables
            .get(&kind)
            .map(Vec::as_slice)
            .ok_or_else(|| DataError::MissingSeed(kind.to_string()))
    }
}

fn stock(symbol: &str, ko: &str, en: &str, sector: &str, value: f64, high: f64) -> Record {
    Record::seed(symbol, sector, LocalizedString::new(ko, en), value, high)
}

fn builtin_stocks() -> Vec<Record> {
    vec![
        stock("QQQ", "인베스코 QQQ", "Invesco QQQ Trust", "ETF", 521.0, 540.8),
        stock("VOO", "뱅가드 S&P 500", "Vanguard S&P 500 ETF", "ETF", 545.0, 563.9),
        stock("AAPL", "애플", "Apple", "Technology", 203.0, 260.1),
        stock("NVDA", "엔비디아", "NVIDIA", "Semiconductors", 135.0, 153.1),
        stock("MSFT", "마이크로소프트", "Microsoft", "Technology", 460.0, 468.4),
        stock("GOOG", "알파벳", "Alphabet", "Communication", 171.0, 208.7),
        stock("AMZN", "아마존", "Amazon", "Consumer Discretionary", 205.0, 242.5),
        stock("META", "메타", "Meta Platforms", "Communication", 670.0, 740.9),
        stock("AVGO", "브로드컴", "Broadcom", "Semiconductors", 245.0, 251.9),
        stock("TSLA", "테슬라", "Tesla", "Consumer Discretionary", 342.0, 488.5),
        stock("COST", "코스트코", "Costco", "Consumer Staples", 1010.0, 1078.2),
        stock("ASML", "ASML", "ASML Holding", "Semiconductors", 740.0, 1110.1),
        stock("NFLX", "넷플릭스", "Netflix", "Communication", 1200.0, 1214.4),
        stock("AZN", "아스트라제네카", "AstraZeneca", "Healthcare", 72.0, 87.7),
        stock("AMD", "AMD", "Advanced Micro Devices", "Semiconductors", 115.0, 227.3),
        stock("ADBE", "어도비", "Adobe", "Technology", 415.0, 587.8),
        stock("QCOM", "퀄컴", "Qualcomm", "Semiconductors", 155.0, 230.6),
    ]
}

fn indicator(series: &str, ko: &str, en: &str, category: &str, value: f64) -> Record {
    // 지표는 기준 고점이 없음
    Record::seed(series, category, LocalizedString::new(ko, en), value, 0.0)
        .with_display_value(IndicatorUnit::for_series(series).format(value))
}

fn builtin_indicators() -> Vec<Record> {
    vec![
        indicator("GDP", "국내총생산", "Gross Domestic Product (GDP)", "Growth", 29_962.0),
        indicator("UNRATE", "실업률", "Unemployment Rate", "Labor", 4.2),
        indicator(
            "CPIAUCSL",
            "소비자물가지수",
            "CPI: All Items in U.S. City Average",
            "Inflation",
            320.3,
        ),
        indicator("DFF", "연방기금 실효금리", "Effective Federal Funds Rate", "Rates", 4.33),
        indicator("INDPRO", "산업생산지수", "Industrial Production Index", "Production", 103.9),
        indicator("PAYEMS", "비농업 고용", "Nonfarm Payrolls", "Labor", 159_561.0),
        indicator(
            "DGS10",
            "10년 만기 국채 수익률",
            "10-Year Treasury Constant Maturity Rate",
            "Rates",
            4.4,
        ),
        indicator("M2SL", "M2 통화량", "M2 Money Stock", "Money", 21_862.0),
        indicator("RSAFS", "소매판매", "Retail Sales", "Consumption", 724_131.0),
        indicator(
            "BAA10YM",
            "Baa 회사채 - 10년 국채 스프레드",
            "Moody's Baa Corporate Bond Yield Relative to 10-Year Treasury Yield",
            "Credit",
            1.85,
        ),
        indicator("HOUST", "주택 착공", "Housing Starts", "Housing", 1_361.0),
        indicator(
            "CES0500000003",
            "평균 시간당 임금",
            "Average Hourly Earnings of All Employees",
            "Wages",
            36.06,
        ),
        indicator(
            "A191RL1Q225SBEA",
            "실질 GDP 성장률",
            "Real Gross Domestic Product",
            "Growth",
            -0.3,
        ),
    ]
}
