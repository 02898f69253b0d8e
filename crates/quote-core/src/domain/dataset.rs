//! 데이터셋 이름 정의.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// 프록시가 제공하는 논리 데이터셋.
///
/// 데이터셋마다 별도의 캐시 항목, 업데이트 상태, 시드 테이블, 업스트림 제공자를 가집니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DatasetKind {
    /// 주식 시세
    Stocks,
    /// 경제 지표
    EconomicIndicators,
}

impl DatasetKind {
    /// 모든 데이터셋.
    pub fn all() -> [DatasetKind; 2] {
        [DatasetKind::Stocks, DatasetKind::EconomicIndicators]
    }

    /// 저장소 키 및 URL에 쓰는 이름.
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetKind::Stocks => "stocks",
            DatasetKind::EconomicIndicators => "economic-indicators",
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "stocks" => Ok(DatasetKind::Stocks),
            "economic-indicators" | "economic_indicators" | "indicators" => {
                Ok(DatasetKind::EconomicIndicators)
            }
            _ => Err(CoreError::InvalidDataset(s.to_string())),
        }
    }
}
