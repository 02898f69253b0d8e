//! 요청 처리기에 노출되는 응답/보고서 타입.

use chrono::{DateTime, Utc};
use quote_core::{DatasetKind, Record};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

use crate::error::DataError;
use crate::update_state::UpdateState;

/// 데이터셋 응답.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetResponse {
    pub items: Vec<Record>,
    pub update_status: UpdateStatus,
}

/// 새로고침 상태 요약.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatus {
    pub is_market_open: bool,
    pub has_completed_initial_update: bool,
    pub is_background_update_in_progress: bool,
    /// 응답 레코드 중 가장 최근 실시간 갱신 시각 (epoch millis)
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_update_time: Option<DateTime<Utc>>,
}

/// 관리자 캐시 삭제 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearMode {
    /// 영속/메모리 캐시만 삭제
    Cache,
    /// 캐시 삭제 + 업데이트 상태 초기화
    Full,
    /// 방어적 리셋 실행
    Defensive,
}

impl ClearMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClearMode::Cache => "cache",
            ClearMode::Full => "full",
            ClearMode::Defensive => "defensive",
        }
    }
}

impl fmt::Display for ClearMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClearMode {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cache" => Ok(ClearMode::Cache),
            "full" => Ok(ClearMode::Full),
            "defensive" => Ok(ClearMode::Defensive),
            other => Err(DataError::Config(format!(
                "invalid reset type '{}'. Use: cache, full, or defensive",
                other
            ))),
        }
    }
}

/// 캐시 삭제 결과.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearReport {
    /// 삭제/초기화된 항목 (`<dataset>:<item>`)
    pub cleared_items: Vec<String>,
}

impl ClearReport {
    pub fn push(&mut self, dataset: DatasetKind, item: &str) {
        self.cleared_items.push(format!("{}:{}", dataset, item));
    }

    pub fn extend(&mut self, other: ClearReport) {
        self.cleared_items.extend(other.cleared_items);
    }
}

/// 메모리 캐시 요약.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryCacheSummary {
    pub item_count: usize,
    pub fetched_at: Option<DateTime<Utc>>,
    pub is_fresh: bool,
}

/// 영속 캐시 요약.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCacheSummary {
    pub item_count: usize,
    pub timestamp: DateTime<Utc>,
    pub age_secs: i64,
    pub is_expired: bool,
}

/// 운영 점검용 캐시 상태 보고서.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheDebugReport {
    pub dataset: DatasetKind,
    pub backend: &'static str,
    pub cache_key: String,
    pub is_market_open: bool,
    pub ttl_secs: i64,
    pub memory: Option<MemoryCacheSummary>,
    pub persisted: Option<PersistedCacheSummary>,
    pub update_state: UpdateState,
    pub reset_threshold: u64,
    pub credentials: usize,
    pub refresh_running: bool,
}
