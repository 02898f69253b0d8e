//! 영속 데이터셋 캐시.
//!
//! 마지막으로 가져온 데이터셋 전체를 `{ "timestamp": <millis>, "data": [...] }` 형태로 저장합니다.
//! TTL은 **읽는 시점**의 시장 상태로 계산되므로, 같은 항목이 장중에는 만료되고
//! 장 마감 후에는 다시 유효할 수 있습니다.

use chrono::{DateTime, Utc};
use quote_core::{MarketContext, Record};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::error::Result;
use crate::store::{read_json, write_json, KeyValueStore};
use crate::ttl::TtlPolicy;

/// 저장된 데이터셋.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedDataset {
    /// 기록 시각
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// 레코드 목록
    #[serde(rename = "data")]
    pub items: Vec<Record>,
}

#[derive(Serialize)]
struct CachedDatasetRef<'a> {
    #[serde(with = "chrono::serde::ts_milliseconds")]
    timestamp: DateTime<Utc>,
    data: &'a [Record],
}

/// 데이터셋 하나의 영속 캐시.
pub struct DatasetCache {
    store: Arc<dyn KeyValueStore>,
    key: String,
    ttl: TtlPolicy,
    market: MarketContext,
}

impl DatasetCache {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        key: impl Into<String>,
        ttl: TtlPolicy,
        market: MarketContext,
    ) -> Self {
        Self {
            store,
            key: key.into(),
            ttl,
            market,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// TTL 이내의 데이터셋을 읽습니다.
    ///
    /// 항목이 없거나, 손상되었거나, 만료되었으면 `None`. 저장소 오류도 캐시 미스로 취급합니다.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn read(&self) -> Option<CachedDataset> {
        let cached = self.read_any().await?;
        let ttl = self.ttl.compute_ttl(self.market.is_market_open());
        let age = self.market.now() - cached.timestamp;

        if age >= ttl {
            debug!(
                age_secs = age.num_seconds(),
                ttl_secs = ttl.num_seconds(),
                "영속 캐시 만료"
            );
            return None;
        }

        Some(cached)
    }

    /// TTL과 관계없이 저장된 데이터셋을 읽습니다.
    pub async fn read_any(&self) -> Option<CachedDataset> {
        match read_json::<CachedDataset>(self.store.as_ref(), &self.key).await {
            Ok(cached) => cached,
            Err(e) => {
                warn!(key = %self.key, error = %e, "영속 캐시 읽기 실패, 미스로 처리");
                None
            }
        }
    }

    /// 데이터셋 전체를 현재 시각으로 기록합니다. 실패는 로그만 남깁니다.
    #[instrument(skip(self, items), fields(key = %self.key, count = items.len()))]
    pub async fn write(&self, items: &[Record]) {
        let payload = CachedDatasetRef {
            timestamp: self.market.now(),
            data: items,
        };

        if let Err(e) = write_json(self.store.as_ref(), &self.key, &payload).await {
            warn!(key = %self.key, error = %e, "영속 캐시 쓰기 실패");
        }
    }

    /// 저장된 데이터셋을 삭제합니다.
    pub async fn clear(&self) -> Result<bool> {
        self.store.delete(&self.key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};
    use quote_core::{Clock, LocalizedString, ManualClock, MarketCalendar};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FixedCalendar(AtomicBool);

    impl MarketCalendar for FixedCalendar {
        fn is_market_open(&self, _at: DateTime<Utc>) -> bool {
            self.0.load(Ordering::SeqCst)
        }
        fn is_near_close(&self, _at: DateTime<Utc>) -> bool {
            false
        }
    }

    fn records() -> Vec<Record> {
        vec![Record::seed(
            "AAPL",
            "Technology",
            LocalizedString::new("애플", "Apple"),
            200.0,
            250.0,
        )]
    }

    fn fixture(open: bool) -> (DatasetCache, Arc<ManualClock>, Arc<FixedCalendar>, Arc<MemoryStore>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 2, 14, 0, 0).unwrap(),
        ));
        let calendar = Arc::new(FixedCalendar(AtomicBool::new(open)));
        let store = Arc::new(MemoryStore::new());
        let cache = DatasetCache::new(
            store.clone(),
            "stocks",
            TtlPolicy::default(),
            MarketContext::new(calendar.clone(), clock.clone()),
        );
        (cache, clock, calendar, store)
    }

    #[tokio::test]
    async fn test_write_then_read_within_ttl() {
        let (cache, clock, _calendar, _store) = fixture(true);
        cache.write(&records()).await;

        clock.advance(Duration::minutes(4));
        let cached = cache.read().await.unwrap();
        assert_eq!(cached.items, records());
    }

    #[tokio::test]
    async fn test_expired_at_exact_ttl() {
        let (cache, clock, _calendar, _store) = fixture(true);
        cache.write(&records()).await;

        clock.advance(Duration::minutes(5));
        assert!(cache.read().await.is_none());
        // TTL 무시 읽기는 여전히 반환
        assert!(cache.read_any().await.is_some());
    }

    #[tokio::test]
    async fn test_ttl_uses_market_state_at_read_time() {
        let (cache, clock, calendar, _store) = fixture(true);
        cache.write(&records()).await;
        clock.advance(Duration::minutes(30));
        assert!(cache.read().await.is_none());

        // 장 마감 후에는 12시간 TTL 적용
        calendar.0.store(false, Ordering::SeqCst);
        assert!(cache.read().await.is_some());
    }

    #[tokio::test]
    async fn test_corrupt_entry_is_miss() {
        let (cache, _clock, _calendar, store) = fixture(false);
        store.put("stocks", "{\"timestamp\":").await.unwrap();
        assert!(cache.read().await.is_none());
    }

    #[tokio::test]
    async fn test_persisted_layout() {
        let (cache, clock, _calendar, store) = fixture(false);
        cache.write(&records()).await;

        let raw = store.get("stocks").await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["timestamp"], clock.now().timestamp_millis());
        assert_eq!(json["data"][0]["symbol"], "AAPL");
    }

    #[tokio::test]
    async fn test_clear() {
        let (cache, _clock, _calendar, _store) = fixture(false);
        cache.write(&records()).await;
        assert!(cache.clear().await.unwrap());
        assert!(cache.read_any().await.is_none());
        assert!(!cache.clear().await.unwrap());
    }
}
