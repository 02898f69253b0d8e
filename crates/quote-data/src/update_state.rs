//! 업데이트 상태 저장소.
//!
//! 새로고침 생명주기 플래그(초기 업데이트 완료, 진행 중, 마지막 시장 상태, 호출 카운터)를
//! 데이터셋마다 하나의 blob으로 영속화합니다. 요청 사이, 프로세스 사이의 조정에 사용됩니다.
//!
//! 읽기-수정-쓰기 헬퍼는 모두 비동기 뮤텍스로 직렬화되므로 한 프로세스 안에서는 원자적입니다.
//! 저장소가 조건부 쓰기를 지원하면 [`UpdateStateStore::try_start_update`]는 임대 락도 함께
//! 획득해 프로세스 간 중복 새로고침을 막습니다.

use chrono::{DateTime, Utc};
use quote_core::Clock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::Result;
use crate::reset::DefensiveResetGuard;
use crate::store::{read_json, write_json, KeyValueStore};

/// 새로고침 생명주기 상태.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateState {
    /// 현재 시장 구간에서 새로고침이 한 번이라도 완료되었는지
    pub has_completed_initial_update: bool,
    /// 새로고침 진행 중 여부 (데이터셋당 최대 1개)
    pub is_background_update_in_progress: bool,
    /// 마지막으로 관측한 시장 개장 여부. 관측 전이면 `None`
    pub last_market_state: Option<bool>,
    /// 마지막 상태 기록 시각
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_update_timestamp: Option<DateTime<Utc>>,
    /// 마지막 시장 상태 전환 시각
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub market_state_change_timestamp: Option<DateTime<Utc>>,
    /// 휴장 중 요청 횟수 (방어적 리셋 판정용)
    pub call_count: u64,
    /// 마지막 리셋 시각
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_reset_timestamp: Option<DateTime<Utc>>,
    /// 마지막으로 새로고침이 완료된 시각
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_completed_timestamp: Option<DateTime<Utc>>,
}

impl UpdateState {
    /// `written_at`에 기록된 데이터셋이 완료된 새로고침의 결과인지 확인합니다.
    ///
    /// 완료 이후에 기록된 blob은 실패한 새로고침의 부분 결과입니다.
    pub fn covers(&self, written_at: DateTime<Utc>) -> bool {
        self.last_completed_timestamp
            .is_some_and(|completed| written_at <= completed)
    }
}

/// 상태 부분 갱신.
///
/// `None` 필드는 기존 값을 유지합니다.
#[derive(Debug, Clone, Default)]
pub struct UpdateStatePatch {
    pub has_completed_initial_update: Option<bool>,
    pub is_background_update_in_progress: Option<bool>,
    pub last_market_state: Option<bool>,
    pub market_state_change_timestamp: Option<DateTime<Utc>>,
    pub call_count: Option<u64>,
    pub last_reset_timestamp: Option<DateTime<Utc>>,
    pub last_completed_timestamp: Option<DateTime<Utc>>,
}

impl UpdateStatePatch {
    fn apply(self, state: &mut UpdateState) {
        if let Some(v) = self.has_completed_initial_update {
            state.has_completed_initial_update = v;
        }
        if let Some(v) = self.is_background_update_in_progress {
            state.is_background_update_in_progress = v;
        }
        if let Some(v) = self.last_market_state {
            state.last_market_state = Some(v);
        }
        if let Some(v) = self.market_state_change_timestamp {
            state.market_state_change_timestamp = Some(v);
        }
        if let Some(v) = self.call_count {
            state.call_count = v;
        }
        if let Some(v) = self.last_reset_timestamp {
            state.last_reset_timestamp = Some(v);
        }
        if let Some(v) = self.last_completed_timestamp {
            state.last_completed_timestamp = Some(v);
        }
    }
}

/// 업데이트 상태 저장소 설정.
#[derive(Debug, Clone, Copy)]
pub struct UpdateStateOptions {
    /// 휴장 중 방어적 리셋까지의 호출 횟수
    pub reset_threshold: u64,
    /// 저장소 락 임대 시간
    pub lock_lease: Duration,
}

impl Default for UpdateStateOptions {
    fn default() -> Self {
        Self {
            reset_threshold: 200,
            lock_lease: Duration::from_secs(600),
        }
    }
}

/// 데이터셋 하나의 업데이트 상태 저장소.
pub struct UpdateStateStore {
    store: Arc<dyn KeyValueStore>,
    key: String,
    lock_name: String,
    clock: Arc<dyn Clock>,
    options: UpdateStateOptions,
    reset_guard: DefensiveResetGuard,
    guard: Mutex<()>,
}

impl UpdateStateStore {
    /// `dataset_key`에 딸린 상태 저장소를 만듭니다.
    ///
    /// 상태는 `<dataset_key>:update-state`, 락은 `<dataset_key>:refresh` 이름을 씁니다.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        dataset_key: &str,
        clock: Arc<dyn Clock>,
        options: UpdateStateOptions,
    ) -> Self {
        let key = state_key(dataset_key);
        let lock_name = lock_name(dataset_key);
        let reset_guard = DefensiveResetGuard::new(
            store.clone(),
            dataset_key,
            key.clone(),
            lock_name.clone(),
            clock.clone(),
        );

        Self {
            store,
            key,
            lock_name,
            clock,
            options,
            reset_guard,
            guard: Mutex::new(()),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn reset_threshold(&self) -> u64 {
        self.options.reset_threshold
    }

    /// 현재 상태. 없거나 손상되었으면 기본값.
    pub async fn read(&self) -> Result<UpdateState> {
        match read_json::<UpdateState>(self.store.as_ref(), &self.key).await {
            Ok(state) => Ok(state.unwrap_or_default()),
            Err(crate::error::DataError::Serialization(e)) => {
                warn!(key = %self.key, error = %e, "업데이트 상태 손상, 기본값 사용");
                Ok(UpdateState::default())
            }
            Err(e) => Err(e),
        }
    }

    /// 읽기-병합-쓰기. `lastUpdateTimestamp`를 현재 시각으로 찍습니다.
    pub async fn write(&self, patch: UpdateStatePatch) -> Result<UpdateState> {
        let _guard = self.guard.lock().await;
        let mut state = self.read().await?;
        patch.apply(&mut state);
        self.persist(&mut state).await?;
        Ok(state)
    }

    async fn persist(&self, state: &mut UpdateState) -> Result<()> {
        state.last_update_timestamp = Some(self.clock.now());
        write_json(self.store.as_ref(), &self.key, state).await
    }

    /// 새로고침 진입 시도. 유일한 진입 관문입니다.
    ///
    /// 이미 진행 중이면 `false`. 저장소가 원자적 락을 지원하면 락도 함께 획득하며,
    /// 진행 중 플래그가 남아 있어도 락 임대가 만료되었다면 중단된 새로고침으로 보고 인계받습니다.
    #[instrument(skip(self), fields(key = %self.key))]
    pub async fn try_start_update(&self) -> Result<bool> {
        let _guard = self.guard.lock().await;
        let mut state = self.read().await?;
        let atomic = self.store.supports_atomic_lock();

        if state.is_background_update_in_progress && !atomic {
            debug!("이미 새로고침 진행 중");
            return Ok(false);
        }

        if !self
            .store
            .try_lock(&self.lock_name, self.options.lock_lease)
            .await?
        {
            debug!("다른 인스턴스가 새로고침 락 보유 중");
            return Ok(false);
        }

        if state.is_background_update_in_progress {
            warn!("락 임대가 만료된 진행 중 플래그를 인계합니다");
        }

        state.is_background_update_in_progress = true;
        if let Err(e) = self.persist(&mut state).await {
            let _ = self.store.unlock(&self.lock_name).await;
            return Err(e);
        }
        Ok(true)
    }

    /// 새로고침 완료 처리.
    pub async fn mark_update_completed(&self) -> Result<()> {
        self.write(UpdateStatePatch {
            has_completed_initial_update: Some(true),
            is_background_update_in_progress: Some(false),
            call_count: Some(0),
            last_completed_timestamp: Some(self.clock.now()),
            ..Default::default()
        })
        .await?;
        self.store.unlock(&self.lock_name).await
    }

    /// 완료 표시 없이 진행 중 플래그만 해제합니다.
    pub async fn release_update(&self) -> Result<()> {
        self.write(UpdateStatePatch {
            is_background_update_in_progress: Some(false),
            ..Default::default()
        })
        .await?;
        self.store.unlock(&self.lock_name).await
    }

    /// 시장 상태 전환을 반영합니다.
    ///
    /// 개장 → 휴장 전환이면 완료/진행 플래그와 카운터를 초기화하고 `true`를 반환합니다.
    pub async fn check_and_reset_for_market_state_change(&self, is_open: bool) -> Result<bool> {
        let _guard = self.guard.lock().await;
        let mut state = self.read().await?;
        if state.last_market_state == Some(is_open) {
            return Ok(false);
        }

        let now = self.clock.now();
        let closed_after_open = state.last_market_state == Some(true) && !is_open;

        state.last_market_state = Some(is_open);
        state.market_state_change_timestamp = Some(now);

        if closed_after_open {
            state.has_completed_initial_update = false;
            state.is_background_update_in_progress = false;
            state.call_count = 0;
            self.persist(&mut state).await?;
            self.store.unlock(&self.lock_name).await?;
            info!(key = %self.key, "장 마감 감지, 업데이트 상태 초기화");
            return Ok(true);
        }

        self.persist(&mut state).await?;
        debug!(key = %self.key, is_open, "시장 상태 기록");
        Ok(false)
    }

    /// 휴장 중 호출 횟수를 올리고 방어적 리셋이 필요한지 확인합니다.
    ///
    /// 개장 중에는 아무것도 하지 않습니다. 카운터가 임계값에 도달했는데 초기 업데이트가
    /// 완료되지 않았다면 리셋을 실행하고 `true`를 반환합니다.
    pub async fn increment_call_count_and_check(&self, is_market_closed: bool) -> Result<bool> {
        if !is_market_closed {
            return Ok(false);
        }

        let _guard = self.guard.lock().await;
        let mut state = self.read().await?;
        state.call_count += 1;

        if state.call_count >= self.options.reset_threshold && !state.has_completed_initial_update
        {
            warn!(
                key = %self.key,
                call_count = state.call_count,
                threshold = self.options.reset_threshold,
                "휴장 중 새로고침이 완료되지 않아 방어적 리셋 실행"
            );
            self.reset_guard.execute().await?;
            return Ok(true);
        }

        self.persist(&mut state).await?;
        Ok(false)
    }

    /// 방어적 리셋을 수동 실행합니다.
    pub async fn defensive_reset(&self) -> Result<()> {
        let _guard = self.guard.lock().await;
        self.reset_guard.execute().await
    }

    /// 완료/진행 플래그와 카운터를 초기화하고 리셋 시각을 기록합니다. 시장 상태는 유지합니다.
    pub async fn reset_flags(&self) -> Result<UpdateState> {
        let state = self
            .write(UpdateStatePatch {
                has_completed_initial_update: Some(false),
                is_background_update_in_progress: Some(false),
                call_count: Some(0),
                last_reset_timestamp: Some(self.clock.now()),
                ..Default::default()
            })
            .await?;
        self.store.unlock(&self.lock_name).await?;
        Ok(state)
    }
}

/// 데이터셋의 업데이트 상태 키.
pub fn state_key(dataset_key: &str) -> String {
    format!("{}:update-state", dataset_key)
}

/// 데이터셋의 새로고침 락 이름.
pub fn lock_name(dataset_key: &str) -> String {
    format!("{}:refresh", dataset_key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset_cache::CachedDataset;
    use crate::store::MemoryStore;
    use chrono::TimeZone;
    use proptest::prelude::*;
    use quote_core::ManualClock;

    /// 조건부 쓰기를 지원하지 않는 저장소.
    struct PlainStore(MemoryStore);

    #[async_trait::async_trait]
    impl KeyValueStore for PlainStore {
        fn backend(&self) -> &'static str {
            "plain"
        }
        async fn get(&self, key: &str) -> Result<Option<String>> {
            self.0.get(key).await
        }
        async fn put(&self, key: &str, value: &str) -> Result<()> {
            self.0.put(key, value).await
        }
        async fn delete(&self, key: &str) -> Result<bool> {
            self.0.delete(key).await
        }
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 6, 2, 21, 0, 0).unwrap(),
        ))
    }

    fn state_store(store: Arc<dyn KeyValueStore>, threshold: u64) -> UpdateStateStore {
        UpdateStateStore::new(
            store,
            "stocks",
            clock(),
            UpdateStateOptions {
                reset_threshold: threshold,
                ..Default::default()
            },
        )
    }

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_read_defaults_when_absent() {
        let states = state_store(Arc::new(MemoryStore::new()), 200);
        assert_eq!(states.read().await.unwrap(), UpdateState::default());
    }

    #[tokio::test]
    async fn test_write_merges_and_stamps() {
        let states = state_store(Arc::new(MemoryStore::new()), 200);
        states
            .write(UpdateStatePatch {
                call_count: Some(7),
                ..Default::default()
            })
            .await
            .unwrap();
        let state = states
            .write(UpdateStatePatch {
                has_completed_initial_update: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();

        assert_eq!(state.call_count, 7);
        assert!(state.has_completed_initial_update);
        assert!(state.last_update_timestamp.is_some());
    }

    #[tokio::test]
    async fn test_persisted_field_names() {
        let store = Arc::new(MemoryStore::new());
        let states = state_store(store.clone(), 200);
        states.check_and_reset_for_market_state_change(true).await.unwrap();

        let raw = store.get("stocks:update-state").await.unwrap().unwrap();
        let json: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["lastMarketState"], true);
        assert_eq!(json["callCount"], 0);
        assert!(json["lastUpdateTimestamp"].is_i64());
        assert!(json["lastCompletedTimestamp"].is_null());
    }

    #[tokio::test]
    async fn test_try_start_update_is_exclusive() {
        let states = state_store(Arc::new(MemoryStore::new()), 200);
        assert!(states.try_start_update().await.unwrap());
        assert!(!states.try_start_update().await.unwrap());

        states.release_update().await.unwrap();
        assert!(states.try_start_update().await.unwrap());
    }

    #[tokio::test]
    async fn test_try_start_update_without_atomic_lock() {
        let states = state_store(Arc::new(PlainStore(MemoryStore::new())), 200);
        assert!(states.try_start_update().await.unwrap());
        assert!(!states.try_start_update().await.unwrap());
        states.mark_update_completed().await.unwrap();
        assert!(states.try_start_update().await.unwrap());
    }

    #[tokio::test]
    async fn test_stale_in_progress_flag_taken_over_after_lease() {
        let store = Arc::new(MemoryStore::new());
        let states = UpdateStateStore::new(
            store.clone(),
            "stocks",
            clock(),
            UpdateStateOptions {
                reset_threshold: 200,
                lock_lease: Duration::from_millis(0),
            },
        );
        // 중단된 프로세스가 남긴 플래그
        assert!(states.try_start_update().await.unwrap());
        assert!(states.try_start_update().await.unwrap());
    }

    #[tokio::test]
    async fn test_mark_update_completed_idempotent() {
        let states = state_store(Arc::new(MemoryStore::new()), 200);
        states.try_start_update().await.unwrap();
        states.mark_update_completed().await.unwrap();
        let once = states.read().await.unwrap();
        states.mark_update_completed().await.unwrap();
        let twice = states.read().await.unwrap();

        assert_eq!(once, twice);
        assert!(twice.covers(Utc.with_ymd_and_hms(2025, 6, 2, 21, 0, 0).unwrap()));
        assert!(twice.has_completed_initial_update);
        assert!(!twice.is_background_update_in_progress);
        assert_eq!(twice.call_count, 0);
    }

    #[tokio::test]
    async fn test_open_to_closed_resets_flags() {
        let states = state_store(Arc::new(MemoryStore::new()), 200);
        assert!(!states.check_and_reset_for_market_state_change(true).await.unwrap());
        states.mark_update_completed().await.unwrap();
        states
            .write(UpdateStatePatch {
                call_count: Some(5),
                ..Default::default()
            })
            .await
            .unwrap();

        assert!(states.check_and_reset_for_market_state_change(false).await.unwrap());
        let state = states.read().await.unwrap();
        assert!(!state.has_completed_initial_update);
        assert!(!state.is_background_update_in_progress);
        assert_eq!(state.call_count, 0);
        assert_eq!(state.last_market_state, Some(false));

        // 같은 상태 반복은 리셋 아님
        assert!(!states.check_and_reset_for_market_state_change(false).await.unwrap());
    }

    #[tokio::test]
    async fn test_closed_to_open_is_not_reset() {
        let states = state_store(Arc::new(MemoryStore::new()), 200);
        states.check_and_reset_for_market_state_change(false).await.unwrap();
        states.mark_update_completed().await.unwrap();

        assert!(!states.check_and_reset_for_market_state_change(true).await.unwrap());
        let state = states.read().await.unwrap();
        assert!(state.has_completed_initial_update);
        assert_eq!(state.last_market_state, Some(true));
    }

    #[tokio::test]
    async fn test_call_count_noop_while_open() {
        let states = state_store(Arc::new(MemoryStore::new()), 3);
        for _ in 0..10 {
            assert!(!states.increment_call_count_and_check(false).await.unwrap());
        }
        assert_eq!(states.read().await.unwrap().call_count, 0);
    }

    #[tokio::test]
    async fn test_call_count_no_reset_after_completion() {
        let states = state_store(Arc::new(MemoryStore::new()), 3);
        states.mark_update_completed().await.unwrap();
        for _ in 0..10 {
            assert!(!states.increment_call_count_and_check(true).await.unwrap());
        }
        assert_eq!(states.read().await.unwrap().call_count, 10);
    }

    #[tokio::test]
    async fn test_default_threshold_triggers_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let states = state_store(store.clone(), 200);
        write_json(
            store.as_ref(),
            "stocks",
            &CachedDataset {
                timestamp: Utc::now(),
                items: Vec::new(),
            },
        )
        .await
        .unwrap();

        let mut triggered = Vec::new();
        for call in 1..=200u64 {
            if states.increment_call_count_and_check(true).await.unwrap() {
                triggered.push(call);
            }
        }

        assert_eq!(triggered, vec![200]);
        let state = states.read().await.unwrap();
        assert_eq!(state.call_count, 0);
        assert!(state.last_reset_timestamp.is_some());
        assert!(store.get("stocks").await.unwrap().is_none());
    }

    proptest! {
        #[test]
        fn prop_single_unmatched_admission(ops in proptest::collection::vec(0u8..3, 1..40)) {
            runtime().block_on(async {
                let states = state_store(Arc::new(MemoryStore::new()), 200);
                let mut held = false;

                for op in ops {
                    match op {
                        0 => {
                            let admitted = states.try_start_update().await.unwrap();
                            // 보유 중이면 절대 재진입 불가, 비었으면 반드시 진입
                            prop_assert_eq!(admitted, !held);
                            held = held || admitted;
                        }
                        1 if held => {
                            states.release_update().await.unwrap();
                            held = false;
                        }
                        2 if held => {
                            states.mark_update_completed().await.unwrap();
                            held = false;
                        }
                        _ => {}
                    }
                    let state = states.read().await.unwrap();
                    prop_assert_eq!(state.is_background_update_in_progress, held);
                }
                Ok(())
            })?;
        }

        #[test]
        fn prop_reset_fires_once_per_threshold(threshold in 1u64..30, calls in 1u64..90) {
            runtime().block_on(async {
                let states = state_store(Arc::new(MemoryStore::new()), threshold);
                let mut resets = 0u64;
                for _ in 0..calls {
                    if states.increment_call_count_and_check(true).await.unwrap() {
                        resets += 1;
                    }
                }
                prop_assert_eq!(resets, calls / threshold);
                prop_assert_eq!(states.read().await.unwrap().call_count, calls % threshold);
                Ok(())
            })?;
        }
    }
}
