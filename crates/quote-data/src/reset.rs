//! 방어적 리셋.
//!
//! 휴장 중 새로고침이 끝나지 않은 채 호출만 쌓이면 캐시와 상태를 통째로 지워
//! 다음 요청이 처음부터 다시 시작하게 합니다. 관리자 작업으로도 노출됩니다.

use quote_core::Clock;
use std::sync::Arc;
use tracing::warn;

use crate::error::Result;
use crate::store::{read_json, write_json, KeyValueStore};
use crate::update_state::UpdateState;

/// 방어적 리셋 실행기.
pub struct DefensiveResetGuard {
    store: Arc<dyn KeyValueStore>,
    dataset_key: String,
    state_key: String,
    lock_name: String,
    clock: Arc<dyn Clock>,
}

impl DefensiveResetGuard {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        dataset_key: impl Into<String>,
        state_key: impl Into<String>,
        lock_name: impl Into<String>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            dataset_key: dataset_key.into(),
            state_key: state_key.into(),
            lock_name: lock_name.into(),
            clock,
        }
    }

    /// 영속 캐시 항목을 지우고 업데이트 상태를 기본값으로 되돌립니다.
    ///
    /// 마지막 시장 상태는 보존하고 리셋 시각을 기록합니다. 여러 번 실행해도 결과는 같습니다.
    pub async fn execute(&self) -> Result<()> {
        let removed = self.store.delete(&self.dataset_key).await?;

        let previous = read_json::<UpdateState>(self.store.as_ref(), &self.state_key)
            .await
            .ok()
            .flatten()
            .unwrap_or_default();

        let now = self.clock.now();
        let state = UpdateState {
            last_market_state: previous.last_market_state,
            market_state_change_timestamp: previous.market_state_change_timestamp,
            last_update_timestamp: Some(now),
            last_reset_timestamp: Some(now),
            ..Default::default()
        };
        write_json(self.store.as_ref(), &self.state_key, &state).await?;
        self.store.unlock(&self.lock_name).await?;

        warn!(
            dataset = %self.dataset_key,
            cache_removed = removed,
            previous_call_count = previous.call_count,
            "방어적 리셋 완료"
        );
        Ok(())
    }
}
