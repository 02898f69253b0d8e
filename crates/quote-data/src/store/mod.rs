//! 영속 키-값 저장소.
//!
//! 데이터셋 blob과 업데이트 상태 blob은 모두 JSON 문자열로 저장됩니다.
//! 백엔드:
//! - [`FileStore`]: 캐시 디렉토리에 키당 JSON 파일 하나
//! - [`RedisStore`]: 외부 Redis
//! - [`MemoryStore`]: 프로세스 메모리

pub mod file;
pub mod memory;
pub mod redis;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use self::redis::RedisStore;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;

use crate::error::Result;

/// 키-값 저장소 추상화.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// 백엔드 이름 (로그/디버그용).
    fn backend(&self) -> &'static str;

    /// 값을 읽습니다. 없으면 `None`.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// 값을 통째로 교체합니다.
    async fn put(&self, key: &str, value: &str) -> Result<()>;

    /// 값을 삭제합니다. 삭제된 항목이 있었으면 `true`.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// 임대 기간이 있는 배타 락 획득을 시도합니다.
    ///
    /// 조건부 쓰기를 지원하지 않는 저장소는 항상 `true`를 반환합니다.
    async fn try_lock(&self, _name: &str, _lease: Duration) -> Result<bool> {
        Ok(true)
    }

    /// 락을 해제합니다.
    async fn unlock(&self, _name: &str) -> Result<()> {
        Ok(())
    }

    /// `try_lock`이 프로세스 간 원자적인지 여부.
    fn supports_atomic_lock(&self) -> bool {
        false
    }
}

/// JSON 값을 읽습니다.
pub async fn read_json<T: DeserializeOwned>(
    store: &dyn KeyValueStore,
    key: &str,
) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

/// JSON 값을 씁니다.
pub async fn write_json<T: Serialize + ?Sized>(
    store: &dyn KeyValueStore,
    key: &str,
    value: &T,
) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    store.put(key, &raw).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        count: u32,
    }

    /// 락을 지원하지 않는 최소 저장소.
    struct NoLockStore(MemoryStore);

    #[async_trait]
    impl KeyValueStore for NoLockStore {
        fn backend(&self) -> &'static str {
            "nolock"
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

    #[tokio::test]
    async fn test_json_helpers() {
        let store = MemoryStore::new();
        let sample = Sample {
            name: "stocks".to_string(),
            count: 3,
        };

        write_json(&store, "sample", &sample).await.unwrap();
        let loaded: Option<Sample> = read_json(&store, "sample").await.unwrap();
        assert_eq!(loaded, Some(sample));

        let missing: Option<Sample> = read_json(&store, "missing").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_json_is_error() {
        let store = MemoryStore::new();
        store.put("sample", "{not json").await.unwrap();
        let loaded: Result<Option<Sample>> = read_json(&store, "sample").await;
        assert!(loaded.is_err());
    }

    #[tokio::test]
    async fn test_default_lock_always_granted() {
        let store = NoLockStore(MemoryStore::new());
        assert!(!store.supports_atomic_lock());
        assert!(store.try_lock("x", Duration::from_secs(5)).await.unwrap());
        assert!(store.try_lock("x", Duration::from_secs(5)).await.unwrap());
        store.unlock("x").await.unwrap();
    }
}
