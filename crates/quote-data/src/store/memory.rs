//! 프로세스 메모리 저장소.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::KeyValueStore;
use crate::error::Result;

/// `HashMap` 기반 저장소. 재시작하면 비워집니다.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    locks: RwLock<HashMap<String, Instant>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn try_lock(&self, name: &str, lease: Duration) -> Result<bool> {
        let mut locks = self.locks.write().await;
        let now = Instant::now();

        match locks.get(name) {
            Some(expires_at) if *expires_at > now => Ok(false),
            _ => {
                locks.insert(name.to_string(), now + lease);
                Ok(true)
            }
        }
    }

    async fn unlock(&self, name: &str) -> Result<()> {
        self.locks.write().await.remove(name);
        Ok(())
    }

    fn supports_atomic_lock(&self) -> bool {
        true
    }
}
