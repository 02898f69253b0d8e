//! Redis 저장소.
//!
//! 여러 인스턴스가 같은 캐시와 업데이트 상태를 공유할 때 사용합니다.
//! 모든 키는 `<prefix>:` 아래에 저장되고, 락은 `SET NX EX`로 획득합니다.

use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, instrument};

use super::KeyValueStore;
use crate::error::Result;

/// Redis 연결 래퍼.
#[derive(Clone)]
pub struct RedisStore {
    connection: Arc<RwLock<MultiplexedConnection>>,
    prefix: String,
}

impl RedisStore {
    /// Redis에 연결합니다.
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self> {
        info!("Connecting to Redis...");

        let client = Client::open(url)?;
        let connection = client.get_multiplexed_async_connection().await?;

        info!("Redis connection established");

        Ok(Self {
            connection: Arc::new(RwLock::new(connection)),
            prefix: prefix.into(),
        })
    }

    /// Redis 상태를 확인합니다.
    pub async fn health_check(&self) -> Result<bool> {
        let mut conn = self.connection.write().await;
        let result: String = redis::cmd("PING").query_async(&mut *conn).await?;
        Ok(result == "PONG")
    }

    fn full_key(&self, key: &str) -> String {
        namespaced(&self.prefix, key)
    }

    fn lock_key(&self, name: &str) -> String {
        namespaced(&self.prefix, &format!("lock:{}", name))
    }
}

fn namespaced(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{}:{}", prefix, key)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    fn backend(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.write().await;
        let value: Option<String> = conn.get(self.full_key(key)).await?;
        Ok(value)
    }

    #[instrument(skip(self, value), fields(bytes = value.len()))]
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection.write().await;
        let _: () = conn.set(self.full_key(key), value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.write().await;
        let deleted: i64 = conn.del(self.full_key(key)).await?;
        Ok(deleted > 0)
    }

    async fn try_lock(&self, name: &str, lease: Duration) -> Result<bool> {
        let key = self.lock_key(name);
        let mut conn = self.connection.write().await;

        // SET NX EX: 원자적 획득
        let result: Option<String> = redis::cmd("SET")
            .arg(&key)
            .arg("locked")
            .arg("NX")
            .arg("EX")
            .arg(lease.as_secs().max(1))
            .query_async(&mut *conn)
            .await?;

        Ok(result.is_some())
    }

    async fn unlock(&self, name: &str) -> Result<()> {
        let key = self.lock_key(name);
        let mut conn = self.connection.write().await;
        let _: i64 = conn.del(key).await?;
        Ok(())
    }

    fn supports_atomic_lock(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("prefix", &self.prefix)
            .finish()
    }
}
