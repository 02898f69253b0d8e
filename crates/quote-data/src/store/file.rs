//! 로컬 파일 저장소.
//!
//! 키 하나가 캐시 디렉토리의 `<key>.json` 파일 하나에 대응합니다.
//! 쓰기는 임시 파일에 기록한 뒤 rename으로 교체하므로 읽는 쪽이 반쯤 쓰인 파일을 보지 않습니다.
//! 락은 `create_new`로 만든 `<name>.lock` 파일이며, 내용에 만료 시각(epoch millis)을 담습니다.

use async_trait::async_trait;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use super::KeyValueStore;
use crate::error::{DataError, Result};

/// 파일 저장소.
#[derive(Debug)]
pub struct FileStore {
    directory: PathBuf,
    write_seq: AtomicU64,
}

impl FileStore {
    /// 캐시 디렉토리를 지정해 생성합니다. 디렉토리는 첫 쓰기 때 만들어집니다.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            write_seq: AtomicU64::new(0),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf> {
        Ok(self.directory.join(format!("{}.json", safe_file_stem(key)?)))
    }

    fn lock_path(&self, name: &str) -> Result<PathBuf> {
        Ok(self.directory.join(format!("{}.lock", safe_file_stem(name)?)))
    }

    async fn create_lock_file(&self, path: &Path, lease: Duration) -> std::io::Result<()> {
        let expires_at = Utc::now().timestamp_millis() + lease.as_millis() as i64;
        let mut file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .await?;
        file.write_all(expires_at.to_string().as_bytes()).await?;
        file.sync_all().await
    }

    async fn lock_expired(&self, path: &Path) -> bool {
        match fs::read_to_string(path).await {
            Ok(raw) => match raw.trim().parse::<i64>() {
                Ok(expires_at) => expires_at <= Utc::now().timestamp_millis(),
                Err(_) => true,
            },
            // 다른 쪽이 방금 해제한 경우
            Err(e) if e.kind() == ErrorKind::NotFound => true,
            Err(_) => false,
        }
    }
}

/// 키를 파일 이름으로 변환합니다. `:`는 `_`로 바꾸고 경로 탈출은 거부합니다.
fn safe_file_stem(key: &str) -> Result<String> {
    if key.is_empty() || key.contains('/') || key.contains('\\') || key.contains("..") {
        return Err(DataError::Store(format!("invalid cache key: {}", key)));
    }
    Ok(key.replace(':', "_"))
}

#[async_trait]
impl KeyValueStore for FileStore {
    fn backend(&self) -> &'static str {
        "file"
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.entry_path(key)?;
        match fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self, value), fields(bytes = value.len()))]
    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let path = self.entry_path(key)?;
        fs::create_dir_all(&self.directory).await?;

        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        let tmp = self.directory.join(format!(
            ".{}.tmp.{}.{}",
            safe_file_stem(key)?,
            std::process::id(),
            seq
        ));

        {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(value.as_bytes()).await?;
            file.sync_all().await?;
        }

        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        debug!(path = %path.display(), "캐시 파일 기록");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.entry_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn try_lock(&self, name: &str, lease: Duration) -> Result<bool> {
        let path = self.lock_path(name)?;
        fs::create_dir_all(&self.directory).await?;

        match self.create_lock_file(&path, lease).await {
            Ok(()) => return Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(e.into()),
        }

        if !self.lock_expired(&path).await {
            return Ok(false);
        }

        warn!(lock = name, "만료된 락 파일 회수");
        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        // 회수 직후 다른 프로세스가 먼저 만들었다면 진다
        match self.create_lock_file(&path, lease).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn unlock(&self, name: &str) -> Result<()> {
        let path = self.lock_path(name)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn supports_atomic_lock(&self) -> bool {
        true
    }
}
