//! 설정 관리.
//!
//! 설정은 세 단계로 병합됩니다: 구조체 기본값, `config/default.toml`(있을 경우),
//! `QUOTE__` 접두사 환경 변수 (예: `QUOTE__TTL__MARKET_OPEN_SECS=120`).

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::CoreResult;

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AppConfig {
    /// 서버 설정
    pub server: ServerConfig,
    /// 로깅 설정
    pub logging: LoggingConfig,
    /// 캐시 저장소 설정
    pub cache: CacheConfig,
    /// 캐시 TTL 설정
    pub ttl: TtlConfig,
    /// 새로고침 설정
    pub refresh: RefreshConfig,
    /// 시장 캘린더 설정
    pub calendar: CalendarConfig,
}

/// 서버 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 바인딩할 호스트
    pub host: String,
    /// 리스닝할 포트
    pub port: u16,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            request_timeout_secs: 60,
        }
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 캐시 저장소 종류.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// 로컬 파일 (기본값)
    #[default]
    File,
    /// Redis
    Redis,
    /// 프로세스 메모리 (재시작 시 소실)
    Memory,
}

/// 캐시 저장소 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheConfig {
    /// 저장소 종류
    pub backend: CacheBackend,
    /// 파일 저장소 디렉토리
    pub directory: String,
    /// Redis URL (backend = redis 일 때)
    pub redis_url: Option<String>,
    /// 저장소 키 접두사
    pub key_prefix: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            backend: CacheBackend::File,
            directory: ".cache".to_string(),
            redis_url: None,
            key_prefix: "quote".to_string(),
        }
    }
}

/// 캐시 TTL 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TtlConfig {
    /// 개장 중 TTL (초)
    pub market_open_secs: u64,
    /// 휴장 중 TTL (초)
    pub market_closed_secs: u64,
}

impl Default for TtlConfig {
    fn default() -> Self {
        Self {
            market_open_secs: 5 * 60,
            market_closed_secs: 12 * 60 * 60,
        }
    }
}

/// 새로고침 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// 배치당 업스트림 요청 수
    pub batch_size: usize,
    /// 배치 간 대기 (밀리초)
    pub batch_delay_ms: u64,
    /// 개별 업스트림 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 새로고침 성공으로 간주하는 성공 비율 (0.0 - 1.0)
    pub success_threshold: f64,
    /// 휴장 중 방어적 리셋까지의 호출 횟수
    pub defensive_reset_threshold: u64,
    /// 백그라운드 새로고침에서 건너뛸 최근 갱신 구간 (초)
    pub background_freshness_secs: u64,
    /// 휴장 중 1회성 새로고침에서 건너뛸 최근 갱신 구간 (초)
    pub one_shot_freshness_secs: u64,
    /// 다중 프로세스 업데이트 락 임대 시간 (초)
    pub lock_lease_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            batch_size: 30,
            batch_delay_ms: 1100,
            request_timeout_secs: 30,
            success_threshold: 0.5,
            defensive_reset_threshold: 200,
            background_freshness_secs: 5 * 60,
            one_shot_freshness_secs: 24 * 60 * 60,
            lock_lease_secs: 10 * 60,
        }
    }
}

/// 시장 캘린더 설정.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// 거래소 시간대 (IANA)
    pub timezone: String,
    /// 개장 시각 (HH:MM, 현지)
    pub open: String,
    /// 마감 시각 (HH:MM, 현지)
    pub close: String,
    /// 마감 임박으로 보는 구간 (분)
    pub near_close_minutes: u32,
    /// 휴장일 (YYYY-MM-DD). 없으면 내장 NYSE 테이블 사용
    pub holidays: Option<Vec<String>>,
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            timezone: "America/New_York".to_string(),
            open: "09:30".to_string(),
            close: "16:00".to_string(),
            near_close_minutes: 15,
            holidays: None,
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// 파일이 없으면 기본값과 환경 변수만 사용합니다.
    pub fn load<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from(path.as_ref()).required(false))
            .add_source(
                config::Environment::with_prefix("QUOTE")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        Ok(config.try_deserialize()?)
    }

    /// 기본 경로에서 설정을 로드합니다.
    pub fn load_default() -> CoreResult<Self> {
        Self::load("config/default.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.ttl.market_open_secs, 300);
        assert_eq!(config.ttl.market_closed_secs, 43_200);
        assert_eq!(config.refresh.batch_size, 30);
        assert_eq!(config.refresh.defensive_reset_threshold, 200);
        assert_eq!(config.cache.backend, CacheBackend::File);
        assert_eq!(config.calendar.timezone, "America/New_York");
    }

    #[test]
    fn test_load_missing_file_falls_back_to_defaults() {
        let config = AppConfig::load("does/not/exist.toml").unwrap();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.refresh.success_threshold, 0.5);
    }

    #[test]
    fn test_partial_section_deserialize() {
        let config: AppConfig = serde_json::from_str(
            r#"{"ttl": {"market_open_secs": 60}, "cache": {"backend": "memory"}}"#,
        )
        .unwrap();
        assert_eq!(config.ttl.market_open_secs, 60);
        assert_eq!(config.ttl.market_closed_secs, 43_200);
        assert_eq!(config.cache.backend, CacheBackend::Memory);
        assert_eq!(config.cache.directory, ".cache");
    }
}
