//! # Quote Data
//!
//! 시세/지표 데이터셋의 캐시와 새로고침을 담당합니다.
//!
//! - 영속 키-값 저장소 (파일, Redis, 메모리)
//! - 시장 상태 기반 TTL
//! - 업데이트 상태 저장소와 방어적 리셋
//! - API 키 순환
//! - 업스트림 제공자 (Finnhub, FRED)
//! - 새로고침 오케스트레이터
//! - 제공자 키별 진단
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use quote_data::{DatasetHub, RefreshOrchestrator};
//!
//! let hub = DatasetHub::new().with(RefreshOrchestrator::new(kind, deps, settings));
//! let response = hub.get_dataset("stocks").await?;
//! ```

pub mod dataset_cache;
pub mod diagnostics;
pub mod error;
pub mod hub;
pub mod orchestrator;
pub mod provider;
pub mod report;
pub mod reset;
pub mod seed;
pub mod stats;
pub mod store;
pub mod token;
pub mod ttl;
pub mod update_state;

pub use dataset_cache::{CachedDataset, DatasetCache};
pub use diagnostics::{DiagnosticMode, DiagnosticReport, ProviderDiagnostics};
pub use error::{DataError, Result};
pub use hub::DatasetHub;
pub use orchestrator::{
    OrchestratorDeps, OrchestratorSettings, RefreshMode, RefreshOptions, RefreshOrchestrator,
};
pub use provider::{FinnhubProvider, FredProvider, ProviderError, QuoteProvider};
pub use report::{CacheDebugReport, ClearMode, ClearReport, DatasetResponse, UpdateStatus};
pub use reset::DefensiveResetGuard;
pub use seed::SeedCatalog;
pub use stats::RefreshStats;
pub use store::{FileStore, KeyValueStore, MemoryStore, RedisStore};
pub use token::{Credential, SelectionPolicy, TokenRotator};
pub use ttl::TtlPolicy;
pub use update_state::{UpdateState, UpdateStateOptions, UpdateStatePatch, UpdateStateStore};
