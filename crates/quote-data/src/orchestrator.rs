//! 새로고침 오케스트레이터.
//!
//! 요청마다 메모리 캐시 → 영속 캐시 → 시드 순으로 응답 데이터를 결정하고,
//! 필요하면 업스트림 새로고침을 백그라운드 태스크로 띄웁니다.
//!
//! # 요청 흐름
//!
//! 1. 시장 개장 여부 확인
//! 2. 개장 → 휴장 전환이면 업데이트 상태 초기화
//! 3. 휴장 중 호출 카운터 증가, 방어적 리셋이 일어나면 메모리 캐시 폐기
//! 4. 메모리 캐시가 TTL 이내이고 (개장 중이거나 초기 업데이트 완료) → 반환
//! 5. 같은 조건으로 영속 캐시 확인 → 완료된 새로고침의 결과면 채택 후 반환.
//!    만료되었거나 부분 결과면 메모리 기반 데이터로만 채택
//! 6. 영속 캐시도 없으면 시드 테이블로 채우고 즉시 영속화
//! 7. 개장 중 → 백그라운드 새로고침, 휴장 중 미완료 → 1회성 새로고침
//! 8. 현재 메모리 캐시 반환
//!
//! 응답은 새로고침을 기다리지 않습니다.

use chrono::{DateTime, Utc};
use futures::future::join_all;
use quote_core::{AppConfig, DatasetKind, LiveQuote, MarketContext, Record, RefreshConfig};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::dataset_cache::DatasetCache;
use crate::diagnostics::{DiagnosticMode, DiagnosticReport, ProviderDiagnostics};
use crate::error::{DataError, Result};
use crate::provider::{ProviderError, QuoteProvider};
use crate::report::{
    CacheDebugReport, ClearMode, ClearReport, DatasetResponse, MemoryCacheSummary,
    PersistedCacheSummary, UpdateStatus,
};
use crate::seed::SeedCatalog;
use crate::stats::RefreshStats;
use crate::store::KeyValueStore;
use crate::token::{Credential, TokenRotator};
use crate::ttl::TtlPolicy;
use crate::update_state::{UpdateState, UpdateStateOptions, UpdateStateStore};

/// 새로고침 실행 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// 개장 중 백그라운드 새로고침
    Background,
    /// 휴장 중 1회성 새로고침
    OneShot,
}

impl RefreshMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshMode::Background => "background",
            RefreshMode::OneShot => "one-shot",
        }
    }
}

/// 새로고침 실행 옵션.
#[derive(Debug, Clone)]
pub struct RefreshOptions {
    /// 배치당 요청 수
    pub batch_size: usize,
    /// 배치 간 대기
    pub batch_delay: Duration,
    /// 개별 요청 타임아웃
    pub request_timeout: Duration,
    /// 완료로 간주하는 성공 비율
    pub success_threshold: f64,
    /// 백그라운드 모드에서 건너뛸 최근 갱신 구간
    pub background_freshness: chrono::Duration,
    /// 1회성 모드에서 건너뛸 최근 갱신 구간
    pub one_shot_freshness: chrono::Duration,
}

impl RefreshOptions {
    pub fn from_config(config: &RefreshConfig) -> Self {
        Self {
            batch_size: config.batch_size.max(1),
            batch_delay: Duration::from_millis(config.batch_delay_ms),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            success_threshold: config.success_threshold,
            background_freshness: chrono::Duration::seconds(config.background_freshness_secs as i64),
            one_shot_freshness: chrono::Duration::seconds(config.one_shot_freshness_secs as i64),
        }
    }

    fn freshness(&self, mode: RefreshMode) -> chrono::Duration {
        match mode {
            RefreshMode::Background => self.background_freshness,
            RefreshMode::OneShot => self.one_shot_freshness,
        }
    }
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self::from_config(&RefreshConfig::default())
    }
}

/// 오케스트레이터 설정 묶음.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    pub ttl: TtlPolicy,
    pub refresh: RefreshOptions,
    pub state: UpdateStateOptions,
}

impl OrchestratorSettings {
    /// 애플리케이션 설정에서 TTL, 새로고침, 상태 저장소 옵션을 만듭니다.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            ttl: TtlPolicy::from_config(&config.ttl),
            refresh: RefreshOptions::from_config(&config.refresh),
            state: UpdateStateOptions {
                reset_threshold: config.refresh.defensive_reset_threshold.max(1),
                lock_lease: Duration::from_secs(config.refresh.lock_lease_secs.max(1)),
            },
        }
    }
}

/// 오케스트레이터 협력 객체.
pub struct OrchestratorDeps {
    pub store: Arc<dyn KeyValueStore>,
    pub seed: Arc<SeedCatalog>,
    pub provider: Arc<dyn QuoteProvider>,
    pub tokens: Arc<TokenRotator>,
    pub market: MarketContext,
}

/// 메모리 캐시.
#[derive(Debug, Clone)]
struct MemoryDataset {
    items: Vec<Record>,
    /// 마지막으로 완료된 새로고침 시각. 시드/부분 데이터면 `None`
    fetched_at: Option<DateTime<Utc>>,
}

impl MemoryDataset {
    fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        self.fetched_at.is_some_and(|at| now - at < ttl)
    }
}

/// 개별 요청 실패.
struct FetchFailure {
    credential: usize,
    error: ProviderError,
}

/// 데이터셋 하나의 새로고침 오케스트레이터.
pub struct RefreshOrchestrator {
    dataset: DatasetKind,
    seed: Arc<SeedCatalog>,
    provider: Arc<dyn QuoteProvider>,
    tokens: Arc<TokenRotator>,
    backend: &'static str,
    cache: DatasetCache,
    state: UpdateStateStore,
    market: MarketContext,
    ttl: TtlPolicy,
    options: RefreshOptions,
    memory: RwLock<Option<MemoryDataset>>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl RefreshOrchestrator {
    /// 오케스트레이터를 생성합니다.
    ///
    /// 영속 캐시 키는 데이터셋 이름(`stocks`, `economic-indicators`)이고
    /// 업데이트 상태는 `<dataset>:update-state`에 저장됩니다.
    pub fn new(dataset: DatasetKind, deps: OrchestratorDeps, settings: OrchestratorSettings) -> Self {
        let key = dataset.as_str();
        let backend = deps.store.backend();
        let cache = DatasetCache::new(
            Arc::clone(&deps.store),
            key,
            settings.ttl,
            deps.market.clone(),
        );
        let state = UpdateStateStore::new(
            Arc::clone(&deps.store),
            key,
            deps.market.clock(),
            settings.state,
        );

        if deps.tokens.is_empty() {
            warn!(dataset = %dataset, provider = deps.provider.name(), "API 키 없음: 시드/캐시 데이터만 제공됩니다");
        }

        Self {
            dataset,
            seed: deps.seed,
            provider: deps.provider,
            tokens: deps.tokens,
            backend,
            cache,
            state,
            market: deps.market,
            ttl: settings.ttl,
            options: settings.refresh,
            memory: RwLock::new(None),
            in_flight: Mutex::new(Vec::new()),
        }
    }

    pub fn dataset(&self) -> DatasetKind {
        self.dataset
    }

    /// 업데이트 상태 저장소.
    pub fn update_state(&self) -> &UpdateStateStore {
        &self.state
    }

    /// 데이터셋을 반환합니다. 필요하면 새로고침을 띄우지만 기다리지 않습니다.
    #[instrument(skip(self), fields(dataset = %self.dataset))]
    pub async fn get_dataset(self: &Arc<Self>) -> Result<DatasetResponse> {
        let is_open = self.market.is_market_open();

        let reset_occurred = self
            .state
            .check_and_reset_for_market_state_change(is_open)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %e, "시장 상태 전환 확인 실패");
                false
            });

        let defensive_reset = match self.state.increment_call_count_and_check(!is_open).await {
            Ok(true) => {
                *self.memory.write().await = None;
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!(error = %e, "호출 카운터 갱신 실패");
                false
            }
        };

        let state = self.state.read().await.unwrap_or_else(|e| {
            warn!(error = %e, "업데이트 상태 읽기 실패, 기본값 사용");
            UpdateState::default()
        });
        let admissible = is_open || state.has_completed_initial_update;
        let ttl = self.ttl.compute_ttl(is_open);

        // 4. 메모리 캐시
        if admissible {
            let memory = self.memory.read().await;
            if let Some(cached) = memory.as_ref().filter(|m| m.is_fresh(self.market.now(), ttl)) {
                debug!(count = cached.items.len(), "메모리 캐시 응답");
                return Ok(self.respond(cached.items.clone(), is_open, &state, false));
            }
        }

        // 5. 영속 캐시. 만료된 항목도 시드보다는 낫다
        let (persisted, unexpired) = match self.cache.read().await {
            Some(cached) => (Some(cached), true),
            None => (self.cache.read_any().await, false),
        };
        if let Some(persisted) = persisted {
            let fetched = persisted.items.iter().any(|r| r.last_updated.is_some());
            let usable = unexpired && fetched && state.covers(persisted.timestamp);
            let mut memory = self.memory.write().await;

            if admissible && usable {
                debug!(count = persisted.items.len(), "영속 캐시 채택");
                let items = persisted.items.clone();
                *memory = Some(MemoryDataset {
                    items: persisted.items,
                    fetched_at: Some(persisted.timestamp),
                });
                return Ok(self.respond(items, is_open, &state, false));
            }

            if memory.is_none() {
                debug!(count = persisted.items.len(), unexpired, "영속 캐시를 기반 데이터로 채택");
                *memory = Some(MemoryDataset {
                    items: persisted.items,
                    fetched_at: None,
                });
            }
        }

        // 6. 시드
        self.seed_if_empty().await?;

        // 7. 새로고침 결정. 태스크가 메모리를 바꾸기 전에 스냅샷을 뜬다
        let items = self.snapshot().await;
        let spawned = if is_open {
            !self.has_running_refresh() && self.spawn_refresh(RefreshMode::Background)
        } else if (!state.has_completed_initial_update && !state.is_background_update_in_progress)
            || reset_occurred
            || defensive_reset
        {
            self.spawn_refresh(RefreshMode::OneShot)
        } else {
            false
        };

        Ok(self.respond(items, is_open, &state, spawned))
    }

    async fn seed_if_empty(&self) -> Result<()> {
        let mut memory = self.memory.write().await;
        if memory.is_some() {
            return Ok(());
        }

        let items = self.seed.get(self.dataset)?.to_vec();
        info!(count = items.len(), "시드 테이블로 메모리 캐시 초기화");
        *memory = Some(MemoryDataset {
            items: items.clone(),
            fetched_at: None,
        });
        drop(memory);

        self.cache.write(&items).await;
        Ok(())
    }

    async fn snapshot(&self) -> Vec<Record> {
        self.memory
            .read()
            .await
            .as_ref()
            .map(|m| m.items.clone())
            .unwrap_or_default()
    }

    fn respond(
        &self,
        items: Vec<Record>,
        is_open: bool,
        state: &UpdateState,
        spawned: bool,
    ) -> DatasetResponse {
        let last_update_time = items.iter().filter_map(|r| r.last_updated).max();
        DatasetResponse {
            items,
            update_status: UpdateStatus {
                is_market_open: is_open,
                has_completed_initial_update: state.has_completed_initial_update,
                is_background_update_in_progress: state.is_background_update_in_progress
                    || spawned,
                last_update_time,
            },
        }
    }

    fn has_running_refresh(&self) -> bool {
        let mut handles = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        !handles.is_empty()
    }

    /// 새로고침 태스크를 띄웁니다. 호출자는 기다리지 않습니다.
    pub fn spawn_refresh(self: &Arc<Self>, mode: RefreshMode) -> bool {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            this.run_refresh(mode).await;
        });

        let mut handles = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
        debug!(dataset = %self.dataset, mode = mode.as_str(), "새로고침 태스크 시작");
        true
    }

    /// 진행 중인 새로고침 태스크가 모두 끝날 때까지 기다립니다.
    pub async fn wait_for_refresh(&self) {
        loop {
            let handles: Vec<JoinHandle<()>> = {
                let mut guard = self.in_flight.lock().unwrap_or_else(PoisonError::into_inner);
                std::mem::take(&mut *guard)
            };
            if handles.is_empty() {
                return;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    error!(dataset = %self.dataset, error = %e, "새로고침 태스크 비정상 종료");
                }
            }
        }
    }

    /// 진입 관문을 통과하면 새로고침을 끝까지 실행합니다.
    #[instrument(skip(self, mode), fields(dataset = %self.dataset, mode = mode.as_str()))]
    pub async fn run_refresh(&self, mode: RefreshMode) {
        match self.state.try_start_update().await {
            Ok(true) => {}
            Ok(false) => {
                debug!("다른 새로고침이 진행 중이라 건너뜀");
                return;
            }
            Err(e) => {
                warn!(error = %e, "새로고침 진입 실패");
                return;
            }
        }

        let started = Instant::now();
        match self.execute_refresh(mode).await {
            Ok(mut stats) => {
                stats.elapsed = started.elapsed();
                stats.log_summary(self.dataset.as_str(), mode.as_str());

                if stats.success_ratio() >= self.options.success_threshold {
                    if let Some(memory) = self.memory.write().await.as_mut() {
                        memory.fetched_at = Some(self.market.now());
                    }
                    if let Err(e) = self.state.mark_update_completed().await {
                        warn!(error = %e, "완료 상태 기록 실패");
                    }
                } else {
                    warn!(
                        success_rate = format!("{:.1}%", stats.success_rate()),
                        threshold = self.options.success_threshold,
                        "성공률 미달, 다음 요청에서 재시도"
                    );
                    self.release().await;
                }
            }
            Err(e) => {
                error!(error = %e, elapsed_ms = started.elapsed().as_millis() as u64, "새로고침 중단");
                self.release().await;
            }
        }
    }

    async fn release(&self) {
        if let Err(e) = self.state.release_update().await {
            warn!(error = %e, "진행 중 플래그 해제 실패");
        }
    }

    async fn execute_refresh(&self, mode: RefreshMode) -> Result<RefreshStats> {
        if self.tokens.is_empty() {
            return Err(DataError::NoCredentialsAvailable);
        }

        let mut working = match self.memory.read().await.as_ref() {
            Some(memory) => memory.items.clone(),
            None => self.seed.get(self.dataset)?.to_vec(),
        };

        let now = self.market.now();
        let window = self.options.freshness(mode);
        let targets: Vec<usize> = working
            .iter()
            .enumerate()
            .filter(|(_, record)| !record.is_fresh(now, window))
            .map(|(i, _)| i)
            .collect();

        let mut stats = RefreshStats::new();
        stats.skipped = working.len() - targets.len();
        let mut exhausted: HashSet<usize> = HashSet::new();
        let batch_size = self.batch_size_for(targets.len());

        for (batch_index, batch) in targets.chunks(batch_size).enumerate() {
            if batch_index > 0 && !self.options.batch_delay.is_zero() {
                tokio::time::sleep(self.options.batch_delay).await;
            }

            let credential = self.tokens.current()?;
            let requests = batch.iter().map(|&i| {
                let symbol = working[i].symbol.clone();
                async move { (i, self.fetch_one(&symbol, credential).await) }
            });
            let results = join_all(requests).await;

            for (i, result) in results {
                stats.total += 1;
                match result {
                    Ok(quote) => {
                        working[i].apply_quote(&quote, self.market.now());
                        stats.success += 1;
                        exhausted.remove(&credential.index);
                    }
                    Err(failure) => {
                        stats.errors += 1;
                        if failure.error.triggers_rotation() {
                            stats.rate_limited += 1;
                            exhausted.insert(failure.credential);
                            self.tokens.rotate_from(failure.credential);
                        }
                        debug!(symbol = %working[i].symbol, error = %failure.error, "업스트림 조회 실패");
                    }
                }
            }
            stats.batches += 1;

            self.publish(&working).await;

            if exhausted.len() >= self.tokens.len() {
                stats.log_summary(self.dataset.as_str(), mode.as_str());
                return Err(DataError::CredentialsExhausted {
                    count: self.tokens.len(),
                });
            }
        }

        Ok(stats)
    }

    /// 배치 크기. 한 번의 새로고침이 키 수만큼의 배치로 나뉘도록 설정값을 줄입니다.
    ///
    /// 배치 하나는 키 하나를 쓰므로, 배치가 하나뿐이면 순환된 키가 같은 패스에서 쓰이지 못합니다.
    fn batch_size_for(&self, targets: usize) -> usize {
        let per_key = targets.div_ceil(self.tokens.len().max(1)).max(1);
        self.options.batch_size.min(per_key)
    }

    async fn fetch_one(
        &self,
        symbol: &str,
        credential: Credential<'_>,
    ) -> std::result::Result<LiveQuote, FetchFailure> {
        let request = self.provider.fetch_quote(symbol, &credential);
        let error = match tokio::time::timeout(self.options.request_timeout, request).await {
            Ok(Ok(quote)) => return Ok(quote),
            Ok(Err(e)) => e,
            Err(_) => ProviderError::Timeout(format!(
                "{}s elapsed",
                self.options.request_timeout.as_secs()
            )),
        };
        Err(FetchFailure {
            credential: credential.index,
            error,
        })
    }

    /// 진행 중 데이터를 메모리에 반영하고 영속화합니다.
    async fn publish(&self, working: &[Record]) {
        {
            let mut memory = self.memory.write().await;
            match memory.as_mut() {
                Some(m) => m.items = working.to_vec(),
                None => {
                    *memory = Some(MemoryDataset {
                        items: working.to_vec(),
                        fetched_at: None,
                    })
                }
            }
        }
        self.cache.write(working).await;
    }

    /// 관리자 캐시 삭제.
    #[instrument(skip(self), fields(dataset = %self.dataset))]
    pub async fn clear_cache(&self, mode: ClearMode) -> Result<ClearReport> {
        let mut report = ClearReport::default();

        match mode {
            ClearMode::Cache => {
                self.cache.clear().await?;
                report.push(self.dataset, "persistent_cache");
            }
            ClearMode::Full => {
                self.cache.clear().await?;
                self.state.reset_flags().await?;
                report.push(self.dataset, "persistent_cache");
                report.push(self.dataset, "update_state");
            }
            ClearMode::Defensive => {
                self.state.defensive_reset().await?;
                report.push(self.dataset, "persistent_cache");
                report.push(self.dataset, "update_state");
                report.push(self.dataset, "defensive_reset");
            }
        }

        *self.memory.write().await = None;
        report.push(self.dataset, "memory_cache");

        info!(mode = %mode, items = ?report.cleared_items, "관리자 캐시 삭제");
        Ok(report)
    }

    /// 업스트림 제공자 진단. 심볼을 생략하면 시드 테이블의 첫 레코드를 씁니다.
    pub async fn diagnose_provider(
        &self,
        symbol: Option<&str>,
        mode: DiagnosticMode,
        count: usize,
    ) -> Result<DiagnosticReport> {
        let symbol = match symbol {
            Some(symbol) => symbol.to_string(),
            None => self
                .seed
                .get(self.dataset)?
                .first()
                .map(|r| r.symbol.clone())
                .ok_or_else(|| DataError::MissingSeed(self.dataset.to_string()))?,
        };

        ProviderDiagnostics::new(
            self.provider.as_ref(),
            &self.tokens,
            self.options.request_timeout,
        )
        .run(&symbol, mode, count, self.market.now())
        .await
    }

    /// 운영 점검용 캐시 상태.
    pub async fn read_cache_debug(&self) -> Result<CacheDebugReport> {
        let is_open = self.market.is_market_open();
        let ttl = self.ttl.compute_ttl(is_open);
        let now = self.market.now();

        let memory = self.memory.read().await.as_ref().map(|m| MemoryCacheSummary {
            item_count: m.items.len(),
            fetched_at: m.fetched_at,
            is_fresh: m.is_fresh(now, ttl),
        });

        let persisted = self.cache.read_any().await.map(|p| {
            let age = now - p.timestamp;
            PersistedCacheSummary {
                item_count: p.items.len(),
                timestamp: p.timestamp,
                age_secs: age.num_seconds(),
                is_expired: age >= ttl,
            }
        });

        Ok(CacheDebugReport {
            dataset: self.dataset,
            backend: self.backend,
            cache_key: self.cache.key().to_string(),
            is_market_open: is_open,
            ttl_secs: ttl.num_seconds(),
            memory,
            persisted,
            update_state: self.state.read().await?,
            reset_threshold: self.state.reset_threshold(),
            credentials: self.tokens.len(),
            refresh_running: self.has_running_refresh(),
        })
    }
}
