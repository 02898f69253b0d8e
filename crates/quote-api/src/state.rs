//! 모든 핸들러에서 공유되는 애플리케이션 상태.

use quote_core::MarketContext;
use quote_data::DatasetHub;
use secrecy::SecretString;

/// 애플리케이션 공유 상태.
///
/// `Arc`로 감싸 axum `State` extractor로 주입됩니다.
#[derive(Clone)]
pub struct AppState {
    /// 데이터셋별 새로고침 오케스트레이터
    pub hub: DatasetHub,

    /// 시장 캘린더 + 시계
    pub market: MarketContext,

    /// 관리자 키 (`ADMIN_SECRET_KEY`). 없으면 관리자 엔드포인트는 500
    pub admin_key: Option<SecretString>,

    /// 서버 시작 시간
    pub started_at: chrono::DateTime<chrono::Utc>,

    /// API 버전
    pub version: String,
}

impl AppState {
    pub fn new(hub: DatasetHub, market: MarketContext, admin_key: Option<SecretString>) -> Self {
        Self {
            hub,
            market,
            admin_key,
            started_at: chrono::Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// 환경 변수에서 관리자 키를 읽습니다. 비어 있으면 `None`.
    pub fn admin_key_from_env() -> Option<SecretString> {
        std::env::var("ADMIN_SECRET_KEY")
            .ok()
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .map(|k| SecretString::new(k.into_boxed_str()))
    }

    /// 서버 업타임(초).
    pub fn uptime_secs(&self) -> i64 {
        chrono::Utc::now()
            .signed_duration_since(self.started_at)
            .num_seconds()
    }
}

/// 테스트용 상태.
///
/// 메모리 저장소, 내장 시드, API 키 없음. 새로고침은 시도되지만 즉시 포기합니다.
#[cfg(any(test, feature = "test-utils"))]
pub fn create_test_state(admin_key: Option<&str>) -> AppState {
    use quote_core::{DatasetKind, ExchangeCalendar, SystemClock};
    use quote_data::{
        FinnhubProvider, MemoryStore, OrchestratorDeps, OrchestratorSettings, QuoteProvider,
        RefreshOrchestrator, SeedCatalog, SelectionPolicy, TokenRotator,
    };
    use std::sync::Arc;
    use std::time::Duration;

    let market = MarketContext::new(
        Arc::new(ExchangeCalendar::us_equities()),
        Arc::new(SystemClock),
    );
    let store = Arc::new(MemoryStore::new());
    let seed = Arc::new(SeedCatalog::builtin());

    let mut hub = DatasetHub::new();
    for kind in DatasetKind::all() {
        let provider: Arc<dyn QuoteProvider> = Arc::new(
            FinnhubProvider::new(Duration::from_secs(1)).expect("reqwest client"),
        );
        let deps = OrchestratorDeps {
            store: store.clone(),
            seed: seed.clone(),
            provider,
            tokens: Arc::new(TokenRotator::new(Vec::<String>::new(), SelectionPolicy::RoundRobin)),
            market: market.clone(),
        };
        hub = hub.with(RefreshOrchestrator::new(
            kind,
            deps,
            OrchestratorSettings::default(),
        ));
    }

    AppState::new(
        hub,
        market,
        admin_key.map(|k| SecretString::new(k.to_string().into_boxed_str())),
    )
}
