//! 데이터셋별 오케스트레이터 모음.
//!
//! HTTP 상태에 주입되는 프로세스 범위 객체입니다.

use quote_core::DatasetKind;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::diagnostics::{DiagnosticMode, DiagnosticReport};
use crate::error::{DataError, Result};
use crate::orchestrator::RefreshOrchestrator;
use crate::report::{CacheDebugReport, ClearMode, ClearReport, DatasetResponse};

/// 데이터셋 이름 → 오케스트레이터.
#[derive(Default, Clone)]
pub struct DatasetHub {
    orchestrators: BTreeMap<DatasetKind, Arc<RefreshOrchestrator>>,
}

impl DatasetHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// 오케스트레이터를 등록합니다.
    pub fn with(mut self, orchestrator: RefreshOrchestrator) -> Self {
        self.orchestrators
            .insert(orchestrator.dataset(), Arc::new(orchestrator));
        self
    }

    /// 등록된 데이터셋.
    pub fn datasets(&self) -> Vec<DatasetKind> {
        self.orchestrators.keys().copied().collect()
    }

    pub fn get(&self, kind: DatasetKind) -> Result<&Arc<RefreshOrchestrator>> {
        self.orchestrators
            .get(&kind)
            .ok_or_else(|| DataError::UnknownDataset(kind.to_string()))
    }

    /// 이름으로 데이터셋을 조회합니다.
    pub async fn get_dataset(&self, name: &str) -> Result<DatasetResponse> {
        let kind: DatasetKind = name.parse()?;
        self.get(kind)?.get_dataset().await
    }

    /// 지정한 데이터셋(없으면 전체)의 캐시를 삭제합니다.
    pub async fn clear_cache(
        &self,
        mode: ClearMode,
        dataset: Option<DatasetKind>,
    ) -> Result<ClearReport> {
        let mut report = ClearReport::default();
        for orchestrator in self.select(dataset)? {
            report.extend(orchestrator.clear_cache(mode).await?);
        }
        Ok(report)
    }

    /// 지정한 데이터셋(없으면 전체)의 캐시 상태 보고서.
    pub async fn read_cache_debug(
        &self,
        dataset: Option<DatasetKind>,
    ) -> Result<Vec<CacheDebugReport>> {
        let mut reports = Vec::new();
        for orchestrator in self.select(dataset)? {
            reports.push(orchestrator.read_cache_debug().await?);
        }
        Ok(reports)
    }

    /// 데이터셋 제공자의 키별 진단.
    pub async fn diagnose_provider(
        &self,
        dataset: DatasetKind,
        symbol: Option<&str>,
        mode: DiagnosticMode,
        count: usize,
    ) -> Result<DiagnosticReport> {
        self.get(dataset)?
            .diagnose_provider(symbol, mode, count)
            .await
    }

    /// 모든 새로고침 태스크가 끝날 때까지 기다립니다.
    pub async fn wait_idle(&self) {
        for orchestrator in self.orchestrators.values() {
            orchestrator.wait_for_refresh().await;
        }
    }

    fn select(&self, dataset: Option<DatasetKind>) -> Result<Vec<&Arc<RefreshOrchestrator>>> {
        match dataset {
            Some(kind) => Ok(vec![self.get(kind)?]),
            None => Ok(self.orchestrators.values().collect()),
        }
    }
}
