//! 새로고침 통계.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 새로고침 한 번의 통계.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefreshStats {
    /// 업스트림에 요청한 레코드 수
    pub total: usize,
    /// 성공 횟수
    pub success: usize,
    /// 에러 횟수 (요청 한도/인증 포함)
    pub errors: usize,
    /// 요청 한도/인증 오류 횟수
    pub rate_limited: usize,
    /// 건너뛴 레코드 (최근에 갱신됨)
    pub skipped: usize,
    /// 처리한 배치 수
    pub batches: usize,
    /// 소요 시간
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RefreshStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 성공 비율 (0.0 - 1.0). 요청이 없으면 1.0.
    pub fn success_ratio(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.success as f64 / self.total as f64
        }
    }

    /// 성공률 (%)
    pub fn success_rate(&self) -> f64 {
        self.success_ratio() * 100.0
    }

    /// 통계 요약 로그 출력
    pub fn log_summary(&self, dataset: &str, mode: &str) {
        tracing::info!(
            dataset = dataset,
            mode = mode,
            total = self.total,
            success = self.success,
            errors = self.errors,
            rate_limited = self.rate_limited,
            skipped = self.skipped,
            batches = self.batches,
            success_rate = format!("{:.1}%", self.success_rate()),
            elapsed = format!("{:.1}s", self.elapsed.as_secs_f64()),
            "새로고침 완료"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_rate() {
        let stats = RefreshStats {
            total: 4,
            success: 3,
            errors: 1,
            ..Default::default()
        };
        assert_eq!(stats.success_ratio(), 0.75);
        assert_eq!(stats.success_rate(), 75.0);
    }

    #[test]
    fn test_nothing_attempted_counts_as_success() {
        let stats = RefreshStats {
            skipped: 17,
            ..Default::default()
        };
        assert_eq!(stats.success_ratio(), 1.0);
    }
}
