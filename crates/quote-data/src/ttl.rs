//! 시장 상태 기반 캐시 TTL.

use chrono::Duration;
use quote_core::TtlConfig;

/// 개장/휴장 TTL 정책.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlPolicy {
    market_open: Duration,
    market_closed: Duration,
}

impl TtlPolicy {
    pub fn new(market_open: Duration, market_closed: Duration) -> Self {
        Self {
            market_open,
            market_closed,
        }
    }

    pub fn from_config(config: &TtlConfig) -> Self {
        Self::new(
            Duration::seconds(config.market_open_secs as i64),
            Duration::seconds(config.market_closed_secs as i64),
        )
    }

    /// 캐시 유효 구간. 개장 중에는 짧고 휴장 중에는 깁니다.
    pub fn compute_ttl(&self, is_market_open: bool) -> Duration {
        if is_market_open {
            self.market_open
        } else {
            self.market_closed
        }
    }
}

impl Default for TtlPolicy {
    fn default() -> Self {
        Self::from_config(&TtlConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ttl() {
        let policy = TtlPolicy::default();
        assert_eq!(policy.compute_ttl(true), Duration::minutes(5));
        assert_eq!(policy.compute_ttl(false), Duration::hours(12));
    }

    #[test]
    fn test_from_config() {
        let policy = TtlPolicy::from_config(&TtlConfig {
            market_open_secs: 60,
            market_closed_secs: 600,
        });
        assert_eq!(policy.compute_ttl(true), Duration::seconds(60));
        assert_eq!(policy.compute_ttl(false), Duration::seconds(600));
    }
}
