//! 시계 추상화.
//!
//! TTL 판정과 상태 타임스탬프는 모두 주입된 `Clock`을 통해 현재 시각을 얻습니다.
//! 운영에서는 [`SystemClock`], 테스트와 재현 시나리오에서는 [`ManualClock`]을 사용합니다.

use chrono::{DateTime, Duration, Utc};
use std::sync::{Mutex, PoisonError};

/// 현재 시각 제공자.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// 현재 UTC 시각.
    fn now(&self) -> DateTime<Utc>;
}

/// 시스템 시계.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 수동으로 진행시키는 시계.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// 주어진 시각에서 시작하는 시계 생성.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// 시각을 지정한 값으로 이동.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = at;
    }

    /// 시각을 `delta`만큼 진행.
    pub fn advance(&self, delta: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_manual_clock_advance() {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 15, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::minutes(4));
        assert_eq!(clock.now(), start + Duration::minutes(4));

        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
