//! 시장 캘린더.
//!
//! 캐시 서브시스템은 캘린더를 "지금 시장이 열려 있는가"라는 불리언 신호로만 소비합니다.
//! 기본 구현인 [`ExchangeCalendar`]는 거래소 시간대 기준으로 다음을 판정합니다:
//!
//! - 정규 거래 시간 (기본 09:30 - 16:00 America/New_York, DST 반영)
//! - 주말 제외
//! - 정적 휴장일 테이블

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use chrono_tz::Tz;
use std::collections::BTreeSet;
use std::sync::Arc;

use crate::clock::Clock;
use crate::config::CalendarConfig;
use crate::error::{CoreError, CoreResult};

/// 시장 개장 신호 제공자.
pub trait MarketCalendar: Send + Sync {
    /// `at` 시점에 정규장이 열려 있는지.
    fn is_market_open(&self, at: DateTime<Utc>) -> bool;

    /// `at` 시점이 정규장 마감 직전 구간인지.
    fn is_near_close(&self, at: DateTime<Utc>) -> bool;

    /// 거래소 시간대 이름.
    fn timezone_name(&self) -> &str {
        "UTC"
    }
}

/// 시간대, 거래 시간, 휴장일 테이블 기반 캘린더.
#[derive(Debug, Clone)]
pub struct ExchangeCalendar {
    timezone: Tz,
    open: NaiveTime,
    close: NaiveTime,
    near_close: Duration,
    holidays: BTreeSet<NaiveDate>,
}

impl ExchangeCalendar {
    /// 캘린더 생성.
    pub fn new(
        timezone: Tz,
        open: NaiveTime,
        close: NaiveTime,
        near_close: Duration,
        holidays: impl IntoIterator<Item = NaiveDate>,
    ) -> CoreResult<Self> {
        if open >= close {
            return Err(CoreError::Calendar(format!(
                "개장 시각({})이 마감 시각({})보다 늦습니다",
                open, close
            )));
        }

        Ok(Self {
            timezone,
            open,
            close,
            near_close,
            holidays: holidays.into_iter().collect(),
        })
    }

    /// 미국 정규장 (NYSE/NASDAQ) 기본 캘린더.
    pub fn us_equities() -> Self {
        Self {
            timezone: chrono_tz::America::New_York,
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or(NaiveTime::MIN),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or(NaiveTime::MIN),
            near_close: Duration::minutes(15),
            holidays: us_market_holidays().into_iter().collect(),
        }
    }

    /// 설정에서 캘린더 생성.
    pub fn from_config(config: &CalendarConfig) -> CoreResult<Self> {
        let timezone: Tz = config
            .timezone
            .parse()
            .map_err(|e| CoreError::Calendar(format!("시간대 파싱 실패 {}: {}", config.timezone, e)))?;
        let open = parse_time(&config.open)?;
        let close = parse_time(&config.close)?;

        let holidays = match &config.holidays {
            Some(dates) => dates
                .iter()
                .map(|d| {
                    NaiveDate::parse_from_str(d, "%Y-%m-%d")
                        .map_err(|e| CoreError::Calendar(format!("휴장일 파싱 실패 {}: {}", d, e)))
                })
                .collect::<CoreResult<Vec<_>>>()?,
            None => us_market_holidays(),
        };

        Self::new(
            timezone,
            open,
            close,
            Duration::minutes(config.near_close_minutes as i64),
            holidays,
        )
    }

    /// 주어진 현지 날짜가 거래일인지 확인.
    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) && !self.holidays.contains(&date)
    }

    fn local_session(&self, at: DateTime<Utc>) -> Option<NaiveTime> {
        let local = at.with_timezone(&self.timezone);
        if !self.is_trading_day(local.date_naive()) {
            return None;
        }
        let time = local.time();
        (time >= self.open && time < self.close).then_some(time)
    }
}

impl MarketCalendar for ExchangeCalendar {
    fn is_market_open(&self, at: DateTime<Utc>) -> bool {
        self.local_session(at).is_some()
    }

    fn is_near_close(&self, at: DateTime<Utc>) -> bool {
        match self.local_session(at) {
            Some(time) => self.close - time <= self.near_close,
            None => false,
        }
    }

    fn timezone_name(&self) -> &str {
        self.timezone.name()
    }
}

/// 캘린더와 시계를 묶은 시장 컨텍스트.
#[derive(Clone)]
pub struct MarketContext {
    calendar: Arc<dyn MarketCalendar>,
    clock: Arc<dyn Clock>,
}

impl MarketContext {
    pub fn new(calendar: Arc<dyn MarketCalendar>, clock: Arc<dyn Clock>) -> Self {
        Self { calendar, clock }
    }

    /// 현재 시각.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// 현재 정규장 개장 여부.
    pub fn is_market_open(&self) -> bool {
        self.calendar.is_market_open(self.clock.now())
    }

    /// 현재 마감 임박 여부.
    pub fn is_near_close(&self) -> bool {
        self.calendar.is_near_close(self.clock.now())
    }

    pub fn timezone_name(&self) -> &str {
        self.calendar.timezone_name()
    }

    /// 공유 시계.
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

impl std::fmt::Debug for MarketContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketContext")
            .field("timezone", &self.calendar.timezone_name())
            .field("clock", &self.clock)
            .finish()
    }
}

fn parse_time(value: &str) -> CoreResult<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|e| CoreError::Calendar(format!("시각 파싱 실패 {}: {}", value, e)))
}

/// NYSE 전일 휴장일 (2025-2026).
pub fn us_market_holidays() -> Vec<NaiveDate> {
    [
        (2025, 1, 1),
        (2025, 1, 9),
        (2025, 1, 20),
        (2025, 2, 17),
        (2025, 4, 18),
        (2025, 5, 26),
        (2025, 6, 19),
        (2025, 7, 4),
        (2025, 9, 1),
        (2025, 11, 27),
        (2025, 12, 25),
        (2026, 1, 1),
        (2026, 1, 19),
        (2026, 2, 16),
        (2026, 4, 3),
        (2026, 5, 25),
        (2026, 6, 19),
        (2026, 7, 3),
        (2026, 9, 7),
        (2026, 11, 26),
        (2026, 12, 25),
    ]
    .into_iter()
    .filter_map(|(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
    .collect()
}
