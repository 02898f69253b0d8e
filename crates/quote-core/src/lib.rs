//! # Quote Core
//!
//! 시세 프록시 전반에서 사용하는 핵심 타입을 제공합니다.
//!
//! - 레코드 및 데이터셋 이름 정의
//! - 시장 캘린더 (개장 여부, 마감 임박 여부)
//! - 시계 추상화
//! - 설정 관리
//! - 로깅 인프라

pub mod calendar;
pub mod clock;
pub mod config;
pub mod domain;
pub mod error;
pub mod logging;

pub use calendar::{ExchangeCalendar, MarketCalendar, MarketContext};
pub use clock::{Clock, ManualClock, SystemClock};
pub use self::config::*;
pub use domain::*;
pub use error::*;
pub use logging::*;
