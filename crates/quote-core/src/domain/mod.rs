//! 도메인 모델.

pub mod dataset;
pub mod indicator;
pub mod record;

pub use dataset::DatasetKind;
pub use indicator::IndicatorUnit;
pub use record::{LiveQuote, LocalizedString, Record};
