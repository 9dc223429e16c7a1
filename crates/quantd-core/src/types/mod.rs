//! 기본 타입 정의.

pub mod decimal;
pub mod timeframe;

pub use decimal::{Percentage, Price, Quantity};
pub use timeframe::Timeframe;
