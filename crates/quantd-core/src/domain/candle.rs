//! 캔들 이벤트 타입.

use crate::types::{Price, Quantity, Timeframe};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// OHLCV 캔들 이벤트.
///
/// 피드가 (심볼, 타임프레임) 키별로 생성하는 불변 이벤트입니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    /// 거래 심볼 (예: "BTC")
    pub symbol: String,
    /// 타임프레임
    pub timeframe: Timeframe,
    /// 캔들 시작 시간
    pub open_time: DateTime<Utc>,
    /// 캔들 종료 시간
    pub close_time: DateTime<Utc>,
    /// 시가
    pub open: Price,
    /// 고가
    pub high: Price,
    /// 저가
    pub low: Price,
    /// 종가
    pub close: Price,
    /// 거래량
    pub volume: Quantity,
}

impl Candle {
    /// 양봉(종가 > 시가)인지 확인합니다.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// 캔들 범위(고가 - 저가)를 반환합니다.
    pub fn range(&self) -> Price {
        self.high - self.low
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_candle_helpers() {
        let now = Utc::now();
        let candle = Candle {
            symbol: "BTC".to_string(),
            timeframe: Timeframe::H1,
            open_time: now,
            close_time: now,
            open: dec!(50000),
            high: dec!(51000),
            low: dec!(49500),
            close: dec!(50500),
            volume: dec!(100),
        };

        assert!(candle.is_bullish());
        assert_eq!(candle.range(), dec!(1500));
    }
}
