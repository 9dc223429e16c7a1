//! 거래소 클라이언트 추상화.
//!
//! 라이브 컨텍스트와 백테스트 데이터 소스가 공유하는 거래소 인터페이스입니다.
//! 주문 계열 메서드는 예상 가능한 거부를 `OrderResult::Failed`로 표현하고,
//! 조회 계열 메서드는 전송/파싱 실패를 `ExchangeError`로 전파합니다.

use crate::domain::candle::Candle;
use crate::domain::order::{CloseParams, OrderParams, OrderResult};
use crate::domain::position::{AccountState, Position};
use crate::types::Timeframe;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// 거래소 조회 실패.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("Exchange error: {0}")]
    Other(String),
}

/// 거래소 클라이언트 인터페이스.
#[async_trait]
pub trait ExchangeClient: Send + Sync {
    /// 거래소 이름을 반환합니다.
    fn exchange_name(&self) -> &str;

    /// 포지션을 엽니다.
    async fn open_position(&self, params: OrderParams) -> OrderResult;

    /// 포지션을 청산합니다.
    async fn close_position(&self, params: CloseParams) -> OrderResult;

    /// 계좌 상태를 조회합니다.
    async fn get_balance(&self) -> Result<AccountState, ExchangeError>;

    /// 열린 포지션 목록을 조회합니다.
    async fn get_positions(&self) -> Result<Vec<Position>, ExchangeError>;

    /// 최근 캔들을 조회합니다.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// 구간 캔들을 조회합니다.
    async fn fetch_candle_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ExchangeError>;
}
