//! 라이브 거래용 전략 컨텍스트.

use crate::traits::StrategyContext;
use async_trait::async_trait;
use quantd_core::domain::{
    AccountState, Candle, CloseParams, ExchangeClient, ExchangeError, OrderParams, OrderResult,
    Position,
};
use quantd_core::store::KvStore;
use quantd_core::types::Timeframe;
use std::sync::Arc;
use tracing::info;

/// 실제 거래소에 주문을 전달하는 라이브 컨텍스트.
///
/// 주문/조회를 거래소 클라이언트에 그대로 위임합니다.
pub struct LiveContext {
    exchange: Arc<dyn ExchangeClient>,
    store: Arc<dyn KvStore>,
    is_testnet: bool,
}

impl LiveContext {
    pub fn new(
        exchange: Arc<dyn ExchangeClient>,
        store: Arc<dyn KvStore>,
        is_testnet: bool,
    ) -> Self {
        Self {
            exchange,
            store,
            is_testnet,
        }
    }
}

#[async_trait]
impl StrategyContext for LiveContext {
    async fn open_position(&self, params: OrderParams) -> OrderResult {
        info!(
            symbol = %params.symbol,
            side = %params.side,
            size = %params.size,
            "Opening position"
        );
        self.exchange.open_position(params).await
    }

    async fn close_position(&self, params: CloseParams) -> OrderResult {
        info!(
            symbol = %params.symbol,
            size = %params.size,
            "Closing position"
        );
        self.exchange.close_position(params).await
    }

    async fn get_balance(&self) -> Result<AccountState, ExchangeError> {
        self.exchange.get_balance().await
    }

    async fn get_positions(&self) -> Result<Vec<Position>, ExchangeError> {
        self.exchange.get_positions().await
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        self.exchange.fetch_candles(symbol, timeframe, count).await
    }

    fn store(&self) -> Arc<dyn KvStore> {
        self.store.clone()
    }

    fn is_backtest(&self) -> bool {
        false
    }

    fn is_testnet(&self) -> bool {
        self.is_testnet
    }
}
