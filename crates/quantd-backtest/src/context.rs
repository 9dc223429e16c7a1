//! 백테스트용 시뮬레이션 컨텍스트.
//!
//! 거래소 대신 메모리 내 계좌/포지션을 시뮬레이션합니다. 포지션 진입 시
//! 명목 가치만큼 잔고에서 증거금을 잠그고, 청산 시 증거금과 실현 손익을
//! 잔고로 되돌립니다.

use async_trait::async_trait;
use quantd_core::domain::{
    realized_pnl, AccountState, Candle, CloseParams, ExchangeError, OrderParams, OrderResult,
    Position,
};
use quantd_core::store::KvStore;
use quantd_core::types::{Price, Timeframe};
use quantd_strategy::StrategyContext;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

type HistoryMap = HashMap<(String, Timeframe), Vec<Candle>>;

/// 시뮬레이션 계좌 상태.
struct SimState {
    balance: Decimal,
    positions: HashMap<String, Position>,
}

/// 러너가 컨텍스트 이동 후에도 시뮬레이션을 관측/적재하기 위한 핸들.
#[derive(Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
    history: Arc<RwLock<HistoryMap>>,
}

impl SimHandle {
    /// 현재 가용 잔고 (잠긴 증거금 제외).
    pub fn balance(&self) -> Decimal {
        self.lock_state().balance
    }

    /// 열린 포지션 수.
    pub fn position_count(&self) -> usize {
        self.lock_state().positions.len()
    }

    /// 과거 캔들을 히스토리에 적재합니다.
    pub fn load_history(&self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        self.lock_history_mut()
            .insert((symbol.to_string(), timeframe), candles);
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_history_mut(&self) -> std::sync::RwLockWriteGuard<'_, HistoryMap> {
        self.history
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 백테스트 컨텍스트.
pub struct BacktestContext {
    state: Arc<Mutex<SimState>>,
    history: Arc<RwLock<HistoryMap>>,
    store: Arc<dyn KvStore>,
    order_seq: AtomicU64,
}

impl BacktestContext {
    /// 초기 잔고로 컨텍스트를 생성하고 관측 핸들을 함께 반환합니다.
    pub fn new(initial_balance: Decimal, store: Arc<dyn KvStore>) -> (Self, SimHandle) {
        let state = Arc::new(Mutex::new(SimState {
            balance: initial_balance,
            positions: HashMap::new(),
        }));
        let history = Arc::new(RwLock::new(HashMap::new()));

        let handle = SimHandle {
            state: state.clone(),
            history: history.clone(),
        };

        (
            Self {
                state,
                history,
                store,
                order_seq: AtomicU64::new(1),
            },
            handle,
        )
    }

    fn next_order_id(&self) -> String {
        format!("backtest-{}", self.order_seq.fetch_add(1, Ordering::SeqCst))
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StrategyContext for BacktestContext {
    async fn open_position(&self, params: OrderParams) -> OrderResult {
        let order_id = self.next_order_id();

        let Some(price) = params.price else {
            return OrderResult::failed(order_id, "price required in backtest");
        };
        if params.size <= Decimal::ZERO {
            return OrderResult::failed(order_id, "size must be positive");
        }

        let mut state = self.lock_state();
        if state.positions.contains_key(&params.symbol) {
            return OrderResult::failed(order_id, "position already open for symbol");
        }

        // 명목 가치만큼 증거금 잠금
        let cost = params.size * price;
        if cost > state.balance {
            return OrderResult::failed(order_id, "insufficient balance");
        }

        state.balance -= cost;
        state.positions.insert(
            params.symbol.clone(),
            Position {
                symbol: params.symbol.clone(),
                side: params.side,
                size: params.size,
                entry_price: price,
                mark_price: price,
                unrealized_pnl: Decimal::ZERO,
                liquidation_price: Decimal::ZERO,
                leverage: params.leverage.unwrap_or(Decimal::ONE),
                margin_used: cost,
            },
        );

        debug!(
            symbol = %params.symbol,
            side = %params.side,
            size = %params.size,
            price = %price,
            "Simulated position opened"
        );

        OrderResult::filled(order_id, Some(price), params.size)
    }

    async fn close_position(&self, params: CloseParams) -> OrderResult {
        let order_id = self.next_order_id();

        let Some(price) = params.price else {
            return OrderResult::failed(order_id, "price required in backtest");
        };

        let mut state = self.lock_state();
        let Some(position) = state.positions.get(&params.symbol).cloned() else {
            return OrderResult::failed(order_id, "no position to close");
        };

        let close_size = params.size.min(position.size);
        if close_size <= Decimal::ZERO {
            return OrderResult::failed(order_id, "size must be positive");
        }

        let pnl = realized_pnl(position.entry_price, price, close_size, position.side);
        let released_margin = position.margin_used * close_size / position.size;
        state.balance += released_margin + pnl;

        let remaining = position.size - close_size;
        if remaining > Decimal::ZERO {
            if let Some(entry) = state.positions.get_mut(&params.symbol) {
                entry.size = remaining;
                entry.margin_used -= released_margin;
            }
        } else {
            state.positions.remove(&params.symbol);
        }

        debug!(
            symbol = %params.symbol,
            size = %close_size,
            price = %price,
            pnl = %pnl,
            "Simulated position closed"
        );

        OrderResult::filled(order_id, Some(price), close_size)
    }

    async fn get_balance(&self) -> Result<AccountState, ExchangeError> {
        let state = self.lock_state();
        let margin_used: Decimal = state.positions.values().map(|p| p.margin_used).sum();

        Ok(AccountState {
            account_value: state.balance + margin_used,
            available_balance: state.balance,
            margin_used,
            withdrawable: state.balance,
        })
    }

    async fn get_positions(&self) -> Result<Vec<Position>, ExchangeError> {
        Ok(self.lock_state().positions.values().cloned().collect())
    }

    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let history = self
            .history
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let candles = history
            .get(&(symbol.to_string(), timeframe))
            .cloned()
            .unwrap_or_default();

        let start = candles.len().saturating_sub(count);
        Ok(candles[start..].to_vec())
    }

    fn store(&self) -> Arc<dyn KvStore> {
        self.store.clone()
    }

    fn is_backtest(&self) -> bool {
        true
    }

    fn is_testnet(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quantd_core::domain::{OrderKind, OrderStatus, Side};
    use quantd_core::store::MemoryKvStore;
    use rust_decimal_macros::dec;

    fn open_params(symbol: &str, size: Decimal, price: Price) -> OrderParams {
        OrderParams {
            symbol: symbol.to_string(),
            side: Side::Long,
            size,
            price: Some(price),
            kind: OrderKind::Limit,
            leverage: None,
        }
    }

    fn close_params(symbol: &str, size: Decimal, price: Price) -> CloseParams {
        CloseParams {
            symbol: symbol.to_string(),
            size,
            price: Some(price),
            kind: None,
        }
    }

    fn setup(initial: Decimal) -> (BacktestContext, SimHandle) {
        BacktestContext::new(initial, Arc::new(MemoryKvStore::new()))
    }

    #[tokio::test]
    async fn test_open_locks_margin() {
        let (ctx, handle) = setup(dec!(10000));

        let result = ctx.open_position(open_params("BTC", dec!(0.01), dec!(60000))).await;
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(handle.balance(), dec!(9400));
        assert_eq!(handle.position_count(), 1);

        let account = ctx.get_balance().await.unwrap();
        assert_eq!(account.account_value, dec!(10000));
        assert_eq!(account.margin_used, dec!(600));
    }

    #[tokio::test]
    async fn test_close_releases_margin_and_pnl() {
        let (ctx, handle) = setup(dec!(10000));

        ctx.open_position(open_params("BTC", dec!(0.01), dec!(60000))).await;
        let result = ctx.close_position(close_params("BTC", dec!(0.01), dec!(61000))).await;

        assert_eq!(result.status, OrderStatus::Filled);
        // 9,400 + 600(증거금) + 10(손익) = 10,010
        assert_eq!(handle.balance(), dec!(10010));
        assert_eq!(handle.position_count(), 0);
    }

    #[tokio::test]
    async fn test_short_close_inverts_pnl() {
        let (ctx, handle) = setup(dec!(10000));

        let mut params = open_params("BTC", dec!(0.01), dec!(60000));
        params.side = Side::Short;
        ctx.open_position(params).await;
        ctx.close_position(close_params("BTC", dec!(0.01), dec!(61000))).await;

        // 숏이므로 손실 10
        assert_eq!(handle.balance(), dec!(9990));
    }

    #[tokio::test]
    async fn test_partial_close() {
        let (ctx, handle) = setup(dec!(10000));

        ctx.open_position(open_params("BTC", dec!(0.02), dec!(60000))).await;
        ctx.close_position(close_params("BTC", dec!(0.01), dec!(61000))).await;

        // 증거금 절반(600)과 손익 10 반환, 나머지 포지션 유지
        assert_eq!(handle.balance(), dec!(9410));
        assert_eq!(handle.position_count(), 1);

        let positions = ctx.get_positions().await.unwrap();
        assert_eq!(positions[0].size, dec!(0.01));
        assert_eq!(positions[0].margin_used, dec!(600));
    }

    #[tokio::test]
    async fn test_rejections_are_failed_results() {
        let (ctx, handle) = setup(dec!(100));

        // 잔고 부족
        let result = ctx.open_position(open_params("BTC", dec!(1), dec!(60000))).await;
        assert_eq!(result.status, OrderStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("insufficient balance"));
        assert_eq!(handle.balance(), dec!(100));

        // 없는 포지션 청산
        let result = ctx.close_position(close_params("BTC", dec!(1), dec!(60000))).await;
        assert_eq!(result.status, OrderStatus::Failed);
        assert_eq!(result.error.as_deref(), Some("no position to close"));

        // 가격 없는 주문
        let mut params = open_params("BTC", dec!(0.001), dec!(60000));
        params.price = None;
        let result = ctx.open_position(params).await;
        assert_eq!(result.status, OrderStatus::Failed);
    }

    #[tokio::test]
    async fn test_fetch_candles_from_loaded_history() {
        let (ctx, handle) = setup(dec!(10000));
        let now = chrono::Utc::now();

        let candles: Vec<Candle> = (0..5)
            .map(|i| Candle {
                symbol: "BTC".to_string(),
                timeframe: Timeframe::M1,
                open_time: now + chrono::Duration::minutes(i),
                close_time: now + chrono::Duration::minutes(i + 1),
                open: dec!(50000),
                high: dec!(50100),
                low: dec!(49900),
                close: dec!(50000) + Decimal::from(i),
                volume: dec!(1),
            })
            .collect();
        handle.load_history("BTC", Timeframe::M1, candles);

        let recent = ctx.fetch_candles("BTC", Timeframe::M1, 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[1].close, dec!(50004));

        let missing = ctx.fetch_candles("ETH", Timeframe::M1, 10).await.unwrap();
        assert!(missing.is_empty());
    }
}
