//! Strategy 및 StrategyContext trait 정의.

use async_trait::async_trait;
use quantd_core::domain::{
    AccountState, Candle, CloseParams, ExchangeError, OrderParams, OrderResult, Position,
    StrategyStatus,
};
use quantd_core::store::KvStore;
use quantd_core::types::Timeframe;
use std::sync::Arc;

/// 전략 콜백이 반환하는 에러 타입.
pub type StrategyError = Box<dyn std::error::Error + Send + Sync>;

/// 트레이딩 전략 구현을 위한 Strategy trait.
///
/// 모든 전략은 엔진에서 로드되기 위해 이 trait를 구현해야 합니다.
/// 이름/심볼/타임프레임은 전략 자신이 선언하며, 엔진은 이를 읽어
/// 구독과 레코드를 구성합니다.
#[async_trait]
pub trait Strategy: Send + Sync {
    /// 전략 이름 반환.
    fn name(&self) -> &str;

    /// 전략 설명 반환.
    fn description(&self) -> &str;

    /// 구독할 심볼 목록 반환.
    fn symbols(&self) -> Vec<String>;

    /// 구독할 타임프레임 목록 반환.
    fn timeframes(&self) -> Vec<Timeframe>;

    /// 전략 시작 시 호출.
    async fn init(&mut self) -> Result<(), StrategyError>;

    /// 라이브 캔들 수신 시 호출.
    async fn on_candle(&mut self, candle: &Candle) -> Result<(), StrategyError>;

    /// 백테스트 캔들 리플레이 시 호출.
    ///
    /// 기본 구현은 `on_candle`로 위임합니다.
    async fn on_backtest_candle(&mut self, candle: &Candle) -> Result<(), StrategyError> {
        self.on_candle(candle).await
    }

    /// 전략 종료 및 리소스 정리.
    async fn cleanup(&mut self) -> Result<(), StrategyError>;

    /// 현재 전략 상태 스냅샷 반환 (모니터링용).
    fn status(&self) -> StrategyStatus {
        StrategyStatus::default()
    }
}

/// 전략에 주입되는 실행 컨텍스트.
///
/// 라이브/백테스트 구현이 동일한 인터페이스를 제공하므로
/// 전략 코드는 실행 모드를 구분하지 않고 작성됩니다.
#[async_trait]
pub trait StrategyContext: Send + Sync {
    /// 포지션을 엽니다.
    async fn open_position(&self, params: OrderParams) -> OrderResult;

    /// 포지션을 청산합니다.
    async fn close_position(&self, params: CloseParams) -> OrderResult;

    /// 계좌 상태를 조회합니다.
    async fn get_balance(&self) -> Result<AccountState, ExchangeError>;

    /// 열린 포지션 목록을 조회합니다.
    async fn get_positions(&self) -> Result<Vec<Position>, ExchangeError>;

    /// 과거 캔들을 조회합니다.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    /// 전략 전용 키-값 저장소를 반환합니다.
    fn store(&self) -> Arc<dyn KvStore>;

    /// 백테스트 모드 여부.
    fn is_backtest(&self) -> bool;

    /// 테스트넷 사용 여부.
    fn is_testnet(&self) -> bool;
}
