//! 백테스트 러너 통합 테스트.
//!
//! 스크립트된 전략으로 전체 파이프라인을 검증합니다:
//! 플러그인 로드 → 히스토리 수집 → 리플레이 → 거래 추론 → 보고서.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use quantd_core::domain::{
    AccountState, Candle, CloseParams, ExchangeClient, ExchangeError, OrderKind, OrderParams,
    OrderResult, Position, StrategyStatus,
};
use quantd_core::types::Timeframe;
use quantd_backtest::{BacktestError, BacktestOptions, BacktestRunner};
use quantd_strategy::{BuiltinLoader, FnFactory, Strategy, StrategyContext, StrategyError};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::path::{Path, PathBuf};
use std::sync::Arc;

// ================================================================================================
// 헬퍼
// ================================================================================================

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn candle(minute: i64, close: Decimal) -> Candle {
    let open_time = base_time() + Duration::minutes(minute);
    Candle {
        symbol: "BTC".to_string(),
        timeframe: Timeframe::M1,
        open_time,
        close_time: open_time + Duration::minutes(1),
        open: close,
        high: close + dec!(50),
        low: close - dec!(50),
        close,
        volume: dec!(10),
    }
}

/// 고정 캔들 시퀀스를 반환하는 데이터 소스.
struct FixedDataSource {
    candles: Vec<Candle>,
}

#[async_trait]
impl ExchangeClient for FixedDataSource {
    fn exchange_name(&self) -> &str {
        "fixture"
    }

    async fn open_position(&self, params: OrderParams) -> OrderResult {
        OrderResult::failed("unused", format!("not a trading venue: {}", params.symbol))
    }

    async fn close_position(&self, params: CloseParams) -> OrderResult {
        OrderResult::failed("unused", format!("not a trading venue: {}", params.symbol))
    }

    async fn get_balance(&self) -> Result<AccountState, ExchangeError> {
        Err(ExchangeError::Unsupported("get_balance".to_string()))
    }

    async fn get_positions(&self) -> Result<Vec<Position>, ExchangeError> {
        Err(ExchangeError::Unsupported("get_positions".to_string()))
    }

    async fn fetch_candles(
        &self,
        _symbol: &str,
        _timeframe: Timeframe,
        count: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let start = self.candles.len().saturating_sub(count);
        Ok(self.candles[start..].to_vec())
    }

    async fn fetch_candle_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ExchangeError> {
        Ok(self
            .candles
            .iter()
            .filter(|c| {
                c.symbol == symbol && c.timeframe == timeframe && c.open_time >= from && c.open_time <= to
            })
            .cloned()
            .collect())
    }
}

/// 첫 캔들에서 진입하고 지정된 캔들에서 청산하는 스크립트 전략.
struct ScriptedStrategy {
    ctx: Box<dyn StrategyContext>,
    candles_seen: usize,
    close_at: usize,
}

#[async_trait]
impl Strategy for ScriptedStrategy {
    fn name(&self) -> &str {
        "scripted"
    }

    fn description(&self) -> &str {
        "opens on the first candle and closes later"
    }

    fn symbols(&self) -> Vec<String> {
        vec!["BTC".to_string()]
    }

    fn timeframes(&self) -> Vec<Timeframe> {
        vec![Timeframe::M1]
    }

    async fn init(&mut self) -> Result<(), StrategyError> {
        assert!(self.ctx.is_backtest());
        Ok(())
    }

    async fn on_candle(&mut self, candle: &Candle) -> Result<(), StrategyError> {
        self.candles_seen += 1;

        if self.candles_seen == 1 {
            let result = self
                .ctx
                .open_position(OrderParams {
                    symbol: candle.symbol.clone(),
                    side: quantd_core::domain::Side::Long,
                    size: dec!(0.01),
                    price: Some(candle.close),
                    kind: OrderKind::Limit,
                    leverage: None,
                })
                .await;
            if let Some(error) = result.error {
                return Err(error.into());
            }
        } else if self.candles_seen == self.close_at {
            let result = self
                .ctx
                .close_position(CloseParams {
                    symbol: candle.symbol.clone(),
                    size: dec!(0.01),
                    price: Some(candle.close),
                    kind: None,
                })
                .await;
            if let Some(error) = result.error {
                return Err(error.into());
            }
        }

        Ok(())
    }

    async fn cleanup(&mut self) -> Result<(), StrategyError> {
        Ok(())
    }

    fn status(&self) -> StrategyStatus {
        StrategyStatus::default()
    }
}

async fn make_runner(candles: Vec<Candle>) -> BacktestRunner {
    let loader = Arc::new(BuiltinLoader::new());
    loader
        .register(
            PathBuf::from("builtin://scripted"),
            Arc::new(FnFactory::new(|ctx| {
                Ok(Box::new(ScriptedStrategy {
                    ctx,
                    candles_seen: 0,
                    close_at: 3,
                }))
            })),
        )
        .await;

    BacktestRunner::new(loader, Arc::new(FixedDataSource { candles }))
}

fn options() -> BacktestOptions {
    BacktestOptions {
        from: base_time(),
        to: base_time() + Duration::hours(1),
        initial_balance: dec!(10000),
    }
}

// ================================================================================================
// 테스트
// ================================================================================================

#[tokio::test]
async fn test_round_trip_report() {
    // 60,000 진입 → 61,000 청산 (0.01 BTC)
    let runner = make_runner(vec![
        candle(0, dec!(60000)),
        candle(1, dec!(60500)),
        candle(2, dec!(61000)),
        candle(3, dec!(61000)),
    ])
    .await;

    let report = runner
        .run(Path::new("builtin://scripted"), options())
        .await
        .unwrap();

    assert_eq!(report.strategy_name, "scripted");
    assert_eq!(report.candles_replayed, 4);
    assert_eq!(report.final_equity, dec!(10010));
    assert_eq!(report.total_pnl, dec!(10));
    assert_eq!(report.total_pnl_pct, dec!(0.1));

    // 증거금 잠금 1회(손실 스텝) + 수익 청산 1회(수익 스텝)
    assert_eq!(report.total_trades, 2);
    assert_eq!(report.winning_trades, 1);
    assert_eq!(report.losing_trades, 1);
    assert_eq!(report.win_rate, dec!(50));

    // 잠금 구간 최대 낙폭: (10,000 - 9,400) / 10,000 = 6%
    assert_eq!(report.max_drawdown, dec!(6));

    // 자산 곡선은 캔들마다 1점
    assert_eq!(report.equity_curve.len(), 4);
    assert_eq!(report.equity_curve[0].equity, dec!(9400));
    assert_eq!(report.equity_curve[0].timestamp, base_time());
    assert_eq!(report.equity_curve[3].equity, dec!(10010));

    let summary = report.summary();
    assert!(summary.contains("scripted"));
    assert!(summary.contains("총 거래: 2"));
}

#[tokio::test]
async fn test_duplicate_candles_replayed_once() {
    // 같은 (심볼, 타임프레임, 시작 시각) 캔들 중복은 한 번만 리플레이
    let runner = make_runner(vec![
        candle(0, dec!(60000)),
        candle(0, dec!(60000)),
        candle(1, dec!(60500)),
        candle(2, dec!(61000)),
    ])
    .await;

    let report = runner
        .run(Path::new("builtin://scripted"), options())
        .await
        .unwrap();

    assert_eq!(report.candles_replayed, 3);
    assert_eq!(report.final_equity, dec!(10010));
}

#[tokio::test]
async fn test_identical_inputs_produce_identical_reports() {
    let candles = vec![
        candle(0, dec!(60000)),
        candle(1, dec!(60500)),
        candle(2, dec!(61000)),
        candle(3, dec!(61000)),
    ];

    let first = make_runner(candles.clone())
        .await
        .run(Path::new("builtin://scripted"), options())
        .await
        .unwrap();
    let second = make_runner(candles)
        .await
        .run(Path::new("builtin://scripted"), options())
        .await
        .unwrap();

    assert_eq!(first.final_equity, second.final_equity);
    assert_eq!(first.total_trades, second.total_trades);
    assert_eq!(first.max_drawdown, second.max_drawdown);
    assert_eq!(
        serde_json::to_value(&first.equity_curve).unwrap(),
        serde_json::to_value(&second.equity_curve).unwrap()
    );
}

#[tokio::test]
async fn test_empty_range_is_an_error() {
    let runner = make_runner(Vec::new()).await;
    let err = runner
        .run(Path::new("builtin://scripted"), options())
        .await
        .unwrap_err();

    assert!(matches!(err, BacktestError::NoData));
}

#[tokio::test]
async fn test_missing_plugin_is_an_error() {
    let runner = make_runner(vec![candle(0, dec!(60000))]).await;
    let err = runner
        .run(Path::new("builtin://ghost"), options())
        .await
        .unwrap_err();

    assert!(matches!(err, BacktestError::Plugin(_)));
}
