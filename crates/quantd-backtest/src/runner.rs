//! 백테스트 러너.
//!
//! 전략 플러그인을 로드해 과거 캔들 위에서 리플레이하고 성과를 집계합니다.
//! 거래는 캔들 처리 후 자산 변화(임계값 0.001 초과)로 추론합니다:
//! 진입(증거금 잠금)은 자산 감소, 수익 청산은 자산 증가로 기록되므로
//! 한 번의 왕복 거래는 보통 2회의 자산 변화를 만듭니다.

use crate::context::BacktestContext;
use chrono::{DateTime, Utc};
use quantd_core::domain::{Candle, ExchangeClient, ExchangeError};
use quantd_core::store::MemoryKvStore;
use quantd_core::types::Timeframe;
use quantd_strategy::{PluginError, StrategyLoader};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

/// 자산 변화를 거래로 간주하는 최소 임계값.
const TRADE_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 3); // 0.001

/// 백테스트 실패.
#[derive(Debug, Error)]
pub enum BacktestError {
    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Exchange error: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("No candle data for backtest range")]
    NoData,

    #[error("Strategy error: {0}")]
    Strategy(String),
}

/// 백테스트 옵션.
#[derive(Debug, Clone)]
pub struct BacktestOptions {
    /// 리플레이 시작 시각
    pub from: DateTime<Utc>,
    /// 리플레이 종료 시각
    pub to: DateTime<Utc>,
    /// 초기 자본
    pub initial_balance: Decimal,
}

/// 자산 곡선의 한 점.
#[derive(Debug, Clone, Serialize)]
pub struct EquityPoint {
    /// 캔들 시작 시각
    pub timestamp: DateTime<Utc>,
    /// 캔들 처리 후 가용 잔고
    pub equity: Decimal,
}

/// 백테스트 결과 보고서.
#[derive(Debug, Clone, Serialize)]
pub struct BacktestReport {
    /// 전략 이름
    pub strategy_name: String,
    /// 리플레이 시작 시각
    pub from: DateTime<Utc>,
    /// 리플레이 종료 시각
    pub to: DateTime<Utc>,
    /// 초기 자본
    pub initial_balance: Decimal,
    /// 최종 자산
    pub final_equity: Decimal,
    /// 순손익
    pub total_pnl: Decimal,
    /// 총 수익률 (%)
    pub total_pnl_pct: Decimal,
    /// 추론된 거래 수
    pub total_trades: usize,
    /// 수익 거래 수
    pub winning_trades: usize,
    /// 손실 거래 수
    pub losing_trades: usize,
    /// 승률 (%)
    pub win_rate: Decimal,
    /// 최대 낙폭 (%)
    pub max_drawdown: Decimal,
    /// 리플레이된 캔들 수
    pub candles_replayed: usize,
    /// 자산 곡선
    pub equity_curve: Vec<EquityPoint>,
}

impl BacktestReport {
    /// 요약 문자열 반환
    pub fn summary(&self) -> String {
        let duration_days = (self.to - self.from).num_days();

        format!(
            "백테스트 결과 요약\n\
             ═══════════════════════════════════════\n\
             전략: {}\n\
             기간: {} → {} ({} 일)\n\
             리플레이 캔들: {}\n\
             ───────────────────────────────────────\n\
             초기 자본: {}\n\
             최종 자산: {}\n\
             순손익: {} ({:.2}%)\n\
             ───────────────────────────────────────\n\
             총 거래: {}\n\
             승률: {:.1}%\n\
             최대 낙폭: {:.2}%\n\
             ═══════════════════════════════════════",
            self.strategy_name,
            self.from.format("%Y-%m-%d"),
            self.to.format("%Y-%m-%d"),
            duration_days,
            self.candles_replayed,
            self.initial_balance,
            self.final_equity,
            self.total_pnl,
            self.total_pnl_pct,
            self.total_trades,
            self.win_rate,
            self.max_drawdown,
        )
    }
}

/// 백테스트 러너.
pub struct BacktestRunner {
    loader: Arc<dyn StrategyLoader>,
    data_source: Arc<dyn ExchangeClient>,
}

impl BacktestRunner {
    pub fn new(loader: Arc<dyn StrategyLoader>, data_source: Arc<dyn ExchangeClient>) -> Self {
        Self {
            loader,
            data_source,
        }
    }

    /// 플러그인 경로의 전략으로 백테스트를 실행합니다.
    pub async fn run(
        &self,
        path: &Path,
        options: BacktestOptions,
    ) -> Result<BacktestReport, BacktestError> {
        let factory = self.loader.load(path, false).await?;
        let (ctx, handle) =
            BacktestContext::new(options.initial_balance, Arc::new(MemoryKvStore::new()));
        let mut strategy = factory.create(Box::new(ctx))?;

        let name = strategy.name().to_string();
        let symbols = strategy.symbols();
        let timeframes = strategy.timeframes();

        info!(
            strategy = %name,
            from = %options.from,
            to = %options.to,
            "Starting backtest"
        );

        strategy
            .init()
            .await
            .map_err(|e| BacktestError::Strategy(e.to_string()))?;

        // 선언된 (심볼 × 타임프레임) 전체의 과거 데이터 수집
        let mut all_candles = Vec::new();
        for symbol in &symbols {
            for &timeframe in &timeframes {
                let candles = self
                    .data_source
                    .fetch_candle_range(symbol, timeframe, options.from, options.to)
                    .await?;
                handle.load_history(symbol, timeframe, candles.clone());
                all_candles.extend(candles);
            }
        }

        if all_candles.is_empty() {
            return Err(BacktestError::NoData);
        }

        // 시간순 병합, 키별 중복 제거
        all_candles.sort_by_key(|c| c.open_time);
        let mut seen = HashSet::new();
        all_candles.retain(|c| seen.insert((c.symbol.clone(), c.timeframe, c.open_time)));

        let mut equity_curve = Vec::with_capacity(all_candles.len());
        for candle in &all_candles {
            strategy
                .on_backtest_candle(candle)
                .await
                .map_err(|e| BacktestError::Strategy(e.to_string()))?;

            equity_curve.push(EquityPoint {
                timestamp: candle.open_time,
                equity: handle.balance(),
            });
        }

        if let Err(e) = strategy.cleanup().await {
            warn!(strategy = %name, error = %e, "Strategy cleanup failed after backtest");
        }

        let report = build_report(&name, &options, all_candles.len(), equity_curve);
        info!(
            strategy = %name,
            pnl = %report.total_pnl,
            trades = report.total_trades,
            "Backtest finished"
        );

        Ok(report)
    }
}

/// 자산 곡선에서 거래를 추론하고 성과 지표를 계산합니다.
fn build_report(
    name: &str,
    options: &BacktestOptions,
    candles_replayed: usize,
    equity_curve: Vec<EquityPoint>,
) -> BacktestReport {
    let initial = options.initial_balance;
    let final_equity = equity_curve
        .last()
        .map(|p| p.equity)
        .unwrap_or(initial);

    let mut winning_trades = 0usize;
    let mut losing_trades = 0usize;
    let mut max_equity = initial;
    let mut max_drawdown = Decimal::ZERO;
    let mut prev_equity = initial;

    for point in &equity_curve {
        let delta = point.equity - prev_equity;
        if delta.abs() > TRADE_EPSILON {
            if delta > Decimal::ZERO {
                winning_trades += 1;
            } else {
                losing_trades += 1;
            }
        }
        prev_equity = point.equity;

        if point.equity > max_equity {
            max_equity = point.equity;
        }
        if max_equity > Decimal::ZERO {
            let drawdown = (max_equity - point.equity) / max_equity * Decimal::ONE_HUNDRED;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
        }
    }

    let total_trades = winning_trades + losing_trades;
    let win_rate = if total_trades > 0 {
        Decimal::from(winning_trades) / Decimal::from(total_trades) * Decimal::ONE_HUNDRED
    } else {
        Decimal::ZERO
    };

    let total_pnl = final_equity - initial;
    let total_pnl_pct = if initial > Decimal::ZERO {
        total_pnl / initial * Decimal::ONE_HUNDRED
    } else {
        Decimal::ZERO
    };

    BacktestReport {
        strategy_name: name.to_string(),
        from: options.from,
        to: options.to,
        initial_balance: initial,
        final_equity,
        total_pnl,
        total_pnl_pct,
        total_trades,
        winning_trades,
        losing_trades,
        win_rate,
        max_drawdown,
        candles_replayed,
        equity_curve,
    }
}
