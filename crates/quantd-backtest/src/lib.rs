//! # Quantd Backtest
//!
//! 전략 플러그인 백테스트 엔진.
//!
//! 라이브 엔진과 동일한 `Strategy`/`StrategyContext` 인터페이스 위에서
//! 시뮬레이션 계좌로 과거 캔들을 리플레이하고, 자산 곡선에서 거래를
//! 추론해 성과 보고서를 생성합니다.

pub mod context;
pub mod runner;

pub use context::{BacktestContext, SimHandle};
pub use runner::{BacktestError, BacktestOptions, BacktestReport, BacktestRunner, EquityPoint};
