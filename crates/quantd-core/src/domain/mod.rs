//! 도메인 모델.

pub mod candle;
pub mod exchange;
pub mod order;
pub mod position;
pub mod record;

pub use candle::Candle;
pub use exchange::{ExchangeClient, ExchangeError};
pub use order::{CloseParams, OrderKind, OrderParams, OrderResult, OrderStatus, Side};
pub use position::{realized_pnl, AccountState, Position};
pub use record::{is_valid_name, StrategyRecord, StrategyStatus};
