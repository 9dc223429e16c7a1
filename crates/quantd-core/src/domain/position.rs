//! 포지션 및 계좌 상태 타입.

use crate::domain::order::Side;
use crate::types::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 보유 중인 포지션.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// 거래 심볼
    pub symbol: String,
    /// 포지션 방향
    pub side: Side,
    /// 수량
    pub size: Quantity,
    /// 평균 진입가
    pub entry_price: Price,
    /// 현재 마크 가격
    pub mark_price: Price,
    /// 미실현 손익
    pub unrealized_pnl: Decimal,
    /// 청산 가격
    pub liquidation_price: Price,
    /// 레버리지
    pub leverage: Decimal,
    /// 사용 중인 증거금
    pub margin_used: Decimal,
}

impl Position {
    /// 포지션 명목 가치(진입가 기준)를 반환합니다.
    pub fn notional(&self) -> Decimal {
        self.entry_price * self.size
    }
}

/// 계좌 상태.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountState {
    /// 총 계좌 가치
    pub account_value: Decimal,
    /// 사용 가능 잔고
    pub available_balance: Decimal,
    /// 사용 중인 증거금
    pub margin_used: Decimal,
    /// 출금 가능 금액
    pub withdrawable: Decimal,
}

/// 청산 시 실현 손익을 계산합니다.
///
/// 롱은 `(청산가 - 진입가) × 수량`, 숏은 부호를 반전합니다.
pub fn realized_pnl(entry_price: Price, exit_price: Price, size: Quantity, side: Side) -> Decimal {
    match side {
        Side::Long => (exit_price - entry_price) * size,
        Side::Short => (entry_price - exit_price) * size,
    }
}
