//! 주문 파라미터 및 결과 타입.
//!
//! 이 모듈은 전략이 컨텍스트를 통해 주문을 낼 때 사용하는 타입을 정의합니다:
//! - `Side` - 포지션 방향 (롱/숏)
//! - `OrderKind` - 주문 유형 (시장가, 지정가)
//! - `OrderParams` / `CloseParams` - 진입/청산 파라미터
//! - `OrderStatus` / `OrderResult` - 주문 결과
//!
//! 예상 가능한 실패(잔고 부족, 포지션 없음, 거래소 거부)는 항상
//! `Failed` 상태의 결과 값으로 표현되며 패닉이나 예외로 전파되지 않습니다.

use crate::types::{Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 포지션 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// 롱 포지션
    Long,
    /// 숏 포지션
    Short,
}

impl Side {
    /// 반대 방향을 반환합니다.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Long => Side::Short,
            Side::Short => Side::Long,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Long => write!(f, "LONG"),
            Side::Short => write!(f, "SHORT"),
        }
    }
}

/// 주문 유형.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    /// 시장가 주문
    Market,
    /// 지정가 주문
    Limit,
}

/// 포지션 진입 파라미터.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderParams {
    /// 거래 심볼
    pub symbol: String,
    /// 포지션 방향
    pub side: Side,
    /// 주문 수량
    pub size: Quantity,
    /// 지정가 (시장가 주문이면 None)
    pub price: Option<Price>,
    /// 주문 유형
    pub kind: OrderKind,
    /// 레버리지 (기본 1배)
    pub leverage: Option<Decimal>,
}

/// 포지션 청산 파라미터.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseParams {
    /// 거래 심볼
    pub symbol: String,
    /// 청산 수량
    pub size: Quantity,
    /// 지정가 (시장가 청산이면 None)
    pub price: Option<Price>,
    /// 주문 유형 (기본 시장가)
    pub kind: Option<OrderKind>,
}

/// 주문 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// 거래소에 제출됨 (대기 중)
    Pending,
    /// 전량 체결됨
    Filled,
    /// 부분 체결됨
    Partial,
    /// 취소됨
    Cancelled,
    /// 실패
    Failed,
}

impl OrderStatus {
    /// 주문이 수락된 상태인지 확인합니다.
    ///
    /// `Filled`/`Pending` 이외의 상태는 복구 가능한 실패로 취급됩니다.
    pub fn is_accepted(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Pending)
    }
}

/// 주문 제출 결과.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    /// 주문 ID
    pub order_id: String,
    /// 주문 상태
    pub status: OrderStatus,
    /// 체결 가격
    pub filled_price: Option<Price>,
    /// 체결 수량
    pub filled_size: Option<Quantity>,
    /// 실패 사유
    pub error: Option<String>,
}

impl OrderResult {
    /// 체결된 주문 결과를 생성합니다.
    pub fn filled(order_id: impl Into<String>, price: Option<Price>, size: Quantity) -> Self {
        Self {
            order_id: order_id.into(),
            status: OrderStatus::Filled,
            filled_price: price,
            filled_size: Some(size),
            error: None,
        }
    }

    /// 실패한 주문 결과를 생성합니다.
    pub fn failed(order_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            order_id: order_id.into(),
            status: OrderStatus::Failed,
            filled_price: None,
            filled_size: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_side_opposite() {
        assert_eq!(Side::Long.opposite(), Side::Short);
        assert_eq!(Side::Short.opposite(), Side::Long);
    }

    #[test]
    fn test_order_status_accepted() {
        assert!(OrderStatus::Filled.is_accepted());
        assert!(OrderStatus::Pending.is_accepted());
        assert!(!OrderStatus::Partial.is_accepted());
        assert!(!OrderStatus::Failed.is_accepted());
    }

    #[test]
    fn test_order_result_constructors() {
        let ok = OrderResult::filled("1", Some(dec!(60000)), dec!(0.01));
        assert_eq!(ok.status, OrderStatus::Filled);
        assert_eq!(ok.filled_size, Some(dec!(0.01)));
        assert!(ok.error.is_none());

        let bad = OrderResult::failed("2", "insufficient balance");
        assert_eq!(bad.status, OrderStatus::Failed);
        assert_eq!(bad.error.as_deref(), Some("insufficient balance"));
    }
}
