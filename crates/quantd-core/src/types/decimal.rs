//! 정밀한 금융 계산을 위한 Decimal 별칭.

use rust_decimal::Decimal;

/// 금융 정밀도를 위한 가격 타입.
pub type Price = Decimal;

/// 주문 수량을 위한 타입.
pub type Quantity = Decimal;

/// 퍼센트 타입 (1 = 1%).
pub type Percentage = Decimal;
