//! 전략 레코드 및 상태 스냅샷.
//!
//! `StrategyRecord`는 전략당 하나 존재하는 영속 메타데이터이며,
//! `StrategyStatus`는 실행 중인 전략 인스턴스가 반환하는 런타임 스냅샷입니다.

use crate::types::Timeframe;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// 전략의 영속 메타데이터 및 생명주기 상태.
///
/// 이름이 기본 키이며, 전략 자신이 선언한 이름을 그대로 사용합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecord {
    /// 전략 이름 (기본 키)
    pub name: String,
    /// 전략 설명
    pub description: String,
    /// 구독할 심볼 목록
    pub symbols: Vec<String>,
    /// 구독할 타임프레임 목록
    pub timeframes: Vec<Timeframe>,
    /// 전략 플러그인 소스 경로
    pub source_path: PathBuf,
    /// 현재 활성 여부
    pub is_active: bool,
    /// 시작 시각 (비활성이면 None)
    pub started_at: Option<DateTime<Utc>>,
    /// 누적 에러 횟수
    pub error_count: u32,
    /// 마지막 에러 메시지
    pub last_error: Option<String>,
    /// 마지막 이벤트 처리 시각
    pub last_event_at: Option<DateTime<Utc>>,
}

impl StrategyRecord {
    /// 비활성 상태의 새 레코드를 생성합니다.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        symbols: Vec<String>,
        timeframes: Vec<Timeframe>,
        source_path: PathBuf,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            symbols,
            timeframes,
            source_path,
            is_active: false,
            started_at: None,
            error_count: 0,
            last_error: None,
            last_event_at: None,
        }
    }
}

/// 전략 이름이 유효한지 확인합니다.
///
/// 허용 문자: 영문 대소문자, 숫자, 하이픈, 언더스코어. 빈 이름은 거부됩니다.
pub fn is_valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

/// 실행 중인 전략이 반환하는 상태 스냅샷.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyStatus {
    /// 누적 손익
    pub pnl: Decimal,
    /// 열린 포지션 수
    pub position_count: usize,
    /// 마지막 거래 시각
    pub last_trade_at: Option<DateTime<Utc>>,
    /// 전략별 자유 형식 지표
    #[serde(default)]
    pub custom: serde_json::Map<String, serde_json::Value>,
}
