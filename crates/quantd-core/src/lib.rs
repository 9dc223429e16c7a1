//! # Quantd Core
//!
//! 전략 엔진의 핵심 도메인 모델 및 타입을 제공합니다.
//!
//! 이 크레이트는 엔진 전반에서 사용되는 기본 타입을 제공합니다:
//! - 캔들 이벤트 및 타임프레임 정의
//! - 주문 파라미터/결과 타입
//! - 포지션 및 계좌 상태
//! - 전략 레코드 (영속 메타데이터)
//! - 거래소 클라이언트 경계 trait
//! - 엔트리 저장소 경계 trait 및 인메모리 구현
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod domain;
pub mod logging;
pub mod store;
pub mod types;

pub use config::*;
pub use domain::*;
pub use logging::*;
pub use store::*;
pub use types::*;
