//! 전략 생명주기 엔진 및 플러그인 시스템.
//!
//! 이 크레이트가 제공하는 기능:
//! - 전략 구현을 위한 Strategy / StrategyContext trait
//! - 동적 전략 로딩을 위한 플러그인 로더 (mtime 캐시, 강제 리로드)
//! - 참조 카운트 기반 캔들 구독 관리
//! - 전략 생명주기 매니저 (실패 격리, 지연 자동 재시작)
//! - 캔들 이벤트 루프 런타임

pub mod context;
pub mod manager;
pub mod plugin;
pub mod runtime;
pub mod subscription;
pub mod traits;

// 주요 타입 재내보내기
pub use context::LiveContext;
pub use manager::{EngineError, LifecycleEvent, ManagerConfig, StrategyManager};
pub use plugin::{
    BuiltinLoader, FnFactory, PluginError, PluginLoader, StrategyFactory, StrategyLoader,
};
pub use runtime::Engine;
pub use subscription::{
    FeedError, FeedEvent, FeedProvider, FeedSubscription, SubscriptionKey, SubscriptionManager,
};
pub use traits::{Strategy, StrategyContext, StrategyError};
