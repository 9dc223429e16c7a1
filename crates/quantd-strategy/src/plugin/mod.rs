//! 전략 플러그인 시스템.
//!
//! 전략 소스(동적 라이브러리 또는 내장 레지스트리)를 팩토리로 변환하는
//! 로더 경계를 정의합니다. 매니저는 `StrategyLoader`만 알고,
//! 실제 로딩 방식은 구현이 결정합니다.

pub mod loader;

pub use loader::{BuiltinLoader, FnFactory, PluginLoader};

use crate::traits::{Strategy, StrategyContext};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// 플러그인 로더 에러.
#[derive(Error, Debug)]
pub enum PluginError {
    #[error("Plugin not found: {0}")]
    NotFound(String),

    #[error("Library load failed: {0}")]
    LoadError(String),

    #[error("Symbol not found: {0}")]
    SymbolNotFound(String),

    #[error("Invalid plugin: {0}")]
    InvalidPlugin(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 전략 인스턴스 팩토리.
///
/// 하나의 팩토리에서 독립적인 인스턴스를 여러 번 생성할 수 있습니다.
/// (메타데이터 조회용 임시 인스턴스와 실행용 인스턴스를 분리)
pub trait StrategyFactory: Send + Sync {
    /// 주어진 컨텍스트로 새 전략 인스턴스를 생성합니다.
    fn create(&self, ctx: Box<dyn StrategyContext>) -> Result<Box<dyn Strategy>, PluginError>;
}

impl std::fmt::Debug for dyn StrategyFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("StrategyFactory")
    }
}

/// 전략 소스 로더.
#[async_trait]
pub trait StrategyLoader: Send + Sync {
    /// 경로에서 전략 팩토리를 로드합니다.
    ///
    /// `force_reload`가 true이면 캐시를 무시하고 다시 로드합니다.
    async fn load(
        &self,
        path: &Path,
        force_reload: bool,
    ) -> Result<Arc<dyn StrategyFactory>, PluginError>;
}
