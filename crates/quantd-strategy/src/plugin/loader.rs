//! 동적 전략 플러그인 로더.
//!
//! 동적 라이브러리(Windows의 .dll, Linux의 .so)에서 전략 플러그인을 로드합니다.
//! 로드된 팩토리는 파일 수정 시각 기준으로 캐시되며, 파일이 변경되거나
//! 강제 리로드가 요청되면 다시 로드됩니다.

use super::{PluginError, StrategyFactory, StrategyLoader};
use crate::traits::{Strategy, StrategyContext};
use async_trait::async_trait;
use libloading::{Library, Symbol};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::RwLock;
use tracing::{debug, info};

// 참고: 이 FFI 타입은 엄격히 FFI 안전하지 않은 트레이트 객체를 사용하지만,
// 양쪽이 동일한 컴파일러로 빌드된 Rust-to-Rust 플러그인 로딩에서는
// 실제로 동작합니다.
#[allow(improper_ctypes_definitions)]
/// create_strategy 함수 시그니처에 대한 타입 별칭.
type CreateStrategyFn =
    unsafe extern "C" fn(*mut dyn StrategyContext) -> *mut dyn Strategy;

/// 로드된 동적 라이브러리를 감싸는 팩토리.
///
/// 라이브러리는 팩토리가 살아있는 동안 언로드되지 않습니다.
/// 생성된 전략 인스턴스가 라이브러리 코드를 참조하므로, 매니저는
/// 인스턴스보다 팩토리를 먼저 해제하지 않아야 합니다.
struct PluginFactory {
    path: PathBuf,
    library: Library,
}

impl PluginFactory {
    /// 파일 경로에서 플러그인 로드.
    ///
    /// # 안전성
    ///
    /// 호출자는 다음을 보장해야 합니다:
    /// - 경로가 동일한 Rust 버전으로 빌드된 유효한 동적 라이브러리를 가리킴
    /// - 라이브러리가 올바른 시그니처의 `create_strategy` 함수를 내보냄
    unsafe fn load(path: &Path) -> Result<Self, PluginError> {
        let library = Library::new(path)
            .map_err(|e| PluginError::LoadError(format!("{}: {}", path.display(), e)))?;

        // 필수 심볼 존재 확인
        let _: Symbol<CreateStrategyFn> = library
            .get(b"create_strategy")
            .map_err(|_| PluginError::SymbolNotFound("create_strategy".to_string()))?;

        Ok(Self {
            path: path.to_path_buf(),
            library,
        })
    }
}

impl StrategyFactory for PluginFactory {
    fn create(&self, ctx: Box<dyn StrategyContext>) -> Result<Box<dyn Strategy>, PluginError> {
        let create_fn: Symbol<CreateStrategyFn> = unsafe {
            self.library
                .get(b"create_strategy")
                .map_err(|_| PluginError::SymbolNotFound("create_strategy".to_string()))?
        };

        let ctx_ptr = Box::into_raw(ctx);
        let raw = unsafe { create_fn(ctx_ptr) };
        if raw.is_null() {
            // 플러그인이 컨텍스트 소유권을 가져가지 않았으므로 회수
            drop(unsafe { Box::from_raw(ctx_ptr) });
            return Err(PluginError::InvalidPlugin(format!(
                "create_strategy returned null: {}",
                self.path.display()
            )));
        }

        Ok(unsafe { Box::from_raw(raw) })
    }
}

/// 캐시된 플러그인 항목.
struct CacheEntry {
    factory: Arc<dyn StrategyFactory>,
    mtime: SystemTime,
}

impl CacheEntry {
    /// 캐시 항목이 현재 파일 수정 시각과 일치하는지 확인.
    fn is_fresh(&self, mtime: SystemTime) -> bool {
        self.mtime == mtime
    }
}

/// 전략 플러그인을 동적으로 로드하는 로더.
///
/// 정규화된 경로를 키로 팩토리를 캐시합니다.
pub struct PluginLoader {
    plugins: RwLock<HashMap<PathBuf, CacheEntry>>,
}

impl PluginLoader {
    pub fn new() -> Self {
        Self {
            plugins: RwLock::new(HashMap::new()),
        }
    }

    /// 캐시된 플러그인 수 반환.
    pub async fn cached_count(&self) -> usize {
        self.plugins.read().await.len()
    }
}

impl Default for PluginLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StrategyLoader for PluginLoader {
    async fn load(
        &self,
        path: &Path,
        force_reload: bool,
    ) -> Result<Arc<dyn StrategyFactory>, PluginError> {
        let canonical = std::fs::canonicalize(path)
            .map_err(|_| PluginError::NotFound(path.display().to_string()))?;
        let mtime = std::fs::metadata(&canonical)?.modified()?;

        if !force_reload {
            let plugins = self.plugins.read().await;
            if let Some(entry) = plugins.get(&canonical) {
                if entry.is_fresh(mtime) {
                    debug!(path = %canonical.display(), "Plugin cache hit");
                    return Ok(entry.factory.clone());
                }
            }
        }

        let mut plugins = self.plugins.write().await;

        // 쓰기 잠금 대기 중 다른 태스크가 로드했을 수 있음
        if !force_reload {
            if let Some(entry) = plugins.get(&canonical) {
                if entry.is_fresh(mtime) {
                    return Ok(entry.factory.clone());
                }
            }
        }

        info!(path = %canonical.display(), force_reload, "Loading plugin");
        let factory: Arc<dyn StrategyFactory> =
            Arc::new(unsafe { PluginFactory::load(&canonical)? });

        plugins.insert(
            canonical,
            CacheEntry {
                factory: factory.clone(),
                mtime,
            },
        );

        Ok(factory)
    }
}

/// 클로저 기반 전략 팩토리.
///
/// 내장 전략 등록 및 테스트에서 사용합니다.
pub struct FnFactory {
    create_fn:
        Box<dyn Fn(Box<dyn StrategyContext>) -> Result<Box<dyn Strategy>, PluginError> + Send + Sync>,
}

impl FnFactory {
    pub fn new<F>(create_fn: F) -> Self
    where
        F: Fn(Box<dyn StrategyContext>) -> Result<Box<dyn Strategy>, PluginError>
            + Send
            + Sync
            + 'static,
    {
        Self {
            create_fn: Box::new(create_fn),
        }
    }
}

impl StrategyFactory for FnFactory {
    fn create(&self, ctx: Box<dyn StrategyContext>) -> Result<Box<dyn Strategy>, PluginError> {
        (self.create_fn)(ctx)
    }
}

/// 인프로세스 전략 레지스트리 로더.
///
/// 동적 라이브러리 없이 경로 키로 등록된 팩토리를 반환합니다.
/// 내장 전략과 테스트에서 사용합니다.
#[derive(Default)]
pub struct BuiltinLoader {
    registry: RwLock<HashMap<PathBuf, Arc<dyn StrategyFactory>>>,
}

impl BuiltinLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// 팩토리를 경로 키로 등록합니다.
    pub async fn register(&self, path: impl Into<PathBuf>, factory: Arc<dyn StrategyFactory>) {
        self.registry.write().await.insert(path.into(), factory);
    }
}

#[async_trait]
impl StrategyLoader for BuiltinLoader {
    async fn load(
        &self,
        path: &Path,
        _force_reload: bool,
    ) -> Result<Arc<dyn StrategyFactory>, PluginError> {
        self.registry
            .read()
            .await
            .get(path)
            .cloned()
            .ok_or_else(|| PluginError::NotFound(path.display().to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::time::Duration;

    #[tokio::test]
    async fn test_load_missing_path_is_not_found() {
        let loader = PluginLoader::new();
        let err = loader
            .load(Path::new("/nonexistent/strategy.so"), false)
            .await
            .unwrap_err();
        assert!(matches!(err, PluginError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_load_garbage_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.so");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(b"not a shared library").unwrap();

        let loader = PluginLoader::new();
        let err = loader.load(&path, false).await.unwrap_err();
        assert!(matches!(err, PluginError::LoadError(_)));
        assert_eq!(loader.cached_count().await, 0);
    }

    #[test]
    fn test_cache_entry_freshness() {
        let now = SystemTime::now();
        let entry = CacheEntry {
            factory: Arc::new(FnFactory::new(|_| {
                Err(PluginError::InvalidPlugin("unused".to_string()))
            })),
            mtime: now,
        };

        assert!(entry.is_fresh(now));
        assert!(!entry.is_fresh(now + Duration::from_secs(1)));
    }

    #[tokio::test]
    async fn test_builtin_loader_registry() {
        let loader = BuiltinLoader::new();
        let path = PathBuf::from("builtin://noop");

        assert!(matches!(
            loader.load(&path, false).await.unwrap_err(),
            PluginError::NotFound(_)
        ));

        loader
            .register(
                path.clone(),
                Arc::new(FnFactory::new(|_| {
                    Err(PluginError::InvalidPlugin("stub".to_string()))
                })),
            )
            .await;

        assert!(loader.load(&path, false).await.is_ok());
        // 강제 리로드도 동일한 팩토리 반환
        assert!(loader.load(&path, true).await.is_ok());
    }
}
