//! 전략 생명주기 매니저.
//!
//! 매니저는 전략의 등록/시작/중지/제거/리로드를 관리하고, 캔들 이벤트를
//! 구독 중인 전략에 디스패치합니다. 전략 하나의 실패가 다른 전략에
//! 전파되지 않도록 모든 전략 작업은 격리됩니다.

use crate::plugin::{PluginError, StrategyLoader};
use crate::subscription::{FeedError, SubscriptionManager};
use crate::traits::Strategy;
use crate::LiveContext;
use chrono::Utc;
use quantd_core::domain::{
    is_valid_name, Candle, ExchangeClient, StrategyRecord, StrategyStatus,
};
use quantd_core::store::{EntryStore, StoreError};
use quantd_core::types::Timeframe;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{error, info, warn};

/// 매니저 에러.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Strategy not found: {0}")]
    NotFound(String),

    #[error("Strategy already exists: {0}")]
    DuplicateName(String),

    #[error("Invalid strategy name: {0}")]
    InvalidName(String),

    #[error("Strategy already active: {0}")]
    AlreadyActive(String),

    #[error("Strategy not active: {0}")]
    NotActive(String),

    #[error("Strategy still active: {0}")]
    StillActive(String),

    #[error("Plugin error: {0}")]
    Plugin(#[from] PluginError),

    #[error("Feed error: {0}")]
    Feed(#[from] FeedError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Strategy error: {0}")]
    Strategy(String),
}

/// 전략 생명주기 이벤트.
///
/// 각 이벤트는 전략 이름과 함께 시점의 스냅샷을 싣습니다. 인스턴스가
/// 살아 있는 이벤트는 런타임 상태(`StrategyStatus`), 그 외에는 레코드를
/// 실어 수신 측이 추가 조회 없이 전략 상태를 알 수 있게 합니다.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Added {
        name: String,
        record: StrategyRecord,
    },
    Started {
        name: String,
        status: StrategyStatus,
    },
    Stopped {
        name: String,
        record: StrategyRecord,
    },
    Removed {
        name: String,
        record: StrategyRecord,
    },
    Error {
        name: String,
        message: String,
        status: StrategyStatus,
    },
    CandleProcessed {
        name: String,
        symbol: String,
        timeframe: Timeframe,
        status: StrategyStatus,
    },
}

/// 매니저 설정.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// 디스패치 실패 후 재시작 지연
    pub restart_delay: Duration,
    /// 테스트넷 사용 여부
    pub is_testnet: bool,
    /// 생명주기 이벤트 브로드캐스트 버퍼 크기
    pub event_buffer_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            restart_delay: Duration::from_millis(1000),
            is_testnet: false,
            event_buffer_size: 64,
        }
    }
}

/// 실행 중인 전략 인스턴스.
///
/// 인스턴스 뮤텍스는 콜백 직렬화를 보장합니다. 중지 시 뮤텍스를 잡아
/// 진행 중인 콜백이 끝나기를 기다립니다.
struct ActiveStrategy {
    instance: Arc<Mutex<Box<dyn Strategy>>>,
}

/// 전략 생명주기 매니저.
pub struct StrategyManager {
    records: RwLock<HashMap<String, StrategyRecord>>,
    active: RwLock<HashMap<String, ActiveStrategy>>,
    // 이름별 생명주기 뮤텍스. init/cleanup 같은 전략 코드 대기 중에도
    // active 맵 잠금을 잡지 않기 위해 상호 배제를 이름 단위로 분리한다.
    lifecycle_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
    store: Arc<dyn EntryStore>,
    subscriptions: Arc<SubscriptionManager>,
    loader: Arc<dyn StrategyLoader>,
    exchange: Arc<dyn ExchangeClient>,
    events: broadcast::Sender<LifecycleEvent>,
    config: ManagerConfig,
}

impl StrategyManager {
    pub fn new(
        store: Arc<dyn EntryStore>,
        subscriptions: Arc<SubscriptionManager>,
        loader: Arc<dyn StrategyLoader>,
        exchange: Arc<dyn ExchangeClient>,
        config: ManagerConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_buffer_size);

        Self {
            records: RwLock::new(HashMap::new()),
            active: RwLock::new(HashMap::new()),
            lifecycle_locks: Mutex::new(HashMap::new()),
            store,
            subscriptions,
            loader,
            exchange,
            events,
            config,
        }
    }

    /// 생명주기 이벤트 수신기를 반환합니다.
    pub fn subscribe_events(&self) -> broadcast::Receiver<LifecycleEvent> {
        self.events.subscribe()
    }

    fn emit(&self, event: LifecycleEvent) {
        // 수신자가 없으면 무시
        let _ = self.events.send(event);
    }

    /// 이름별 생명주기 뮤텍스 핸들을 반환합니다.
    async fn lifecycle_lock(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.lifecycle_locks.lock().await;
        locks
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// 전략의 실행 컨텍스트를 생성합니다.
    fn make_context(&self, namespace: &str) -> Box<LiveContext> {
        Box::new(LiveContext::new(
            self.exchange.clone(),
            self.store.open_namespace(namespace),
            self.config.is_testnet,
        ))
    }

    /// 플러그인 경로에서 전략을 등록합니다.
    ///
    /// 임시 인스턴스를 생성해 전략이 선언한 이름/설명/구독 대상을 읽고
    /// (init은 호출하지 않음) 비활성 레코드를 저장합니다.
    pub async fn add(&self, path: &Path) -> Result<String, EngineError> {
        let factory = self.loader.load(path, false).await?;
        let probe = factory.create(self.make_context("_probe"))?;

        let name = probe.name().to_string();
        if !is_valid_name(&name) {
            return Err(EngineError::InvalidName(name));
        }

        let record = StrategyRecord::new(
            &name,
            probe.description(),
            probe.symbols(),
            probe.timeframes(),
            path.to_path_buf(),
        );
        drop(probe);

        {
            let mut records = self.records.write().await;
            if records.contains_key(&name) {
                return Err(EngineError::DuplicateName(name));
            }
            self.store.upsert(&record).await?;
            records.insert(name.clone(), record.clone());
        }

        info!(strategy = %name, path = %path.display(), "Strategy added");
        self.emit(LifecycleEvent::Added {
            name: name.clone(),
            record,
        });

        Ok(name)
    }

    /// 전략을 시작합니다.
    ///
    /// 새 인스턴스를 생성하고 init 후 선언된 (심볼 × 타임프레임) 전체를
    /// 구독합니다. 어느 단계든 실패하면 이미 연 구독을 되돌리고
    /// 전략은 비활성 상태로 남습니다.
    pub async fn start(&self, name: &str) -> Result<(), EngineError> {
        // 같은 이름의 동시 시작/중지만 직렬화한다. active 맵 잠금은 짧은
        // 조회/삽입에만 사용하므로 init/구독 대기 중에도 디스패치가 막히지 않는다.
        let lock = self.lifecycle_lock(name).await;
        let _guard = lock.lock().await;

        if self.active.read().await.contains_key(name) {
            return Err(EngineError::AlreadyActive(name.to_string()));
        }

        let record = {
            let records = self.records.read().await;
            records
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(name.to_string()))?
        };

        let factory = self.loader.load(&record.source_path, false).await?;
        let mut instance = factory.create(self.make_context(name))?;

        instance
            .init()
            .await
            .map_err(|e| EngineError::Strategy(e.to_string()))?;

        for symbol in &record.symbols {
            for &timeframe in &record.timeframes {
                if let Err(e) = self.subscriptions.subscribe(name, symbol, timeframe).await {
                    self.rollback_start(name, &mut instance).await;
                    return Err(e.into());
                }
            }
        }

        let persisted = {
            let mut records = self.records.write().await;
            if let Some(stored) = records.get_mut(name) {
                stored.is_active = true;
                stored.started_at = Some(Utc::now());
                let result = self.store.upsert(stored).await;
                if result.is_err() {
                    stored.is_active = false;
                    stored.started_at = None;
                }
                result
            } else {
                Ok(())
            }
        };
        if let Err(e) = persisted {
            self.rollback_start(name, &mut instance).await;
            return Err(e.into());
        }

        let status = instance.status();
        self.active.write().await.insert(
            name.to_string(),
            ActiveStrategy {
                instance: Arc::new(Mutex::new(instance)),
            },
        );

        info!(strategy = %name, "Strategy started");
        self.emit(LifecycleEvent::Started {
            name: name.to_string(),
            status,
        });

        Ok(())
    }

    /// 시작 도중 실패한 전략의 구독을 되돌리고 cleanup을 시도합니다.
    async fn rollback_start(&self, name: &str, instance: &mut Box<dyn Strategy>) {
        self.subscriptions.unsubscribe_all(name).await;
        if let Err(e) = instance.cleanup().await {
            warn!(strategy = %name, error = %e, "Cleanup failed during start rollback");
        }
    }

    /// 전략을 중지합니다.
    ///
    /// 진행 중인 캔들 콜백이 끝나기를 기다린 뒤 cleanup을 호출하고
    /// 모든 구독을 해제합니다. cleanup 실패는 경고만 남깁니다.
    pub async fn stop(&self, name: &str) -> Result<(), EngineError> {
        let lock = self.lifecycle_lock(name).await;
        let _guard = lock.lock().await;

        let entry = self
            .active
            .write()
            .await
            .remove(name)
            .ok_or_else(|| EngineError::NotActive(name.to_string()))?;

        {
            let mut instance = entry.instance.lock().await;
            if let Err(e) = instance.cleanup().await {
                warn!(strategy = %name, error = %e, "Strategy cleanup failed");
            }
        }

        self.subscriptions.unsubscribe_all(name).await;

        let snapshot = {
            let mut records = self.records.write().await;
            if let Some(stored) = records.get_mut(name) {
                stored.is_active = false;
                stored.started_at = None;
                if let Err(e) = self.store.upsert(stored).await {
                    warn!(strategy = %name, error = %e, "Failed to persist stopped record");
                }
                Some(stored.clone())
            } else {
                None
            }
        };

        info!(strategy = %name, "Strategy stopped");
        if let Some(record) = snapshot {
            self.emit(LifecycleEvent::Stopped {
                name: name.to_string(),
                record,
            });
        }

        Ok(())
    }

    /// 전략을 제거합니다. 활성 상태면 거부합니다.
    pub async fn remove(&self, name: &str) -> Result<(), EngineError> {
        let lock = self.lifecycle_lock(name).await;
        let _guard = lock.lock().await;

        if self.active.read().await.contains_key(name) {
            return Err(EngineError::StillActive(name.to_string()));
        }

        let removed = {
            let mut records = self.records.write().await;
            let removed = records
                .remove(name)
                .ok_or_else(|| EngineError::NotFound(name.to_string()))?;
            self.store.delete(name).await?;
            removed
        };

        info!(strategy = %name, "Strategy removed");
        self.emit(LifecycleEvent::Removed {
            name: name.to_string(),
            record: removed,
        });

        Ok(())
    }

    /// 전략 플러그인을 다시 로드하고 메타데이터를 갱신합니다.
    ///
    /// 활성 상태면 거부합니다. 새 코드가 선언하는 설명/심볼/타임프레임을
    /// 레코드에 반영하며, 이름이 바뀌었으면 거부합니다.
    pub async fn reload(&self, name: &str) -> Result<(), EngineError> {
        let lock = self.lifecycle_lock(name).await;
        let _guard = lock.lock().await;

        if self.active.read().await.contains_key(name) {
            return Err(EngineError::StillActive(name.to_string()));
        }

        let record = {
            let records = self.records.read().await;
            records
                .get(name)
                .cloned()
                .ok_or_else(|| EngineError::NotFound(name.to_string()))?
        };

        let factory = self.loader.load(&record.source_path, true).await?;
        let probe = factory.create(self.make_context("_probe"))?;

        if probe.name() != name {
            return Err(EngineError::Strategy(format!(
                "Plugin name changed: {} -> {}",
                name,
                probe.name()
            )));
        }

        {
            let mut records = self.records.write().await;
            if let Some(stored) = records.get_mut(name) {
                stored.description = probe.description().to_string();
                stored.symbols = probe.symbols();
                stored.timeframes = probe.timeframes();
                self.store.upsert(stored).await?;
            }
        }

        info!(strategy = %name, "Strategy reloaded");
        Ok(())
    }

    /// 캔들을 구독 중인 모든 전략에 디스패치합니다.
    ///
    /// 전략별로 독립 태스크에서 처리하므로 한 전략의 실패/지연이
    /// 다른 전략을 막지 않습니다. 실패한 전략은 지연 후 자동 재시작됩니다.
    pub async fn dispatch(self: Arc<Self>, candle: Candle) {
        let subscribers = self
            .subscriptions
            .subscribers_for(&candle.symbol, candle.timeframe)
            .await;
        if subscribers.is_empty() {
            return;
        }

        let instances: Vec<(String, Arc<Mutex<Box<dyn Strategy>>>)> = {
            let active = self.active.read().await;
            subscribers
                .into_iter()
                .filter_map(|name| {
                    active
                        .get(&name)
                        .map(|entry| (name, entry.instance.clone()))
                })
                .collect()
        };

        let mut tasks = Vec::with_capacity(instances.len());
        for (name, instance) in instances {
            let manager = self.clone();
            let candle = candle.clone();
            tasks.push(tokio::spawn(async move {
                let (result, status) = {
                    let mut strategy = instance.lock().await;
                    let result = strategy.on_candle(&candle).await;
                    (result, strategy.status())
                };

                match result {
                    Ok(()) => manager.mark_candle_processed(&name, &candle, status).await,
                    Err(e) => {
                        manager
                            .handle_dispatch_failure(name, e.to_string(), status)
                            .await
                    }
                }
            }));
        }

        // 키별 이벤트 순서 보장을 위해 모든 전략 처리 완료까지 대기
        for outcome in futures::future::join_all(tasks).await {
            if let Err(e) = outcome {
                error!(error = %e, "Dispatch task panicked");
            }
        }
    }

    async fn mark_candle_processed(&self, name: &str, candle: &Candle, status: StrategyStatus) {
        {
            let mut records = self.records.write().await;
            if let Some(stored) = records.get_mut(name) {
                stored.last_event_at = Some(Utc::now());
                if let Err(e) = self.store.upsert(stored).await {
                    warn!(strategy = %name, error = %e, "Failed to persist record");
                }
            }
        }

        self.emit(LifecycleEvent::CandleProcessed {
            name: name.to_string(),
            symbol: candle.symbol.clone(),
            timeframe: candle.timeframe,
            status,
        });
    }

    /// 디스패치 실패를 기록하고 지연 후 재시작을 예약합니다.
    ///
    /// 재시작 실패는 로그만 남기며 추가 재시도는 없습니다.
    async fn handle_dispatch_failure(
        self: Arc<Self>,
        name: String,
        message: String,
        status: StrategyStatus,
    ) {
        error!(strategy = %name, error = %message, "Strategy candle handler failed");

        {
            let mut records = self.records.write().await;
            if let Some(stored) = records.get_mut(&name) {
                stored.error_count += 1;
                stored.last_error = Some(message.clone());
                if let Err(e) = self.store.upsert(stored).await {
                    warn!(strategy = %name, error = %e, "Failed to persist record");
                }
            }
        }

        self.emit(LifecycleEvent::Error {
            name: name.clone(),
            message,
            status,
        });

        let manager = self.clone();
        let delay = self.config.restart_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            info!(strategy = %name, "Restarting strategy after failure");
            if let Err(e) = manager.restart(&name).await {
                error!(strategy = %name, error = %e, "Strategy restart failed");
            }
        });
    }

    /// 전략을 중지 후 다시 시작합니다.
    pub async fn restart(&self, name: &str) -> Result<(), EngineError> {
        self.stop(name).await?;
        self.start(name).await
    }

    /// 피드 장애를 해당 키 구독자들에게 에러 이벤트로 전파합니다.
    pub async fn report_feed_error(&self, symbol: &str, timeframe: Timeframe, message: &str) {
        for name in self.subscriptions.subscribers_for(symbol, timeframe).await {
            warn!(strategy = %name, symbol, %timeframe, error = %message, "Feed error for subscribed key");
            let status = self.status(&name).await.unwrap_or_default();
            self.emit(LifecycleEvent::Error {
                name,
                message: message.to_string(),
                status,
            });
        }
    }

    /// 실행 중인 전략의 상태 스냅샷을 반환합니다.
    pub async fn status(&self, name: &str) -> Option<StrategyStatus> {
        let instance = {
            let active = self.active.read().await;
            active.get(name).map(|entry| entry.instance.clone())
        }?;

        let strategy = instance.lock().await;
        Some(strategy.status())
    }

    /// 전략 레코드를 반환합니다.
    pub async fn get_record(&self, name: &str) -> Option<StrategyRecord> {
        self.records.read().await.get(name).cloned()
    }

    /// 전체 전략 레코드 목록을 반환합니다.
    pub async fn list_records(&self) -> Vec<StrategyRecord> {
        self.records.read().await.values().cloned().collect()
    }

    /// 저장소의 레코드를 복원하고 활성 전략을 시작합니다.
    ///
    /// 개별 전략 시작 실패는 로그만 남기고 나머지를 계속 진행합니다.
    pub async fn load_from_store(&self) -> Result<(), EngineError> {
        let stored = self.store.all().await?;
        let to_start: Vec<String> = stored
            .iter()
            .filter(|r| r.is_active)
            .map(|r| r.name.clone())
            .collect();

        {
            let mut records = self.records.write().await;
            for record in stored {
                records.insert(record.name.clone(), record);
            }
        }

        for name in to_start {
            // start는 레코드를 비활성으로 보고 있어야 하므로 플래그 선초기화
            {
                let mut records = self.records.write().await;
                if let Some(stored) = records.get_mut(&name) {
                    stored.is_active = false;
                    stored.started_at = None;
                }
            }

            if let Err(e) = self.start(&name).await {
                error!(strategy = %name, error = %e, "Failed to restore strategy");
            }
        }

        info!(count = self.records.read().await.len(), "Strategies loaded from store");
        Ok(())
    }

    /// 모든 활성 전략을 중지합니다.
    pub async fn shutdown(&self) {
        let names: Vec<String> = self.active.read().await.keys().cloned().collect();
        for name in names {
            if let Err(e) = self.stop(&name).await {
                warn!(strategy = %name, error = %e, "Failed to stop strategy during shutdown");
            }
        }
    }
}
