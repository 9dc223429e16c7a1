//! 참조 카운트 기반 캔들 구독 관리.
//!
//! (심볼, 타임프레임) 키별로 업스트림 피드 구독을 하나만 유지하고,
//! 같은 키를 원하는 전략들을 구독자 집합으로 관리합니다.
//! 첫 구독자가 업스트림을 열고, 마지막 구독자가 떠나면 닫습니다.

use async_trait::async_trait;
use quantd_core::domain::Candle;
use quantd_core::types::Timeframe;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

/// 피드 구독 실패.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Upstream feed error: {0}")]
    Upstream(String),

    #[error("Feed not initialized")]
    NotInitialized,

    #[error("Feed closed")]
    Closed,
}

/// 업스트림 피드가 전달 채널로 보내는 이벤트.
///
/// 캔들 외에 업스트림 장애도 같은 채널로 전달되어 구독자에게 통지됩니다.
#[derive(Debug, Clone)]
pub enum FeedEvent {
    Candle(Candle),
    Error {
        symbol: String,
        timeframe: Timeframe,
        message: String,
    },
}

/// 업스트림 구독 키.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionKey {
    pub symbol: String,
    pub timeframe: Timeframe,
}

impl SubscriptionKey {
    pub fn new(symbol: impl Into<String>, timeframe: Timeframe) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
        }
    }
}

impl std::fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.symbol, self.timeframe)
    }
}

/// 캔들 피드 제공자.
///
/// 구현은 주어진 채널로 해당 키의 캔들과 업스트림 장애를 전송하는
/// 업스트림 구독을 엽니다.
#[async_trait]
pub trait FeedProvider: Send + Sync {
    async fn subscribe(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        tx: mpsc::Sender<FeedEvent>,
    ) -> Result<Box<dyn FeedSubscription>, FeedError>;
}

/// 열린 업스트림 구독 핸들.
#[async_trait]
pub trait FeedSubscription: Send + Sync {
    /// 업스트림 구독을 닫습니다.
    async fn unsubscribe(&mut self) -> Result<(), FeedError>;
}

struct KeyState {
    handle: Box<dyn FeedSubscription>,
    subscribers: HashSet<String>,
}

/// 구독 매니저.
pub struct SubscriptionManager {
    feed: Arc<dyn FeedProvider>,
    events_tx: mpsc::Sender<FeedEvent>,
    keys: RwLock<HashMap<SubscriptionKey, KeyState>>,
}

impl SubscriptionManager {
    pub fn new(feed: Arc<dyn FeedProvider>, events_tx: mpsc::Sender<FeedEvent>) -> Self {
        Self {
            feed,
            events_tx,
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// 전략을 키에 구독시킵니다.
    ///
    /// 키의 첫 구독자이면 업스트림 구독을 먼저 연 뒤 반환합니다.
    /// 업스트림 열기에 실패하면 구독자는 등록되지 않습니다.
    pub async fn subscribe(
        &self,
        strategy: &str,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<(), FeedError> {
        let key = SubscriptionKey::new(symbol, timeframe);
        let mut keys = self.keys.write().await;

        if let Some(state) = keys.get_mut(&key) {
            state.subscribers.insert(strategy.to_string());
            return Ok(());
        }

        let handle = self
            .feed
            .subscribe(symbol, timeframe, self.events_tx.clone())
            .await?;

        info!(key = %key, "Opened upstream subscription");

        let mut subscribers = HashSet::new();
        subscribers.insert(strategy.to_string());
        keys.insert(key, KeyState { handle, subscribers });

        Ok(())
    }

    /// 전략을 키에서 구독 해제합니다.
    ///
    /// 마지막 구독자가 떠나면 업스트림 구독을 닫습니다. 등록되지 않은
    /// 키/전략에 대한 호출은 무시됩니다.
    pub async fn unsubscribe(
        &self,
        strategy: &str,
        symbol: &str,
        timeframe: Timeframe,
    ) -> Result<(), FeedError> {
        let key = SubscriptionKey::new(symbol, timeframe);
        let mut keys = self.keys.write().await;

        let Some(state) = keys.get_mut(&key) else {
            return Ok(());
        };

        state.subscribers.remove(strategy);
        if state.subscribers.is_empty() {
            let mut state = keys.remove(&key).ok_or(FeedError::NotInitialized)?;
            info!(key = %key, "Closing upstream subscription");
            state.handle.unsubscribe().await?;
        }

        Ok(())
    }

    /// 전략의 모든 구독을 해제합니다.
    ///
    /// 업스트림 닫기 실패는 경고만 남기고 계속 진행합니다.
    pub async fn unsubscribe_all(&self, strategy: &str) {
        let mut keys = self.keys.write().await;
        let mut emptied = Vec::new();

        for (key, state) in keys.iter_mut() {
            if state.subscribers.remove(strategy) && state.subscribers.is_empty() {
                emptied.push(key.clone());
            }
        }

        for key in emptied {
            if let Some(mut state) = keys.remove(&key) {
                info!(key = %key, "Closing upstream subscription");
                if let Err(e) = state.handle.unsubscribe().await {
                    warn!(key = %key, error = %e, "Failed to close upstream subscription");
                }
            }
        }
    }

    /// 키의 현재 구독자 스냅샷을 반환합니다.
    pub async fn subscribers_for(&self, symbol: &str, timeframe: Timeframe) -> Vec<String> {
        let key = SubscriptionKey::new(symbol, timeframe);
        let keys = self.keys.read().await;
        keys.get(&key)
            .map(|state| state.subscribers.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// 열린 업스트림 구독 키 목록을 반환합니다.
    pub async fn active_subscriptions(&self) -> Vec<SubscriptionKey> {
        self.keys.read().await.keys().cloned().collect()
    }

    /// 모든 업스트림 구독을 닫습니다.
    pub async fn close_all(&self) {
        let mut keys = self.keys.write().await;
        for (key, mut state) in keys.drain() {
            if let Err(e) = state.handle.unsubscribe().await {
                warn!(key = %key, error = %e, "Failed to close upstream subscription");
            }
        }
    }
}
