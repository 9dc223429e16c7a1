//! 엔진 런타임.
//!
//! 피드 → 구독 매니저 → 전략 매니저로 이어지는 캔들 이벤트 루프를 구성합니다.

use crate::manager::{ManagerConfig, StrategyManager};
use crate::plugin::StrategyLoader;
use crate::subscription::{FeedEvent, FeedProvider, SubscriptionManager};
use quantd_core::config::EngineSettings;
use quantd_core::domain::ExchangeClient;
use quantd_core::store::EntryStore;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{info, warn};

/// 전략 엔진 런타임.
///
/// 구성 요소를 묶고 캔들 이벤트 루프를 실행합니다.
pub struct Engine {
    manager: Arc<StrategyManager>,
    subscriptions: Arc<SubscriptionManager>,
    feed_rx: Mutex<Option<mpsc::Receiver<FeedEvent>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Engine {
    pub fn new(
        settings: &EngineSettings,
        loader: Arc<dyn StrategyLoader>,
        exchange: Arc<dyn ExchangeClient>,
        feed: Arc<dyn FeedProvider>,
        store: Arc<dyn EntryStore>,
    ) -> Self {
        let (feed_tx, feed_rx) = mpsc::channel(settings.candle_buffer_size);
        let (shutdown_tx, _) = watch::channel(false);

        let subscriptions = Arc::new(SubscriptionManager::new(feed, feed_tx));
        let manager = Arc::new(StrategyManager::new(
            store,
            subscriptions.clone(),
            loader,
            exchange,
            ManagerConfig {
                restart_delay: settings.restart_delay(),
                is_testnet: settings.is_testnet,
                event_buffer_size: settings.lifecycle_buffer_size,
            },
        ));

        Self {
            manager,
            subscriptions,
            feed_rx: Mutex::new(Some(feed_rx)),
            shutdown_tx,
        }
    }

    /// 전략 매니저를 반환합니다.
    pub fn manager(&self) -> Arc<StrategyManager> {
        self.manager.clone()
    }

    /// 구독 매니저를 반환합니다.
    pub fn subscriptions(&self) -> Arc<SubscriptionManager> {
        self.subscriptions.clone()
    }

    /// 종료 신호를 보냅니다.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// 캔들 이벤트 루프를 실행합니다.
    ///
    /// 종료 신호를 받으면 구독을 닫고 모든 전략을 중지한 뒤 반환합니다.
    /// 두 번 호출하면 즉시 반환합니다.
    pub async fn run(&self) {
        let Some(mut feed_rx) = self.feed_rx.lock().await.take() else {
            warn!("Engine event loop already consumed");
            return;
        };
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        info!("Engine event loop started");

        loop {
            tokio::select! {
                maybe_event = feed_rx.recv() => {
                    match maybe_event {
                        Some(FeedEvent::Candle(candle)) => {
                            self.manager.clone().dispatch(candle).await
                        }
                        Some(FeedEvent::Error { symbol, timeframe, message }) => {
                            self.manager
                                .report_feed_error(&symbol, timeframe, &message)
                                .await
                        }
                        None => {
                            warn!("Feed channel closed");
                            break;
                        }
                    }
                }
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("Shutdown signal received");
                        break;
                    }
                }
            }
        }

        self.subscriptions.close_all().await;
        self.manager.shutdown().await;
        info!("Engine event loop stopped");
    }
}
