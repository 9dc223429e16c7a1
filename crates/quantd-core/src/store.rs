//! 전략 레코드 및 키-값 저장소.
//!
//! `EntryStore`는 전략 레코드의 영속화를, `KvStore`는 전략별 네임스페이스의
//! 자유 형식 상태 저장을 담당합니다. 기본 구현은 메모리 기반이며,
//! 파일/DB 백엔드는 동일한 트레이트를 구현해 교체할 수 있습니다.

use crate::domain::StrategyRecord;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;

/// 저장소 실패.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store error: {0}")]
    Other(String),
}

/// 전략별 네임스페이스 키-값 저장소.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// 값을 저장합니다. 기존 키는 덮어씁니다.
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// 값을 조회합니다.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// 키를 삭제합니다. 없는 키는 무시됩니다.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// 전체 키 목록을 반환합니다.
    async fn keys(&self) -> Result<Vec<String>, StoreError>;
}

/// 전략 레코드 저장소.
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// 레코드를 삽입하거나 갱신합니다.
    async fn upsert(&self, record: &StrategyRecord) -> Result<(), StoreError>;

    /// 이름으로 레코드를 조회합니다.
    async fn get(&self, name: &str) -> Result<Option<StrategyRecord>, StoreError>;

    /// 전체 레코드를 반환합니다.
    async fn all(&self) -> Result<Vec<StrategyRecord>, StoreError>;

    /// 레코드를 삭제합니다.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// 전략별 네임스페이스 키-값 저장소를 엽니다.
    ///
    /// 같은 이름으로 다시 열면 동일한 저장소를 반환합니다.
    fn open_namespace(&self, name: &str) -> Arc<dyn KvStore>;
}

/// 메모리 키-값 저장소.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn put(&self, key: &str, value: Value) -> Result<(), StoreError> {
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn keys(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.entries.read().await.keys().cloned().collect())
    }
}

/// 메모리 전략 레코드 저장소.
///
/// 네임스페이스 저장소는 이름별로 캐시되어 재시작된 전략이
/// 같은 프로세스 안에서 상태를 이어받을 수 있습니다.
#[derive(Default)]
pub struct MemoryEntryStore {
    records: RwLock<HashMap<String, StrategyRecord>>,
    namespaces: std::sync::Mutex<HashMap<String, Arc<MemoryKvStore>>>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntryStore for MemoryEntryStore {
    async fn upsert(&self, record: &StrategyRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .await
            .insert(record.name.clone(), record.clone());
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<StrategyRecord>, StoreError> {
        Ok(self.records.read().await.get(name).cloned())
    }

    async fn all(&self) -> Result<Vec<StrategyRecord>, StoreError> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.records.write().await.remove(name);
        Ok(())
    }

    fn open_namespace(&self, name: &str) -> Arc<dyn KvStore> {
        let mut namespaces = self
            .namespaces
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        namespaces
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(MemoryKvStore::new()))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Timeframe;
    use serde_json::json;
    use std::path::PathBuf;

    fn sample_record(name: &str) -> StrategyRecord {
        StrategyRecord::new(
            name,
            "test",
            vec!["BTC".to_string()],
            vec![Timeframe::M1],
            PathBuf::from("/tmp/test.so"),
        )
    }

    #[tokio::test]
    async fn test_entry_store_roundtrip() {
        let store = MemoryEntryStore::new();
        store.upsert(&sample_record("alpha")).await.unwrap();
        store.upsert(&sample_record("beta")).await.unwrap();

        let loaded = store.get("alpha").await.unwrap().unwrap();
        assert_eq!(loaded.name, "alpha");
        assert_eq!(store.all().await.unwrap().len(), 2);

        store.delete("alpha").await.unwrap();
        assert!(store.get("alpha").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_kv_store_namespace_isolation() {
        let store = MemoryEntryStore::new();
        let ns_a = store.open_namespace("alpha");
        let ns_b = store.open_namespace("beta");

        ns_a.put("count", json!(3)).await.unwrap();
        assert_eq!(ns_a.get("count").await.unwrap(), Some(json!(3)));
        assert!(ns_b.get("count").await.unwrap().is_none());

        // 같은 이름으로 다시 열면 상태가 유지됨
        let ns_a2 = store.open_namespace("alpha");
        assert_eq!(ns_a2.get("count").await.unwrap(), Some(json!(3)));
    }

    #[tokio::test]
    async fn test_kv_store_delete_and_keys() {
        let kv = MemoryKvStore::new();
        kv.put("a", json!(1)).await.unwrap();
        kv.put("b", json!(2)).await.unwrap();

        let mut keys = kv.keys().await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["a", "b"]);

        kv.delete("a").await.unwrap();
        assert!(kv.get("a").await.unwrap().is_none());
    }
}
