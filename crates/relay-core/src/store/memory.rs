use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use super::{CasOutcome, KvEntry, KvStore};
use crate::Result;

/// In-process store. State is lost on restart.
#[derive(Debug, Default)]
pub struct MemoryKv {
    entries: Mutex<HashMap<String, KvEntry>>,
}

impl MemoryKv {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>> {
        Ok(self.entries.lock().await.get(key).cloned())
    }

    async fn compare_and_put(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Option<u64>,
    ) -> Result<CasOutcome> {
        let mut map = self.entries.lock().await;
        let current = map.get(key).map(|e| e.revision);
        if current != expected {
            return Ok(CasOutcome::Conflict);
        }

        let revision = current.unwrap_or(0) + 1;
        map.insert(key.to_string(), KvEntry { value, revision });
        Ok(CasOutcome::Written { revision })
    }
}
