//! Key-value store port.
//!
//! Writes are conditional on the revision the caller last read, so a
//! read-modify-write sequence can detect that another request wrote the same
//! key in between.

use async_trait::async_trait;

use crate::Result;

mod memory;
mod sqlite;

pub use memory::MemoryKv;
pub use sqlite::SqliteKv;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct KvEntry {
    pub value: Vec<u8>,
    /// Starts at 1 and increases by one per successful write.
    pub revision: u64,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CasOutcome {
    Written { revision: u64 },
    /// The stored revision did not match (or the key already existed for a create).
    Conflict,
}

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<KvEntry>>;

    /// Write `value` only if the current revision equals `expected`.
    ///
    /// `expected = None` means create-only: the key must not exist yet.
    async fn compare_and_put(
        &self,
        key: &str,
        value: Vec<u8>,
        expected: Option<u64>,
    ) -> Result<CasOutcome>;
}
