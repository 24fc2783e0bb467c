//! Optional persistence back-end.
//!
//! The engine is fully functional in memory; a deployment that wants
//! durable tracking or a semantic market cache can plug a memory
//! service in behind this four-capsule contract. Writes from the
//! orchestrator are best-effort: a failing store is logged and ignored,
//! never surfaced to the caller.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::FederationError;

/// The capsules (named storage partitions) the engine writes to.
pub const CAPSULES: &[&str] = &[
    "market-cache",
    "tracked-markets",
    "market-mappings",
    "category-index",
];

/// One stored item with its metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    pub metadata: Value,
}

/// Contract for the pluggable memory service.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Store content in a capsule, returning the stored record's id.
    async fn store(
        &self,
        capsule: &str,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<String, FederationError>;

    /// Search a capsule by embedding similarity.
    async fn semantic_search(
        &self,
        capsule: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<MemoryRecord>, FederationError>;

    /// Search a capsule by text match.
    async fn text_search(
        &self,
        capsule: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<MemoryRecord>, FederationError>;

    /// Most recent records in a capsule, newest first.
    async fn recent(&self, capsule: &str, limit: usize)
        -> Result<Vec<MemoryRecord>, FederationError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

/// Volatile implementation of the contract. Semantic search degrades to
/// text search (there is no local embedding model); useful for tests
/// and for running without a memory service configured.
#[derive(Default)]
pub struct InMemoryStore {
    records: Mutex<HashMap<String, Vec<MemoryRecord>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matching(&self, capsule: &str, query: &str, k: usize) -> Vec<MemoryRecord> {
        let query = query.to_lowercase();
        let records = self.records.lock().expect("store lock poisoned");
        records
            .get(capsule)
            .map(|items| {
                items
                    .iter()
                    .rev()
                    .filter(|r| r.content.to_lowercase().contains(&query))
                    .take(k)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl MemoryStore for InMemoryStore {
    async fn store(
        &self,
        capsule: &str,
        content: &str,
        metadata: Option<Value>,
    ) -> Result<String, FederationError> {
        let mut records = self.records.lock().expect("store lock poisoned");
        let items = records.entry(capsule.to_string()).or_default();
        let id = format!("{capsule}-{}", items.len() + 1);
        items.push(MemoryRecord {
            id: id.clone(),
            content: content.to_string(),
            metadata: metadata.unwrap_or(Value::Null),
        });
        Ok(id)
    }

    async fn semantic_search(
        &self,
        capsule: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<MemoryRecord>, FederationError> {
        Ok(self.matching(capsule, query, k))
    }

    async fn text_search(
        &self,
        capsule: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<MemoryRecord>, FederationError> {
        Ok(self.matching(capsule, query, k))
    }

    async fn recent(
        &self,
        capsule: &str,
        limit: usize,
    ) -> Result<Vec<MemoryRecord>, FederationError> {
        let records = self.records.lock().expect("store lock poisoned");
        Ok(records
            .get(capsule)
            .map(|items| items.iter().rev().take(limit).cloned().collect())
            .unwrap_or_default())
    }
}
