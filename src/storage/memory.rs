//! In-memory record store for development and testing

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::traits::{ItemRecord, RecordStore};
use crate::error::Result;

#[derive(Default, Clone)]
pub struct MemoryRecordStore {
    items: Arc<RwLock<Vec<ItemRecord>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every item written so far, in write order
    pub async fn items(&self) -> Vec<ItemRecord> {
        self.items.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert_item(&self, item: ItemRecord) -> Result<()> {
        self.items.write().await.push(item);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
