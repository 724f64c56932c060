//! Record store interface
//!
//! Match outcomes are written to an external item store. The hub only needs
//! "accept a write, report success or failure", so the backend is pluggable.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::core::envelope::SubscriberId;
use crate::error::Result;

/// Row written to the item store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub owner_id: String,
}

impl ItemRecord {
    /// Record of a finished match, owned by the system identity
    pub fn match_result(winner: SubscriberId, owner_id: &str) -> Self {
        let timestamp = chrono::Utc::now().timestamp();
        Self {
            id: Uuid::new_v4(),
            title: format!("match_result{}", timestamp),
            description: winner.to_string(),
            owner_id: owner_id.to_string(),
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a single item using the store's elevated credentials
    async fn insert_item(&self, item: ItemRecord) -> Result<()>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

pub type SharedRecordStore = Arc<dyn RecordStore>;
