use async_trait::async_trait;

use crate::error::CacheError;
use crate::types::ConsumptionEvent;
use crate::types::ConsumptionOutcome;
use crate::types::InventoryItem;
use crate::types::ItemDraft;

/// The remote system of record for inventory items. Implementations decode
/// responses into typed values; callers never see raw payloads.
#[async_trait]
pub trait InventoryApi: Send + Sync {
    async fn list_items(&self, container: &str) -> Result<Vec<InventoryItem>, CacheError>;

    async fn create_item(
        &self,
        container: &str,
        draft: &ItemDraft,
    ) -> Result<InventoryItem, CacheError>;

    async fn log_consumption(
        &self,
        container: &str,
        item_id: &str,
        event: &ConsumptionEvent,
    ) -> Result<ConsumptionOutcome, CacheError>;
}

pub mod http;
pub mod local;
