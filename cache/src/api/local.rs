use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use super::InventoryApi;
use crate::error::CacheError;
use crate::types::ConsumptionEvent;
use crate::types::ConsumptionOutcome;
use crate::types::InventoryItem;
use crate::types::ItemDraft;
use crate::types::decrement_floored;

/// In-process stand-in for the inventory backend. Assigns numeric ids,
/// rejects over-consumption and can be told to fail upcoming calls.
#[derive(Debug, Default)]
pub struct LocalInventoryApi {
    state: Mutex<LocalState>,
}

#[derive(Debug, Default)]
struct LocalState {
    containers: HashMap<String, Vec<InventoryItem>>,
    next_id: u64,
    failures: VecDeque<CacheError>,
    calls: usize,
}

impl LocalInventoryApi {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, LocalState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace a container's server-side contents. Ids handed out afterwards
    /// start above the largest numeric id seeded so far.
    pub fn seed(&self, container: &str, items: Vec<InventoryItem>) {
        let mut state = self.lock();
        let highest = items
            .iter()
            .filter_map(|item| item.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0);
        state.next_id = state.next_id.max(highest);
        state.containers.insert(container.to_string(), items);
    }

    pub fn items(&self, container: &str) -> Vec<InventoryItem> {
        self.lock()
            .containers
            .get(container)
            .cloned()
            .unwrap_or_default()
    }

    /// Queue an error to be returned by the next call, whatever it is.
    pub fn fail_next(&self, err: CacheError) {
        self.lock().failures.push_back(err);
    }

    /// Number of calls received so far, including failed ones.
    pub fn calls(&self) -> usize {
        self.lock().calls
    }

    fn begin_call(&self) -> Result<MutexGuard<'_, LocalState>, CacheError> {
        let mut state = self.lock();
        state.calls += 1;
        match state.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(state),
        }
    }
}

#[async_trait]
impl InventoryApi for LocalInventoryApi {
    async fn list_items(&self, container: &str) -> Result<Vec<InventoryItem>, CacheError> {
        let state = self.begin_call()?;
        Ok(state
            .containers
            .get(container)
            .map(|items| {
                items
                    .iter()
                    .filter(|i| i.quantity > Decimal::ZERO)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_item(
        &self,
        container: &str,
        draft: &ItemDraft,
    ) -> Result<InventoryItem, CacheError> {
        let mut state = self.begin_call()?;
        draft
            .validate()
            .map_err(|e| CacheError::Validation(e.message()))?;
        state.next_id += 1;
        let id = state.next_id.to_string();
        let mut item = draft.clone().into_provisional(id, container);
        item.unit = item.unit.map(|u| u.trim().to_ascii_lowercase());
        state
            .containers
            .entry(container.to_string())
            .or_default()
            .push(item.clone());
        Ok(item)
    }

    async fn log_consumption(
        &self,
        container: &str,
        item_id: &str,
        event: &ConsumptionEvent,
    ) -> Result<ConsumptionOutcome, CacheError> {
        let mut state = self.begin_call()?;
        let items = state.containers.entry(container.to_string()).or_default();
        let Some(pos) = items.iter().position(|i| i.id == item_id) else {
            return Err(CacheError::Validation(format!("item {item_id} not found")));
        };
        if event.amount <= Decimal::ZERO {
            return Err(CacheError::Validation(
                "amount must be greater than zero".to_string(),
            ));
        }
        if event.amount > items[pos].quantity {
            let available = items[pos].quantity;
            return Err(CacheError::Validation(format!(
                "cannot consume {} of {item_id}: only {available} available",
                event.amount
            )));
        }
        let remaining = decrement_floored(items[pos].quantity, event.amount);
        if remaining.is_zero() {
            items.remove(pos);
            Ok(ConsumptionOutcome::Depleted)
        } else {
            items[pos].quantity = remaining;
            Ok(ConsumptionOutcome::Remaining(items[pos].clone()))
        }
    }
}
