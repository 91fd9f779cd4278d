//! Per-container item cache with optimistic add and consumption.
//!
//! Every mutation first applies a provisional change synchronously, inside
//! the call itself, so readers see it before any network round-trip. The
//! returned future then talks to the [`InventoryApi`] and either reconciles
//! the provisional state with the server's answer or rolls it back.

use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use tokio::sync::OwnedMutexGuard;
use tokio::sync::watch;

use crate::api::InventoryApi;
use crate::config::Consistency;
use crate::error::CacheError;
use crate::types::ConsumptionEvent;
use crate::types::ConsumptionOutcome;
use crate::types::InventoryItem;
use crate::types::ItemDraft;
use crate::types::TempIdGenerator;
use crate::types::decrement_floored;
use crate::types::is_provisional;

type Collection = Vec<InventoryItem>;
type ItemLock = Arc<tokio::sync::Mutex<()>>;
type ItemKey = (String, String);

/// Cheap to clone; clones share the same collections.
#[derive(Clone)]
pub struct InventoryItemCache {
    inner: Arc<Inner>,
}

struct Inner {
    api: Arc<dyn InventoryApi>,
    consistency: Consistency,
    collections: Mutex<HashMap<String, watch::Sender<Collection>>>,
    item_locks: Mutex<HashMap<ItemKey, ItemLock>>,
    temp_ids: TempIdGenerator,
}

/// Undoes a provisional change unless disarmed. Runs on drop too, so a
/// future abandoned mid-flight does not leave provisional state behind.
struct Rollback(Option<Box<dyn FnOnce() + Send>>);

impl Rollback {
    fn new(undo: impl FnOnce() + Send + 'static) -> Self {
        Self(Some(Box::new(undo)))
    }

    fn disarm(mut self) {
        self.0 = None;
    }

    fn fire(mut self) {
        if let Some(undo) = self.0.take() {
            undo();
        }
    }
}

impl Drop for Rollback {
    fn drop(&mut self) {
        if let Some(undo) = self.0.take() {
            tracing::warn!("inventory operation dropped before settling; rolling back");
            undo();
        }
    }
}

/// Serialized-mode hold on one item. Dropping it releases the lock and
/// forgets the item's entry when no other operation is waiting on it.
struct ItemGuard {
    guard: Option<OwnedMutexGuard<()>>,
    inner: Arc<Inner>,
    key: ItemKey,
}

impl Drop for ItemGuard {
    fn drop(&mut self) {
        self.guard.take();
        self.inner.release_item_lock(&self.key);
    }
}

enum ConsumptionTicket {
    Applied {
        lock: Option<ItemGuard>,
        rollback: Rollback,
    },
    Queued(ItemLock, ItemGuard),
}

impl InventoryItemCache {
    pub fn new(api: Arc<dyn InventoryApi>) -> Self {
        Self::with_consistency(api, Consistency::default())
    }

    pub fn with_consistency(api: Arc<dyn InventoryApi>, consistency: Consistency) -> Self {
        Self {
            inner: Arc::new(Inner {
                api,
                consistency,
                collections: Mutex::new(HashMap::new()),
                item_locks: Mutex::new(HashMap::new()),
                temp_ids: TempIdGenerator::default(),
            }),
        }
    }

    pub fn consistency(&self) -> Consistency {
        self.inner.consistency
    }

    /// Current items of `container`, in display order.
    pub fn items(&self, container: &str) -> Vec<InventoryItem> {
        self.inner.snapshot(container)
    }

    pub fn item(&self, container: &str, id: &str) -> Option<InventoryItem> {
        self.inner
            .snapshot(container)
            .into_iter()
            .find(|item| item.id == id)
    }

    pub fn containers(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.lock_collections().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Watch `container`. The receiver is notified after every change to that
    /// container only, and closes when the container is removed.
    pub fn subscribe(&self, container: &str) -> watch::Receiver<Vec<InventoryItem>> {
        self.inner
            .lock_collections()
            .entry(container.to_string())
            .or_insert_with(|| watch::channel(Vec::new()).0)
            .subscribe()
    }

    /// Add `draft` to `container`.
    ///
    /// A provisional item with a `temp-` id is visible as soon as this returns.
    /// Awaiting the future submits the draft; on success the provisional entry
    /// is replaced in place by the server's record, on failure it is removed
    /// and the error returned.
    pub fn add_item(
        &self,
        container: &str,
        draft: ItemDraft,
    ) -> impl Future<Output = Result<InventoryItem, CacheError>> + Send + use<> {
        let inner = Arc::clone(&self.inner);
        let container = container.to_string();
        let started = inner.begin_add(&container, &draft);
        async move {
            let (temp_id, rollback) = started?;
            match inner.api.create_item(&container, &draft).await {
                Ok(item) => {
                    rollback.disarm();
                    inner.confirm_add(&container, &temp_id, item.clone());
                    Ok(item)
                }
                Err(err) => {
                    tracing::warn!("add to {container} failed, removing {temp_id}: {err}");
                    rollback.fire();
                    Err(err)
                }
            }
        }
    }

    /// Record that `amount` of `item_id` was consumed.
    ///
    /// The decremented quantity (floored at zero, removing the item when it
    /// reaches zero) is visible as soon as this returns. Awaiting the future
    /// submits the event; on success the container is refetched, on failure
    /// the item's original record is put back where it was. Other entries,
    /// including ones added meanwhile, are left alone.
    pub fn log_consumption(
        &self,
        container: &str,
        item_id: &str,
        amount: Decimal,
    ) -> impl Future<Output = Result<(), CacheError>> + Send + use<> {
        let inner = Arc::clone(&self.inner);
        let container = container.to_string();
        let item_id = item_id.to_string();
        let ticket = inner.begin_consumption(&container, &item_id, amount);
        async move {
            let (_lock, rollback) = match ticket? {
                ConsumptionTicket::Applied { lock, rollback } => (lock, rollback),
                ConsumptionTicket::Queued(lock, mut held) => {
                    held.guard = Some(lock.lock_owned().await);
                    let rollback = inner.apply_consumption(&container, &item_id, amount)?;
                    (Some(held), rollback)
                }
            };
            let event = ConsumptionEvent::now(amount);
            match inner
                .api
                .log_consumption(&container, &item_id, &event)
                .await
            {
                Ok(outcome) => {
                    rollback.disarm();
                    inner
                        .reconcile_consumption(&container, &item_id, outcome)
                        .await;
                    Ok(())
                }
                Err(err) => {
                    tracing::warn!(
                        "consumption of {item_id} in {container} failed, restoring item: {err}"
                    );
                    rollback.fire();
                    Err(err)
                }
            }
        }
    }

    /// Replace the cached collection with the server's. Provisional entries are
    /// dropped; their pending adds append the confirmed item when they settle.
    pub async fn refresh(&self, container: &str) -> Result<Vec<InventoryItem>, CacheError> {
        validate_container(container)?;
        self.inner.fetch(container).await
    }

    /// Forget `container` entirely, e.g. after it was deleted. Subscribers
    /// observe an empty collection, then a closed channel.
    pub fn remove_container(&self, container: &str) -> Vec<InventoryItem> {
        let removed = self
            .inner
            .lock_collections()
            .remove(container)
            .map(|sender| sender.send_replace(Vec::new()))
            .unwrap_or_default();
        self.inner
            .lock_item_locks()
            .retain(|(c, _), _| c != container);
        tracing::debug!("removed container {container} ({} items)", removed.len());
        removed
    }

    /// Drop every cached collection.
    pub fn clear(&self) {
        let drained: Vec<_> = self.inner.lock_collections().drain().collect();
        for (_, sender) in drained {
            sender.send_replace(Vec::new());
        }
        self.inner.lock_item_locks().clear();
    }
}

impl Inner {
    fn lock_collections(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<Collection>>> {
        self.collections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_item_locks(&self) -> MutexGuard<'_, HashMap<ItemKey, ItemLock>> {
        self.item_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn snapshot(&self, container: &str) -> Collection {
        self.lock_collections()
            .get(container)
            .map(|sender| sender.borrow().clone())
            .unwrap_or_default()
    }

    /// Run `f` against the collection for `container` while holding the
    /// collections lock. Subscribers are notified only if the items changed,
    /// and a missing container is created only if `f` leaves it non-empty.
    fn update<R>(&self, container: &str, f: impl FnOnce(&mut Collection) -> R) -> R {
        let mut collections = self.lock_collections();
        let current = collections
            .get(container)
            .map(|sender| sender.borrow().clone())
            .unwrap_or_default();
        let mut items = current.clone();
        let out = f(&mut items);
        if items != current {
            match collections.get(container) {
                Some(sender) => {
                    sender.send_replace(items);
                }
                None => {
                    collections.insert(container.to_string(), watch::channel(items).0);
                }
            }
        }
        out
    }

    fn begin_add(
        self: &Arc<Self>,
        container: &str,
        draft: &ItemDraft,
    ) -> Result<(String, Rollback), CacheError> {
        validate_container(container)?;
        draft.validate()?;
        let temp_id = self.temp_ids.next();
        let provisional = draft.clone().into_provisional(temp_id.clone(), container);
        self.update(container, |items| items.push(provisional));
        tracing::debug!("provisional add {temp_id} to {container}");

        let inner = Arc::clone(self);
        let (c, t) = (container.to_string(), temp_id.clone());
        let rollback = Rollback::new(move || {
            inner.update(&c, |items| items.retain(|item| item.id != t));
        });
        Ok((temp_id, rollback))
    }

    fn confirm_add(&self, container: &str, temp_id: &str, item: InventoryItem) {
        if item.inventory_id != container {
            tracing::warn!(
                "server placed {} in {} instead of {container}",
                item.id,
                item.inventory_id
            );
        }
        tracing::debug!("confirmed {temp_id} as {} in {container}", item.id);
        self.update(container, |items| {
            let temp_pos = items.iter().position(|i| i.id == temp_id);
            let real_pos = items.iter().position(|i| i.id == item.id);
            match (temp_pos, real_pos) {
                // A refetch already brought the confirmed record in; keep the
                // provisional slot and drop the other copy.
                (Some(t), Some(r)) => {
                    items[t] = item;
                    items.remove(r);
                }
                (Some(t), None) => items[t] = item,
                (None, Some(r)) => items[r] = item,
                (None, None) => items.push(item),
            }
        });
    }

    fn item_lock(&self, key: &ItemKey) -> ItemLock {
        Arc::clone(self.lock_item_locks().entry(key.clone()).or_default())
    }

    fn release_item_lock(&self, key: &ItemKey) {
        let mut locks = self.lock_item_locks();
        if locks
            .get(key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            locks.remove(key);
        }
    }

    #[cfg(test)]
    fn tracked_item_locks(&self) -> usize {
        self.lock_item_locks().len()
    }

    fn begin_consumption(
        self: &Arc<Self>,
        container: &str,
        item_id: &str,
        amount: Decimal,
    ) -> Result<ConsumptionTicket, CacheError> {
        validate_container(container)?;
        if amount <= Decimal::ZERO {
            return Err(CacheError::InvalidInput(format!(
                "amount must be greater than zero, got {amount}"
            )));
        }
        if is_provisional(item_id) {
            return Err(CacheError::InvalidInput(format!(
                "item {item_id} is still being saved"
            )));
        }
        match self.consistency {
            Consistency::Eventual => Ok(ConsumptionTicket::Applied {
                lock: None,
                rollback: self.apply_consumption(container, item_id, amount)?,
            }),
            Consistency::Serialized => {
                let key = (container.to_string(), item_id.to_string());
                let lock = self.item_lock(&key);
                let mut held = ItemGuard {
                    guard: None,
                    inner: Arc::clone(self),
                    key,
                };
                match Arc::clone(&lock).try_lock_owned() {
                    Ok(guard) => {
                        drop(lock);
                        held.guard = Some(guard);
                        Ok(ConsumptionTicket::Applied {
                            lock: Some(held),
                            rollback: self.apply_consumption(container, item_id, amount)?,
                        })
                    }
                    Err(_) => {
                        tracing::debug!("{item_id} in {container} busy; queueing consumption");
                        Ok(ConsumptionTicket::Queued(lock, held))
                    }
                }
            }
        }
    }

    fn apply_consumption(
        self: &Arc<Self>,
        container: &str,
        item_id: &str,
        amount: Decimal,
    ) -> Result<Rollback, CacheError> {
        let (pos, original) = self.update(container, |items| {
            let Some(pos) = items.iter().position(|i| i.id == item_id) else {
                return Err(CacheError::UnknownItem {
                    container: container.to_string(),
                    item_id: item_id.to_string(),
                });
            };
            let original = items[pos].clone();
            let remaining = decrement_floored(original.quantity, amount);
            if remaining.is_zero() {
                items.remove(pos);
            } else {
                items[pos].quantity = remaining;
            }
            Ok((pos, original))
        })?;
        tracing::debug!("provisional consumption of {amount} from {item_id} in {container}");

        let inner = Arc::clone(self);
        let c = container.to_string();
        Ok(Rollback::new(move || {
            inner.update(&c, |items| restore_item(items, pos, original));
        }))
    }

    async fn reconcile_consumption(
        &self,
        container: &str,
        item_id: &str,
        outcome: ConsumptionOutcome,
    ) {
        if let Err(err) = self.fetch(container).await {
            tracing::warn!(
                "refetch of {container} after consumption failed, patching {item_id} from response: {err}"
            );
            self.update(container, |items| patch_consumed(items, item_id, outcome));
        }
    }

    async fn fetch(&self, container: &str) -> Result<Collection, CacheError> {
        let items: Collection = self
            .api
            .list_items(container)
            .await?
            .into_iter()
            .filter(|item| item.quantity > Decimal::ZERO)
            .collect();
        tracing::debug!("fetched {} items for {container}", items.len());
        self.update(container, |cached| cached.clone_from(&items));
        Ok(items)
    }
}

fn validate_container(container: &str) -> Result<(), CacheError> {
    if container.trim().is_empty() {
        return Err(CacheError::InvalidInput(
            "inventory id must not be empty".to_string(),
        ));
    }
    Ok(())
}

/// Put `original` back without touching the other entries: in place if the
/// record is still cached, otherwise at its old index (clamped to the end).
fn restore_item(items: &mut Collection, pos: usize, original: InventoryItem) {
    match items.iter().position(|i| i.id == original.id) {
        Some(current) => items[current] = original,
        None => items.insert(pos.min(items.len()), original),
    }
}

/// Apply a consumption response directly when a refetch is not available.
fn patch_consumed(items: &mut Collection, item_id: &str, outcome: ConsumptionOutcome) {
    let pos = items.iter().position(|i| i.id == item_id);
    match (outcome, pos) {
        (ConsumptionOutcome::Depleted, Some(pos)) => {
            items.remove(pos);
        }
        (ConsumptionOutcome::Depleted, None) => {}
        (ConsumptionOutcome::Remaining(item), Some(pos)) => items[pos] = item,
        (ConsumptionOutcome::Remaining(item), None) => items.push(item),
        (ConsumptionOutcome::Quantity(q), Some(pos)) => items[pos].quantity = q,
        (ConsumptionOutcome::Quantity(q), None) => {
            tracing::warn!("cannot restore {item_id} with quantity {q}: no cached record");
        }
        (ConsumptionOutcome::Unknown, _) => {
            tracing::warn!("no remaining quantity reported for {item_id}; keeping local value");
        }
    }
}
