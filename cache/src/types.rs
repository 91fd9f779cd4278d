use chrono::DateTime;
use chrono::NaiveDate;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::Serialize;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;

use crate::error::CacheError;

/// Prefix reserved for client-generated placeholder ids. Server ids are
/// numeric or UUIDs and never start with it.
pub const TEMP_ID_PREFIX: &str = "temp-";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ItemName {
    Custom(String),
    #[serde(rename_all = "camelCase")]
    Catalog {
        food_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        label: Option<String>,
    },
}

impl ItemName {
    pub fn custom(name: impl Into<String>) -> Self {
        ItemName::Custom(name.into())
    }

    /// Human-readable name: the custom text, the catalog label, or the food id.
    pub fn display(&self) -> &str {
        match self {
            ItemName::Custom(name) => name,
            ItemName::Catalog {
                label: Some(label), ..
            } => label,
            ItemName::Catalog { food_id, .. } => food_id,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct InventoryItem {
    pub id: String,
    pub inventory_id: String,
    pub name: ItemName,
    pub quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl InventoryItem {
    pub fn is_provisional(&self) -> bool {
        is_provisional(&self.id)
    }
}

/// An item as submitted by the user, before the server assigns an id.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ItemDraft {
    pub name: ItemName,
    pub quantity: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl ItemDraft {
    pub fn new(name: ItemName, quantity: Decimal) -> Self {
        Self {
            name,
            quantity,
            unit: None,
            expiry_date: None,
            notes: None,
        }
    }

    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    pub fn with_expiry(mut self, date: NaiveDate) -> Self {
        self.expiry_date = Some(date);
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn validate(&self) -> Result<(), CacheError> {
        if self.quantity <= Decimal::ZERO {
            return Err(CacheError::InvalidInput(format!(
                "quantity must be greater than zero, got {}",
                self.quantity
            )));
        }
        match &self.name {
            ItemName::Custom(name) if name.trim().is_empty() => Err(CacheError::InvalidInput(
                "item name must not be empty".to_string(),
            )),
            ItemName::Catalog { food_id, .. } if food_id.trim().is_empty() => Err(
                CacheError::InvalidInput("catalog food id must not be empty".to_string()),
            ),
            _ => Ok(()),
        }
    }

    pub(crate) fn into_provisional(self, id: String, inventory_id: &str) -> InventoryItem {
        InventoryItem {
            id,
            inventory_id: inventory_id.to_string(),
            name: self.name,
            quantity: self.quantity,
            unit: self.unit,
            expiry_date: self.expiry_date,
            notes: self.notes,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionEvent {
    pub amount: Decimal,
    pub consumed_at: DateTime<Utc>,
}

impl ConsumptionEvent {
    pub fn now(amount: Decimal) -> Self {
        Self {
            amount,
            consumed_at: Utc::now(),
        }
    }
}

/// What the server reports back after a consumption was recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsumptionOutcome {
    Remaining(InventoryItem),
    Quantity(Decimal),
    Depleted,
    /// The response carried neither a record nor a quantity.
    Unknown,
}

pub fn is_provisional(id: &str) -> bool {
    id.starts_with(TEMP_ID_PREFIX)
}

/// Generates `temp-<unix-millis>-<seq>` ids. The sequence makes ids unique
/// even when several are minted within the same millisecond.
#[derive(Debug, Default)]
pub(crate) struct TempIdGenerator {
    seq: AtomicU64,
}

impl TempIdGenerator {
    pub(crate) fn next(&self) -> String {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let millis = Utc::now().timestamp_millis();
        format!("{TEMP_ID_PREFIX}{millis}-{seq}")
    }
}

/// max(0, quantity - amount)
pub(crate) fn decrement_floored(quantity: Decimal, amount: Decimal) -> Decimal {
    (quantity - amount).max(Decimal::ZERO)
}
