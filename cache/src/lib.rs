//! Client-side inventory cache for the pantry app: per-container item lists
//! mirrored from the inventory API, with optimistic add/consume and rollback.

pub mod api;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod factory;
pub mod types;

pub use cache::InventoryItemCache;
pub use error::CacheError;
