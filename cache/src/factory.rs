use std::sync::Arc;

use crate::api::InventoryApi;
use crate::api::http::HttpInventoryApi;
use crate::api::local::LocalInventoryApi;
use crate::auth::EnvToken;
use crate::cache::InventoryItemCache;
use crate::config::Backend;
use crate::config::Config;

/// Build the API client selected by `config.backend`.
pub fn open_api(config: &Config) -> anyhow::Result<Arc<dyn InventoryApi>> {
    Ok(match config.backend {
        Backend::Http => {
            let tokens = Arc::new(EnvToken::new(config.token_var.clone()));
            Arc::new(HttpInventoryApi::new(
                config.api_url.clone(),
                config.request_timeout(),
                tokens,
            )?)
        }
        Backend::Local => {
            tracing::info!("using in-process inventory backend; nothing is persisted");
            Arc::new(LocalInventoryApi::new())
        }
    })
}

/// Build a cache wired to the backend described by `config`.
pub fn open_cache(config: &Config) -> anyhow::Result<InventoryItemCache> {
    let api = open_api(config)?;
    Ok(InventoryItemCache::with_consistency(api, config.consistency))
}
