use async_trait::async_trait;
use reqwest::StatusCode;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use super::InventoryApi;
use crate::auth::TokenSource;
use crate::error::CacheError;
use crate::types::ConsumptionEvent;
use crate::types::ConsumptionOutcome;
use crate::types::InventoryItem;
use crate::types::ItemDraft;
use crate::types::is_provisional;

/// REST client for the inventory backend.
pub struct HttpInventoryApi {
    client: reqwest::Client,
    base_url: String,
    tokens: Arc<dyn TokenSource>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConsumptionResponse {
    #[serde(default)]
    item: Option<InventoryItem>,
    #[serde(default)]
    remaining_quantity: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpInventoryApi {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, CacheError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            tokens,
        })
    }

    fn items_url(&self, container: &str) -> String {
        format!(
            "{}/inventories/{}/items",
            self.base_url,
            urlencoding::encode(container)
        )
    }

    fn consumptions_url(&self, container: &str, item_id: &str) -> String {
        format!(
            "{}/{}/consumptions",
            self.items_url(container),
            urlencoding::encode(item_id)
        )
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<T, CacheError> {
        let token = self.tokens.bearer_token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(error_from_response(status, &body));
        }
        serde_json::from_str(&body).map_err(|e| CacheError::Decode(format!("{e}: {body}")))
    }
}

#[async_trait]
impl InventoryApi for HttpInventoryApi {
    async fn list_items(&self, container: &str) -> Result<Vec<InventoryItem>, CacheError> {
        let url = self.items_url(container);
        tracing::debug!("GET {url}");
        let items: Vec<InventoryItem> = self.send(self.client.get(&url)).await?;
        items.into_iter().map(checked_item).collect()
    }

    async fn create_item(
        &self,
        container: &str,
        draft: &ItemDraft,
    ) -> Result<InventoryItem, CacheError> {
        let url = self.items_url(container);
        tracing::debug!("POST {url}");
        let item = self.send(self.client.post(&url).json(draft)).await?;
        checked_item(item)
    }

    async fn log_consumption(
        &self,
        container: &str,
        item_id: &str,
        event: &ConsumptionEvent,
    ) -> Result<ConsumptionOutcome, CacheError> {
        let url = self.consumptions_url(container, item_id);
        tracing::debug!("POST {url}");
        let response: ConsumptionResponse = self.send(self.client.post(&url).json(event)).await?;
        match (response.item, response.remaining_quantity) {
            (Some(item), _) => {
                let item = checked_item(item)?;
                if item.quantity.is_zero() {
                    Ok(ConsumptionOutcome::Depleted)
                } else {
                    Ok(ConsumptionOutcome::Remaining(item))
                }
            }
            (None, Some(q)) if q > Decimal::ZERO => Ok(ConsumptionOutcome::Quantity(q)),
            (None, Some(_)) => Ok(ConsumptionOutcome::Depleted),
            (None, None) => Ok(ConsumptionOutcome::Unknown),
        }
    }
}

/// Rejects records the cache could not safely hold and clamps negative
/// quantities to zero.
fn checked_item(mut item: InventoryItem) -> Result<InventoryItem, CacheError> {
    if item.id.trim().is_empty() {
        return Err(CacheError::Decode("item without an id".to_string()));
    }
    if is_provisional(&item.id) {
        return Err(CacheError::Decode(format!(
            "server returned reserved id {}",
            item.id
        )));
    }
    if item.quantity < Decimal::ZERO {
        tracing::warn!(
            "item {} has negative quantity {}; clamping to zero",
            item.id,
            item.quantity
        );
        item.quantity = Decimal::ZERO;
    }
    Ok(item)
}

fn error_from_response(status: StatusCode, body: &str) -> CacheError {
    let parsed: ErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = parsed
        .message
        .or(parsed.error)
        .unwrap_or_else(|| body.trim().to_string());
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => CacheError::Unauthorized(message),
        StatusCode::BAD_REQUEST
        | StatusCode::NOT_FOUND
        | StatusCode::CONFLICT
        | StatusCode::UNPROCESSABLE_ENTITY => CacheError::Validation(message),
        other => CacheError::Server {
            status: other.as_u16(),
            message,
        },
    }
}
