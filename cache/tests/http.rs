use pantry_cache::InventoryItemCache;
use pantry_cache::api::http::HttpInventoryApi;
use pantry_cache::auth::StaticToken;
use pantry_cache::error::CacheError;
use pantry_cache::types::ItemDraft;
use pantry_cache::types::ItemName;
use pretty_assertions::assert_eq;
use rust_decimal::Decimal;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;

fn cache_for(server: &MockServer, token: &str, timeout: Duration) -> InventoryItemCache {
    let api = HttpInventoryApi::new(
        format!("{}/", server.uri()),
        timeout,
        Arc::new(StaticToken::new(token)),
    )
    .unwrap();
    InventoryItemCache::new(Arc::new(api))
}

fn item_json(id: &str, qty: f64) -> serde_json::Value {
    json!({
        "id": id,
        "inventoryId": "fridge",
        "name": {"custom": "Milk"},
        "quantity": qty,
        "unit": "l",
    })
}

#[tokio::test]
async fn add_item_posts_draft_with_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/inventories/fridge/items"))
        .and(header("authorization", "Bearer s3cret"))
        .respond_with(ResponseTemplate::new(201).set_body_json(item_json("42", 2.0)))
        .expect(1)
        .mount(&server)
        .await;

    let cache = cache_for(&server, "s3cret", Duration::from_secs(5));
    let pending = cache.add_item(
        "fridge",
        ItemDraft::new(ItemName::custom("Milk"), Decimal::new(2, 0)).with_unit("l"),
    );
    assert!(cache.items("fridge")[0].is_provisional());

    let item = pending.await.unwrap();
    assert_eq!(item.id, "42");
    assert_eq!(cache.items("fridge"), vec![item]);
}

#[tokio::test]
async fn consumption_success_refetches_authoritative_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/inventories/fridge/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([item_json("7", 3.0)])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/inventories/fridge/items/7/consumptions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"item": item_json("7", 2.0)})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/inventories/fridge/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([item_json("7", 1.5)])))
        .mount(&server)
        .await;

    let cache = cache_for(&server, "t", Duration::from_secs(5));
    cache.refresh("fridge").await.unwrap();

    let pending = cache.log_consumption("fridge", "7", Decimal::ONE);
    assert_eq!(cache.item("fridge", "7").unwrap().quantity, Decimal::new(2, 0));

    pending.await.unwrap();
    // The refetch wins over both the optimistic value and the response body.
    assert_eq!(
        cache.item("fridge", "7").unwrap().quantity,
        Decimal::new(15, 1)
    );
}

#[tokio::test]
async fn empty_consumption_response_keeps_optimistic_quantity() {
    for body in [json!({}), json!({"remainingQuantity": null})] {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/inventories/fridge/items"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([item_json("7", 10.0)])))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/inventories/fridge/items/7/consumptions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/inventories/fridge/items"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let cache = cache_for(&server, "t", Duration::from_secs(5));
        cache.refresh("fridge").await.unwrap();
        cache
            .log_consumption("fridge", "7", Decimal::ONE)
            .await
            .unwrap();

        // Neither the refetch nor the response says what is left, so the
        // locally decremented record stays.
        assert_eq!(
            cache.item("fridge", "7").unwrap().quantity,
            Decimal::new(9, 0)
        );
    }
}

#[tokio::test]
async fn validation_failure_rolls_back_with_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/inventories/fridge/items"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([item_json("7", 2.0)])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/inventories/fridge/items/7/consumptions"))
        .respond_with(
            ResponseTemplate::new(422).set_body_json(json!({"message": "only 2 l left"})),
        )
        .mount(&server)
        .await;

    let cache = cache_for(&server, "t", Duration::from_secs(5));
    let before = cache.refresh("fridge").await.unwrap();

    let pending = cache.log_consumption("fridge", "7", Decimal::new(5, 0));
    assert!(cache.items("fridge").is_empty());

    let err = pending.await.unwrap_err();
    assert_eq!(err, CacheError::Validation("only 2 l left".to_string()));
    assert_eq!(err.user_message(), "only 2 l left");
    assert_eq!(cache.items("fridge"), before);
}

#[tokio::test]
async fn rejected_token_is_reported_as_auth_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/inventories/fridge/items"))
        .respond_with(ResponseTemplate::new(401).set_body_string(""))
        .mount(&server)
        .await;

    let cache = cache_for(&server, "expired", Duration::from_secs(5));
    let err = cache
        .add_item("fridge", ItemDraft::new(ItemName::custom("Milk"), Decimal::ONE))
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert_eq!(
        err.user_message(),
        pantry_cache::error::GENERIC_FAILURE_MESSAGE
    );
    assert!(cache.items("fridge").is_empty());
}

#[tokio::test]
async fn missing_token_fails_before_any_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(201).set_body_json(item_json("1", 1.0)))
        .expect(0)
        .mount(&server)
        .await;

    let cache = cache_for(&server, "", Duration::from_secs(5));
    let err = cache
        .add_item("fridge", ItemDraft::new(ItemName::custom("Milk"), Decimal::ONE))
        .await
        .unwrap_err();
    assert!(err.is_auth());
    assert!(cache.items("fridge").is_empty());
}

#[tokio::test]
async fn reserved_id_from_server_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/inventories/fridge/items"))
        .respond_with(ResponseTemplate::new(201).set_body_json(item_json("temp-1-0", 1.0)))
        .mount(&server)
        .await;

    let cache = cache_for(&server, "t", Duration::from_secs(5));
    let err = cache
        .add_item("fridge", ItemDraft::new(ItemName::custom("Milk"), Decimal::ONE))
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Decode(_)));
    assert!(cache.items("fridge").is_empty());
}

#[tokio::test]
async fn negative_quantities_are_clamped() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/inventories/fridge/items"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([item_json("1", -3.0), item_json("2", 1.0)])),
        )
        .mount(&server)
        .await;

    let cache = cache_for(&server, "t", Duration::from_secs(5));
    let items = cache.refresh("fridge").await.unwrap();
    let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
    assert_eq!(ids, vec!["2"]);
}

#[tokio::test]
async fn slow_server_times_out_as_network_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/inventories/fridge/items"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(item_json("1", 1.0))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let cache = cache_for(&server, "t", Duration::from_millis(200));
    let err = cache
        .add_item("fridge", ItemDraft::new(ItemName::custom("Milk"), Decimal::ONE))
        .await
        .unwrap_err();
    assert!(matches!(err, CacheError::Network(_)));
    assert!(cache.items("fridge").is_empty());
}
