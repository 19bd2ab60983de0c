//! Integration tests for `SupplierClient` using wiremock HTTP mocks.

use std::sync::Arc;

use dropsync_cache::ApiCache;
use dropsync_supplier::types::{CreateSupplierOrder, OrderLine};
use dropsync_supplier::{Credentials, SupplierClient, SupplierError};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_client(base_url: &str) -> SupplierClient {
    SupplierClient::with_base_url(
        Credentials {
            email: "ops@example.com".to_owned(),
            api_key: "test-key".to_owned(),
        },
        30,
        base_url,
        Arc::new(ApiCache::new()),
    )
    .expect("client construction should not fail")
    .with_retry_policy(2, 0)
}

fn token_body(token: &str) -> serde_json::Value {
    serde_json::json!({
        "code": 200,
        "result": true,
        "message": null,
        "data": {
            "accessToken": token,
            "accessTokenExpiryDate": "2099-01-01T00:00:00Z"
        }
    })
}

fn product_body(pid: &str) -> serde_json::Value {
    serde_json::json!({
        "code": 200,
        "result": true,
        "message": null,
        "data": {
            "pid": pid,
            "productName": "Leather Wallet",
            "categoryName": "Men > Leather Wallets",
            "sellPrice": "12.50",
            "productImages": ["https://img.example.com/1.jpg"],
            "variants": [
                {
                    "vid": "V1",
                    "variantSku": "WAL-BRN",
                    "variantSellPrice": "12.50",
                    "variantStock": 40
                }
            ]
        }
    })
}

async fn mount_auth(server: &MockServer, token: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/authentication/getAccessToken"))
        .respond_with(ResponseTemplate::new(200).set_body_json(token_body(token)))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn get_product_authenticates_and_parses_detail() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-1", 1).await;

    Mock::given(method("GET"))
        .and(path("/product/query"))
        .and(query_param("pid", "P123"))
        .and(header("CJ-Access-Token", "tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_body("P123")))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let product = client.get_product("P123").await.expect("product");

    assert_eq!(product.pid, "P123");
    assert_eq!(product.product_name, "Leather Wallet");
    assert_eq!(product.variants.len(), 1);
    assert_eq!(product.variants[0].vid, "V1");
    assert_eq!(
        product.category_name.as_deref(),
        Some("Men > Leather Wallets")
    );
}

#[tokio::test]
async fn rejected_token_triggers_exactly_one_refresh() {
    let server = MockServer::start().await;
    // Initial token fetch plus the forced refresh after the 401.
    mount_auth(&server, "tok-1", 2).await;

    Mock::given(method("GET"))
        .and(path("/product/query"))
        .respond_with(ResponseTemplate::new(401))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/product/query"))
        .and(query_param("pid", "P123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_body("P123")))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let product = client.get_product("P123").await.expect("product");
    assert_eq!(product.pid, "P123");
}

#[tokio::test]
async fn persistent_401_surfaces_auth_error() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-1", 2).await;

    Mock::given(method("GET"))
        .and(path("/product/query"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = client.get_product("P123").await;
    assert!(
        matches!(result, Err(SupplierError::Auth(_))),
        "second 401 after refresh must be fatal, got: {result:?}"
    );
}

#[tokio::test]
async fn business_error_is_typed_and_not_retried() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-1", 1).await;

    Mock::given(method("GET"))
        .and(path("/product/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 1602,
            "result": false,
            "message": "product not found",
            "data": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = client.get_product("GONE").await;
    assert!(
        matches!(result, Err(SupplierError::Business { code: 1602, .. })),
        "expected Business(1602), got: {result:?}"
    );
}

#[tokio::test]
async fn rate_limited_call_is_retried_then_succeeds() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-1", 1).await;

    Mock::given(method("GET"))
        .and(path("/product/query"))
        .respond_with(ResponseTemplate::new(429))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/product/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_body("P123")))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let product = client.get_product("P123").await.expect("product");
    assert_eq!(product.pid, "P123");
}

#[tokio::test]
async fn server_errors_exhaust_retry_budget() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-1", 1).await;

    Mock::given(method("GET"))
        .and(path("/product/query"))
        .respond_with(ResponseTemplate::new(503))
        // max_retries=2 → 3 total attempts
        .expect(3)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let result = client.get_product("P123").await;
    assert!(matches!(
        result,
        Err(SupplierError::ServerError { status: 503 })
    ));
}

#[tokio::test]
async fn product_detail_is_served_from_cache_on_second_call() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-1", 1).await;

    Mock::given(method("GET"))
        .and(path("/product/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(product_body("P123")))
        .expect(1)
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let first = client.get_product("P123").await.expect("first");
    let second = client.get_product("P123").await.expect("second");
    assert_eq!(first.pid, second.pid);
}

#[tokio::test]
async fn list_products_parses_page() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-1", 1).await;

    Mock::given(method("GET"))
        .and(path("/product/list"))
        .and(query_param("pageNum", "1"))
        .and(query_param("pageSize", "50"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 200,
            "result": true,
            "message": null,
            "data": {
                "pageNum": 1,
                "pageSize": 50,
                "total": 2,
                "list": [
                    {"pid": "P1", "productName": "Wallet", "sellPrice": "12.50",
                     "categoryName": "Men > Wallets", "productImage": null},
                    {"pid": "P2", "productName": "Belt", "sellPrice": "8.00",
                     "categoryName": "Men > Belts", "productImage": null}
                ]
            }
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let page = client.list_products(1, 50, None).await.expect("page");
    assert_eq!(page.total, 2);
    assert_eq!(page.list.len(), 2);
    assert_eq!(page.list[0].pid, "P1");
}

#[tokio::test]
async fn query_stock_parses_region_entries() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-1", 1).await;

    Mock::given(method("GET"))
        .and(path("/product/stock/queryByVid"))
        .and(query_param("vid", "V1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 200,
            "result": true,
            "message": null,
            "data": [
                {"countryCode": "US", "stock": 120},
                {"countryCode": "DE", "stock": 30}
            ]
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let stock = client.query_stock("V1").await.expect("stock");
    assert_eq!(stock.len(), 2);
    assert_eq!(stock[0].country_code, "US");
    assert_eq!(stock[1].stock, 30);
}

#[tokio::test]
async fn create_order_posts_lines_and_parses_order_id() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-1", 1).await;

    Mock::given(method("POST"))
        .and(path("/shopping/order/createOrder"))
        .and(body_partial_json(serde_json::json!({
            "orderNumber": "ord-pub-1",
            "countryCode": "DE",
            "products": [{"vid": "V1", "quantity": 2}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "code": 200,
            "result": true,
            "message": null,
            "data": {"orderId": "SUP-900"}
        })))
        .mount(&server)
        .await;

    let client = test_client(&server.uri());
    let created = client
        .create_order(&CreateSupplierOrder {
            order_number: "ord-pub-1".to_owned(),
            consignee: "Jane Doe".to_owned(),
            address: "Musterstr. 1".to_owned(),
            city: "Berlin".to_owned(),
            zip: "10115".to_owned(),
            country_code: "DE".to_owned(),
            products: vec![OrderLine {
                vid: Some("V1".to_owned()),
                pid: None,
                quantity: 2,
            }],
        })
        .await
        .expect("created order");
    assert_eq!(created.order_id, "SUP-900");
}

#[tokio::test]
async fn concurrent_calls_share_a_single_token_refresh() {
    let server = MockServer::start().await;
    mount_auth(&server, "tok-1", 1).await;

    for pid in ["P1", "P2", "P3", "P4"] {
        Mock::given(method("GET"))
            .and(path("/product/query"))
            .and(query_param("pid", pid))
            .respond_with(ResponseTemplate::new(200).set_body_json(product_body(pid)))
            .mount(&server)
            .await;
    }

    let client = Arc::new(test_client(&server.uri()));
    let mut handles = Vec::new();
    for pid in ["P1", "P2", "P3", "P4"] {
        let client = Arc::clone(&client);
        handles.push(tokio::spawn(
            async move { client.get_product(pid).await },
        ));
    }
    for handle in handles {
        handle.await.expect("task").expect("product");
    }
}
