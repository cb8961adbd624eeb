use reqwest::StatusCode;
use serde_json::{Value, json};

use stockledger_api::config::ApiConfig;

struct TestServer {
    base_url: String,
    handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    async fn spawn() -> Self {
        Self::spawn_with(ApiConfig::in_memory()).await
    }

    async fn spawn_with(config: ApiConfig) -> Self {
        // Build app (same router as prod), but bind to an ephemeral port.
        let app = stockledger_api::app::build_app(&config)
            .await
            .expect("failed to build app");
        let listener = tokio::net::TcpListener::bind(config.bind_addr)
            .await
            .expect("failed to bind ephemeral port");
        let addr = listener.local_addr().unwrap();
        let base_url = format!("http://{}", addr);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { base_url, handle }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Register an active product and warehouse, returning their ids.
    async fn seed(&self, client: &reqwest::Client, minimum_stock: &str) -> (String, String) {
        let res = client
            .post(self.url("/catalog/products"))
            .json(&json!({ "sku": "WIDGET-1", "minimum_stock": minimum_stock }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let product: Value = res.json().await.unwrap();

        let res = client
            .post(self.url("/catalog/warehouses"))
            .json(&json!({ "code": "MAIN" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::CREATED);
        let warehouse: Value = res.json().await.unwrap();

        (
            product["product_id"].as_str().unwrap().to_string(),
            warehouse["warehouse_id"].as_str().unwrap().to_string(),
        )
    }

    async fn movement(&self, client: &reqwest::Client, body: Value) -> reqwest::Response {
        client
            .post(self.url("/inventory/movements"))
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[tokio::test]
async fn health_is_ok() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(srv.url("/health")).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
}

#[tokio::test]
async fn purchase_records_movement_and_costs() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (product_id, warehouse_id) = srv.seed(&client, "0").await;

    let res = srv
        .movement(
            &client,
            json!({
                "product_id": product_id,
                "warehouse_id": warehouse_id,
                "movement_type": "PURCHASE",
                "quantity": "100",
                "unit_cost": "5",
                "reference_type": "PURCHASE_ORDER",
                "reference_id": 42,
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let snapshot: Value = res.json().await.unwrap();

    assert_eq!(snapshot["quantity_on_hand"], "100");
    assert_eq!(snapshot["quantity_available"], "100");
    assert_eq!(snapshot["movement"]["quantity_before"], "0");
    assert_eq!(snapshot["movement"]["quantity_after"], "100");
    assert_eq!(snapshot["movement"]["total_cost"], "500");
    assert!(
        snapshot["movement"]["movement_number"]
            .as_str()
            .unwrap()
            .starts_with("MOV-")
    );

    let res = client
        .get(srv.url(&format!("/inventory/stock/{product_id}/warehouse/{warehouse_id}")))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["available"], "100");

    let res = client
        .get(srv.url("/inventory/movements/reference/PURCHASE_ORDER/42"))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let movements: Vec<Value> = res.json().await.unwrap();
    assert_eq!(movements.len(), 1);
    assert_eq!(movements[0]["movement_type"], "PURCHASE");
}

#[tokio::test]
async fn sale_beyond_unreserved_stock_is_rejected() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (product_id, warehouse_id) = srv.seed(&client, "0").await;

    let res = srv
        .movement(
            &client,
            json!({
                "product_id": product_id,
                "warehouse_id": warehouse_id,
                "movement_type": "IN",
                "quantity": "50",
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let res = client
        .post(srv.url("/inventory/reserve"))
        .json(&json!({ "product_id": product_id, "warehouse_id": warehouse_id, "quantity": "30" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["available"], "20");

    let res = srv
        .movement(
            &client,
            json!({
                "product_id": product_id,
                "warehouse_id": warehouse_id,
                "movement_type": "SALE",
                "quantity": "40",
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "insufficient_stock");
    assert_eq!(err["retryable"], false);
    assert_eq!(err["product_id"], product_id.as_str());
    assert_eq!(err["warehouse_id"], warehouse_id.as_str());

    // Over-release floors the reservation at zero.
    let res = client
        .post(srv.url("/inventory/release-reservation"))
        .json(&json!({ "product_id": product_id, "warehouse_id": warehouse_id, "quantity": "100" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["available"], "50");
}

#[tokio::test]
async fn reserve_more_than_available_is_422() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (product_id, warehouse_id) = srv.seed(&client, "0").await;

    let res = client
        .post(srv.url("/inventory/reserve"))
        .json(&json!({ "product_id": product_id, "warehouse_id": warehouse_id, "quantity": "1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "insufficient_available_stock");
}

#[tokio::test]
async fn unknown_product_is_404() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (_, warehouse_id) = srv.seed(&client, "0").await;
    let missing = uuid::Uuid::now_v7().to_string();

    let res = srv
        .movement(
            &client,
            json!({
                "product_id": missing,
                "warehouse_id": warehouse_id,
                "movement_type": "IN",
                "quantity": "1",
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "product_not_found");
    assert_eq!(err["product_id"], missing.as_str());
}

#[tokio::test]
async fn non_positive_quantity_is_400() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (product_id, warehouse_id) = srv.seed(&client, "0").await;

    let res = srv
        .movement(
            &client,
            json!({
                "product_id": product_id,
                "warehouse_id": warehouse_id,
                "movement_type": "OUT",
                "quantity": "0",
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_path_id_is_400() {
    let srv = TestServer::spawn().await;

    let res = reqwest::get(srv.url("/inventory/stock/not-a-uuid/total")).await.unwrap();
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "invalid_id");
}

#[tokio::test]
async fn unknown_movement_type_is_400_json() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (product_id, warehouse_id) = srv.seed(&client, "0").await;

    let res = srv
        .movement(
            &client,
            json!({
                "product_id": product_id,
                "warehouse_id": warehouse_id,
                "movement_type": "SHRINKAGE",
                "quantity": "1",
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    let err: Value = res.json().await.unwrap();
    assert_eq!(err["error"], "invalid_movement");
    assert_eq!(err["retryable"], false);
    assert!(err["message"].as_str().unwrap().contains("SHRINKAGE"));
}

#[tokio::test]
async fn lower_case_movement_type_is_accepted() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (product_id, warehouse_id) = srv.seed(&client, "0").await;

    let res = srv
        .movement(
            &client,
            json!({
                "product_id": product_id,
                "warehouse_id": warehouse_id,
                "movement_type": "purchase",
                "quantity": "2",
                "unit_cost": "1.50",
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);
    let snapshot: Value = res.json().await.unwrap();
    assert_eq!(snapshot["movement"]["movement_type"], "PURCHASE");
}

#[tokio::test]
async fn malformed_reservation_body_is_400_json() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();

    for path in ["/inventory/reserve", "/inventory/release-reservation"] {
        let res = client
            .post(srv.url(path))
            .json(&json!({ "product_id": "nope", "quantity": "1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
        let err: Value = res.json().await.unwrap();
        assert_eq!(err["error"], "invalid_request");
        assert_eq!(err["retryable"], false);
    }
}

#[tokio::test]
async fn low_and_out_of_stock_listings() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (product_id, warehouse_id) = srv.seed(&client, "10").await;

    for (movement_type, quantity) in [("IN", "12"), ("OUT", "5")] {
        let res = srv
            .movement(
                &client,
                json!({
                    "product_id": product_id,
                    "warehouse_id": warehouse_id,
                    "movement_type": movement_type,
                    "quantity": quantity,
                }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let low: Vec<Value> = reqwest::get(srv.url("/inventory/stock/low-stock"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(low.len(), 1);
    assert_eq!(low[0]["quantity_on_hand"], "7");

    let out: Vec<Value> = reqwest::get(srv.url("/inventory/stock/out-of-stock"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(out.is_empty());

    let totals: Value = reqwest::get(srv.url(&format!("/inventory/stock/{product_id}/total")))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(totals["total_on_hand"], "7");
    assert_eq!(totals["total_available"], "7");
}

#[tokio::test]
async fn movement_history_is_paginated_most_recent_first() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (product_id, warehouse_id) = srv.seed(&client, "0").await;

    for quantity in ["1", "2", "3"] {
        let res = srv
            .movement(
                &client,
                json!({
                    "product_id": product_id,
                    "warehouse_id": warehouse_id,
                    "movement_type": "IN",
                    "quantity": quantity,
                }),
            )
            .await;
        assert_eq!(res.status(), StatusCode::OK);
    }

    let page: Value = client
        .get(srv.url(&format!("/inventory/movements/{product_id}")))
        .query(&[("warehouse_id", warehouse_id.as_str()), ("limit", "2")])
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(page["total"], 3);
    assert_eq!(page["has_more"], true);
    let movements = page["movements"].as_array().unwrap();
    assert_eq!(movements.len(), 2);
    assert_eq!(movements[0]["quantity"], "3");
    assert_eq!(movements[1]["quantity"], "2");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_sales_drain_stock_exactly() {
    let srv = TestServer::spawn().await;
    let client = reqwest::Client::new();
    let (product_id, warehouse_id) = srv.seed(&client, "0").await;

    let res = srv
        .movement(
            &client,
            json!({
                "product_id": product_id,
                "warehouse_id": warehouse_id,
                "movement_type": "IN",
                "quantity": "20",
            }),
        )
        .await;
    assert_eq!(res.status(), StatusCode::OK);

    let mut tasks = Vec::new();
    for _ in 0..10 {
        let client = client.clone();
        let url = srv.url("/inventory/movements");
        let body = json!({
            "product_id": product_id,
            "warehouse_id": warehouse_id,
            "movement_type": "SALE",
            "quantity": "2",
        });
        tasks.push(tokio::spawn(async move {
            client.post(url).json(&body).send().await.unwrap().status()
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), StatusCode::OK);
    }

    let body: Value = client
        .get(srv.url(&format!("/inventory/stock/{product_id}/warehouse/{warehouse_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["available"], "0");

    let page: Value = client
        .get(srv.url(&format!("/inventory/movements/{product_id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(page["total"], 11);

    let mut numbers: Vec<&str> = page["movements"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["movement_number"].as_str().unwrap())
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    assert_eq!(numbers.len(), 11);
}
