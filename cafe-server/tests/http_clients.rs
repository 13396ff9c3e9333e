//! reqwest clients against in-process axum stubs

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use cafe_server::store::{
    CatalogSource, OrderStore, RestCatalog, RestClient, RestOrderStore, StoreError,
};
use cafe_server::stripe::{
    ConfirmIntent, CreateIntent, GatewayError, PaymentGateway, PaymentIntentStatus, StripeGateway,
};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use shared::checkout::{NewOrder, OrderStatus, OrderType};

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{addr}")
}

// ============================================================================
// Stripe
// ============================================================================

#[derive(Clone, Default)]
struct StripeStub {
    created: Arc<Mutex<Vec<(Option<String>, HashMap<String, String>)>>>,
}

fn intent_json(id: &str, status: &str, amount: i64) -> Value {
    json!({
        "id": id,
        "object": "payment_intent",
        "client_secret": format!("{id}_secret_abc"),
        "status": status,
        "amount": amount,
        "currency": "gbp",
        "metadata": { "attempt_id": "att_1" },
        "livemode": false
    })
}

async fn create_intent(
    State(stub): State<StripeStub>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    let key = headers
        .get("idempotency-key")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let amount = form["amount"].parse().unwrap();
    stub.created.lock().unwrap().push((key, form));
    Json(intent_json("pi_created", "requires_payment_method", amount))
}

async fn confirm_intent(Path(id): Path<String>) -> impl IntoResponse {
    (
        StatusCode::PAYMENT_REQUIRED,
        Json(json!({
            "error": {
                "type": "card_error",
                "code": "card_declined",
                "decline_code": "insufficient_funds",
                "message": format!("Your card has insufficient funds. ({id})")
            }
        })),
    )
}

async fn cancel_intent(
    Path(id): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Json<Value> {
    // Stripe only accepts its own reason values
    let status = match form.get("cancellation_reason").map(String::as_str) {
        Some("abandoned") => "canceled",
        _ => "requires_payment_method",
    };
    Json(intent_json(&id, status, 1250))
}

async fn retrieve_intent(Path(id): Path<String>, headers: HeaderMap) -> impl IntoResponse {
    let authorized = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("Basic "));
    if !authorized {
        return (StatusCode::UNAUTHORIZED, "missing key").into_response();
    }
    match id.as_str() {
        "pi_garbage" => (StatusCode::OK, "<html>oops</html>").into_response(),
        "pi_missing" => (
            StatusCode::NOT_FOUND,
            Json(json!({
                "error": {
                    "type": "invalid_request_error",
                    "code": "resource_missing",
                    "message": "No such payment_intent: 'pi_missing'"
                }
            })),
        )
            .into_response(),
        _ => Json(intent_json(&id, "succeeded", 1250)).into_response(),
    }
}

async fn stripe_gateway() -> (StripeGateway, StripeStub) {
    let stub = StripeStub::default();
    let router = Router::new()
        .route("/v1/payment_intents", post(create_intent))
        .route("/v1/payment_intents/{id}/confirm", post(confirm_intent))
        .route("/v1/payment_intents/{id}/cancel", post(cancel_intent))
        .route("/v1/payment_intents/{id}", get(retrieve_intent))
        .with_state(stub.clone());
    let base = serve(router).await;
    (StripeGateway::new(&base, "sk_test_123").unwrap(), stub)
}

#[tokio::test]
async fn cancel_intent_posts_reason() {
    let (gateway, _) = stripe_gateway().await;

    let intent = gateway.cancel_intent("pi_stale", "abandoned").await.unwrap();

    assert_eq!(intent.id, "pi_stale");
    assert_eq!(intent.status, PaymentIntentStatus::Canceled);
}

#[tokio::test]
async fn create_intent_sends_form_and_idempotency_key() {
    let (gateway, stub) = stripe_gateway().await;

    let intent = gateway
        .create_intent(
            &CreateIntent {
                amount_minor: 1250,
                currency: "gbp".into(),
                metadata: vec![
                    ("attempt_id".into(), "att_1".into()),
                    ("order_type".into(), "collection".into()),
                ],
                receipt_email: Some("ada@example.com".into()),
                description: None,
            },
            "att_1",
        )
        .await
        .unwrap();

    assert_eq!(intent.id, "pi_created");
    assert_eq!(intent.amount, 1250);
    assert_eq!(intent.status, PaymentIntentStatus::RequiresPaymentMethod);
    assert_eq!(intent.client_secret.as_deref(), Some("pi_created_secret_abc"));

    let created = stub.created.lock().unwrap();
    let (key, form) = &created[0];
    assert_eq!(key.as_deref(), Some("att_1"));
    assert_eq!(form["amount"], "1250");
    assert_eq!(form["currency"], "gbp");
    assert_eq!(form["metadata[attempt_id]"], "att_1");
    assert_eq!(form["metadata[order_type]"], "collection");
    assert_eq!(form["receipt_email"], "ada@example.com");
    assert!(!form.contains_key("description"));
}

#[tokio::test]
async fn card_error_maps_to_declined() {
    let (gateway, _) = stripe_gateway().await;

    let err = gateway
        .confirm_intent(
            "pi_1",
            &ConfirmIntent {
                payment_method: "pm_card_chargeDeclined".into(),
                receipt_email: None,
            },
        )
        .await
        .unwrap_err();

    match err {
        GatewayError::CardDeclined {
            decline_code,
            message,
            ..
        } => {
            assert_eq!(decline_code.as_deref(), Some("insufficient_funds"));
            assert!(message.starts_with("Your card has insufficient funds."));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn retrieve_parses_intent_and_errors() {
    let (gateway, _) = stripe_gateway().await;

    let intent = gateway.retrieve_intent("pi_ok").await.unwrap();
    assert_eq!(intent.status, PaymentIntentStatus::Succeeded);
    assert_eq!(intent.metadata["attempt_id"], "att_1");

    assert!(matches!(
        gateway.retrieve_intent("pi_missing").await,
        Err(GatewayError::Api { status: 404, .. })
    ));
    assert!(matches!(
        gateway.retrieve_intent("pi_garbage").await,
        Err(GatewayError::InvalidResponse(_))
    ));
}

// ============================================================================
// Data store
// ============================================================================

fn order_row(id: i64, status: &str, reference: &str) -> Value {
    json!({
        "id": id,
        "customer_email": "ada@example.com",
        "customer_name": "Ada Lovelace",
        "customer_phone": null,
        "order_type": "collection",
        "total_amount": 12.0,
        "status": status,
        "payment_reference": reference,
        "special_instructions": null,
        "delivery_address": null,
        "created_at": "2024-05-01T09:30:00Z",
        "updated_at": "2024-05-01T09:30:00Z"
    })
}

fn authorized(headers: &HeaderMap) -> bool {
    headers.get("apikey").and_then(|v| v.to_str().ok()) == Some("service-key")
        && headers.get("authorization").and_then(|v| v.to_str().ok())
            == Some("Bearer service-key")
}

async fn insert_order(headers: HeaderMap, Json(body): Json<Value>) -> impl IntoResponse {
    if !authorized(&headers) {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    assert_eq!(
        headers.get("prefer").and_then(|v| v.to_str().ok()),
        Some("return=representation")
    );
    let reference = body["payment_reference"].as_str().unwrap_or_default();
    if reference == "pi_dup" {
        return (
            StatusCode::CONFLICT,
            Json(json!({
                "code": "23505",
                "message": "duplicate key value violates unique constraint",
                "details": "Key (payment_reference)=(pi_dup) already exists.",
                "hint": null
            })),
        )
            .into_response();
    }
    assert_eq!(body["status"], "pending");
    Json(json!([order_row(7, "pending", reference)])).into_response()
}

async fn update_order(
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Json<Value> {
    assert_eq!(query["id"], "eq.7");
    let status = body["status"].as_str().unwrap().to_string();
    assert!(body.get("updated_at").is_some());
    Json(json!([order_row(7, &status, "pi_1")]))
}

async fn select_orders(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    match query.get("payment_reference").map(String::as_str) {
        Some("eq.pi_1") => Json(json!([order_row(7, "confirmed", "pi_1")])),
        _ => Json(json!([])),
    }
}

async fn select_items(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    assert_eq!(query["select"], "id");
    assert_eq!(query["order_id"], "eq.7");
    Json(json!([{ "id": 1 }, { "id": 2 }]))
}

async fn select_menu(Query(query): Query<HashMap<String, String>>) -> Json<Value> {
    assert_eq!(query["id"], r#"in.("flat-white","croissant")"#);
    Json(json!([
        { "id": "flat-white", "name": "Flat white", "price": 4.5, "is_available": true },
        { "id": "croissant", "name": "Croissant", "price": 3.0 }
    ]))
}

async fn store_base() -> String {
    let router = Router::new()
        .route(
            "/rest/v1/orders",
            post(insert_order).patch(update_order).get(select_orders),
        )
        .route("/rest/v1/order_items", get(select_items))
        .route("/rest/v1/menu_items", get(select_menu));
    serve(router).await
}

fn new_order(reference: &str) -> NewOrder {
    NewOrder {
        customer_email: "ada@example.com".into(),
        customer_name: "Ada Lovelace".into(),
        customer_phone: None,
        order_type: OrderType::Collection,
        total_amount: Decimal::from_str("12.00").unwrap(),
        status: OrderStatus::Pending,
        payment_reference: reference.into(),
        special_instructions: None,
        delivery_address: None,
    }
}

#[tokio::test]
async fn order_store_round_trip() {
    let base = store_base().await;
    let store = RestOrderStore::new(RestClient::new(&base, "service-key").unwrap());

    let order = store.insert_order(&new_order("pi_1")).await.unwrap();
    assert_eq!(order.id, 7);
    assert_eq!(order.status, OrderStatus::Pending);

    let confirmed = store.set_status(7, OrderStatus::Confirmed).await.unwrap();
    assert_eq!(confirmed.status, OrderStatus::Confirmed);

    assert_eq!(store.count_items(7).await.unwrap(), 2);
    assert_eq!(
        store.find_by_payment_reference("pi_1").await.unwrap().map(|o| o.id),
        Some(7)
    );
    assert!(store.find_by_payment_reference("pi_other").await.unwrap().is_none());
}

#[tokio::test]
async fn duplicate_payment_reference_is_a_conflict() {
    let base = store_base().await;
    let store = RestOrderStore::new(RestClient::new(&base, "service-key").unwrap());

    match store.insert_order(&new_order("pi_dup")).await {
        Err(StoreError::Conflict(message)) => assert!(message.contains("already exists")),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn wrong_key_surfaces_store_status() {
    let base = store_base().await;
    let store = RestOrderStore::new(RestClient::new(&base, "wrong-key").unwrap());

    assert!(matches!(
        store.insert_order(&new_order("pi_1")).await,
        Err(StoreError::Api { status: 401, .. })
    ));
}

#[tokio::test]
async fn catalog_reads_prices_and_defaults_availability() {
    let base = store_base().await;
    let catalog = RestCatalog::new(RestClient::new(&base, "service-key").unwrap());

    let items = catalog
        .menu_items(&["flat-white".to_string(), "croissant".to_string()])
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].price, Decimal::from_str("4.5").unwrap());
    assert!(items[1].is_available);
}
