//! HTTP contract tests for `BookingApiClient` against a mock backend

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;
use tourbook_api::{
    ApiError, BookingApi, BookingApiClient, CreateOrderRequest, SaveCartRequest,
    VerifyPaymentRequest,
};
use tourbook_core::cart::CartSnapshot;
use tourbook_core::catalog::{AvailabilityStatus, PackageId, ProductId};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup() -> (MockServer, BookingApiClient) {
    let server = MockServer::start().await;
    let client = BookingApiClient::new(&format!("{}/api", server.uri())).unwrap();
    (server, client)
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 4).unwrap()
}

#[tokio::test]
async fn product_availability_unwraps_envelope() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/availability/product/prod-1"))
        .and(query_param("startDate", "2025-03-04"))
        .and(query_param("endDate", "2025-03-04"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "availability": [
                { "status": "AVAILABLE", "package": { "id": "pkg-1", "name": "Sunrise", "maxPeople": 8, "basePrice": 45.0, "currency": "USD" } },
                { "status": "SOLD_OUT", "package": { "id": "pkg-2", "name": "Sunset", "maxPeople": 4, "basePrice": 60.0, "currency": "USD" } }
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let records = client
        .product_availability(&ProductId::new("prod-1"), date(), date())
        .await
        .unwrap();

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].status, AvailabilityStatus::Available);
    assert_eq!(records[0].package.id, PackageId::new("pkg-1"));
    assert_eq!(records[1].status, AvailabilityStatus::SoldOut);
}

#[tokio::test]
async fn package_slots_reads_wire_names() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/availability/package/pkg-1/slots"))
        .and(query_param("date", "2025-03-04"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "slots": [
                { "id": "slot-1", "days": ["Tuesday"], "Time": ["09:00", "14:00"], "cutoffTime": 12, "available": 10, "booked": 3 }
            ]
        })))
        .mount(&server)
        .await;

    let slots = client
        .package_slots(&PackageId::new("pkg-1"), date())
        .await
        .unwrap();

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].times, vec!["09:00", "14:00"]);
    assert_eq!(slots[0].effective_cutoff_hours(), 12);
    assert_eq!(slots[0].available_seats(), 7);
}

#[tokio::test]
async fn non_success_maps_to_status_error() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/availability/package/pkg-1/slots"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let error = client
        .package_slots(&PackageId::new("pkg-1"), date())
        .await
        .unwrap_err();

    assert_eq!(
        error,
        ApiError::Status {
            status: 503,
            message: "maintenance".to_string()
        }
    );
}

#[tokio::test]
async fn malformed_body_is_parse_error() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/availability/product/prod-1"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
        .mount(&server)
        .await;

    let result = client
        .product_availability(&ProductId::new("prod-1"), date(), date())
        .await;

    assert!(matches!(result, Err(ApiError::ResponseParseFailed(_))));
}

#[tokio::test]
async fn unreachable_backend_is_request_error() {
    let client = BookingApiClient::new("http://127.0.0.1:9/api").unwrap();
    let result = client
        .product_availability(&ProductId::new("prod-1"), date(), date())
        .await;
    assert!(matches!(result, Err(ApiError::RequestFailed(_))));
}

#[tokio::test]
async fn cart_status_handles_record_null_and_missing() {
    let (server, client) = setup().await;
    Mock::given(method("GET"))
        .and(path("/api/abandoned-carts/status"))
        .and(query_param("email", "ada@example.com"))
        .and(query_param("productId", "prod-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "email": "ada@example.com",
            "productId": "prod-1",
            "packageId": "pkg-1",
            "customerData": { "name": "Ada", "adults": 2 },
            "status": "open",
            "updatedAt": "2025-03-01T10:00:00Z"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/abandoned-carts/status"))
        .and(query_param("email", "nobody@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_string("null"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/abandoned-carts/status"))
        .and(query_param("email", "gone@example.com"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let product = ProductId::new("prod-1");
    let cart = client
        .abandoned_cart_status("ada@example.com", &product)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cart.customer_name, "Ada");
    assert_eq!(cart.adults, 2);
    assert!(cart.is_open());
    assert_eq!(
        cart.updated_at,
        Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
    );

    assert!(client
        .abandoned_cart_status("nobody@example.com", &product)
        .await
        .unwrap()
        .is_none());
    assert!(client
        .abandoned_cart_status("gone@example.com", &product)
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn save_cart_posts_customer_data() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/abandoned-carts"))
        .and(body_partial_json(json!({
            "email": "ada@example.com",
            "productId": "prod-1",
            "customerData": { "name": "Ada", "phone": "555" }
        })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let mut cart = CartSnapshot::new(ProductId::new("prod-1"), "ada@example.com", Utc::now());
    cart.customer_name = "Ada".to_string();
    cart.customer_phone = "555".to_string();

    client
        .save_abandoned_cart(&SaveCartRequest::from(&cart))
        .await
        .unwrap();
}

#[tokio::test]
async fn payment_lifecycle() {
    let (server, client) = setup().await;
    Mock::given(method("POST"))
        .and(path("/api/payments/create-order"))
        .and(body_partial_json(json!({ "bookingId": "bk_1", "currency": "USD" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "orderId": "order_1", "amount": 90.0, "currency": "USD", "keyId": "key_live"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/payments/verify"))
        .and(body_partial_json(json!({ "signature": "good" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true, "bookingCode": "TB-1234"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/payments/verify"))
        .and(body_partial_json(json!({ "signature": "bad" })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "success": false, "message": "Signature mismatch"
        })))
        .mount(&server)
        .await;

    let order = client
        .create_payment_order(&CreateOrderRequest {
            booking_id: "bk_1".to_string(),
            amount: 90.0,
            currency: "USD".to_string(),
        })
        .await
        .unwrap();
    assert_eq!(order.order_id, "order_1");
    assert_eq!(order.key_id.as_deref(), Some("key_live"));

    let verify = |signature: &str| VerifyPaymentRequest {
        order_id: "order_1".to_string(),
        payment_id: "pay_1".to_string(),
        signature: signature.to_string(),
        booking_id: "bk_1".to_string(),
    };

    let ok = client.verify_payment(&verify("good")).await.unwrap();
    assert!(ok.success);
    assert_eq!(ok.booking_code.as_deref(), Some("TB-1234"));

    let rejected = client.verify_payment(&verify("bad")).await.unwrap();
    assert!(!rejected.success);
    assert_eq!(rejected.message.as_deref(), Some("Signature mismatch"));
}
