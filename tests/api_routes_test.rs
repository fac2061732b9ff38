//! HTTP surface: routing, envelopes and error mapping.

mod common;

use axum::http::{Method, StatusCode};
use common::{response_json, FailingStore, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use uuid::Uuid;

fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .map(|s| s.parse().unwrap())
        .unwrap_or_else(|| value.to_string().parse().unwrap())
}

#[tokio::test]
async fn checkout_flow_over_http() {
    let app = TestApp::new();

    let response = app
        .request(
            Method::POST,
            "/api/v1/users",
            Some(json!({ "email": "http@example.com", "name": "Nadia" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = app
        .request(
            Method::POST,
            "/api/v1/restaurants",
            Some(json!({
                "name": "Star Kabab",
                "location": { "street": "Road 11", "city": "Dhaka" }
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let restaurant_id = response_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/restaurants/{}/menu", restaurant_id),
            Some(json!({ "name": "Beef Kabab", "price": "8.50" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let menu_item_id = response_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request(
            Method::POST,
            "/api/v1/carts",
            Some(json!({ "user_email": "http@example.com", "restaurant_id": restaurant_id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["status"], "active");
    let cart_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/carts/{}/items", cart_id),
            Some(json!({ "menu_item_id": menu_item_id, "quantity": 2 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(decimal(&body["data"]["total_amount"]), dec!(17.00));

    let response = app
        .request(
            Method::POST,
            "/api/v1/orders",
            Some(json!({
                "cart_id": cart_id,
                "user_email": "http@example.com",
                "delivery_address": { "street": "House 9", "city": "Dhaka" },
                "payment_method": "card",
                "delivery_fee": "3.00"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "pending");
    assert_eq!(body["data"]["payment_status"], "pending");
    assert_eq!(decimal(&body["data"]["total_amount"]), dec!(20.00));
    let order_number = body["data"]["order_number"].as_str().unwrap().to_string();
    let order_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/number/{}", order_number),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/orders/{}/status", order_id),
            Some(json!({ "status": "on_the_way" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["status"], "on_the_way");

    let response = app
        .request(
            Method::GET,
            "/api/v1/orders?user_email=HTTP@example.com&status=on_the_way",
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn unknown_status_string_is_a_bad_request() {
    let app = TestApp::new();
    let order = app
        .seed_order("s@example.com", &[("Tea", dec!(1), 1)], dec!(0))
        .await;

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/orders/{}/status", order.id),
            Some(json!({ "status": "teleported" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["success"], false);
    assert!(body["message"].as_str().unwrap().contains("teleported"));

    let response = app
        .request(Method::GET, "/api/v1/orders?status=lost", None)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn conflicts_are_reported_as_bad_request() {
    let app = TestApp::new();
    let order = app
        .seed_order("c@example.com", &[("Tea", dec!(1), 1)], dec!(0))
        .await;
    app.state
        .services
        .orders
        .update_status(order.id, food_delivery_api::models::OrderStatus::Delivered)
        .await
        .unwrap();

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/orders/{}/cancel", order.id),
            Some(json!({ "reason": "changed my mind" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_resources_are_404_with_the_error_envelope() {
    let app = TestApp::new();

    for uri in [
        format!("/api/v1/orders/{}", Uuid::new_v4()),
        format!("/api/v1/carts/{}", Uuid::new_v4()),
        format!("/api/v1/deliveries/{}", Uuid::new_v4()),
        "/api/v1/users/nobody@example.com".to_string(),
    ] {
        let response = app.request(Method::GET, &uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND, "{}", uri);
        let body = response_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Not Found");
        assert!(body["request_id"].is_string());
    }
}

#[tokio::test]
async fn malformed_and_invalid_bodies_are_400() {
    let app = TestApp::new();

    let response = app
        .request_raw(
            Method::POST,
            "/api/v1/carts",
            b"{not json".to_vec(),
            &[("content-type", "application/json")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::POST,
            "/api/v1/users",
            Some(json!({ "email": "not-an-email", "name": "X" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(response_json(response).await["success"], false);
}

#[tokio::test]
async fn delete_returns_a_message_envelope() {
    let app = TestApp::new();
    let (_, cart) = app.seed_cart("del@example.com", &[]).await;

    let response = app
        .request(Method::DELETE, &format!("/api/v1/carts/{}", cart.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["success"], true);
    assert!(body.get("data").is_none());
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn request_id_is_echoed_or_generated() {
    let app = TestApp::new();

    let response = app
        .request_raw(
            Method::GET,
            "/api/v1/status",
            Vec::new(),
            &[("x-request-id", "courier-7")],
        )
        .await;
    assert_eq!(response.headers()["x-request-id"], "courier-7");
    let body = response_json(response).await;
    assert_eq!(body["meta"]["request_id"], "courier-7");
    assert_eq!(body["data"]["store_backend"], "memory");
    assert_eq!(body["data"]["payment_provider"], "stripe");

    let response = app.request(Method::GET, "/api/v1/health", None).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn health_reports_an_unreachable_store() {
    let store = FailingStore::new();
    let app = TestApp::with_store(store.clone());
    store.unhealthy.store(true, Ordering::SeqCst);

    let response = app.request(Method::GET, "/api/v1/health", None).await;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = response_json(response).await;
    assert_eq!(body["data"]["checks"]["store"], "unhealthy");
}

#[tokio::test]
async fn delivery_routes_track_location() {
    let app = TestApp::new();
    let order = app
        .seed_order("loc@example.com", &[("Tea", dec!(1), 1)], dec!(0))
        .await;
    let rider = app.seed_rider("Sumi").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/deliveries",
            Some(json!({ "order_id": order.id, "rider_id": rider.id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let delivery_id = response_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/deliveries/{}/location", delivery_id),
            Some(json!({ "latitude": 23.8, "longitude": 90.4 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["location_history"].as_array().unwrap().len(), 1);

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/deliveries/{}/rating", delivery_id),
            Some(json!({ "rating": 9 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/deliveries/order/{}", order.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn directory_routes_filter_update_and_delete() {
    let app = TestApp::new();
    let featured = app.seed_restaurant("Featured Grill").await;
    let plain = app.seed_restaurant("Plain Cafe").await;
    let item = app.seed_menu_item(plain.id, "Cold Coffee", dec!(3.00)).await;
    let rider = app.seed_rider("Kabir").await;

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/restaurants/{}", featured.id),
            Some(json!({ "is_featured": true, "category": "grill" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response_json(response).await["data"]["is_featured"], true);

    let response = app
        .request(Method::GET, "/api/v1/restaurants?featured=true", None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let listed = response_json(response).await["data"].clone();
    assert_eq!(listed.as_array().unwrap().len(), 1);
    assert_eq!(listed[0]["name"], "Featured Grill");

    let response = app
        .request(Method::GET, "/api/v1/restaurants?q=cafe", None)
        .await;
    assert_eq!(response_json(response).await["data"][0]["name"], "Plain Cafe");

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/restaurants/{}/menu/{}", plain.id, item.id),
            Some(json!({ "is_featured": true, "category": "beverage" })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/restaurants/{}/menu?category=beverage&featured=true", plain.id),
            None,
        )
        .await;
    let menu = response_json(response).await["data"].clone();
    assert_eq!(menu.as_array().unwrap().len(), 1);

    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/restaurants/{}/menu/{}", featured.id, item.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/riders/{}/location", rider.id),
            Some(json!({ "latitude": 23.8, "longitude": 90.4 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response_json(response).await["data"]["current_location"]["latitude"],
        23.8
    );

    let response = app
        .request(
            Method::PATCH,
            &format!("/api/v1/riders/{}/location", rider.id),
            Some(json!({ "latitude": 95.0, "longitude": 90.4 })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .request(Method::GET, "/api/v1/riders/available?city=dhaka", None)
        .await;
    assert_eq!(response_json(response).await["data"].as_array().unwrap().len(), 1);

    let response = app
        .request(Method::DELETE, &format!("/api/v1/riders/{}", rider.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .request(Method::DELETE, &format!("/api/v1/restaurants/{}", plain.id), None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let response = app.request(Method::GET, "/api/v1/restaurants", None).await;
    let remaining = response_json(response).await["data"].clone();
    assert_eq!(remaining.as_array().unwrap().len(), 1);
    assert_eq!(remaining[0]["id"], json!(featured.id));
}
