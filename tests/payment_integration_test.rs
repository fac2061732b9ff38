//! Payment reconciliation against a scripted processor.

mod common;

use assert_matches::assert_matches;
use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::{order_metadata, response_json, test_config, TestApp, WEBHOOK_SECRET};
use food_delivery_api::{
    errors::ServiceError,
    models::{Order, PaymentStatus},
    payments::{
        webhook::{signature_header, SIGNATURE_HEADER},
        PaymentIntent, PaymentIntentStatus, RefundReason,
    },
    services::payment_service::{CheckoutSessionInput, CreatePaymentIntentInput, RefundInput},
};
use rstest::rstest;
use rust_decimal_macros::dec;
use serde_json::{json, Value};

const EMAIL: &str = "payer@example.com";

fn intent_for(order_id: uuid::Uuid) -> CreatePaymentIntentInput {
    CreatePaymentIntentInput {
        order_id,
        amount: None,
        currency: None,
        description: None,
    }
}

fn refund_for(order_id: uuid::Uuid) -> RefundInput {
    RefundInput {
        order_id,
        amount: None,
        reason: None,
    }
}

async fn paid_order(app: &TestApp) -> (Order, String) {
    let order = app
        .seed_order(EMAIL, &[("Kacchi", dec!(10.00), 2)], dec!(3.00))
        .await;
    let created = app
        .state
        .services
        .payments
        .create_payment_intent(intent_for(order.id))
        .await
        .unwrap();
    app.processor
        .set_status(&created.payment_intent_id, PaymentIntentStatus::Succeeded);
    app.state
        .services
        .payments
        .confirm_payment(&created.payment_intent_id)
        .await
        .unwrap();
    (order, created.payment_intent_id)
}

async fn post_webhook(app: &TestApp, event: &Value, secret: &str) -> axum::response::Response {
    let payload = serde_json::to_vec(event).unwrap();
    let header = signature_header(secret, Utc::now().timestamp(), &payload).unwrap();
    app.request_raw(
        Method::POST,
        "/api/v1/payments/webhook",
        payload,
        &[
            (SIGNATURE_HEADER, header.as_str()),
            ("content-type", "application/json"),
        ],
    )
    .await
}

fn intent_event(kind: &str, intent_id: &str, order: &Order) -> Value {
    json!({
        "id": format!("evt_{}", kind.replace('.', "_")),
        "type": kind,
        "data": {
            "object": {
                "id": intent_id,
                "amount": 2300,
                "currency": "usd",
                "status": "succeeded",
                "metadata": order_metadata(order),
            }
        }
    })
}

#[tokio::test]
async fn refund_without_a_payment_is_rejected_and_changes_nothing() {
    let app = TestApp::new();
    let order = app.seed_order(EMAIL, &[("Tea", dec!(2), 1)], dec!(0)).await;

    let result = app
        .state
        .services
        .payments
        .refund_payment(refund_for(order.id))
        .await;
    assert_matches!(result, Err(ServiceError::BadRequest(msg)) if msg == "No payment found for this order");

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
    assert!(app.processor.refunds.lock().unwrap().is_empty());
}

#[tokio::test]
async fn intent_defaults_to_the_order_total() {
    let app = TestApp::new();
    let order = app
        .seed_order(EMAIL, &[("Kacchi", dec!(10.00), 2)], dec!(3.00))
        .await;

    let created = app
        .state
        .services
        .payments
        .create_payment_intent(intent_for(order.id))
        .await
        .unwrap();

    assert_eq!(created.amount, dec!(23.00));
    assert_eq!(created.currency, "usd");
    assert!(created.client_secret.is_some());
    assert_eq!(
        created.order.payment_intent_id.as_deref(),
        Some(created.payment_intent_id.as_str())
    );
    assert_eq!(created.order.payment_method, "stripe");
    // creating an intent does not move the payment status
    assert_eq!(created.order.payment_status, PaymentStatus::Pending);

    let sent = app.processor.created.lock().unwrap();
    assert_eq!(sent[0].amount_minor, 2300);
    assert_eq!(sent[0].metadata["order_id"], order.id.to_string());
    assert_eq!(sent[0].metadata["order_number"], order.order_number);
    assert_eq!(sent[0].metadata["user_email"], EMAIL);
}

#[tokio::test]
async fn intent_amount_must_be_positive() {
    let app = TestApp::new();
    let order = app.seed_order(EMAIL, &[("Tea", dec!(2), 1)], dec!(0)).await;

    let input = CreatePaymentIntentInput {
        amount: Some(dec!(0)),
        ..intent_for(order.id)
    };
    assert_matches!(
        app.state.services.payments.create_payment_intent(input).await,
        Err(ServiceError::BadRequest(_))
    );
}

#[tokio::test]
async fn confirm_applies_the_intent_outcome() {
    let app = TestApp::new();
    let payments = &app.state.services.payments;
    let order = app.seed_order(EMAIL, &[("Tea", dec!(2), 1)], dec!(0)).await;
    let created = payments
        .create_payment_intent(intent_for(order.id))
        .await
        .unwrap();

    // still open at the processor
    let pending = payments
        .confirm_payment(&created.payment_intent_id)
        .await
        .unwrap();
    assert_eq!(pending.intent_status, PaymentIntentStatus::RequiresPaymentMethod);
    assert_eq!(pending.order.payment_status, PaymentStatus::Pending);

    app.processor
        .set_status(&created.payment_intent_id, PaymentIntentStatus::Succeeded);
    let confirmed = payments
        .confirm_payment(&created.payment_intent_id)
        .await
        .unwrap();
    assert_eq!(confirmed.order.payment_status, PaymentStatus::Paid);

    assert_matches!(
        payments.create_payment_intent(intent_for(order.id)).await,
        Err(ServiceError::Conflict(_))
    );
}

#[tokio::test]
async fn confirm_requires_order_metadata() {
    let app = TestApp::new();
    app.processor.insert_intent(PaymentIntent {
        id: "pi_foreign".into(),
        amount: 500,
        currency: "usd".into(),
        status: PaymentIntentStatus::Succeeded,
        client_secret: None,
        description: None,
        metadata: Default::default(),
    });

    assert_matches!(
        app.state.services.payments.confirm_payment("pi_foreign").await,
        Err(ServiceError::BadRequest(msg)) if msg.contains("Order ID")
    );
}

#[tokio::test]
async fn refund_twice_conflicts() {
    let app = TestApp::new();
    let payments = &app.state.services.payments;
    let (order, intent_id) = paid_order(&app).await;

    let refund = payments
        .refund_payment(RefundInput {
            amount: Some(dec!(5.00)),
            reason: Some(RefundReason::RequestedByCustomer),
            ..refund_for(order.id)
        })
        .await
        .unwrap();
    assert_eq!(refund.amount, dec!(5.00));
    assert_eq!(refund.order.payment_status, PaymentStatus::Refunded);
    {
        let sent = app.processor.refunds.lock().unwrap();
        assert_eq!(sent[0].payment_intent_id, intent_id);
        assert_eq!(sent[0].amount_minor, Some(500));
    }

    assert_matches!(
        payments.refund_payment(refund_for(order.id)).await,
        Err(ServiceError::Conflict(_))
    );
}

#[tokio::test]
async fn refund_requires_a_paid_order() {
    let app = TestApp::new();
    let payments = &app.state.services.payments;
    let order = app.seed_order(EMAIL, &[("Tea", dec!(2), 1)], dec!(0)).await;
    payments
        .create_payment_intent(intent_for(order.id))
        .await
        .unwrap();

    assert_matches!(
        payments.refund_payment(refund_for(order.id)).await,
        Err(ServiceError::Conflict(msg)) if msg.contains("pending")
    );
    assert!(app.processor.refunds.lock().unwrap().is_empty());

    payments.cancel_payment(order.id).await.unwrap();
    assert_matches!(
        payments.refund_payment(refund_for(order.id)).await,
        Err(ServiceError::Conflict(msg)) if msg.contains("failed")
    );

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert!(app.processor.refunds.lock().unwrap().is_empty());
}

#[tokio::test]
async fn processor_rejection_surfaces_as_bad_request() {
    let app = TestApp::new();
    let (order, _) = paid_order(&app).await;
    app.processor.reject_next("Charge has already been refunded");

    let response = app
        .request(
            Method::POST,
            "/api/v1/payments/refund",
            Some(json!({ "order_id": order.id })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Charge has already been refunded");

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn cancel_payment_marks_the_order_failed() {
    let app = TestApp::new();
    let payments = &app.state.services.payments;
    let order = app.seed_order(EMAIL, &[("Tea", dec!(2), 1)], dec!(0)).await;

    assert_matches!(
        payments.cancel_payment(order.id).await,
        Err(ServiceError::BadRequest(_))
    );

    let created = payments
        .create_payment_intent(intent_for(order.id))
        .await
        .unwrap();
    let order = payments.cancel_payment(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
    assert_eq!(
        app.processor.cancelled.lock().unwrap().clone(),
        vec![created.payment_intent_id.clone()]
    );

    let (paid, _) = paid_order(&app).await;
    assert_matches!(
        payments.cancel_payment(paid.id).await,
        Err(ServiceError::Conflict(_))
    );
}

#[tokio::test]
async fn payment_details_read_through_to_the_processor() {
    let app = TestApp::new();
    let payments = &app.state.services.payments;
    let order = app.seed_order(EMAIL, &[("Tea", dec!(2), 1)], dec!(0)).await;

    assert_matches!(
        payments.get_payment_details(order.id).await,
        Err(ServiceError::NotFound(_))
    );

    let (order, intent_id) = paid_order(&app).await;
    let details = payments.get_payment_details(order.id).await.unwrap();
    assert_eq!(details.intent.id, intent_id);
    assert_eq!(details.amount, dec!(23.00));
    assert_eq!(details.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn checkout_session_lists_items_and_delivery_fee() {
    let app = TestApp::new();
    let order = app
        .seed_order(
            EMAIL,
            &[("Kacchi", dec!(10.00), 2), ("Borhani", dec!(1.50), 1)],
            dec!(2.00),
        )
        .await;

    let session = app
        .state
        .services
        .payments
        .create_checkout_session(CheckoutSessionInput {
            order_id: order.id,
            success_url: "https://shop.example.com/ok".into(),
            cancel_url: "https://shop.example.com/cancel".into(),
            currency: Some("BDT".into()),
        })
        .await
        .unwrap();
    assert!(session.url.is_some());
    assert_eq!(
        session.order.checkout_session_id.as_deref(),
        Some(session.session_id.as_str())
    );

    let sent = app.processor.sessions.lock().unwrap();
    let request = &sent[0];
    assert_eq!(request.currency, "bdt");
    assert_eq!(request.client_reference_id, Some(order.id.to_string()));
    let lines: Vec<(&str, i64, i32)> = request
        .line_items
        .iter()
        .map(|l| (l.name.as_str(), l.unit_amount_minor, l.quantity))
        .collect();
    assert_eq!(
        lines,
        vec![
            ("Kacchi", 1000, 2),
            ("Borhani", 150, 1),
            ("Delivery Fee", 200, 1),
        ]
    );
}

#[tokio::test]
async fn signed_success_webhook_marks_the_order_paid() {
    let app = TestApp::new();
    let order = app.seed_order(EMAIL, &[("Tea", dec!(2), 1)], dec!(0)).await;

    let event = intent_event("payment_intent.succeeded", "pi_hook", &order);
    let response = post_webhook(&app, &event, WEBHOOK_SECRET).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["data"]["handled"], true);
    assert_eq!(body["data"]["payment_status"], "paid");

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);

    // redelivery is harmless
    let again = post_webhook(&app, &event, WEBHOOK_SECRET).await;
    assert_eq!(again.status(), StatusCode::OK);
}

#[rstest]
#[case("payment_intent.payment_failed")]
#[case("payment_intent.canceled")]
#[tokio::test]
async fn failure_events_mark_a_pending_order_failed(#[case] kind: &str) {
    let app = TestApp::new();
    let order = app.seed_order(EMAIL, &[("Tea", dec!(2), 1)], dec!(0)).await;

    let event = intent_event(kind, "pi_declined", &order);
    let response = post_webhook(&app, &event, WEBHOOK_SECRET).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = response_json(response).await;
    assert_eq!(body["data"]["handled"], true);
    assert_eq!(body["data"]["payment_status"], "failed");

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Failed);
}

#[tokio::test]
async fn webhook_without_a_configured_secret_is_rejected() {
    let mut config = test_config();
    config.payment_webhook_secret = None;
    let app = TestApp::with_config(config);
    let order = app.seed_order(EMAIL, &[("Tea", dec!(2), 1)], dec!(0)).await;

    let event = intent_event("payment_intent.succeeded", "pi_unverified", &order);
    let response = post_webhook(&app, &event, WEBHOOK_SECRET).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = response_json(response).await;
    assert_eq!(body["message"], "Webhook secret not configured");

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn malformed_intent_object_is_a_server_error() {
    let app = TestApp::new();
    let order = app.seed_order(EMAIL, &[("Tea", dec!(2), 1)], dec!(0)).await;

    let event = json!({
        "id": "evt_truncated",
        "type": "payment_intent.succeeded",
        "data": { "object": { "id": "pi_truncated", "metadata": order_metadata(&order) } }
    });
    let response = post_webhook(&app, &event, WEBHOOK_SECRET).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}

#[tokio::test]
async fn late_failure_does_not_undo_a_payment() {
    let app = TestApp::new();
    let (order, intent_id) = paid_order(&app).await;

    let event = intent_event("payment_intent.payment_failed", &intent_id, &order);
    let response = post_webhook(&app, &event, WEBHOOK_SECRET).await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Paid);
}

#[tokio::test]
async fn charge_refunded_is_resolved_through_the_intent() {
    let app = TestApp::new();
    let (order, intent_id) = paid_order(&app).await;

    let event = json!({
        "id": "evt_refund",
        "type": "charge.refunded",
        "data": { "object": { "id": "ch_1", "payment_intent": intent_id } }
    });
    let response = post_webhook(&app, &event, WEBHOOK_SECRET).await;
    assert_eq!(response.status(), StatusCode::OK);

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Refunded);
}

#[tokio::test]
async fn unknown_event_types_are_acknowledged() {
    let app = TestApp::new();
    let event = json!({
        "id": "evt_other",
        "type": "customer.created",
        "data": { "object": { "id": "cus_1" } }
    });

    let response = post_webhook(&app, &event, WEBHOOK_SECRET).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = response_json(response).await;
    assert_eq!(body["data"]["handled"], false);
    assert_eq!(body["data"]["event_type"], "customer.created");
}

#[tokio::test]
async fn bad_or_missing_signature_is_rejected() {
    let app = TestApp::new();
    let order = app.seed_order(EMAIL, &[("Tea", dec!(2), 1)], dec!(0)).await;
    let event = intent_event("payment_intent.succeeded", "pi_x", &order);

    let forged = post_webhook(&app, &event, "whsec_wrong").await;
    assert_eq!(forged.status(), StatusCode::BAD_REQUEST);

    let unsigned = app
        .request_raw(
            Method::POST,
            "/api/v1/payments/webhook",
            serde_json::to_vec(&event).unwrap(),
            &[("content-type", "application/json")],
        )
        .await;
    assert_eq!(unsigned.status(), StatusCode::BAD_REQUEST);

    let order = app.state.services.orders.get_order(order.id).await.unwrap();
    assert_eq!(order.payment_status, PaymentStatus::Pending);
}
