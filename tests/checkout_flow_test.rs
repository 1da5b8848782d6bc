//! Integration tests for the checkout flow.
//!
//! Covers:
//! - step ordering and go_back rules
//! - per-step validation codes
//! - payment dispatch per method (WhatsApp, transfer, hosted redirect,
//!   embedded widget, card PaymentIntent)
//! - widget fallback exactly-once semantics under racing triggers
//! - loading/error discipline, retries, and concurrent-submit rejection

mod common;

use assert_matches::assert_matches;
use common::{engine, engine_with_order_store, store_config, FakeOrderStore, SANDBOX_INIT_POINT};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::Ordering;
use std::time::Duration;
use storefront_checkout::errors::ServiceError;
use storefront_checkout::models::cart::{LineExtras, Product};
use storefront_checkout::models::{
    BankField, CheckoutErrorCode, CheckoutStep, CustomerInfo, DeliveryAddress, DeliveryInfo,
    DeliveryMethod, PaymentMethod, PaymentStatus,
};
use storefront_checkout::services::checkout::WidgetSubmission;
use uuid::Uuid;

fn product(id: &str, price: Decimal) -> Product {
    Product {
        id: id.to_string(),
        name: format!("Product {}", id),
        price,
        image: None,
    }
}

fn customer() -> CustomerInfo {
    CustomerInfo {
        name: "Ana".to_string(),
        phone: "+51999888777".to_string(),
        email: None,
    }
}

fn pickup() -> DeliveryInfo {
    DeliveryInfo {
        method: DeliveryMethod::Pickup,
        address: None,
        observations: None,
    }
}

fn home_delivery() -> DeliveryInfo {
    DeliveryInfo {
        method: DeliveryMethod::Delivery,
        address: Some(DeliveryAddress {
            street: "Av. X 123".to_string(),
            city: "Lima".to_string(),
            state: None,
            reference: None,
        }),
        observations: None,
    }
}

/// Cart with one plain line, checkout started, returns the session id.
async fn start_session(engine: &common::TestEngine, price: Decimal) -> Uuid {
    let cart = engine.carts.create_cart().await;
    engine
        .carts
        .add_item(cart.id, product("p1", price), LineExtras::default())
        .await
        .unwrap();
    engine.checkout.start_checkout(cart.id).await.unwrap().id
}

/// Session advanced all the way to the payment step (pickup).
async fn session_at_payment(engine: &common::TestEngine, price: Decimal) -> Uuid {
    let session_id = start_session(engine, price).await;
    engine
        .checkout
        .set_customer(session_id, customer())
        .await
        .unwrap();
    engine
        .checkout
        .set_delivery(session_id, pickup())
        .await
        .unwrap();
    session_id
}

// ==================== Step ordering ====================

#[tokio::test]
async fn steps_advance_monotonically_forward() {
    let engine = engine(store_config());
    let session_id = start_session(&engine, dec!(10.00)).await;

    let view = engine.checkout.get_session(session_id).unwrap();
    assert_eq!(view.step, CheckoutStep::Customer);

    let view = engine
        .checkout
        .set_customer(session_id, customer())
        .await
        .unwrap();
    assert_eq!(view.step, CheckoutStep::Delivery);

    let view = engine
        .checkout
        .set_delivery(session_id, pickup())
        .await
        .unwrap();
    assert_eq!(view.step, CheckoutStep::Payment);
}

#[tokio::test]
async fn empty_cart_cannot_start_checkout() {
    let engine = engine(store_config());
    let cart = engine.carts.create_cart().await;

    let err = engine.checkout.start_checkout(cart.id).await.unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn go_back_retreats_exactly_one_step() {
    let engine = engine(store_config());
    let session_id = session_at_payment(&engine, dec!(10.00)).await;

    let view = engine.checkout.go_back(session_id).unwrap();
    assert_eq!(view.step, CheckoutStep::Delivery);
    let view = engine.checkout.go_back(session_id).unwrap();
    assert_eq!(view.step, CheckoutStep::Customer);

    // Nothing before the customer step
    let err = engine.checkout.go_back(session_id).unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn confirmation_rejects_go_back() {
    let engine = engine(store_config());
    let session_id = session_at_payment(&engine, dec!(10.00)).await;

    let view = engine
        .checkout
        .submit_payment(session_id, PaymentMethod::Transfer)
        .await
        .unwrap();
    assert_eq!(view.step, CheckoutStep::Confirmation);

    let err = engine.checkout.go_back(session_id).unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

#[tokio::test]
async fn payment_cannot_be_submitted_before_the_payment_step() {
    let engine = engine(store_config());
    let session_id = start_session(&engine, dec!(10.00)).await;

    let err = engine
        .checkout
        .submit_payment(session_id, PaymentMethod::Transfer)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));
}

// ==================== Validation ====================

#[tokio::test]
async fn blank_name_surfaces_name_required() {
    let engine = engine(store_config());
    let session_id = start_session(&engine, dec!(10.00)).await;

    let err = engine
        .checkout
        .set_customer(
            session_id,
            CustomerInfo {
                name: "  ".to_string(),
                phone: "999".to_string(),
                email: None,
            },
        )
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::Validation(CheckoutErrorCode::NameRequired)
    );

    // The code is also on the session surface, and the step did not move
    let view = engine.checkout.get_session(session_id).unwrap();
    assert_eq!(view.error, Some(CheckoutErrorCode::NameRequired));
    assert_eq!(view.step, CheckoutStep::Customer);
}

#[tokio::test]
async fn delivery_requires_street_and_city_only_for_home_delivery() {
    let engine = engine(store_config());
    let session_id = start_session(&engine, dec!(10.00)).await;
    engine
        .checkout
        .set_customer(session_id, customer())
        .await
        .unwrap();

    let mut missing_city = home_delivery();
    missing_city.address.as_mut().unwrap().city = String::new();
    let err = engine
        .checkout
        .set_delivery(session_id, missing_city)
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::Validation(CheckoutErrorCode::CityRequired)
    );

    // Pickup never requires address fields
    let view = engine
        .checkout
        .set_delivery(session_id, pickup())
        .await
        .unwrap();
    assert_eq!(view.step, CheckoutStep::Payment);
    assert_eq!(view.error, None);
}

#[tokio::test]
async fn state_is_demanded_only_for_configured_countries() {
    let mut store = store_config();
    store.country = Some("MX".to_string());
    let engine = engine(store);
    let session_id = start_session(&engine, dec!(10.00)).await;
    engine
        .checkout
        .set_customer(session_id, customer())
        .await
        .unwrap();

    let err = engine
        .checkout
        .set_delivery(session_id, home_delivery())
        .await
        .unwrap_err();
    assert_matches!(
        err,
        ServiceError::Validation(CheckoutErrorCode::StateRequired)
    );

    let mut with_state = home_delivery();
    with_state.address.as_mut().unwrap().state = Some("CDMX".to_string());
    let view = engine
        .checkout
        .set_delivery(session_id, with_state)
        .await
        .unwrap();
    assert_eq!(view.step, CheckoutStep::Payment);
}

// ==================== WhatsApp (scenario B) ====================

#[tokio::test]
async fn whatsapp_order_links_to_wa_me_with_the_order_number() {
    let engine = engine(store_config());
    let session_id = start_session(&engine, dec!(25.00)).await;
    engine
        .checkout
        .set_customer(session_id, customer())
        .await
        .unwrap();
    engine
        .checkout
        .set_delivery(session_id, home_delivery())
        .await
        .unwrap();

    let view = engine
        .checkout
        .submit_payment(session_id, PaymentMethod::Whatsapp)
        .await
        .unwrap();

    assert_eq!(view.step, CheckoutStep::Confirmation);
    assert!(!view.loading);

    let order = view.order.expect("order created");
    assert_eq!(order.payment_method, PaymentMethod::Whatsapp);
    assert_eq!(order.payment_status, PaymentStatus::Pending);

    let url = view.whatsapp_url.expect("whatsapp link surfaced");
    let parsed = url::Url::parse(&url).expect("valid deep link");
    assert_eq!(parsed.host_str(), Some("wa.me"));
    assert!(url.contains(&order.order_number));

    // The cart was cleared after the completed order
    let cart_view = engine.carts.get_cart(view.cart_id).unwrap();
    assert!(cart_view.is_empty());
}

// ==================== Transfer (scenario C) ====================

#[tokio::test]
async fn pickup_plus_transfer_shows_bank_panel_and_no_whatsapp_action() {
    let engine = engine(store_config());
    let session_id = session_at_payment(&engine, dec!(30.00)).await;

    let view = engine
        .checkout
        .submit_payment(session_id, PaymentMethod::Transfer)
        .await
        .unwrap();

    assert_eq!(view.step, CheckoutStep::Confirmation);
    let info = view.bank_instructions.expect("bank panel rendered");
    assert_eq!(info.bank_name, "Banco de Credito");
    assert!(view.whatsapp_url.is_none());
    assert_eq!(
        view.order.unwrap().payment_status,
        PaymentStatus::Pending
    );
}

#[tokio::test]
async fn copied_field_acknowledgement_expires() {
    let engine = engine(store_config());
    let session_id = session_at_payment(&engine, dec!(30.00)).await;
    engine
        .checkout
        .submit_payment(session_id, PaymentMethod::Transfer)
        .await
        .unwrap();

    let view = engine
        .checkout
        .mark_copied(session_id, BankField::Account)
        .unwrap();
    assert_eq!(view.copied_field, Some(BankField::Account));

    // Acknowledgements are readable for two seconds, then vanish
    tokio::time::sleep(Duration::from_millis(2_100)).await;
    let view = engine.checkout.get_session(session_id).unwrap();
    assert_eq!(view.copied_field, None);
}

// ==================== Hosted redirect (scenario D) ====================

#[tokio::test]
async fn hosted_redirect_builds_preference_from_unit_prices() {
    let engine = engine(store_config());
    let cart = engine.carts.create_cart().await;
    // One line with a 5.00 modifier surcharge already folded into the price
    engine
        .carts
        .add_item(
            cart.id,
            product("p1", dec!(40.00)),
            LineExtras {
                item_price: Some(dec!(45.00)),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let session_id = engine.checkout.start_checkout(cart.id).await.unwrap().id;
    engine
        .checkout
        .set_customer(session_id, customer())
        .await
        .unwrap();
    engine
        .checkout
        .set_delivery(session_id, pickup())
        .await
        .unwrap();

    let view = engine
        .checkout
        .submit_payment(session_id, PaymentMethod::GatewayRedirect)
        .await
        .unwrap();

    // Terminal local handoff: redirect URL surfaced, no confirmation step
    assert_eq!(view.redirect_url.as_deref(), Some(common::INIT_POINT));
    assert!(!view.loading);

    let order = view.order.expect("order created before the attempt");
    let requests = engine.preference_api.requests.lock().unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].items[0].unit_price, dec!(45.00));
    assert_eq!(requests[0].items[0].currency_id, "PEN");
    assert_eq!(requests[0].external_reference, order.id);

    // Pending marker written for return-trip reconciliation
    let marker = engine.pending_orders.get(&order.id).expect("marker");
    assert_eq!(marker.order_number, order.order_number);
}

#[tokio::test]
async fn sandbox_store_redirects_to_the_sandbox_url() {
    let mut store = store_config();
    store.payments.hosted.as_mut().unwrap().sandbox = true;
    let engine = engine(store);
    let session_id = session_at_payment(&engine, dec!(10.00)).await;

    let view = engine
        .checkout
        .submit_payment(session_id, PaymentMethod::GatewayRedirect)
        .await
        .unwrap();
    assert_eq!(view.redirect_url.as_deref(), Some(SANDBOX_INIT_POINT));
}

// ==================== Failure handling / retries ====================

#[tokio::test]
async fn gateway_failure_clears_loading_and_allows_retry_with_fresh_order() {
    let engine = engine(store_config());
    engine.preference_api.fail_first.store(true, Ordering::SeqCst);
    let session_id = session_at_payment(&engine, dec!(10.00)).await;

    let err = engine
        .checkout
        .submit_payment(session_id, PaymentMethod::GatewayRedirect)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ExternalServiceError(_));

    let view = engine.checkout.get_session(session_id).unwrap();
    assert!(!view.loading);
    assert_eq!(view.error, Some(CheckoutErrorCode::PaymentFailed));
    assert_eq!(view.step, CheckoutStep::Payment);
    let first_order = view.order.expect("failed attempt still created an order");

    // Retry succeeds and creates a second, distinct order
    let view = engine
        .checkout
        .submit_payment(session_id, PaymentMethod::GatewayRedirect)
        .await
        .unwrap();
    let second_order = view.order.unwrap();
    assert_ne!(first_order.id, second_order.id);
    assert_eq!(engine.order_store.created_count(), 2);
}

#[tokio::test]
async fn disabled_gateway_blocks_dispatch_with_a_configuration_error() {
    let mut store = store_config();
    store.payments.hosted.as_mut().unwrap().enabled = false;
    let engine = engine(store);
    let session_id = session_at_payment(&engine, dec!(10.00)).await;

    let err = engine
        .checkout
        .submit_payment(session_id, PaymentMethod::GatewayRedirect)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::GatewayNotConfigured(_));

    let view = engine.checkout.get_session(session_id).unwrap();
    assert_eq!(view.error, Some(CheckoutErrorCode::GatewayNotConfigured));
    assert!(!view.loading);
}

#[tokio::test(start_paused = true)]
async fn concurrent_submission_is_rejected_while_an_attempt_is_in_flight() {
    let engine = engine_with_order_store(
        store_config(),
        FakeOrderStore::stalling(Duration::from_secs(5)),
    );
    let session_id = session_at_payment(&engine, dec!(10.00)).await;

    let checkout = engine.checkout.clone();
    let first = tokio::spawn(async move {
        checkout
            .submit_payment(session_id, PaymentMethod::Transfer)
            .await
    });
    // Let the first submission reach the stalled order store
    tokio::task::yield_now().await;

    let err = engine
        .checkout
        .submit_payment(session_id, PaymentMethod::Transfer)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InvalidOperation(_));

    let view = first.await.unwrap().unwrap();
    assert_eq!(view.step, CheckoutStep::Confirmation);
    assert_eq!(engine.order_store.created_count(), 1);
}

// ==================== Embedded widget ====================

fn widget_store() -> storefront_checkout::config::StoreConfig {
    let mut store = store_config();
    store.payments.hosted.as_mut().unwrap().embedded_widget = true;
    store
}

#[tokio::test]
async fn widget_method_opens_an_intermediate_step() {
    let engine = engine(widget_store());
    let session_id = session_at_payment(&engine, dec!(10.00)).await;

    let view = engine
        .checkout
        .submit_payment(session_id, PaymentMethod::GatewayRedirect)
        .await
        .unwrap();

    assert_eq!(view.step, CheckoutStep::Widget);
    let widget = view.widget.expect("widget sub-state");
    assert_eq!(widget.kind, "hostedWidget");
    assert!(!widget.ready);
    // No preference was created yet: the redirect only happens on fallback
    assert_eq!(engine.preference_api.call_count(), 0);
}

#[tokio::test]
async fn widget_submit_confirms_and_completes() {
    let engine = engine(widget_store());
    let session_id = session_at_payment(&engine, dec!(10.00)).await;
    engine
        .checkout
        .submit_payment(session_id, PaymentMethod::GatewayRedirect)
        .await
        .unwrap();
    engine.checkout.widget_ready(session_id).unwrap();

    let view = engine
        .checkout
        .widget_submit(
            session_id,
            WidgetSubmission::HostedForm(serde_json::json!({"token": "tok_1"})),
        )
        .await
        .unwrap();

    assert_eq!(view.step, CheckoutStep::Confirmation);
    let payment = view.payment.expect("payment result");
    assert_eq!(payment.payment_id, "pay-widget-1");
    assert_eq!(view.order.unwrap().payment_status, PaymentStatus::Paid);
}

#[tokio::test(start_paused = true)]
async fn widget_timeout_falls_back_to_redirect() {
    let engine = engine(widget_store());
    let session_id = session_at_payment(&engine, dec!(10.00)).await;
    engine
        .checkout
        .submit_payment(session_id, PaymentMethod::GatewayRedirect)
        .await
        .unwrap();

    // Never becomes ready; the 15s timer fires
    tokio::time::sleep(Duration::from_secs(16)).await;
    // A second paused-time sleep only returns once every task is idle,
    // so the fallback task has finished by now
    tokio::time::sleep(Duration::from_millis(10)).await;

    let view = engine.checkout.get_session(session_id).unwrap();
    assert_eq!(view.redirect_url.as_deref(), Some(common::INIT_POINT));
    assert!(view.widget.is_none());
    assert_eq!(engine.preference_api.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn ready_widget_cancels_the_fallback_timer() {
    let engine = engine(widget_store());
    let session_id = session_at_payment(&engine, dec!(10.00)).await;
    engine
        .checkout
        .submit_payment(session_id, PaymentMethod::GatewayRedirect)
        .await
        .unwrap();
    engine.checkout.widget_ready(session_id).unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let view = engine.checkout.get_session(session_id).unwrap();
    assert_eq!(view.step, CheckoutStep::Widget);
    assert!(view.redirect_url.is_none());
    assert_eq!(engine.preference_api.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn fallback_runs_exactly_once_when_timer_and_error_race() {
    let engine = engine(widget_store());
    let session_id = session_at_payment(&engine, dec!(10.00)).await;
    engine
        .checkout
        .submit_payment(session_id, PaymentMethod::GatewayRedirect)
        .await
        .unwrap();

    // Widget reports an error: the latch is claimed now, fallback delayed 2s
    engine
        .checkout
        .widget_error(session_id, Some("sdk failed".to_string()))
        .await
        .unwrap();

    // Run past both the 2s grace and the 15s timer
    tokio::time::sleep(Duration::from_secs(20)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;

    let view = engine.checkout.get_session(session_id).unwrap();
    assert_eq!(view.redirect_url.as_deref(), Some(common::INIT_POINT));
    // Exactly one fallback despite two triggers
    assert_eq!(engine.preference_api.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn abandoning_the_session_silences_a_pending_fallback() {
    let engine = engine(widget_store());
    let session_id = session_at_payment(&engine, dec!(10.00)).await;
    engine
        .checkout
        .submit_payment(session_id, PaymentMethod::GatewayRedirect)
        .await
        .unwrap();

    engine.checkout.abandon(session_id).unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(engine.preference_api.call_count(), 0);
}

// ==================== Card PaymentIntent (scenario E) ====================

#[tokio::test]
async fn card_intent_flow_creates_intent_then_settles_server_side() {
    let engine = engine(store_config());
    let session_id = session_at_payment(&engine, dec!(53.00)).await;

    let view = engine
        .checkout
        .submit_payment(session_id, PaymentMethod::GatewayCard)
        .await
        .unwrap();

    assert_eq!(view.step, CheckoutStep::Widget);
    let widget = view.widget.expect("widget sub-state");
    assert_eq!(widget.kind, "cardIntent");
    let order = view.order.clone().expect("order created first");
    assert_eq!(
        widget.client_secret.as_deref(),
        Some(format!("cs_{}", order.id).as_str())
    );

    // Client SDK confirmed with `succeeded`; the engine settles server-side
    let view = engine
        .checkout
        .widget_submit(
            session_id,
            WidgetSubmission::CardConfirmation {
                payment_intent_id: None,
                status: "succeeded".to_string(),
            },
        )
        .await
        .unwrap();

    assert_eq!(view.step, CheckoutStep::Confirmation);
    let payment = view.payment.expect("payment carried into confirmation");
    assert_eq!(payment.status, "succeeded");
    assert_eq!(payment.payment_id, format!("pay_for_pi_{}", order.id));

    // The settlement call received the stored intent id
    let confirmed = engine.intent_api.confirmed_with.lock().unwrap();
    assert_eq!(*confirmed, vec![format!("pi_{}", order.id)]);
}

#[tokio::test]
async fn failed_card_confirmation_surfaces_an_error_without_settling() {
    let engine = engine(store_config());
    let session_id = session_at_payment(&engine, dec!(10.00)).await;
    engine
        .checkout
        .submit_payment(session_id, PaymentMethod::GatewayCard)
        .await
        .unwrap();

    let err = engine
        .checkout
        .widget_submit(
            session_id,
            WidgetSubmission::CardConfirmation {
                payment_intent_id: None,
                status: "requires_payment_method".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::PaymentRejected(_));

    let view = engine.checkout.get_session(session_id).unwrap();
    assert_eq!(view.error, Some(CheckoutErrorCode::PaymentRejected));
    assert_eq!(view.step, CheckoutStep::Widget);
    assert!(engine.intent_api.confirmed_with.lock().unwrap().is_empty());
}

// ==================== Shipping & prefill ====================

#[tokio::test]
async fn delivery_below_threshold_adds_flat_shipping_to_the_order() {
    let engine = engine(store_config());
    let session_id = start_session(&engine, dec!(45.00)).await;
    engine
        .checkout
        .set_customer(session_id, customer())
        .await
        .unwrap();
    engine
        .checkout
        .set_delivery(session_id, home_delivery())
        .await
        .unwrap();

    let view = engine
        .checkout
        .submit_payment(session_id, PaymentMethod::Transfer)
        .await
        .unwrap();
    let order = view.order.unwrap();
    assert_eq!(order.subtotal, dec!(45.00));
    assert_eq!(order.shipping_cost, Some(dec!(8.00)));
    assert_eq!(order.total, dec!(53.00));
}

#[tokio::test]
async fn completed_checkout_prefills_the_next_session() {
    let engine = engine(store_config());
    let session_id = session_at_payment(&engine, dec!(10.00)).await;
    engine
        .checkout
        .submit_payment(session_id, PaymentMethod::Transfer)
        .await
        .unwrap();

    // A new cart and checkout for the same store starts prefilled
    let cart = engine.carts.create_cart().await;
    engine
        .carts
        .add_item(cart.id, product("p2", dec!(5.00)), LineExtras::default())
        .await
        .unwrap();
    let view = engine.checkout.start_checkout(cart.id).await.unwrap();

    let prefilled = view.data.customer.expect("customer prefilled");
    assert_eq!(prefilled.name, "Ana");
    assert_eq!(
        view.data.delivery.expect("delivery prefilled").method,
        DeliveryMethod::Pickup
    );
}
