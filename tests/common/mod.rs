//! Shared test fixtures: an assembled checkout engine wired to in-memory
//! fakes for every external collaborator.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use storefront_checkout::cache::TtlCache;
use storefront_checkout::config::{
    BankTransferConfig, BusinessType, CardIntentConfig, HostedGatewayConfig, PaymentsConfig,
    ShippingConfig, StoreConfig,
};
use storefront_checkout::errors::ServiceError;
use storefront_checkout::events::EventSender;
use storefront_checkout::models::{OrderDraft, OrderReceipt, PendingOrder};
use storefront_checkout::services::orders::OrderStore;
use storefront_checkout::services::payments::card_intent::{ConfirmResult, IntentReceipt};
use storefront_checkout::services::payments::{
    CardIntentGateway, GatewayRegistry, HostedCheckoutGateway, PaymentIntentApi, PreferenceApi,
    PreferenceRequest, PreferenceResponse, TransferGateway, WhatsAppGateway,
    WidgetPaymentProcessor, WidgetPaymentResult,
};
use storefront_checkout::services::{CartService, CheckoutService, OrderService};

pub const INIT_POINT: &str = "https://gateway.example/pay/pref-1";
pub const SANDBOX_INIT_POINT: &str = "https://sandbox.gateway.example/pay/pref-1";

/// Order store fake. Assigns sequential order numbers and can be told to
/// fail, or to stall until released, to exercise the failure and
/// concurrency paths.
pub struct FakeOrderStore {
    counter: AtomicUsize,
    pub fail: AtomicBool,
    pub stall: Option<std::time::Duration>,
    pub drafts: Mutex<Vec<OrderDraft>>,
}

impl FakeOrderStore {
    pub fn new() -> Self {
        Self {
            counter: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            stall: None,
            drafts: Mutex::new(Vec::new()),
        }
    }

    pub fn stalling(duration: std::time::Duration) -> Self {
        Self {
            stall: Some(duration),
            ..Self::new()
        }
    }

    pub fn created_count(&self) -> usize {
        self.counter.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OrderStore for FakeOrderStore {
    async fn create(
        &self,
        _store_id: &str,
        draft: &OrderDraft,
    ) -> Result<OrderReceipt, ServiceError> {
        if let Some(stall) = self.stall {
            tokio::time::sleep(stall).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "order store unavailable".to_string(),
            ));
        }
        self.drafts.lock().unwrap().push(draft.clone());
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(OrderReceipt {
            id: format!("order-{}", n),
            order_number: format!("ORD-{:04}", n),
        })
    }
}

/// Preference API fake. Captures requests and counts calls so fallback
/// tests can assert exactly-once execution.
pub struct FakePreferenceApi {
    pub calls: AtomicUsize,
    pub fail_first: AtomicBool,
    pub requests: Mutex<Vec<PreferenceRequest>>,
}

impl FakePreferenceApi {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_first: AtomicBool::new(false),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PreferenceApi for FakePreferenceApi {
    async fn create_preference(
        &self,
        request: &PreferenceRequest,
    ) -> Result<PreferenceResponse, ServiceError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call == 0 && self.fail_first.load(Ordering::SeqCst) {
            return Err(ServiceError::ExternalServiceError(
                "gateway unavailable".to_string(),
            ));
        }
        self.requests.lock().unwrap().push(request.clone());
        Ok(PreferenceResponse {
            preference_id: "pref-1".to_string(),
            init_point: INIT_POINT.to_string(),
            sandbox_init_point: Some(SANDBOX_INIT_POINT.to_string()),
        })
    }
}

pub struct FakeIntentApi {
    pub confirmed_with: Mutex<Vec<String>>,
}

impl FakeIntentApi {
    pub fn new() -> Self {
        Self {
            confirmed_with: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl PaymentIntentApi for FakeIntentApi {
    async fn create_intent(
        &self,
        _store_id: &str,
        order_id: &str,
        _amount: Decimal,
        _currency: &str,
    ) -> Result<IntentReceipt, ServiceError> {
        Ok(IntentReceipt {
            client_secret: format!("cs_{}", order_id),
            payment_intent_id: format!("pi_{}", order_id),
        })
    }

    async fn confirm_payment(
        &self,
        _store_id: &str,
        _order_id: &str,
        payment_intent_id: &str,
    ) -> Result<ConfirmResult, ServiceError> {
        self.confirmed_with
            .lock()
            .unwrap()
            .push(payment_intent_id.to_string());
        Ok(ConfirmResult {
            status: "succeeded".to_string(),
            payment_id: format!("pay_for_{}", payment_intent_id),
        })
    }
}

pub struct FakeWidgetProcessor {
    pub status: Mutex<String>,
}

impl FakeWidgetProcessor {
    pub fn new() -> Self {
        Self {
            status: Mutex::new("approved".to_string()),
        }
    }
}

#[async_trait]
impl WidgetPaymentProcessor for FakeWidgetProcessor {
    async fn process(
        &self,
        _store_id: &str,
        _order_id: &str,
        _form_data: &serde_json::Value,
    ) -> Result<WidgetPaymentResult, ServiceError> {
        Ok(WidgetPaymentResult {
            status: self.status.lock().unwrap().clone(),
            status_detail: "accredited".to_string(),
            payment_id: "pay-widget-1".to_string(),
        })
    }
}

/// Store configuration with every gateway enabled.
pub fn store_config() -> StoreConfig {
    StoreConfig {
        id: "store-1".to_string(),
        name: "Demo Store".to_string(),
        currency: "PEN".to_string(),
        language: "es".to_string(),
        country: Some("PE".to_string()),
        business_type: BusinessType::General,
        whatsapp_phone: Some("+51 999 888 777".to_string()),
        shipping: ShippingConfig {
            enabled: true,
            cost: dec!(8.00),
            free_above: Some(dec!(100.00)),
        },
        payments: PaymentsConfig {
            hosted: Some(HostedGatewayConfig {
                enabled: true,
                public_key: "pk-test".to_string(),
                api_url: "https://gateway.example/api".to_string(),
                sandbox: false,
                embedded_widget: false,
            }),
            card_intent: Some(CardIntentConfig {
                enabled: true,
                publishable_key: "pk_test".to_string(),
                api_url: "https://cards.example/api".to_string(),
            }),
            transfer: Some(BankTransferConfig {
                enabled: true,
                bank_name: "Banco de Credito".to_string(),
                account_holder: "Demo Store SAC".to_string(),
                account_number: "123-456789-0-12".to_string(),
            }),
        },
        delivery_state_required_countries: vec!["MX".to_string()],
    }
}

/// The fully assembled engine plus handles on every fake collaborator.
pub struct TestEngine {
    pub carts: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub order_store: Arc<FakeOrderStore>,
    pub preference_api: Arc<FakePreferenceApi>,
    pub intent_api: Arc<FakeIntentApi>,
    pub widget_processor: Arc<FakeWidgetProcessor>,
    pub pending_orders: Arc<TtlCache<PendingOrder>>,
}

pub fn engine(store: StoreConfig) -> TestEngine {
    engine_with_order_store(store, FakeOrderStore::new())
}

pub fn engine_with_order_store(store: StoreConfig, order_store: FakeOrderStore) -> TestEngine {
    let store = Arc::new(store);

    let (tx, mut rx) = mpsc::channel(256);
    tokio::spawn(async move { while rx.recv().await.is_some() {} });
    let event_sender = Arc::new(EventSender::new(tx));

    let order_store = Arc::new(order_store);
    let preference_api = Arc::new(FakePreferenceApi::new());
    let intent_api = Arc::new(FakeIntentApi::new());
    let widget_processor = Arc::new(FakeWidgetProcessor::new());
    let pending_orders = Arc::new(TtlCache::new(ChronoDuration::hours(24)));
    let prefill = Arc::new(TtlCache::new(ChronoDuration::days(30)));

    let gateways = Arc::new(GatewayRegistry::new(
        WhatsAppGateway::new(store.clone()),
        HostedCheckoutGateway::new(
            store.clone(),
            preference_api.clone(),
            widget_processor.clone(),
            pending_orders.clone(),
        ),
        CardIntentGateway::new(store.clone(), intent_api.clone()),
        TransferGateway::new(store.clone()),
    ));

    let carts = Arc::new(CartService::new(event_sender.clone()));
    let orders = Arc::new(OrderService::new(order_store.clone(), event_sender.clone()));
    let checkout = Arc::new(CheckoutService::new(
        carts.clone(),
        orders,
        gateways,
        prefill,
        event_sender,
        store,
    ));

    TestEngine {
        carts,
        checkout,
        order_store,
        preference_api,
        intent_api,
        widget_processor,
        pending_orders,
    }
}
