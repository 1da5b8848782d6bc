use crate::{
    cache::TtlCache,
    config::{HostedGatewayConfig, StoreConfig},
    errors::ServiceError,
    models::{CheckoutData, Order, PendingOrder},
};
use async_trait::async_trait;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{PaymentGateway, PaymentOutcome, WidgetInit};

/// One purchasable line in a gateway preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceItem {
    pub id: String,
    pub title: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub currency_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferencePayer {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

/// Request for the backend that owns the gateway credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferenceRequest {
    pub store_id: String,
    pub order_id: String,
    pub order_number: String,
    pub items: Vec<PreferenceItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payer: Option<PreferencePayer>,
    pub external_reference: String,
}

/// What the gateway hands back for a created preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceResponse {
    pub preference_id: String,
    pub init_point: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox_init_point: Option<String>,
}

/// Creates checkout preferences against the hosted gateway backend.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PreferenceApi: Send + Sync {
    async fn create_preference(
        &self,
        request: &PreferenceRequest,
    ) -> Result<PreferenceResponse, ServiceError>;
}

pub struct HttpPreferenceApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPreferenceApi {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl PreferenceApi for HttpPreferenceApi {
    async fn create_preference(
        &self,
        request: &PreferenceRequest,
    ) -> Result<PreferenceResponse, ServiceError> {
        let url = format!("{}/create-preference", self.base_url);
        let response = self.client.post(&url).json(request).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "preference creation returned {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}

/// Result of processing a tokenized widget payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WidgetPaymentResult {
    pub status: String,
    pub status_detail: String,
    pub payment_id: String,
}

/// Processes a tokenized card payment submitted from the embedded widget.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait WidgetPaymentProcessor: Send + Sync {
    async fn process(
        &self,
        store_id: &str,
        order_id: &str,
        form_data: &serde_json::Value,
    ) -> Result<WidgetPaymentResult, ServiceError>;
}

pub struct HttpWidgetPaymentProcessor {
    client: reqwest::Client,
    base_url: String,
}

impl HttpWidgetPaymentProcessor {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl WidgetPaymentProcessor for HttpWidgetPaymentProcessor {
    async fn process(
        &self,
        store_id: &str,
        order_id: &str,
        form_data: &serde_json::Value,
    ) -> Result<WidgetPaymentResult, ServiceError> {
        let url = format!("{}/process-payment", self.base_url);
        let body = serde_json::json!({
            "storeId": store_id,
            "orderId": order_id,
            "formData": form_data,
        });
        let response = self.client.post(&url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "widget payment processing returned {}: {}",
                status, text
            )));
        }

        Ok(response.json().await?)
    }
}

/// Hosted-checkout adapter.
///
/// The redirect flow is a terminal local handoff: after the preference is
/// created and the pending-order marker written, the browser navigates to
/// the gateway and completion is reconciled out-of-band. When the store
/// enables the embedded widget, the attempt instead opens a widget step that
/// either confirms in place or falls back to this redirect.
pub struct HostedCheckoutGateway {
    store: Arc<StoreConfig>,
    api: Arc<dyn PreferenceApi>,
    processor: Arc<dyn WidgetPaymentProcessor>,
    pending: Arc<TtlCache<PendingOrder>>,
}

impl HostedCheckoutGateway {
    pub fn new(
        store: Arc<StoreConfig>,
        api: Arc<dyn PreferenceApi>,
        processor: Arc<dyn WidgetPaymentProcessor>,
        pending: Arc<TtlCache<PendingOrder>>,
    ) -> Self {
        Self {
            store,
            api,
            processor,
            pending,
        }
    }

    fn config(&self) -> Result<&HostedGatewayConfig, ServiceError> {
        match &self.store.payments.hosted {
            Some(cfg) if cfg.enabled => Ok(cfg),
            _ => Err(ServiceError::GatewayNotConfigured(
                "hosted checkout gateway is not enabled for this store".to_string(),
            )),
        }
    }

    fn build_request(&self, order: &Order, checkout: &CheckoutData) -> PreferenceRequest {
        let items = order
            .items
            .iter()
            .map(|item| PreferenceItem {
                id: item.product_id.clone(),
                title: item.product_name.clone(),
                quantity: item.quantity,
                // unit_price is the cart line price, so modifier surcharges
                // are respected; never the raw catalog price
                unit_price: item
                    .price
                    .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero),
                currency_id: self.store.currency.clone(),
            })
            .collect();

        let payer = checkout.customer.as_ref().map(|customer| PreferencePayer {
            name: Some(customer.name.clone()),
            email: customer.email.clone(),
            phone: Some(customer.phone.clone()),
        });

        PreferenceRequest {
            store_id: self.store.id.clone(),
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            items,
            payer,
            external_reference: order.id.clone(),
        }
    }

    /// Runs the redirect flow regardless of the embedded-widget setting.
    /// Used directly by the widget fallback path.
    #[instrument(skip(self, order, checkout), fields(order_id = %order.id))]
    pub async fn redirect_attempt(
        &self,
        order: &Order,
        checkout: &CheckoutData,
    ) -> Result<PaymentOutcome, ServiceError> {
        let config = self.config()?;
        let request = self.build_request(order, checkout);
        let response = self.api.create_preference(&request).await?;

        // Environment selection is store configuration, never inferred
        let url = if config.sandbox {
            response
                .sandbox_init_point
                .unwrap_or(response.init_point)
        } else {
            response.init_point
        };

        // Marker for the return page: the engine itself never observes
        // gateway completion
        self.pending.insert(
            order.id.clone(),
            PendingOrder {
                order_id: order.id.clone(),
                store_id: self.store.id.clone(),
                order_number: order.order_number.clone(),
            },
        );

        info!(preference_id = %response.preference_id, "hosted checkout preference created");
        Ok(PaymentOutcome::Redirect { url })
    }

    /// Processes a tokenized payment submitted from the embedded widget.
    /// A `rejected` status surfaces as an error; anything else confirms.
    pub async fn process_widget_payment(
        &self,
        order: &Order,
        form_data: &serde_json::Value,
    ) -> Result<PaymentOutcome, ServiceError> {
        self.config()?;
        let result = self
            .processor
            .process(&self.store.id, &order.id, form_data)
            .await?;

        if result.status == "rejected" {
            return Err(ServiceError::PaymentRejected(result.status_detail));
        }

        Ok(PaymentOutcome::Confirmed {
            payment_id: result.payment_id,
            status: result.status,
        })
    }

    /// Pending marker lookup, exposed for the return-trip surface.
    pub fn pending_order(&self, order_id: &str) -> Option<PendingOrder> {
        self.pending.get(order_id)
    }
}

#[async_trait]
impl PaymentGateway for HostedCheckoutGateway {
    async fn attempt(
        &self,
        order: &Order,
        checkout: &CheckoutData,
    ) -> Result<PaymentOutcome, ServiceError> {
        let config = self.config()?;
        if config.embedded_widget {
            return Ok(PaymentOutcome::WidgetPending(WidgetInit::HostedWidget));
        }
        self.redirect_attempt(order, checkout).await
    }
}
