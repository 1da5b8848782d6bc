use crate::{
    config::{CardIntentConfig, StoreConfig},
    errors::ServiceError,
    models::{CheckoutData, Order},
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{PaymentGateway, PaymentOutcome, WidgetInit};

/// A created PaymentIntent: the secret the client SDK renders against.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentReceipt {
    pub client_secret: String,
    pub payment_intent_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmResult {
    pub status: String,
    pub payment_id: String,
}

/// Backend collaborator owning the card network credentials.
///
/// `create_intent` runs before the embedded form renders; `confirm_payment`
/// settles the order server-side after the client SDK reports success.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PaymentIntentApi: Send + Sync {
    async fn create_intent(
        &self,
        store_id: &str,
        order_id: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<IntentReceipt, ServiceError>;

    async fn confirm_payment(
        &self,
        store_id: &str,
        order_id: &str,
        payment_intent_id: &str,
    ) -> Result<ConfirmResult, ServiceError>;
}

/// HTTP implementation posting `{action: ...}` requests to a single
/// endpoint, the way the backend route multiplexes both operations.
pub struct HttpPaymentIntentApi {
    client: reqwest::Client,
    api_url: String,
}

impl HttpPaymentIntentApi {
    pub fn new(client: reqwest::Client, api_url: impl Into<String>) -> Self {
        Self {
            client,
            api_url: api_url.into(),
        }
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        body: serde_json::Value,
    ) -> Result<T, ServiceError> {
        let response = self.client.post(&self.api_url).json(&body).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "payment intent backend returned {}: {}",
                status, text
            )));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl PaymentIntentApi for HttpPaymentIntentApi {
    async fn create_intent(
        &self,
        store_id: &str,
        order_id: &str,
        amount: Decimal,
        currency: &str,
    ) -> Result<IntentReceipt, ServiceError> {
        self.post(serde_json::json!({
            "action": "create-intent",
            "storeId": store_id,
            "orderId": order_id,
            "amount": amount,
            "currency": currency,
        }))
        .await
    }

    async fn confirm_payment(
        &self,
        store_id: &str,
        order_id: &str,
        payment_intent_id: &str,
    ) -> Result<ConfirmResult, ServiceError> {
        self.post(serde_json::json!({
            "action": "confirm-payment",
            "storeId": store_id,
            "orderId": order_id,
            "paymentIntentId": payment_intent_id,
        }))
        .await
    }
}

/// Client-side confirmation statuses that are allowed to settle.
fn is_settleable(status: &str) -> bool {
    matches!(status, "succeeded" | "processing")
}

/// Card PaymentIntent adapter.
///
/// The attempt creates the intent for the order's final total and opens the
/// widget step; the client SDK confirms the payment in the embedded form,
/// and only after a server-side confirm does the attempt resolve.
pub struct CardIntentGateway {
    store: Arc<StoreConfig>,
    api: Arc<dyn PaymentIntentApi>,
}

impl CardIntentGateway {
    pub fn new(store: Arc<StoreConfig>, api: Arc<dyn PaymentIntentApi>) -> Self {
        Self { store, api }
    }

    fn config(&self) -> Result<&CardIntentConfig, ServiceError> {
        match &self.store.payments.card_intent {
            Some(cfg) if cfg.enabled => Ok(cfg),
            _ => Err(ServiceError::GatewayNotConfigured(
                "card payment gateway is not enabled for this store".to_string(),
            )),
        }
    }

    /// Settles a client-confirmed intent server-side.
    ///
    /// Anything other than a settleable client status is surfaced as an
    /// error; nothing is retried silently.
    #[instrument(skip(self, order), fields(order_id = %order.id))]
    pub async fn settle(
        &self,
        order: &Order,
        payment_intent_id: &str,
        client_status: &str,
    ) -> Result<PaymentOutcome, ServiceError> {
        self.config()?;

        if !is_settleable(client_status) {
            return Err(ServiceError::PaymentRejected(format!(
                "card confirmation ended in status {}",
                client_status
            )));
        }

        let result = self
            .api
            .confirm_payment(&self.store.id, &order.id, payment_intent_id)
            .await?;

        info!(payment_id = %result.payment_id, status = %result.status, "card payment settled");
        Ok(PaymentOutcome::Confirmed {
            payment_id: result.payment_id,
            status: result.status,
        })
    }
}

#[async_trait]
impl PaymentGateway for CardIntentGateway {
    #[instrument(skip(self, order, _checkout), fields(order_id = %order.id))]
    async fn attempt(
        &self,
        order: &Order,
        _checkout: &CheckoutData,
    ) -> Result<PaymentOutcome, ServiceError> {
        self.config()?;

        // Intent first: the embedded form renders against the secret
        let receipt = self
            .api
            .create_intent(&self.store.id, &order.id, order.total, &self.store.currency)
            .await?;

        Ok(PaymentOutcome::WidgetPending(WidgetInit::CardIntent {
            client_secret: receipt.client_secret,
            payment_intent_id: receipt.payment_intent_id,
        }))
    }
}
