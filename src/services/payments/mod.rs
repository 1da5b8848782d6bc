// Payment strategies behind a uniform "attempt" contract.
//
// Three strategies resolve immediately (WhatsApp link, hosted redirect,
// bank transfer); the embedded card forms resolve through the widget
// lifecycle instead, signalled by `PaymentOutcome::WidgetPending`.

pub mod card_intent;
pub mod hosted;
pub mod transfer;
pub mod whatsapp;
pub mod widget;

pub use card_intent::{CardIntentGateway, HttpPaymentIntentApi, IntentReceipt, PaymentIntentApi};
pub use hosted::{
    HostedCheckoutGateway, HttpPreferenceApi, HttpWidgetPaymentProcessor, PreferenceApi,
    PreferenceItem, PreferencePayer, PreferenceRequest, PreferenceResponse, WidgetPaymentProcessor,
    WidgetPaymentResult,
};
pub use transfer::TransferGateway;
pub use whatsapp::WhatsAppGateway;
pub use widget::{FallbackLatch, GatewaySession, WidgetKind};

use crate::{
    errors::ServiceError,
    models::{BankInstructions, CheckoutData, Order, PaymentMethod},
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Something the shopper must do by hand to move the order forward.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ManualAction {
    /// A deep link the shopper taps themselves. Browsers block programmatic
    /// popups unreliably, so navigation is never attempted automatically.
    OpenLink { url: String },
    /// Bank details for a manual transfer.
    BankInstructions(BankInstructions),
}

/// How an embedded widget step must be initialized.
#[derive(Debug, Clone)]
pub enum WidgetInit {
    /// Hosted gateway's card widget; falls back to redirect when it never
    /// becomes ready or reports an error.
    HostedWidget,
    /// PaymentIntent card form; the intent is created before rendering.
    CardIntent {
        client_secret: String,
        payment_intent_id: String,
    },
}

/// Result of one payment attempt.
#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    /// Terminal local handoff: the browser navigates away; completion is
    /// reconciled out-of-band.
    Redirect { url: String },
    /// The gateway settled the payment.
    Confirmed { payment_id: String, status: String },
    /// The order is placed; the shopper finishes manually.
    PendingManualAction(ManualAction),
    /// Intermediate: an embedded widget step must resolve this attempt.
    WidgetPending(WidgetInit),
}

/// Uniform strategy contract the state machine dispatches to.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn attempt(
        &self,
        order: &Order,
        checkout: &CheckoutData,
    ) -> Result<PaymentOutcome, ServiceError>;
}

/// Holds the configured adapters and picks one per payment method.
pub struct GatewayRegistry {
    whatsapp: WhatsAppGateway,
    hosted: HostedCheckoutGateway,
    card_intent: CardIntentGateway,
    transfer: TransferGateway,
}

impl GatewayRegistry {
    pub fn new(
        whatsapp: WhatsAppGateway,
        hosted: HostedCheckoutGateway,
        card_intent: CardIntentGateway,
        transfer: TransferGateway,
    ) -> Self {
        Self {
            whatsapp,
            hosted,
            card_intent,
            transfer,
        }
    }

    pub fn gateway(&self, method: PaymentMethod) -> &dyn PaymentGateway {
        match method {
            PaymentMethod::Whatsapp => &self.whatsapp,
            PaymentMethod::GatewayRedirect => &self.hosted,
            PaymentMethod::GatewayCard => &self.card_intent,
            PaymentMethod::Transfer => &self.transfer,
        }
    }

    /// The hosted adapter, reachable directly for the widget fallback and
    /// widget payment processing paths.
    pub fn hosted(&self) -> &HostedCheckoutGateway {
        &self.hosted
    }

    pub fn card_intent(&self) -> &CardIntentGateway {
        &self.card_intent
    }
}
