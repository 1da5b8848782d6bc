use crate::{
    cache::TtlCache,
    config::StoreConfig,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        BankField, BankInstructions, CheckoutData, CheckoutErrorCode, CheckoutPrefill,
        CheckoutStep, CustomerInfo, DeliveryInfo, DeliveryMethod, Order, PaymentMethod,
        PaymentStatus,
    },
    services::{
        cart::CartService,
        orders::{assemble_order, OrderService},
        payments::{
            GatewayRegistry, GatewaySession, ManualAction, PaymentOutcome, WidgetInit, WidgetKind,
        },
    },
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::payments::widget::{WIDGET_ERROR_GRACE, WIDGET_READY_TIMEOUT};

/// Copied-field acknowledgements stay visible this long.
const COPY_ACK_WINDOW_SECS: i64 = 2;

/// A settled payment as reported by a gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    pub payment_id: String,
    pub status: String,
}

#[derive(Debug, Clone)]
struct CopiedField {
    field: BankField,
    expires_at: DateTime<Utc>,
}

/// One shopper's checkout flow.
///
/// Steps move strictly forward (`customer → delivery → payment →
/// (widget)? → confirmation`); `go_back` retreats exactly one step and is
/// rejected from the confirmation step. Data accumulates additively and is
/// only dropped when the whole session is abandoned.
pub struct CheckoutSession {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub step: CheckoutStep,
    pub data: CheckoutData,
    pub order: Option<Order>,
    pub payment: Option<PaymentConfirmation>,
    pub whatsapp_url: Option<String>,
    pub redirect_url: Option<String>,
    pub bank_instructions: Option<BankInstructions>,
    pub widget: Option<GatewaySession>,
    copied_field: Option<CopiedField>,
    pub loading: bool,
    pub error: Option<CheckoutErrorCode>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl CheckoutSession {
    fn new(cart_id: Uuid, prefill: Option<CheckoutPrefill>) -> Self {
        let now = Utc::now();
        let data = match prefill {
            Some(saved) => CheckoutData {
                customer: Some(saved.customer),
                delivery: Some(saved.delivery),
                payment_method: None,
            },
            None => CheckoutData::default(),
        };
        Self {
            id: Uuid::new_v4(),
            cart_id,
            step: CheckoutStep::Customer,
            data,
            order: None,
            payment: None,
            whatsapp_url: None,
            redirect_url: None,
            bank_instructions: None,
            widget: None,
            copied_field: None,
            loading: false,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Embedded-widget sub-state exposed to the presentation layer.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WidgetView {
    pub kind: &'static str,
    pub ready: bool,
    pub processing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
}

/// Everything the presentation layer needs to render the current step.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutSessionView {
    pub id: Uuid,
    pub cart_id: Uuid,
    pub step: CheckoutStep,
    pub data: CheckoutData,
    pub loading: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<CheckoutErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<PaymentConfirmation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whatsapp_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub widget: Option<WidgetView>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bank_instructions: Option<BankInstructions>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub copied_field: Option<BankField>,
    pub subtotal: Decimal,
    pub shipping_cost: Decimal,
    pub total: Decimal,
}

/// What the shopper's widget interaction submitted.
#[derive(Debug, Clone)]
pub enum WidgetSubmission {
    /// Tokenized form data from the hosted gateway's card widget.
    HostedForm(serde_json::Value),
    /// Client-side confirmation result from the PaymentIntent form SDK.
    CardConfirmation {
        payment_intent_id: Option<String>,
        status: String,
    },
}

/// Validates the customer step. Codes, not prose: the presentation layer
/// owns the wording.
fn validate_customer(customer: &CustomerInfo) -> Result<(), CheckoutErrorCode> {
    if customer.name.trim().is_empty() {
        return Err(CheckoutErrorCode::NameRequired);
    }
    if customer.phone.trim().is_empty() {
        return Err(CheckoutErrorCode::PhoneRequired);
    }
    Ok(())
}

/// Validates the delivery step. Address fields are only demanded for home
/// delivery, and the state field only when the store's country requires it.
fn validate_delivery(store: &StoreConfig, delivery: &DeliveryInfo) -> Result<(), CheckoutErrorCode> {
    if delivery.method == DeliveryMethod::Pickup {
        return Ok(());
    }
    let address = delivery
        .address
        .as_ref()
        .ok_or(CheckoutErrorCode::AddressRequired)?;
    if address.street.trim().is_empty() {
        return Err(CheckoutErrorCode::AddressRequired);
    }
    if address.city.trim().is_empty() {
        return Err(CheckoutErrorCode::CityRequired);
    }
    if store.requires_delivery_state()
        && !address
            .state
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    {
        return Err(CheckoutErrorCode::StateRequired);
    }
    Ok(())
}

/// Flat-rate shipping: only for home delivery, only when enabled, free at
/// or above the configured threshold.
fn compute_shipping(store: &StoreConfig, data: &CheckoutData, subtotal: Decimal) -> Decimal {
    let is_delivery = data
        .delivery
        .as_ref()
        .map(|d| d.method == DeliveryMethod::Delivery)
        .unwrap_or(false);
    if !is_delivery || !store.shipping.enabled {
        return Decimal::ZERO;
    }
    if let Some(threshold) = store.shipping.free_above {
        if subtotal >= threshold {
            return Decimal::ZERO;
        }
    }
    store.shipping.cost
}

/// Checkout state machine.
///
/// Owns step sequencing, per-step validation, the loading/error surface,
/// and dispatch to the order assembler and the selected payment gateway.
/// One cooperative flow per session: while an attempt is in flight the
/// session refuses further submissions.
#[derive(Clone)]
pub struct CheckoutService {
    sessions: Arc<DashMap<Uuid, CheckoutSession>>,
    cart_service: Arc<CartService>,
    order_service: Arc<OrderService>,
    gateways: Arc<GatewayRegistry>,
    prefill: Arc<TtlCache<CheckoutPrefill>>,
    event_sender: Arc<EventSender>,
    store: Arc<StoreConfig>,
}

impl CheckoutService {
    pub fn new(
        cart_service: Arc<CartService>,
        order_service: Arc<OrderService>,
        gateways: Arc<GatewayRegistry>,
        prefill: Arc<TtlCache<CheckoutPrefill>>,
        event_sender: Arc<EventSender>,
        store: Arc<StoreConfig>,
    ) -> Self {
        Self {
            sessions: Arc::new(DashMap::new()),
            cart_service,
            order_service,
            gateways,
            prefill,
            event_sender,
            store,
        }
    }

    /// Starts a checkout for a non-empty cart, prefilled with remembered
    /// customer data when a fresh entry exists for this store.
    #[instrument(skip(self))]
    pub async fn start_checkout(&self, cart_id: Uuid) -> Result<CheckoutSessionView, ServiceError> {
        let cart = self.cart_service.get_cart(cart_id)?;
        if cart.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        let session = CheckoutSession::new(cart_id, self.prefill.get(&self.store.id));
        let session_id = session.id;
        let view = self.render(&session);
        self.sessions.insert(session_id, session);

        self.event_sender
            .send_or_log(Event::CheckoutStarted {
                cart_id,
                session_id,
            })
            .await;

        info!(%session_id, %cart_id, "checkout started");
        Ok(view)
    }

    pub fn get_session(&self, session_id: Uuid) -> Result<CheckoutSessionView, ServiceError> {
        let session = self
            .sessions
            .get(&session_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Session {} not found", session_id)))?;
        Ok(self.render(&session))
    }

    /// Drops the session, aborting any pending widget timer. The in-memory
    /// equivalent of the shopper navigating away.
    pub fn abandon(&self, session_id: Uuid) -> Result<(), ServiceError> {
        self.sessions
            .remove(&session_id)
            .map(|_| ())
            .ok_or_else(|| ServiceError::NotFound(format!("Session {} not found", session_id)))
    }

    /// Stores customer data and advances to the delivery step.
    #[instrument(skip(self, customer))]
    pub async fn set_customer(
        &self,
        session_id: Uuid,
        customer: CustomerInfo,
    ) -> Result<CheckoutSessionView, ServiceError> {
        let view = {
            let mut session = self.session_mut(session_id)?;
            session.error = None;
            if session.step != CheckoutStep::Customer {
                return Err(ServiceError::InvalidOperation(format!(
                    "customer data cannot be set at step {}",
                    session.step
                )));
            }
            if let Err(code) = validate_customer(&customer) {
                session.error = Some(code);
                return Err(ServiceError::Validation(code));
            }
            session.data.customer = Some(customer);
            session.step = CheckoutStep::Delivery;
            session.touch();
            self.render(&session)
        };

        self.step_advanced(session_id, CheckoutStep::Delivery).await;
        Ok(view)
    }

    /// Stores delivery data and advances to the payment step.
    #[instrument(skip(self, delivery))]
    pub async fn set_delivery(
        &self,
        session_id: Uuid,
        delivery: DeliveryInfo,
    ) -> Result<CheckoutSessionView, ServiceError> {
        let view = {
            let mut session = self.session_mut(session_id)?;
            session.error = None;
            if session.step != CheckoutStep::Delivery {
                return Err(ServiceError::InvalidOperation(format!(
                    "delivery data cannot be set at step {}",
                    session.step
                )));
            }
            if let Err(code) = validate_delivery(&self.store, &delivery) {
                session.error = Some(code);
                return Err(ServiceError::Validation(code));
            }
            session.data.delivery = Some(delivery);
            session.step = CheckoutStep::Payment;
            session.touch();
            self.render(&session)
        };

        self.step_advanced(session_id, CheckoutStep::Payment).await;
        Ok(view)
    }

    /// Moves exactly one step back. Only `delivery → customer` and
    /// `payment → delivery` exist; the confirmation step is terminal.
    pub fn go_back(&self, session_id: Uuid) -> Result<CheckoutSessionView, ServiceError> {
        let mut session = self.session_mut(session_id)?;
        session.error = None;
        session.step = match session.step {
            CheckoutStep::Delivery => CheckoutStep::Customer,
            CheckoutStep::Payment => CheckoutStep::Delivery,
            other => {
                return Err(ServiceError::InvalidOperation(format!(
                    "cannot go back from step {}",
                    other
                )))
            }
        };
        session.touch();
        Ok(self.render(&session))
    }

    /// Selects a payment method: creates the order, then dispatches to the
    /// matching gateway. Rejected while a previous attempt is in flight.
    ///
    /// A retry after a failure runs the whole submission again and creates
    /// a fresh order; no idempotency key is reused across retries.
    #[instrument(skip(self))]
    pub async fn submit_payment(
        &self,
        session_id: Uuid,
        method: PaymentMethod,
    ) -> Result<CheckoutSessionView, ServiceError> {
        let (cart_id, data) = {
            let mut session = self.session_mut(session_id)?;
            if session.loading {
                return Err(ServiceError::InvalidOperation(
                    "a payment attempt is already in flight".to_string(),
                ));
            }
            if session.step != CheckoutStep::Payment {
                return Err(ServiceError::InvalidOperation(format!(
                    "payment cannot be submitted at step {}",
                    session.step
                )));
            }
            session.error = None;
            session.loading = true;
            session.data.payment_method = Some(method);
            session.touch();
            (session.cart_id, session.data.clone())
        };

        self.event_sender
            .send_or_log(Event::PaymentAttempted { session_id, method })
            .await;

        let result = self.run_attempt(session_id, cart_id, method, &data).await;

        match result {
            Ok((order, outcome)) => self.apply_outcome(session_id, order, outcome).await,
            Err(err) => {
                // loading is guaranteed cleared on the failure path too
                if let Ok(mut session) = self.session_mut(session_id) {
                    session.loading = false;
                    session.error = err.checkout_code();
                    session.touch();
                }
                Err(err)
            }
        }
    }

    async fn run_attempt(
        &self,
        session_id: Uuid,
        cart_id: Uuid,
        method: PaymentMethod,
        data: &CheckoutData,
    ) -> Result<(Order, PaymentOutcome), ServiceError> {
        let cart = self.cart_service.get_cart(cart_id)?;
        if cart.is_empty() {
            return Err(ServiceError::InvalidOperation("Cart is empty".to_string()));
        }

        let shipping = compute_shipping(&self.store, data, cart.total_price());
        let draft = assemble_order(&self.store, &cart, data, method, shipping)?;
        let order = self.order_service.create(draft).await?;

        // The order exists even if the gateway attempt fails: a retry will
        // create another one
        if let Ok(mut session) = self.session_mut(session_id) {
            session.order = Some(order.clone());
        }

        let outcome = self.gateways.gateway(method).attempt(&order, data).await?;
        Ok((order, outcome))
    }

    async fn apply_outcome(
        &self,
        session_id: Uuid,
        order: Order,
        outcome: PaymentOutcome,
    ) -> Result<CheckoutSessionView, ServiceError> {
        match outcome {
            PaymentOutcome::PendingManualAction(ManualAction::OpenLink { url }) => {
                {
                    let mut session = self.session_mut(session_id)?;
                    session.whatsapp_url = Some(url);
                }
                self.finalize(session_id, None).await
            }
            PaymentOutcome::PendingManualAction(ManualAction::BankInstructions(info)) => {
                {
                    let mut session = self.session_mut(session_id)?;
                    session.bank_instructions = Some(info);
                }
                self.finalize(session_id, None).await
            }
            PaymentOutcome::Confirmed { payment_id, status } => {
                self.event_sender
                    .send_or_log(Event::PaymentConfirmed {
                        order_id: order.id.clone(),
                        payment_id: payment_id.clone(),
                    })
                    .await;
                self.finalize(session_id, Some(PaymentConfirmation { payment_id, status }))
                    .await
            }
            PaymentOutcome::Redirect { url } => {
                let view = {
                    let mut session = self.session_mut(session_id)?;
                    session.redirect_url = Some(url);
                    session.loading = false;
                    session.widget = None;
                    session.touch();
                    self.render(&session)
                };
                self.event_sender
                    .send_or_log(Event::PaymentRedirectIssued {
                        order_id: order.id.clone(),
                    })
                    .await;
                // Terminal local handoff: the browser navigates away and
                // completion is reconciled out-of-band
                Ok(view)
            }
            PaymentOutcome::WidgetPending(init) => self.enter_widget_step(session_id, init),
        }
    }

    /// Opens the embedded-widget step and, for the hosted widget, arms the
    /// readiness fallback timer.
    fn enter_widget_step(
        &self,
        session_id: Uuid,
        init: WidgetInit,
    ) -> Result<CheckoutSessionView, ServiceError> {
        let mut session = self.session_mut(session_id)?;

        let gateway_session = match init {
            WidgetInit::HostedWidget => {
                let mut gs = GatewaySession::new(WidgetKind::HostedWidget);
                let latch = gs.latch();
                let service = self.clone();
                gs.arm_fallback_timer(tokio::spawn(async move {
                    tokio::time::sleep(WIDGET_READY_TIMEOUT).await;
                    // Check-and-set before any side effect
                    if latch.trigger() {
                        service.run_widget_fallback(session_id).await;
                    }
                }));
                gs
            }
            WidgetInit::CardIntent {
                client_secret,
                payment_intent_id,
            } => GatewaySession::new(WidgetKind::CardIntent {
                client_secret,
                payment_intent_id,
            }),
        };

        session.widget = Some(gateway_session);
        session.step = CheckoutStep::Widget;
        session.loading = false;
        session.touch();
        Ok(self.render(&session))
    }

    /// The widget signalled readiness: cancel the fallback timer.
    pub fn widget_ready(&self, session_id: Uuid) -> Result<CheckoutSessionView, ServiceError> {
        let mut session = self.session_mut(session_id)?;
        if session.step != CheckoutStep::Widget {
            return Err(ServiceError::InvalidOperation(
                "no widget step is active".to_string(),
            ));
        }
        if let Some(widget) = session.widget.as_mut() {
            widget.mark_ready();
        }
        session.touch();
        Ok(self.render(&session))
    }

    /// The widget reported an error. For the hosted widget this claims the
    /// fallback latch and schedules the redirect after a short grace delay;
    /// for the card form the error surfaces directly.
    pub async fn widget_error(
        &self,
        session_id: Uuid,
        message: Option<String>,
    ) -> Result<CheckoutSessionView, ServiceError> {
        let hosted_latch = {
            let mut session = self.session_mut(session_id)?;
            if session.step != CheckoutStep::Widget {
                return Err(ServiceError::InvalidOperation(
                    "no widget step is active".to_string(),
                ));
            }
            let latch = match session.widget.as_ref() {
                Some(widget) => match &widget.kind {
                    WidgetKind::HostedWidget => Some(widget.latch()),
                    WidgetKind::CardIntent { .. } => None,
                },
                None => {
                    return Err(ServiceError::InvalidOperation(
                        "no widget session".to_string(),
                    ))
                }
            };
            if latch.is_none() {
                session.error = Some(CheckoutErrorCode::PaymentRejected);
                session.touch();
            }
            latch
        };

        if let Some(latch) = hosted_latch {
            warn!(%session_id, ?message, "widget reported an error");
            if latch.trigger() {
                let service = self.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(WIDGET_ERROR_GRACE).await;
                    service.run_widget_fallback(session_id).await;
                });
            }
        }

        self.get_session(session_id)
    }

    /// A submission coming out of the embedded widget.
    #[instrument(skip(self, submission))]
    pub async fn widget_submit(
        &self,
        session_id: Uuid,
        submission: WidgetSubmission,
    ) -> Result<CheckoutSessionView, ServiceError> {
        let (order, stored_intent_id) = {
            let mut session = self.session_mut(session_id)?;
            if session.step != CheckoutStep::Widget {
                return Err(ServiceError::InvalidOperation(
                    "no widget step is active".to_string(),
                ));
            }
            let order = session.order.clone().ok_or_else(|| {
                ServiceError::InvalidOperation("widget step has no order".to_string())
            })?;
            let widget = session.widget.as_mut().ok_or_else(|| {
                ServiceError::InvalidOperation("no widget session".to_string())
            })?;
            if widget.processing {
                return Err(ServiceError::InvalidOperation(
                    "a widget submission is already being processed".to_string(),
                ));
            }
            let stored_intent_id = match (&widget.kind, &submission) {
                (WidgetKind::HostedWidget, WidgetSubmission::HostedForm(_)) => None,
                (
                    WidgetKind::CardIntent {
                        payment_intent_id, ..
                    },
                    WidgetSubmission::CardConfirmation { .. },
                ) => Some(payment_intent_id.clone()),
                _ => {
                    return Err(ServiceError::InvalidOperation(
                        "submission does not match the active widget".to_string(),
                    ))
                }
            };
            widget.processing = true;
            session.touch();
            (order, stored_intent_id)
        };

        let result = match submission {
            WidgetSubmission::HostedForm(form_data) => {
                self.gateways
                    .hosted()
                    .process_widget_payment(&order, &form_data)
                    .await
            }
            WidgetSubmission::CardConfirmation {
                payment_intent_id,
                status,
            } => {
                let intent_id = payment_intent_id
                    .or(stored_intent_id)
                    .ok_or_else(|| {
                        ServiceError::InvalidOperation("no payment intent id".to_string())
                    })?;
                self.gateways
                    .card_intent()
                    .settle(&order, &intent_id, &status)
                    .await
            }
        };

        match result {
            Ok(PaymentOutcome::Confirmed { payment_id, status }) => {
                self.event_sender
                    .send_or_log(Event::PaymentConfirmed {
                        order_id: order.id.clone(),
                        payment_id: payment_id.clone(),
                    })
                    .await;
                self.finalize(session_id, Some(PaymentConfirmation { payment_id, status }))
                    .await
            }
            Ok(other) => {
                error!(%session_id, ?other, "widget submission resolved to a non-confirmation");
                Err(ServiceError::InternalError(
                    "unexpected widget payment outcome".to_string(),
                ))
            }
            Err(err) => {
                if let Ok(mut session) = self.session_mut(session_id) {
                    if let Some(widget) = session.widget.as_mut() {
                        widget.processing = false;
                    }
                    session.error = err.checkout_code();
                    session.touch();
                }
                Err(err)
            }
        }
    }

    /// Runs the redirect fallback for a hosted widget that never became
    /// ready or reported an error. The caller must have claimed the latch;
    /// this path therefore executes at most once per widget session.
    async fn run_widget_fallback(&self, session_id: Uuid) {
        self.event_sender
            .send_or_log(Event::WidgetFallbackTriggered { session_id })
            .await;

        let attempt = {
            let session = match self.sessions.get(&session_id) {
                Some(session) => session,
                None => return, // session abandoned
            };
            if session.step != CheckoutStep::Widget {
                return;
            }
            match (&session.order, &session.widget) {
                (Some(order), Some(widget)) if matches!(widget.kind, WidgetKind::HostedWidget) => {
                    Some((order.clone(), session.data.clone()))
                }
                _ => None,
            }
        };
        let Some((order, data)) = attempt else {
            return;
        };

        info!(%session_id, order_id = %order.id, "falling back to hosted redirect");
        match self.gateways.hosted().redirect_attempt(&order, &data).await {
            Ok(PaymentOutcome::Redirect { url }) => {
                if let Ok(mut session) = self.session_mut(session_id) {
                    session.redirect_url = Some(url);
                    session.widget = None;
                    session.step = CheckoutStep::Payment;
                    session.loading = false;
                    session.touch();
                }
                self.event_sender
                    .send_or_log(Event::PaymentRedirectIssued { order_id: order.id })
                    .await;
            }
            Ok(other) => {
                error!(%session_id, ?other, "fallback resolved to a non-redirect outcome");
            }
            Err(err) => {
                error!(%session_id, %err, "widget fallback failed");
                if let Ok(mut session) = self.session_mut(session_id) {
                    session.error = err.checkout_code();
                    session.loading = false;
                    session.touch();
                }
            }
        }
    }

    /// Records a copy-to-clipboard acknowledgement for a bank field. The
    /// acknowledgement expires after two seconds, evaluated on read.
    pub fn mark_copied(
        &self,
        session_id: Uuid,
        field: BankField,
    ) -> Result<CheckoutSessionView, ServiceError> {
        let mut session = self.session_mut(session_id)?;
        if session.step != CheckoutStep::Confirmation || session.bank_instructions.is_none() {
            return Err(ServiceError::InvalidOperation(
                "no bank instructions are being shown".to_string(),
            ));
        }
        session.copied_field = Some(CopiedField {
            field,
            expires_at: Utc::now() + Duration::seconds(COPY_ACK_WINDOW_SECS),
        });
        session.touch();
        Ok(self.render(&session))
    }

    /// Terminal transition into the confirmation step: clears the cart and
    /// remembers the shopper's data for the next order.
    async fn finalize(
        &self,
        session_id: Uuid,
        confirmation: Option<PaymentConfirmation>,
    ) -> Result<CheckoutSessionView, ServiceError> {
        let (cart_id, order_id, prefill) = {
            let mut session = self.session_mut(session_id)?;
            if let Some(confirmation) = confirmation {
                if let Some(order) = session.order.as_mut() {
                    order.payment_status = PaymentStatus::Paid;
                    order.updated_at = Utc::now();
                }
                session.payment = Some(confirmation);
            }
            session.step = CheckoutStep::Confirmation;
            session.loading = false;
            session.error = None;
            session.widget = None;
            session.touch();

            let prefill = match (&session.data.customer, &session.data.delivery) {
                (Some(customer), Some(delivery)) => Some(CheckoutPrefill {
                    customer: customer.clone(),
                    delivery: delivery.clone(),
                }),
                _ => None,
            };
            let order_id = session.order.as_ref().map(|o| o.id.clone());
            (session.cart_id, order_id, prefill)
        };

        if let Some(prefill) = prefill {
            self.prefill.insert(self.store.id.clone(), prefill);
        }
        if let Err(err) = self.cart_service.clear_cart(cart_id).await {
            warn!(%cart_id, %err, "failed to clear cart after completed order");
        }
        if let Some(order_id) = order_id {
            self.event_sender
                .send_or_log(Event::CheckoutCompleted {
                    session_id,
                    order_id,
                })
                .await;
        }

        self.get_session(session_id)
    }

    async fn step_advanced(&self, session_id: Uuid, step: CheckoutStep) {
        self.event_sender
            .send_or_log(Event::CheckoutStepAdvanced {
                session_id,
                step: step.to_string(),
            })
            .await;
    }

    fn session_mut(
        &self,
        session_id: Uuid,
    ) -> Result<dashmap::mapref::one::RefMut<'_, Uuid, CheckoutSession>, ServiceError> {
        self.sessions
            .get_mut(&session_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Session {} not found", session_id)))
    }

    fn render(&self, session: &CheckoutSession) -> CheckoutSessionView {
        // Totals come from the order once one exists; before that, from the
        // live cart plus the shipping rule
        let (subtotal, shipping, total) = match &session.order {
            Some(order) => (
                order.subtotal,
                order.shipping_cost.unwrap_or(Decimal::ZERO),
                order.total,
            ),
            None => match self.cart_service.get_cart(session.cart_id) {
                Ok(cart) => {
                    let subtotal = cart.total_price();
                    let shipping = compute_shipping(&self.store, &session.data, subtotal);
                    (subtotal, shipping, subtotal + shipping)
                }
                Err(_) => (Decimal::ZERO, Decimal::ZERO, Decimal::ZERO),
            },
        };

        let widget = session.widget.as_ref().map(|w| match &w.kind {
            WidgetKind::HostedWidget => WidgetView {
                kind: "hostedWidget",
                ready: w.ready,
                processing: w.processing,
                client_secret: None,
            },
            WidgetKind::CardIntent { client_secret, .. } => WidgetView {
                kind: "cardIntent",
                ready: w.ready,
                processing: w.processing,
                client_secret: Some(client_secret.clone()),
            },
        });

        let copied_field = session
            .copied_field
            .as_ref()
            .filter(|c| c.expires_at > Utc::now())
            .map(|c| c.field);

        CheckoutSessionView {
            id: session.id,
            cart_id: session.cart_id,
            step: session.step,
            data: session.data.clone(),
            loading: session.loading,
            error: session.error,
            order: session.order.clone(),
            payment: session.payment.clone(),
            whatsapp_url: session.whatsapp_url.clone(),
            redirect_url: session.redirect_url.clone(),
            widget,
            bank_instructions: session.bank_instructions.clone(),
            copied_field,
            subtotal,
            shipping_cost: shipping,
            total,
        }
    }
}
