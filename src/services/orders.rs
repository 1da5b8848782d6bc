use crate::{
    config::StoreConfig,
    errors::ServiceError,
    events::{Event, EventSender},
    models::{
        Cart, CheckoutData, DeliveryMethod, Order, OrderAddress, OrderCustomer, OrderDraft,
        OrderItem, OrderReceipt, OrderStatus, PaymentMethod, PaymentStatus,
    },
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};

/// Order persistence backend.
///
/// The store is the authority for order identity: it assigns the id and the
/// human-facing order number. It rejects payloads containing null-valued
/// keys, which is why the draft serializer omits absent fields entirely.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn create(&self, store_id: &str, draft: &OrderDraft)
        -> Result<OrderReceipt, ServiceError>;
}

/// HTTP implementation of [`OrderStore`].
pub struct HttpOrderStore {
    client: reqwest::Client,
    base_url: String,
}

impl HttpOrderStore {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl OrderStore for HttpOrderStore {
    async fn create(
        &self,
        store_id: &str,
        draft: &OrderDraft,
    ) -> Result<OrderReceipt, ServiceError> {
        let url = format!("{}/stores/{}/orders", self.base_url, store_id);
        let response = self.client.post(&url).json(draft).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::ExternalServiceError(format!(
                "order store returned {}: {}",
                status, body
            )));
        }

        Ok(response.json().await?)
    }
}

/// Converts a cart snapshot plus collected checkout data into a
/// persistence-ready order payload.
///
/// Optional fields are attached only when they carry a value: variant and
/// modifier selections when non-empty, the product image when present, the
/// delivery address only for home delivery (with a missing reference
/// stripped), notes only when observations were entered, and the shipping
/// cost only when above zero.
///
/// Returns `MissingCheckoutData` when customer or delivery data is absent.
/// The state machine guarantees both are populated before payment dispatch,
/// so hitting this is a programming error, not a user-facing condition.
pub fn assemble_order(
    store: &StoreConfig,
    cart: &Cart,
    data: &CheckoutData,
    payment_method: PaymentMethod,
    shipping_cost: Decimal,
) -> Result<OrderDraft, ServiceError> {
    let customer = data
        .customer
        .as_ref()
        .ok_or(ServiceError::MissingCheckoutData("customer"))?;
    let delivery = data
        .delivery
        .as_ref()
        .ok_or(ServiceError::MissingCheckoutData("delivery"))?;

    let items: Vec<OrderItem> = cart.lines.iter().map(OrderItem::from_line).collect();
    let subtotal = cart.total_price();
    let total = subtotal + shipping_cost;

    let delivery_address = match (delivery.method, delivery.address.as_ref()) {
        (DeliveryMethod::Delivery, Some(address)) => Some(OrderAddress::from(address)),
        _ => None,
    };

    let notes = delivery
        .observations
        .clone()
        .filter(|obs| !obs.trim().is_empty());

    Ok(OrderDraft {
        store_id: store.id.clone(),
        items,
        customer: OrderCustomer::from(customer),
        delivery_method: delivery.method,
        delivery_address,
        notes,
        subtotal,
        shipping_cost: (shipping_cost > Decimal::ZERO).then_some(shipping_cost),
        total,
        payment_method,
        payment_status: PaymentStatus::Pending,
        status: OrderStatus::Pending,
    })
}

/// Creates orders against the external store and publishes lifecycle events.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn OrderStore>,
    event_sender: Arc<EventSender>,
}

impl OrderService {
    pub fn new(store: Arc<dyn OrderStore>, event_sender: Arc<EventSender>) -> Self {
        Self {
            store,
            event_sender,
        }
    }

    /// Submits a draft to the order store and returns the created order.
    ///
    /// Each call creates a new order: retried submissions intentionally do
    /// not reuse the previous one.
    #[instrument(skip(self, draft), fields(store_id = %draft.store_id))]
    pub async fn create(&self, draft: OrderDraft) -> Result<Order, ServiceError> {
        let receipt = self.store.create(&draft.store_id, &draft).await?;

        self.event_sender
            .send_or_log(Event::OrderCreated {
                order_id: receipt.id.clone(),
                order_number: receipt.order_number.clone(),
            })
            .await;

        info!(order_id = %receipt.id, order_number = %receipt.order_number, "order persisted");
        Ok(Order::from_draft(draft, receipt))
    }
}
