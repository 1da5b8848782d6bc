use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::cart::CartLine;
use super::checkout::{CustomerInfo, DeliveryAddress, DeliveryMethod, PaymentMethod};

/// Serialized field names follow the external order store's contract
/// (camelCase), and every optional field is omitted when absent: the store
/// rejects payloads carrying null/undefined values.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Paid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    Preparing,
    Delivered,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedVariation {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderModifierOption {
    pub name: String,
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderModifier {
    pub group_name: String,
    pub options: Vec<OrderModifierOption>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItem {
    pub product_id: String,
    pub product_name: String,
    pub price: Decimal,
    pub quantity: i32,
    pub item_total: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_variations: Option<Vec<SelectedVariation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_modifiers: Option<Vec<OrderModifier>>,
}

impl OrderItem {
    /// Copies a cart line into an order item, attaching optional fields only
    /// when they carry a value.
    pub fn from_line(line: &CartLine) -> Self {
        let selected_variations = if line.selected_variants.is_empty() {
            None
        } else {
            Some(
                line.selected_variants
                    .iter()
                    .map(|(name, value)| SelectedVariation {
                        name: name.clone(),
                        value: value.clone(),
                    })
                    .collect(),
            )
        };

        let selected_modifiers = if line.selected_modifiers.is_empty() {
            None
        } else {
            Some(
                line.selected_modifiers
                    .iter()
                    .map(|group| OrderModifier {
                        group_name: group.group_name.clone(),
                        options: group
                            .options
                            .iter()
                            .map(|opt| OrderModifierOption {
                                name: opt.name.clone(),
                                price: opt.price,
                            })
                            .collect(),
                    })
                    .collect(),
            )
        };

        Self {
            product_id: line.product_id.clone(),
            product_name: line.product_name.clone(),
            price: line.unit_price,
            quantity: line.quantity,
            item_total: line.line_total(),
            product_image: line.product_image.clone(),
            selected_variations,
            selected_modifiers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderCustomer {
    pub name: String,
    pub phone: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

impl From<&CustomerInfo> for OrderCustomer {
    fn from(customer: &CustomerInfo) -> Self {
        Self {
            name: customer.name.clone(),
            phone: customer.phone.clone(),
            email: customer.email.clone().filter(|e| !e.is_empty()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAddress {
    pub street: String,
    pub city: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl From<&DeliveryAddress> for OrderAddress {
    fn from(address: &DeliveryAddress) -> Self {
        Self {
            street: address.street.clone(),
            city: address.city.clone(),
            state: address.state.clone().filter(|s| !s.is_empty()),
            reference: address.reference.clone().filter(|r| !r.is_empty()),
        }
    }
}

/// Persistence-ready order payload, produced by the assembler and submitted
/// to the external order store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub store_id: String,
    pub items: Vec<OrderItem>,
    pub customer: OrderCustomer,
    pub delivery_method: DeliveryMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<OrderAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub subtotal: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_cost: Option<Decimal>,
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
}

/// What the order store hands back on creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderReceipt {
    pub id: String,
    pub order_number: String,
}

/// A created order: the draft plus the identity assigned by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: String,
    pub order_number: String,
    pub store_id: String,
    pub items: Vec<OrderItem>,
    pub customer: OrderCustomer,
    pub delivery_method: DeliveryMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<OrderAddress>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub subtotal: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_cost: Option<Decimal>,
    pub total: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn from_draft(draft: OrderDraft, receipt: OrderReceipt) -> Self {
        let now = Utc::now();
        Self {
            id: receipt.id,
            order_number: receipt.order_number,
            store_id: draft.store_id,
            items: draft.items,
            customer: draft.customer,
            delivery_method: draft.delivery_method,
            delivery_address: draft.delivery_address,
            notes: draft.notes,
            subtotal: draft.subtotal,
            shipping_cost: draft.shipping_cost,
            total: draft.total,
            payment_method: draft.payment_method,
            payment_status: draft.payment_status,
            status: draft.status,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Marker written before a hosted-gateway redirect so the return page can
/// reconcile the order when the shopper comes back.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingOrder {
    pub order_id: String,
    pub store_id: String,
    pub order_number: String,
}
