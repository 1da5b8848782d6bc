use crate::{
    config::{BusinessType, StoreConfig},
    errors::ServiceError,
    models::{CheckoutData, DeliveryMethod, Order},
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::instrument;

use super::{ManualAction, PaymentGateway, PaymentOutcome};

/// Builds a line-itemized order message and a `wa.me` deep link.
///
/// The link is surfaced for the shopper to tap; automatic navigation is
/// never attempted.
pub struct WhatsAppGateway {
    store: Arc<StoreConfig>,
}

/// Message wording for one language, adjusted per business vertical.
struct MessageLabels {
    new_order: &'static str,
    customer: &'static str,
    name: &'static str,
    phone: &'static str,
    delivery: &'static str,
    pickup: &'static str,
    home_delivery: &'static str,
    reference: &'static str,
    items: &'static str,
    subtotal: &'static str,
    shipping: &'static str,
    total: &'static str,
    notes: &'static str,
}

fn labels(language: &str, business_type: BusinessType) -> MessageLabels {
    if language == "en" {
        MessageLabels {
            new_order: "New Order",
            customer: "Customer",
            name: "Name",
            phone: "Phone",
            delivery: "Delivery",
            pickup: "Store pickup",
            home_delivery: "Home delivery",
            reference: "Ref",
            items: match business_type {
                BusinessType::Food => "Items",
                BusinessType::Beauty => "Services",
                BusinessType::General => "Products",
            },
            subtotal: "Subtotal",
            shipping: "Shipping",
            total: "Total",
            notes: "Notes",
        }
    } else {
        // Spanish default
        MessageLabels {
            new_order: "Nuevo Pedido",
            customer: "Cliente",
            name: "Nombre",
            phone: "Tel",
            delivery: "Entrega",
            pickup: "Retiro en tienda",
            home_delivery: "Delivery",
            reference: "Ref",
            items: match business_type {
                BusinessType::Food => "Pedido",
                BusinessType::Beauty => "Servicios",
                BusinessType::General => "Productos",
            },
            subtotal: "Subtotal",
            shipping: "Envío",
            total: "Total",
            notes: "Notas",
        }
    }
}

fn currency_symbol(currency: &str) -> &'static str {
    match currency {
        "PEN" => "S/",
        _ => "$",
    }
}

/// Strips everything but digits from a phone number.
pub fn normalize_phone(phone: &str) -> String {
    phone.chars().filter(|c| c.is_ascii_digit()).collect()
}

impl WhatsAppGateway {
    pub fn new(store: Arc<StoreConfig>) -> Self {
        Self { store }
    }

    /// Renders the full order message: header with order number, customer
    /// block, delivery summary, numbered items with modifier and variant
    /// annotations, totals, and notes.
    pub fn build_message(&self, order: &Order) -> String {
        let symbol = currency_symbol(&self.store.currency);
        let l = labels(&self.store.language, self.store.business_type);

        let mut message = format!("*{} {}*\n\n", l.new_order, order.order_number);

        message.push_str(&format!("*{}:*\n", l.customer));
        message.push_str(&format!("{}: {}\n", l.name, order.customer.name));
        message.push_str(&format!("{}: {}\n", l.phone, order.customer.phone));
        if let Some(email) = &order.customer.email {
            message.push_str(&format!("Email: {}\n", email));
        }
        message.push('\n');

        message.push_str(&format!("*{}:*\n", l.delivery));
        match order.delivery_method {
            DeliveryMethod::Pickup => {
                message.push_str(l.pickup);
                message.push('\n');
            }
            DeliveryMethod::Delivery => {
                message.push_str(l.home_delivery);
                message.push('\n');
                if let Some(address) = &order.delivery_address {
                    let mut parts = vec![address.street.clone(), address.city.clone()];
                    if let Some(state) = &address.state {
                        parts.push(state.clone());
                    }
                    message.push_str(&parts.join(", "));
                    message.push('\n');
                    if let Some(reference) = &address.reference {
                        message.push_str(&format!("{}: {}\n", l.reference, reference));
                    }
                }
            }
        }
        message.push('\n');

        message.push_str(&format!("*{}:*\n", l.items));
        for item in &order.items {
            message.push_str(&format!(
                "{}x {} - {}{:.2}\n",
                item.quantity, item.product_name, symbol, item.item_total
            ));
            if let Some(modifiers) = &item.selected_modifiers {
                for group in modifiers {
                    for opt in &group.options {
                        if opt.price > Decimal::ZERO {
                            message.push_str(&format!(
                                "   + {} (+{}{:.2})\n",
                                opt.name, symbol, opt.price
                            ));
                        } else {
                            message.push_str(&format!("   + {}\n", opt.name));
                        }
                    }
                }
            }
            if let Some(variations) = &item.selected_variations {
                let rendered = variations
                    .iter()
                    .map(|v| format!("{}: {}", v.name, v.value))
                    .collect::<Vec<_>>()
                    .join(", ");
                message.push_str(&format!("   ({})\n", rendered));
            }
        }
        message.push('\n');

        if let Some(shipping) = order.shipping_cost {
            message.push_str(&format!("{}: {}{:.2}\n", l.subtotal, symbol, order.subtotal));
            message.push_str(&format!("{}: {}{:.2}\n", l.shipping, symbol, shipping));
        }
        message.push_str(&format!("*{}: {}{:.2}*\n", l.total, symbol, order.total));

        if let Some(notes) = &order.notes {
            message.push_str(&format!("\n*{}:* {}\n", l.notes, notes));
        }

        message
    }

    /// Builds the deep link with a digits-only phone and the message
    /// URL-encoded into the `text` parameter.
    pub fn build_link(&self, order: &Order) -> Result<String, ServiceError> {
        let phone = self
            .store
            .whatsapp_phone
            .as_deref()
            .map(normalize_phone)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                ServiceError::GatewayNotConfigured(
                    "store has no WhatsApp phone configured".to_string(),
                )
            })?;

        let message = self.build_message(order);
        Ok(format!(
            "https://wa.me/{}?text={}",
            phone,
            urlencoding::encode(&message)
        ))
    }
}

#[async_trait]
impl PaymentGateway for WhatsAppGateway {
    #[instrument(skip(self, order, _checkout), fields(order_id = %order.id))]
    async fn attempt(
        &self,
        order: &Order,
        _checkout: &CheckoutData,
    ) -> Result<PaymentOutcome, ServiceError> {
        let url = self.build_link(order)?;
        Ok(PaymentOutcome::PendingManualAction(ManualAction::OpenLink {
            url,
        }))
    }
}
