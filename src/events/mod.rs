use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::models::PaymentMethod;

/// Events emitted by the cart and checkout services.
///
/// Events are observational: failures to deliver them are logged and never
/// fail the operation that produced them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    // Cart events
    CartCreated(Uuid),
    CartItemAdded { cart_id: Uuid, line_id: Uuid },
    CartItemRemoved { cart_id: Uuid, line_id: Uuid },
    CartUpdated(Uuid),
    CartCleared(Uuid),

    // Checkout events
    CheckoutStarted { cart_id: Uuid, session_id: Uuid },
    CheckoutStepAdvanced { session_id: Uuid, step: String },
    CheckoutCompleted { session_id: Uuid, order_id: String },

    // Order / payment events
    OrderCreated { order_id: String, order_number: String },
    PaymentAttempted { session_id: Uuid, method: PaymentMethod },
    PaymentConfirmed { order_id: String, payment_id: String },
    PaymentRedirectIssued { order_id: String },
    WidgetFallbackTriggered { session_id: Uuid },
}

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously.
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event, logging instead of failing when the channel is gone.
    pub async fn send_or_log(&self, event: Event) {
        if let Err(e) = self.send(event).await {
            error!("Event delivery failed: {}", e);
        }
    }
}

/// Processes incoming events. Spawned once from `main`; today this loop only
/// records activity, but it is the seam where webhooks or notification
/// fan-out would attach.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::OrderCreated {
                order_id,
                order_number,
            } => {
                info!(%order_id, %order_number, "order created");
            }
            Event::PaymentConfirmed {
                order_id,
                payment_id,
            } => {
                info!(%order_id, %payment_id, "payment confirmed");
            }
            Event::WidgetFallbackTriggered { session_id } => {
                info!(%session_id, "widget fallback triggered");
            }
            other => {
                info!("Received event: {:?}", other);
            }
        }
    }

    info!("Event processing loop stopped");
}
