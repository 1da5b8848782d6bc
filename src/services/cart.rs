use crate::{
    errors::ServiceError,
    events::{Event, EventSender},
    models::cart::{identity_key, Cart, CartLine, LineExtras, Product},
};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

/// Shopping cart service.
///
/// Carts live in an in-memory registry for the duration of a shopper
/// session; the order store only ever sees the snapshot taken at payment
/// submission. Mutations are synchronous; totals are pure derivations over
/// the line list, recomputed on every read.
///
/// Adding a product whose configuration (variants + modifier options)
/// matches an existing line increments that line instead of appending:
/// two lines with equal identity keys never coexist.
#[derive(Clone)]
pub struct CartService {
    carts: Arc<DashMap<Uuid, Cart>>,
    event_sender: Arc<EventSender>,
}

impl CartService {
    pub fn new(event_sender: Arc<EventSender>) -> Self {
        Self {
            carts: Arc::new(DashMap::new()),
            event_sender,
        }
    }

    /// Creates a new empty cart.
    #[instrument(skip(self))]
    pub async fn create_cart(&self) -> Cart {
        let cart = Cart::new(Uuid::new_v4());
        self.carts.insert(cart.id, cart.clone());

        self.event_sender
            .send_or_log(Event::CartCreated(cart.id))
            .await;

        info!("Created cart: {}", cart.id);
        cart
    }

    /// Adds a product to the cart, merging with an existing line when the
    /// configuration matches.
    ///
    /// On merge the quantity goes up by one and the line's price and
    /// selections are left untouched. A new line starts at quantity 1 with
    /// `unit_price = extras.item_price` (which already includes modifier
    /// surcharges) falling back to the catalog price.
    #[instrument(skip(self, product, extras), fields(product_id = %product.id))]
    pub async fn add_item(
        &self,
        cart_id: Uuid,
        product: Product,
        extras: LineExtras,
    ) -> Result<Cart, ServiceError> {
        let key = identity_key(
            &product.id,
            &extras.selected_variants,
            &extras.selected_modifiers,
        );

        let (cart, line_id) = {
            let mut entry = self
                .carts
                .get_mut(&cart_id)
                .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

            let line_id = match entry.lines.iter_mut().find(|l| l.identity_key() == key) {
                Some(existing) => {
                    existing.quantity += 1;
                    existing.id
                }
                None => {
                    let line = CartLine {
                        id: Uuid::new_v4(),
                        product_id: product.id,
                        product_name: product.name,
                        product_image: product.image,
                        quantity: 1,
                        unit_price: extras.item_price.unwrap_or(product.price),
                        selected_variants: extras.selected_variants,
                        selected_modifiers: extras.selected_modifiers,
                        custom_note: extras.custom_note,
                    };
                    let id = line.id;
                    entry.lines.push(line);
                    id
                }
            };

            entry.updated_at = Utc::now();
            (entry.clone(), line_id)
        };

        self.event_sender
            .send_or_log(Event::CartItemAdded { cart_id, line_id })
            .await;

        Ok(cart)
    }

    /// Updates a line's quantity. Zero or negative removes the line; a
    /// zero-quantity line is never kept.
    #[instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        cart_id: Uuid,
        line_id: Uuid,
        quantity: i32,
    ) -> Result<Cart, ServiceError> {
        let (cart, removed) = {
            let mut entry = self
                .carts
                .get_mut(&cart_id)
                .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;

            if quantity <= 0 {
                let before = entry.lines.len();
                entry.lines.retain(|l| l.id != line_id);
                if entry.lines.len() == before {
                    return Err(ServiceError::NotFound(format!(
                        "Cart line {} not found",
                        line_id
                    )));
                }
                entry.updated_at = Utc::now();
                (entry.clone(), true)
            } else {
                let line = entry
                    .lines
                    .iter_mut()
                    .find(|l| l.id == line_id)
                    .ok_or_else(|| {
                        ServiceError::NotFound(format!("Cart line {} not found", line_id))
                    })?;
                line.quantity = quantity;
                entry.updated_at = Utc::now();
                (entry.clone(), false)
            }
        };

        let event = if removed {
            Event::CartItemRemoved { cart_id, line_id }
        } else {
            Event::CartUpdated(cart_id)
        };
        self.event_sender.send_or_log(event).await;

        Ok(cart)
    }

    /// Removes a line outright.
    pub async fn remove_item(&self, cart_id: Uuid, line_id: Uuid) -> Result<Cart, ServiceError> {
        self.update_quantity(cart_id, line_id, 0).await
    }

    /// Drops every line from the cart. The cart itself stays usable.
    #[instrument(skip(self))]
    pub async fn clear_cart(&self, cart_id: Uuid) -> Result<(), ServiceError> {
        {
            let mut entry = self
                .carts
                .get_mut(&cart_id)
                .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))?;
            entry.lines.clear();
            entry.updated_at = Utc::now();
        }

        self.event_sender
            .send_or_log(Event::CartCleared(cart_id))
            .await;

        info!("Cleared cart: {}", cart_id);
        Ok(())
    }

    /// Returns a snapshot of the cart.
    pub fn get_cart(&self, cart_id: Uuid) -> Result<Cart, ServiceError> {
        self.carts
            .get(&cart_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| ServiceError::NotFound(format!("Cart {} not found", cart_id)))
    }
}
