pub mod carts;
pub mod checkout;
pub mod common;

use crate::services::{CartService, CheckoutService, OrderService};
use std::sync::Arc;

/// Services shared across the handler layer.
#[derive(Clone)]
pub struct AppServices {
    pub cart: Arc<CartService>,
    pub checkout: Arc<CheckoutService>,
    pub orders: Arc<OrderService>,
}
