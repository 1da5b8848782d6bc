use crate::handlers::common::{
    created_response, map_service_error, no_content_response, success_response, validate_input,
};
use crate::{
    errors::ApiError,
    models::cart::{LineExtras, ModifierSelection, Product},
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    routing::{delete, get, post, put},
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for cart endpoints
pub fn carts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(create_cart))
        .route("/:id", get(get_cart))
        .route("/:id/items", post(add_to_cart))
        .route("/:id/items/:line_id", put(update_cart_line))
        .route("/:id/items/:line_id", delete(remove_cart_line))
        .route("/:id/clear", post(clear_cart))
}

/// Create a new cart
async fn create_cart(
    State(state): State<Arc<AppState>>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state.services.cart.create_cart().await;
    Ok(created_response(cart))
}

/// Get a cart with derived totals
async fn get_cart(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state.services.cart.get_cart(id).map_err(map_service_error)?;
    Ok(success_response(CartResponse::from(cart)))
}

/// Add a product to the cart
async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    Path(cart_id): Path<Uuid>,
    Json(payload): Json<AddItemRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    validate_input(&payload)?;

    let product = Product {
        id: payload.product_id,
        name: payload.product_name,
        price: payload.price,
        image: payload.product_image,
    };
    let extras = LineExtras {
        selected_variants: payload.selected_variants.unwrap_or_default(),
        selected_modifiers: payload.selected_modifiers.unwrap_or_default(),
        custom_note: payload.custom_note,
        item_price: payload.item_price,
    };

    let cart = state
        .services
        .cart
        .add_item(cart_id, product, extras)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(CartResponse::from(cart)))
}

/// Update a cart line's quantity (zero removes the line)
async fn update_cart_line(
    State(state): State<Arc<AppState>>,
    Path((cart_id, line_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateQuantityRequest>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    let cart = state
        .services
        .cart
        .update_quantity(cart_id, line_id, payload.quantity)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(CartResponse::from(cart)))
}

/// Remove a cart line
async fn remove_cart_line(
    State(state): State<Arc<AppState>>,
    Path((cart_id, line_id)): Path<(Uuid, Uuid)>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .services
        .cart
        .remove_item(cart_id, line_id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

/// Remove every line from the cart
async fn clear_cart(
    State(state): State<Arc<AppState>>,
    Path(cart_id): Path<Uuid>,
) -> Result<impl axum::response::IntoResponse, ApiError> {
    state
        .services
        .cart
        .clear_cart(cart_id)
        .await
        .map_err(map_service_error)?;

    Ok(no_content_response())
}

// Request/Response DTOs

#[derive(Debug, Deserialize, Validate)]
pub struct AddItemRequest {
    #[validate(length(min = 1))]
    pub product_id: String,
    #[validate(length(min = 1))]
    pub product_name: String,
    pub price: Decimal,
    pub product_image: Option<String>,
    pub selected_variants: Option<BTreeMap<String, String>>,
    pub selected_modifiers: Option<Vec<ModifierSelection>>,
    pub custom_note: Option<String>,
    /// Final per-unit price including modifier surcharges
    pub item_price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, serde::Serialize)]
pub struct CartResponse {
    pub id: Uuid,
    pub lines: Vec<crate::models::CartLine>,
    pub total_items: i32,
    pub total_price: Decimal,
}

impl From<crate::models::Cart> for CartResponse {
    fn from(cart: crate::models::Cart) -> Self {
        let total_items = cart.total_items();
        let total_price = cart.total_price();
        Self {
            id: cart.id,
            lines: cart.lines,
            total_items,
            total_price,
        }
    }
}
