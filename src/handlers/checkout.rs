use crate::handlers::common::{created_response, map_service_error, success_response, validate_input};
use crate::{
    errors::ApiError,
    models::{BankField, CustomerInfo, DeliveryInfo, PaymentMethod},
    services::checkout::WidgetSubmission,
    AppState,
};
use axum::{
    extract::{Json, Path, State},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

/// Creates the router for checkout endpoints
pub fn checkout_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(start_checkout))
        .route("/:session_id", get(get_checkout_session))
        .route("/:session_id", delete(abandon_checkout))
        .route("/:session_id/customer", put(set_customer))
        .route("/:session_id/delivery", put(set_delivery))
        .route("/:session_id/back", post(go_back))
        .route("/:session_id/pay", post(submit_payment))
        .route("/:session_id/widget/ready", post(widget_ready))
        .route("/:session_id/widget/error", post(widget_error))
        .route("/:session_id/widget/submit", post(widget_submit))
        .route("/:session_id/copied", post(mark_copied))
}

/// Start checkout from a cart
async fn start_checkout(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<StartCheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .services
        .checkout
        .start_checkout(payload.cart_id)
        .await
        .map_err(map_service_error)?;

    Ok(created_response(view))
}

/// Current session surface: step, accumulated data, loading/error flags,
/// order, and method-specific sub-state
async fn get_checkout_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .services
        .checkout
        .get_session(session_id)
        .map_err(map_service_error)?;

    Ok(success_response(view))
}

/// Abandon the session, discarding all in-memory checkout state
async fn abandon_checkout(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .services
        .checkout
        .abandon(session_id)
        .map_err(map_service_error)?;

    Ok(axum::http::StatusCode::NO_CONTENT)
}

/// Set customer info and advance to the delivery step
async fn set_customer(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<CustomerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let customer = CustomerInfo {
        name: payload.name,
        phone: payload.phone,
        email: payload.email.filter(|e| !e.is_empty()),
    };

    let view = state
        .services
        .checkout
        .set_customer(session_id, customer)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(view))
}

/// Set delivery info and advance to the payment step
async fn set_delivery(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<DeliveryInfo>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .services
        .checkout
        .set_delivery(session_id, payload)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(view))
}

/// Move one step back
async fn go_back(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .services
        .checkout
        .go_back(session_id)
        .map_err(map_service_error)?;

    Ok(success_response(view))
}

/// Select a payment method: creates the order and dispatches to the
/// matching gateway
async fn submit_payment(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<PayRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .services
        .checkout
        .submit_payment(session_id, payload.method)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(view))
}

/// The embedded widget signalled readiness
async fn widget_ready(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .services
        .checkout
        .widget_ready(session_id)
        .map_err(map_service_error)?;

    Ok(success_response(view))
}

/// The embedded widget reported an error
async fn widget_error(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<WidgetErrorRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .services
        .checkout
        .widget_error(session_id, payload.message)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(view))
}

/// The embedded widget submitted: tokenized form data for the hosted
/// widget, or the client SDK's confirmation result for the card form
async fn widget_submit(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<WidgetSubmitRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let submission = match (payload.form_data, payload.payment_intent_status) {
        (Some(form_data), None) => WidgetSubmission::HostedForm(form_data),
        (None, Some(status)) => WidgetSubmission::CardConfirmation {
            payment_intent_id: payload.payment_intent_id,
            status,
        },
        _ => {
            return Err(ApiError::BadRequest(
                "provide either form_data or payment_intent_status".to_string(),
            ))
        }
    };

    let view = state
        .services
        .checkout
        .widget_submit(session_id, submission)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(view))
}

/// Record a copy-to-clipboard acknowledgement on the bank panel
async fn mark_copied(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<Uuid>,
    Json(payload): Json<CopiedRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state
        .services
        .checkout
        .mark_copied(session_id, payload.field)
        .map_err(map_service_error)?;

    Ok(success_response(view))
}

// Request DTOs

#[derive(Debug, Deserialize)]
pub struct StartCheckoutRequest {
    pub cart_id: Uuid,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CustomerRequest {
    pub name: String,
    pub phone: String,
    #[validate(email)]
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PayRequest {
    pub method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct WidgetErrorRequest {
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct WidgetSubmitRequest {
    pub form_data: Option<serde_json::Value>,
    pub payment_intent_id: Option<String>,
    pub payment_intent_status: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CopiedRequest {
    pub field: BankField,
}
