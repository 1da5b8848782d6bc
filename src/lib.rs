//! Storefront Checkout Library
//!
//! Checkout orchestration for a catalog storefront: an in-memory cart
//! registry, an order assembler targeting an external order store, payment
//! strategies behind a uniform gateway contract, and the step-driven
//! checkout state machine that ties them together.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod cache;
pub mod config;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod models;
pub mod services;

use axum::{response::Json, routing::get, Router};
use chrono::Utc;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{compression::CompressionLayer, cors::CorsLayer, trace::TraceLayer};

pub use handlers::AppServices;

/// Shared application state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::AppConfig>,
    pub event_sender: events::EventSender,
    pub services: AppServices,
}

/// Liveness probe
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Assembles the application router with all resource routes and the
/// shared middleware stack.
pub fn app_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1/carts", handlers::carts::carts_routes())
        .nest("/api/v1/checkout", handlers::checkout::checkout_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(CompressionLayer::new()),
        )
        .with_state(state)
}
