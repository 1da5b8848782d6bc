use std::{net::SocketAddr, sync::Arc, time::Duration};

use anyhow::Context;
use chrono::Duration as ChronoDuration;
use tokio::{signal, sync::mpsc};
use tracing::info;

use storefront_checkout as app;

use app::services::payments::{
    CardIntentGateway, GatewayRegistry, HostedCheckoutGateway, HttpPaymentIntentApi,
    HttpPreferenceApi, HttpWidgetPaymentProcessor, TransferGateway, WhatsAppGateway,
};
use app::services::{CartService, CheckoutService, OrderService};

/// Remembered customer data expires after 30 days.
const PREFILL_TTL_DAYS: i64 = 30;
/// Pending-order redirect markers are kept for a day.
const PENDING_ORDER_TTL_HOURS: i64 = 24;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = app::config::load_config()?;
    app::config::init_tracing(cfg.log_level(), cfg.log_json);

    let config = Arc::new(cfg);
    let store = Arc::new(config.store.clone());

    // Event channel and processing loop
    let (event_tx, event_rx) = mpsc::channel(1024);
    let event_sender = app::events::EventSender::new(event_tx);
    tokio::spawn(app::events::process_events(event_rx));
    let event_sender = Arc::new(event_sender);

    // Outbound HTTP client shared by all collaborators
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.collaborators.http_timeout_secs))
        .build()
        .context("building outbound HTTP client")?;

    // Collaborators
    let order_store = Arc::new(app::services::orders::HttpOrderStore::new(
        http_client.clone(),
        config.collaborators.order_store_url.clone(),
    ));
    let hosted_api_url = config
        .store
        .payments
        .hosted
        .as_ref()
        .map(|h| h.api_url.clone())
        .unwrap_or_default();
    let preference_api = Arc::new(HttpPreferenceApi::new(
        http_client.clone(),
        hosted_api_url.clone(),
    ));
    let widget_processor = Arc::new(HttpWidgetPaymentProcessor::new(
        http_client.clone(),
        hosted_api_url,
    ));
    let intent_api_url = config
        .store
        .payments
        .card_intent
        .as_ref()
        .map(|c| c.api_url.clone())
        .unwrap_or_default();
    let intent_api = Arc::new(HttpPaymentIntentApi::new(http_client, intent_api_url));

    // Ephemeral caches (browser storage analogues)
    let pending_orders = Arc::new(app::cache::TtlCache::new(ChronoDuration::hours(
        PENDING_ORDER_TTL_HOURS,
    )));
    let prefill = Arc::new(app::cache::TtlCache::new(ChronoDuration::days(
        PREFILL_TTL_DAYS,
    )));

    // Payment gateways
    let gateways = Arc::new(GatewayRegistry::new(
        WhatsAppGateway::new(store.clone()),
        HostedCheckoutGateway::new(
            store.clone(),
            preference_api,
            widget_processor,
            pending_orders,
        ),
        CardIntentGateway::new(store.clone(), intent_api),
        TransferGateway::new(store.clone()),
    ));

    // Services
    let cart_service = Arc::new(CartService::new(event_sender.clone()));
    let order_service = Arc::new(OrderService::new(order_store, event_sender.clone()));
    let checkout_service = Arc::new(CheckoutService::new(
        cart_service.clone(),
        order_service.clone(),
        gateways,
        prefill,
        event_sender.clone(),
        store,
    ));

    let state = Arc::new(app::AppState {
        config: config.clone(),
        event_sender: (*event_sender).clone(),
        services: app::AppServices {
            cart: cart_service,
            checkout: checkout_service,
            orders: order_service,
        },
    });

    let router = app::app_router(state);

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .context("parsing listen address")?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("binding listen address")?;

    info!(%addr, store = %config.store.id, "storefront checkout listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving HTTP")?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
