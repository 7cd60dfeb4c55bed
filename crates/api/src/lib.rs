//! HTTP API server for the compost marketplace.
//!
//! Exposes the listing registry, matching engine and settlement service as
//! JSON endpoints behind bearer-token authentication, with structured
//! logging (tracing) and Prometheus metrics.

pub mod auth;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod worker;

use std::sync::Arc;

use axum::Router;
use axum::routing::{MethodRouter, get, post, put};
use domain::Currency;
use listings::{ListingRegistry, MatchingEngine};
use metrics_exporter_prometheus::PrometheusHandle;
use settlement::{PaymentGateway, SettlementConfig, SettlementService, SignatureVerifier};
use store::MarketStore;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use auth::Authenticator;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub registry: ListingRegistry<dyn MarketStore>,
    pub matching: MatchingEngine<dyn MarketStore>,
    pub settlement: SettlementService<dyn MarketStore, dyn PaymentGateway>,
    pub authenticator: Arc<dyn Authenticator>,
}

impl AppState {
    /// Wires the services over one store and one payment gateway.
    pub fn new(
        store: Arc<dyn MarketStore>,
        gateway: Arc<dyn PaymentGateway>,
        verifier: SignatureVerifier,
        settlement_config: SettlementConfig,
        authenticator: Arc<dyn Authenticator>,
    ) -> Self {
        Self {
            registry: ListingRegistry::new(store.clone()),
            matching: MatchingEngine::new(store.clone()),
            settlement: SettlementService::new(store, gateway, verifier, settlement_config),
            authenticator,
        }
    }

    /// Currency prices are quoted and collected in.
    pub fn currency(&self) -> Currency {
        self.settlement.config().currency
    }
}

/// Registers `handler` at `path` and at its trailing-slash twin.
fn route_both<S>(router: Router<S>, path: &str, handler: MethodRouter<S>) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    let twin = match path.strip_suffix('/') {
        Some(bare) => bare.to_string(),
        None => format!("{path}/"),
    };
    router.route(path, handler.clone()).route(&twin, handler)
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    use routes::{compost_listings, composters, health, orders, payments, waste_listings};

    let metrics_router = route_both(
        Router::new(),
        "/metrics",
        get(routes::metrics::render),
    )
    .with_state(metrics_handle);

    let api_routes: Vec<(&str, MethodRouter<Arc<AppState>>)> = vec![
        ("/health", get(health::check)),
        (
            "/waste-listings",
            get(waste_listings::list).post(waste_listings::create),
        ),
        ("/waste-listings/{id}", get(waste_listings::get)),
        (
            "/waste-listings/{id}/assign-composter",
            put(waste_listings::assign_composter),
        ),
        (
            "/waste-listings/{id}/update-status",
            put(waste_listings::update_status),
        ),
        ("/waste-listings/{id}/cancel", put(waste_listings::cancel)),
        (
            "/waste-listings/{id}/recommended-composters",
            get(waste_listings::recommended_composters),
        ),
        (
            "/compost-listings",
            get(compost_listings::list).post(compost_listings::create),
        ),
        ("/compost-listings/{id}", get(compost_listings::get)),
        ("/composters/me/profile", put(composters::put_profile)),
        (
            "/create-payment-order",
            post(payments::create_payment_order),
        ),
        ("/verify-payment", post(payments::verify_payment)),
        ("/orders", post(orders::create)),
        ("/orders/{id}", get(orders::get)),
        ("/users/me/orders", get(orders::list_mine)),
    ];

    api_routes
        .into_iter()
        .fold(Router::new(), |router, (path, handler)| {
            route_both(router, path, handler)
        })
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
