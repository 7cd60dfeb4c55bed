//! API server entry point.

use std::error::Error;
use std::sync::Arc;

use api::auth::{Authenticator, StaticTokenAuthenticator};
use api::config::{Config, LogFormat};
use api::worker::spawn_expiry_worker;
use api::{AppState, create_app};
use settlement::{
    HttpGatewayConfig, HttpPaymentGateway, InMemoryPaymentGateway, PaymentGateway,
    SettlementConfig, SignatureVerifier,
};
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryMarketStore, MarketStore, PostgresMarketStore};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let registry = tracing_subscriber::registry().with(filter);
    match config.log_format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

async fn open_store(config: &Config) -> Result<Arc<dyn MarketStore>, Box<dyn Error>> {
    let Some(url) = &config.database_url else {
        tracing::warn!("DATABASE_URL not set, using the in-memory store");
        return Ok(Arc::new(InMemoryMarketStore::new()));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url.reveal())
        .await?;
    let store = PostgresMarketStore::new(pool);
    store.run_migrations().await?;
    tracing::info!("connected to PostgreSQL and applied migrations");
    Ok(Arc::new(store))
}

fn open_gateway(
    config: &Config,
    verifier: &SignatureVerifier,
) -> Result<Arc<dyn PaymentGateway>, Box<dyn Error>> {
    match &config.gateway {
        Some(settings) => {
            let gateway = HttpPaymentGateway::new(HttpGatewayConfig {
                base_url: settings.url.clone(),
                key_id: settings.key_id.clone(),
                key_secret: settings.key_secret.clone(),
                timeout: config.gateway_timeout,
            })?;
            tracing::info!(url = %settings.url, "using HTTP payment gateway");
            Ok(Arc::new(gateway))
        }
        None => {
            tracing::warn!("PAYMENT_GATEWAY_URL not set, using the sandbox payment gateway");
            Ok(Arc::new(InMemoryPaymentGateway::new(verifier.clone())))
        }
    }
}

async fn run(config: Config) -> Result<(), Box<dyn Error>> {
    // 1. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new().install_recorder()?;

    // 2. Storage, payment gateway and callback verification
    let store = open_store(&config).await?;
    let verifier = SignatureVerifier::new(&config.webhook_secret)?;
    let gateway = open_gateway(&config, &verifier)?;

    let authenticator = StaticTokenAuthenticator::new(&config.api_tokens);
    if authenticator.is_empty() {
        tracing::warn!("API_TOKENS is empty, every authenticated request will be rejected");
    }
    let authenticator: Arc<dyn Authenticator> = Arc::new(authenticator);

    let state = Arc::new(AppState::new(
        store,
        gateway,
        verifier,
        SettlementConfig {
            currency: config.currency,
            gateway_timeout: config.gateway_timeout,
        },
        authenticator,
    ));

    // 3. Background expiry of unpaid orders
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = spawn_expiry_worker(
        state.settlement.clone(),
        config.order_ttl,
        config.expiry_sweep_interval,
        shutdown_rx,
    );

    // 4. Serve until a shutdown signal arrives
    let app = create_app(state, metrics_handle);
    let addr = config.addr();
    tracing::info!(%addr, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = shutdown_tx.send(true);
    if let Err(e) = worker.await {
        tracing::warn!(error = %e, "order expiry worker panicked");
    }

    tracing::info!("server shut down gracefully");
    Ok(())
}

#[tokio::main]
async fn main() {
    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    init_tracing(&config);

    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "server failed");
        std::process::exit(1);
    }
}
