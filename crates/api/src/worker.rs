//! Background sweep that expires unpaid orders.

use std::time::Duration;

use settlement::{PaymentGateway, SettlementService};
use store::MarketStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Runs `expire_stale_orders(ttl)` every `interval` until `shutdown` flips to
/// `true` or its sender is dropped.
///
/// A failed sweep is logged and retried on the next tick.
pub fn spawn_expiry_worker<S, G>(
    settlement: SettlementService<S, G>,
    ttl: Duration,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    S: MarketStore + ?Sized + 'static,
    G: PaymentGateway + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(?ttl, ?interval, "order expiry worker started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match settlement.expire_stale_orders(ttl).await {
                        Ok(expired) if !expired.is_empty() => {
                            tracing::info!(count = expired.len(), "expired stale orders");
                        }
                        Ok(_) => {}
                        Err(e) => tracing::warn!(error = %e, "order expiry sweep failed"),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("order expiry worker stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::Utc;
    use common::Secret;
    use domain::{
        CompostListing, Currency, Money, NewCompostListing, OrderStatus, Principal, Quantity,
        Role, UserId,
    };
    use settlement::{
        InMemoryPaymentGateway, OrderRequest, SettlementConfig, SignatureVerifier,
    };
    use store::InMemoryMarketStore;

    #[tokio::test]
    async fn expires_orders_and_stops_on_shutdown() {
        let verifier = SignatureVerifier::new(&Secret::new("whsec".to_string())).unwrap();
        let store = Arc::new(InMemoryMarketStore::new());
        let gateway = Arc::new(InMemoryPaymentGateway::new(verifier.clone()));
        let service = SettlementService::new(
            store.clone(),
            gateway,
            verifier,
            SettlementConfig::default(),
        );

        let listing = CompostListing::create(
            UserId::new(),
            NewCompostListing {
                title: "Compost".to_string(),
                description: None,
                price_per_kg: Money::from_major(10.0, Currency::Inr).unwrap(),
                quantity_available: Quantity::from_kg(5.0).unwrap(),
            },
            Utc::now(),
        )
        .unwrap();
        store.insert_compost_listing(&listing).await.unwrap();
        let buyer = Principal::new(UserId::new(), Role::Buyer);
        let order = service
            .create_order(
                &buyer,
                OrderRequest::new(listing.id, Quantity::from_kg(1.0).unwrap()),
            )
            .await
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = spawn_expiry_worker(
            service,
            Duration::ZERO,
            Duration::from_millis(10),
            rx,
        );

        let mut status = OrderStatus::Pending;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            status = store.get_order(order.id).await.unwrap().unwrap().status;
            if status == OrderStatus::Cancelled {
                break;
            }
        }
        assert_eq!(status, OrderStatus::Cancelled);

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("worker did not stop")
            .unwrap();
    }
}
