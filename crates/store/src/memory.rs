use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    CompostListing, CompostListingId, ComposterProfile, ListingState, Order, OrderId, OrderStatus,
    PaymentCapture, SettlementPlan, UserId, WasteListing, WasteListingId, plan_settlement,
};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{MarketStore, Page, Settlement},
};

/// In-memory marketplace store.
///
/// Each table sits behind its own lock. `settle` is the only operation that
/// holds two at once and always takes `orders` before `compost_listings`.
#[derive(Clone, Default)]
pub struct InMemoryMarketStore {
    waste_listings: Arc<RwLock<HashMap<WasteListingId, WasteListing>>>,
    compost_listings: Arc<RwLock<HashMap<CompostListingId, CompostListing>>>,
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
    profiles: Arc<RwLock<HashMap<UserId, ComposterProfile>>>,
}

impl InMemoryMarketStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }

    /// Clears every table.
    pub async fn clear(&self) {
        self.waste_listings.write().await.clear();
        self.compost_listings.write().await.clear();
        self.orders.write().await.clear();
        self.profiles.write().await.clear();
    }
}

fn paginate<T, K>(mut rows: Vec<&T>, page: Page, key: K) -> Vec<T>
where
    T: Clone,
    K: Fn(&T) -> (DateTime<Utc>, uuid::Uuid),
{
    rows.sort_by_key(|row| key(row));
    rows.into_iter()
        .skip(page.offset)
        .take(page.limit)
        .cloned()
        .collect()
}

#[async_trait]
impl MarketStore for InMemoryMarketStore {
    async fn insert_waste_listing(&self, listing: &WasteListing) -> Result<()> {
        let mut table = self.waste_listings.write().await;
        if table.contains_key(&listing.id) {
            return Err(StoreError::conflict(
                "waste listing",
                listing.id,
                "duplicate id",
            ));
        }
        table.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn get_waste_listing(&self, id: WasteListingId) -> Result<Option<WasteListing>> {
        Ok(self.waste_listings.read().await.get(&id).cloned())
    }

    async fn list_waste_listings(&self, page: Page) -> Result<Vec<WasteListing>> {
        let table = self.waste_listings.read().await;
        Ok(paginate(table.values().collect(), page, |l| {
            (l.created_at, l.id.as_uuid())
        }))
    }

    async fn compare_and_swap_waste_listing(
        &self,
        id: WasteListingId,
        expected: ListingState,
        next: ListingState,
        now: DateTime<Utc>,
    ) -> Result<Option<WasteListing>> {
        let mut table = self.waste_listings.write().await;
        let listing = table
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("waste listing", id))?;

        if listing.state != expected {
            return Ok(None);
        }
        listing.state = next;
        listing.updated_at = now;
        Ok(Some(listing.clone()))
    }

    async fn insert_compost_listing(&self, listing: &CompostListing) -> Result<()> {
        let mut table = self.compost_listings.write().await;
        if table.contains_key(&listing.id) {
            return Err(StoreError::conflict(
                "compost listing",
                listing.id,
                "duplicate id",
            ));
        }
        table.insert(listing.id, listing.clone());
        Ok(())
    }

    async fn get_compost_listing(&self, id: CompostListingId) -> Result<Option<CompostListing>> {
        Ok(self.compost_listings.read().await.get(&id).cloned())
    }

    async fn list_compost_listings(&self, page: Page) -> Result<Vec<CompostListing>> {
        let table = self.compost_listings.read().await;
        Ok(paginate(table.values().collect(), page, |l| {
            (l.created_at, l.id.as_uuid())
        }))
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id)
            || orders.values().any(|o| o.intent_id() == order.intent_id())
        {
            return Err(StoreError::conflict(
                "order",
                order.id,
                format!("an order already exists for intent {}", order.intent_id()),
            ));
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn find_order_by_intent(&self, intent_id: &str) -> Result<Option<Order>> {
        Ok(self
            .orders
            .read()
            .await
            .values()
            .find(|o| o.intent_id() == intent_id)
            .cloned())
    }

    async fn list_orders_for_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut mine: Vec<_> = orders
            .values()
            .filter(|o| o.buyer_id == buyer_id)
            .cloned()
            .collect();
        mine.sort_by_key(|o| (o.created_at, o.id.as_uuid()));
        Ok(mine)
    }

    async fn put_composter_profile(&self, profile: &ComposterProfile) -> Result<()> {
        self.profiles
            .write()
            .await
            .insert(profile.composter_id, profile.clone());
        Ok(())
    }

    async fn list_composter_profiles(&self) -> Result<Vec<ComposterProfile>> {
        Ok(self.profiles.read().await.values().cloned().collect())
    }

    async fn settle(
        &self,
        intent_id: &str,
        capture: &PaymentCapture,
        now: DateTime<Utc>,
    ) -> Result<Settlement> {
        let mut orders = self.orders.write().await;
        let mut compost = self.compost_listings.write().await;

        if let Some(done) = orders.values().find(|o| {
            o.status == OrderStatus::Completed
                && o.payment_id() == Some(capture.payment_id.as_str())
        }) {
            return Ok(Settlement::Replayed(done.clone()));
        }

        let order = orders
            .values()
            .find(|o| o.intent_id() == intent_id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("order for intent", intent_id))?;
        let listing = compost
            .get_mut(&order.compost_listing_id)
            .ok_or_else(|| StoreError::not_found("compost listing", order.compost_listing_id))?;

        match plan_settlement(&order, capture, listing.quantity_available, now) {
            SettlementPlan::Commit { order, remaining } => {
                listing.quantity_available = remaining;
                orders.insert(order.id, order.clone());
                Ok(Settlement::Committed(order))
            }
            SettlementPlan::Reject { order } => {
                orders.insert(order.id, order.clone());
                Ok(Settlement::Rejected(order))
            }
            SettlementPlan::Replay { order } => Ok(Settlement::Replayed(order)),
            SettlementPlan::Conflict { order } => Err(StoreError::conflict(
                "order",
                order.id,
                "already settled by a different payment",
            )),
        }
    }

    async fn cancel_stale_orders(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let mut orders = self.orders.write().await;
        let mut expired = Vec::new();
        for order in orders.values_mut() {
            if order.is_stale(cutoff)
                && let Some(cancelled) = order.expire(now)
            {
                *order = cancelled;
                expired.push(order.clone());
            }
        }
        expired.sort_by_key(|o| (o.created_at, o.id.as_uuid()));
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::{
        Currency, Money, NewCompostListing, NewWasteListing, PickupLocation, Quantity,
        ReconciliationReason, WasteListingStatus, WasteType,
    };

    fn waste_listing(owner: UserId) -> WasteListing {
        WasteListing::create(
            owner,
            NewWasteListing {
                title: "Garden clippings".to_string(),
                description: None,
                quantity: Quantity::from_kg(20.0).unwrap(),
                waste_type: WasteType::Organic,
                pickup: PickupLocation::new("Indiranagar"),
            },
            Utc::now(),
        )
        .unwrap()
    }

    async fn compost_with_stock(store: &InMemoryMarketStore, kg: f64) -> CompostListing {
        let listing = CompostListing::create(
            UserId::new(),
            NewCompostListing {
                title: "Compost".to_string(),
                description: None,
                price_per_kg: Money::from_minor_units(1000),
                quantity_available: Quantity::from_kg(kg).unwrap(),
            },
            Utc::now(),
        )
        .unwrap();
        store.insert_compost_listing(&listing).await.unwrap();
        listing
    }

    async fn pending_order(
        store: &InMemoryMarketStore,
        listing: &CompostListing,
        kg: f64,
        intent: &str,
    ) -> Order {
        let quantity = Quantity::from_kg(kg).unwrap();
        let order = Order::pending(
            UserId::new(),
            listing.id,
            quantity,
            listing.quote(quantity).unwrap(),
            Currency::Inr,
            intent,
            Utc::now(),
        );
        store.insert_order(&order).await.unwrap();
        order
    }

    #[tokio::test]
    async fn cas_swaps_only_from_expected_state() {
        let store = InMemoryMarketStore::new();
        let listing = waste_listing(UserId::new());
        store.insert_waste_listing(&listing).await.unwrap();

        let composter = UserId::new();
        let assigned = listing.state.accept(composter).unwrap();
        let updated = store
            .compare_and_swap_waste_listing(listing.id, listing.state, assigned, Utc::now())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.status(), WasteListingStatus::Assigned);

        let again = store
            .compare_and_swap_waste_listing(listing.id, listing.state, assigned, Utc::now())
            .await
            .unwrap();
        assert!(again.is_none());
    }

    #[tokio::test]
    async fn cas_on_missing_listing_is_not_found() {
        let store = InMemoryMarketStore::new();
        let state = ListingState::available();
        let err = store
            .compare_and_swap_waste_listing(
                WasteListingId::new(),
                state,
                state.withdraw().unwrap(),
                Utc::now(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn listing_pages_are_ordered_by_creation() {
        let store = InMemoryMarketStore::new();
        let owner = UserId::new();
        let base = Utc::now();
        for i in 0..5 {
            let mut listing = waste_listing(owner);
            listing.created_at = base + Duration::seconds(i);
            listing.title = format!("listing {i}");
            store.insert_waste_listing(&listing).await.unwrap();
        }

        let page = store
            .list_waste_listings(Page::new(Some(1), Some(2)))
            .await
            .unwrap();
        let titles: Vec<_> = page.iter().map(|l| l.title.as_str()).collect();
        assert_eq!(titles, vec!["listing 1", "listing 2"]);
    }

    #[tokio::test]
    async fn duplicate_intent_is_rejected() {
        let store = InMemoryMarketStore::new();
        let listing = compost_with_stock(&store, 5.0).await;
        pending_order(&store, &listing, 1.0, "order_0001").await;

        let dup = Order::pending(
            UserId::new(),
            listing.id,
            Quantity::from_kg(1.0).unwrap(),
            Money::from_minor_units(1000),
            Currency::Inr,
            "order_0001",
            Utc::now(),
        );
        assert!(matches!(
            store.insert_order(&dup).await,
            Err(StoreError::Conflict { .. })
        ));
    }

    #[tokio::test]
    async fn settle_commits_once() {
        let store = InMemoryMarketStore::new();
        let listing = compost_with_stock(&store, 5.0).await;
        pending_order(&store, &listing, 3.0, "order_0001").await;
        let capture = PaymentCapture::new("pay_1", "sig");

        let first = store.settle("order_0001", &capture, Utc::now()).await.unwrap();
        assert!(matches!(first, Settlement::Committed(_)));
        let second = store.settle("order_0001", &capture, Utc::now()).await.unwrap();
        assert!(matches!(second, Settlement::Replayed(_)));
        assert_eq!(first.order(), second.order());

        let stock = store.get_compost_listing(listing.id).await.unwrap().unwrap();
        assert_eq!(stock.quantity_available.grams(), 2000);
    }

    #[tokio::test]
    async fn settle_rejects_when_depleted() {
        let store = InMemoryMarketStore::new();
        let listing = compost_with_stock(&store, 1.0).await;
        pending_order(&store, &listing, 1.0, "order_a").await;
        pending_order(&store, &listing, 1.0, "order_b").await;

        let a = store
            .settle("order_a", &PaymentCapture::new("pay_a", "sig"), Utc::now())
            .await
            .unwrap();
        let b = store
            .settle("order_b", &PaymentCapture::new("pay_b", "sig"), Utc::now())
            .await
            .unwrap();

        assert!(matches!(a, Settlement::Committed(_)));
        let Settlement::Rejected(rejected) = b else {
            panic!("expected rejection, got {b:?}");
        };
        assert_eq!(rejected.status, OrderStatus::Cancelled);
        assert_eq!(
            rejected.reconciliation,
            Some(ReconciliationReason::InventoryDepleted)
        );
        let stock = store.get_compost_listing(listing.id).await.unwrap().unwrap();
        assert_eq!(stock.quantity_available, Quantity::zero());
    }

    #[tokio::test]
    async fn settle_unknown_intent_is_not_found() {
        let store = InMemoryMarketStore::new();
        let err = store
            .settle("order_missing", &PaymentCapture::new("pay", "sig"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn stale_pending_orders_are_cancelled() {
        let store = InMemoryMarketStore::new();
        let listing = compost_with_stock(&store, 5.0).await;
        let old = pending_order(&store, &listing, 1.0, "order_old").await;
        store
            .settle("order_old", &PaymentCapture::new("pay_old", "sig"), Utc::now())
            .await
            .unwrap();
        let fresh = pending_order(&store, &listing, 1.0, "order_fresh").await;

        let cutoff = fresh.created_at + Duration::seconds(1);
        let expired = store.cancel_stale_orders(cutoff, Utc::now()).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, fresh.id);

        let completed = store.get_order(old.id).await.unwrap().unwrap();
        assert_eq!(completed.status, OrderStatus::Completed);
    }
}
