use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    CompostListing, CompostListingId, ComposterProfile, ListingState, Order, OrderId,
    PaymentCapture, UserId, WasteListing, WasteListingId,
};

use crate::Result;

/// Offset/limit window over a listing table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 100;
    pub const MAX_LIMIT: usize = 500;
    /// Largest offset a SQL `OFFSET` (BIGINT) accepts.
    pub const MAX_OFFSET: usize = i64::MAX as usize;

    /// Builds a page, applying the default limit and clamping both bounds.
    pub fn new(offset: Option<usize>, limit: Option<usize>) -> Self {
        Self {
            offset: offset.unwrap_or(0).min(Self::MAX_OFFSET),
            limit: limit.unwrap_or(Self::DEFAULT_LIMIT).min(Self::MAX_LIMIT),
        }
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(None, None)
    }
}

/// Result of applying a verified payment to its order.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Inventory was decremented and the order completed.
    Committed(Order),
    /// The order was cancelled and flagged for reconciliation; inventory untouched.
    Rejected(Order),
    /// This payment had already been applied; nothing was written.
    Replayed(Order),
}

impl Settlement {
    pub fn order(&self) -> &Order {
        match self {
            Settlement::Committed(order)
            | Settlement::Rejected(order)
            | Settlement::Replayed(order) => order,
        }
    }

    pub fn into_order(self) -> Order {
        match self {
            Settlement::Committed(order)
            | Settlement::Rejected(order)
            | Settlement::Replayed(order) => order,
        }
    }
}

/// Core trait for marketplace storage.
///
/// Every write that races with another caller is a single conditional
/// operation here: the waste-listing compare-and-swap and the settlement
/// commit. Callers never read-then-write across two calls without one of
/// these guards. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Inserts a new waste listing.
    async fn insert_waste_listing(&self, listing: &WasteListing) -> Result<()>;

    /// Retrieves a waste listing by id.
    async fn get_waste_listing(&self, id: WasteListingId) -> Result<Option<WasteListing>>;

    /// Lists waste listings ordered by creation time, then id.
    async fn list_waste_listings(&self, page: Page) -> Result<Vec<WasteListing>>;

    /// Replaces a listing's `(status, assigned_composter_id)` pair with `next`
    /// only if it currently equals `expected`.
    ///
    /// Returns the updated listing, or `None` if the stored pair differed.
    /// Returns `NotFound` if the listing does not exist.
    async fn compare_and_swap_waste_listing(
        &self,
        id: WasteListingId,
        expected: ListingState,
        next: ListingState,
        now: DateTime<Utc>,
    ) -> Result<Option<WasteListing>>;

    /// Inserts a new compost listing.
    async fn insert_compost_listing(&self, listing: &CompostListing) -> Result<()>;

    /// Retrieves a compost listing by id.
    async fn get_compost_listing(&self, id: CompostListingId) -> Result<Option<CompostListing>>;

    /// Lists compost listings ordered by creation time, then id.
    async fn list_compost_listings(&self, page: Page) -> Result<Vec<CompostListing>>;

    /// Inserts a new pending order.
    ///
    /// Fails with `Conflict` if an order already exists for the same intent.
    async fn insert_order(&self, order: &Order) -> Result<()>;

    /// Retrieves an order by id.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Retrieves the order opened for a gateway intent.
    async fn find_order_by_intent(&self, intent_id: &str) -> Result<Option<Order>>;

    /// Lists a buyer's orders ordered by creation time, then id.
    async fn list_orders_for_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>>;

    /// Creates or replaces a composter's profile.
    async fn put_composter_profile(&self, profile: &ComposterProfile) -> Result<()>;

    /// Lists every published composter profile.
    async fn list_composter_profiles(&self) -> Result<Vec<ComposterProfile>>;

    /// Applies a verified payment to the order opened for `intent_id`.
    ///
    /// This is one atomic unit: the idempotency lookup on `payment_id`, the
    /// inventory re-check, the decrement and the order status flip either all
    /// happen or none do. Concurrent calls for the same payment resolve to one
    /// `Committed` and any number of `Replayed`.
    ///
    /// Returns `NotFound` for an unknown intent and `Conflict` if the order was
    /// already settled by a different payment.
    async fn settle(
        &self,
        intent_id: &str,
        capture: &PaymentCapture,
        now: DateTime<Utc>,
    ) -> Result<Settlement>;

    /// Cancels every `pending` order created before `cutoff` and returns them.
    async fn cancel_stale_orders(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Order>>;
}
