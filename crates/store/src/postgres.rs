use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{
    CompostListing, CompostListingId, ComposterProfile, Currency, GeoPoint, ListingState, Money,
    Order, OrderId, OrderStatus, PaymentCapture, PaymentReference, PickupLocation, Quantity,
    ReconciliationReason, SettlementPlan, UserId, WasteListing, WasteListingId,
    WasteListingStatus, WasteType, plan_settlement,
};
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{MarketStore, Page, Settlement},
};

const WASTE_LISTING_COLUMNS: &str = "id, owner_id, title, description, quantity_grams, \
     waste_type, pickup_label, pickup_address, pickup_city, pickup_state, pickup_country, \
     pickup_latitude, pickup_longitude, status, assigned_composter_id, created_at, updated_at";

const COMPOST_LISTING_COLUMNS: &str = "id, owner_id, title, description, price_per_kg_minor, \
     quantity_available_grams, created_at";

const ORDER_COLUMNS: &str = "id, buyer_id, compost_listing_id, quantity_grams, \
     total_price_minor, currency, status, intent_id, payment_id, signature, reconciliation, \
     created_at, updated_at";

/// Partial unique index allowing one completed order per payment id.
const COMPLETED_PAYMENT_INDEX: &str = "orders_completed_payment_id";
const INTENT_UNIQUE_CONSTRAINT: &str = "orders_intent_id_key";

/// PostgreSQL-backed marketplace store.
#[derive(Clone)]
pub struct PostgresMarketStore {
    pool: PgPool,
}

impl PostgresMarketStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_waste_listing(row: PgRow) -> Result<WasteListing> {
        let id: Uuid = row.try_get("id")?;
        let corrupt = |reason: String| StoreError::corrupt("waste listing", id, reason);

        let status: WasteListingStatus = row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(|e: domain::ValidationError| corrupt(e.to_string()))?;
        let assigned: Option<Uuid> = row.try_get("assigned_composter_id")?;
        let state = ListingState::new(status, assigned.map(UserId::from_uuid))
            .map_err(|e| corrupt(e.to_string()))?;
        let waste_type: WasteType = row
            .try_get::<String, _>("waste_type")?
            .parse()
            .map_err(|e: domain::ValidationError| corrupt(e.to_string()))?;
        let point = GeoPoint::from_optional(
            row.try_get("pickup_latitude")?,
            row.try_get("pickup_longitude")?,
        )
        .map_err(|e| corrupt(e.to_string()))?;
        let quantity = Quantity::from_grams(row.try_get("quantity_grams")?)
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(WasteListing {
            id: WasteListingId::from_uuid(id),
            owner_id: UserId::from_uuid(row.try_get("owner_id")?),
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            quantity,
            waste_type,
            pickup: PickupLocation {
                label: row.try_get("pickup_label")?,
                address: row.try_get("pickup_address")?,
                city: row.try_get("pickup_city")?,
                state: row.try_get("pickup_state")?,
                country: row.try_get("pickup_country")?,
                point,
            },
            state,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_compost_listing(row: PgRow) -> Result<CompostListing> {
        let id: Uuid = row.try_get("id")?;
        let quantity_available = Quantity::from_grams(row.try_get("quantity_available_grams")?)
            .map_err(|e| StoreError::corrupt("compost listing", id, e))?;

        Ok(CompostListing {
            id: CompostListingId::from_uuid(id),
            owner_id: UserId::from_uuid(row.try_get("owner_id")?),
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            price_per_kg: Money::from_minor_units(row.try_get("price_per_kg_minor")?),
            quantity_available,
            created_at: row.try_get("created_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let id: Uuid = row.try_get("id")?;
        let corrupt = |reason: String| StoreError::corrupt("order", id, reason);

        let status: OrderStatus = row
            .try_get::<String, _>("status")?
            .parse()
            .map_err(|e: domain::ValidationError| corrupt(e.to_string()))?;
        let currency: Currency = row
            .try_get::<String, _>("currency")?
            .parse()
            .map_err(|e: domain::ValidationError| corrupt(e.to_string()))?;
        let reconciliation = row
            .try_get::<Option<String>, _>("reconciliation")?
            .map(|r| r.parse::<ReconciliationReason>())
            .transpose()
            .map_err(|e| corrupt(e.to_string()))?;
        let quantity = Quantity::from_grams(row.try_get("quantity_grams")?)
            .map_err(|e| corrupt(e.to_string()))?;

        Ok(Order {
            id: OrderId::from_uuid(id),
            buyer_id: UserId::from_uuid(row.try_get("buyer_id")?),
            compost_listing_id: CompostListingId::from_uuid(row.try_get("compost_listing_id")?),
            quantity,
            total_price: Money::from_minor_units(row.try_get("total_price_minor")?),
            currency,
            status,
            payment: PaymentReference {
                intent_id: row.try_get("intent_id")?,
                payment_id: row.try_get("payment_id")?,
                signature: row.try_get("signature")?,
            },
            reconciliation,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_profile(row: PgRow) -> Result<ComposterProfile> {
        let id: Uuid = row.try_get("composter_id")?;
        let location = GeoPoint::new(row.try_get("latitude")?, row.try_get("longitude")?)
            .map_err(|e| StoreError::corrupt("composter profile", id, e))?;

        Ok(ComposterProfile {
            composter_id: UserId::from_uuid(id),
            location,
            service_radius_km: row.try_get("service_radius_km")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    async fn completed_order_for_payment(
        tx: &mut Transaction<'_, Postgres>,
        payment_id: &str,
    ) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE payment_id = $1 AND status = 'completed'"
        ))
        .bind(payment_id)
        .fetch_optional(&mut **tx)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn write_settled_order(
        tx: &mut Transaction<'_, Postgres>,
        order: &Order,
    ) -> std::result::Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            UPDATE orders
            SET status = $2, payment_id = $3, signature = $4, reconciliation = $5, updated_at = $6
            WHERE id = $1
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.payment.payment_id.as_deref())
        .bind(order.payment.signature.as_deref())
        .bind(order.reconciliation.map(|r| r.as_str()))
        .bind(order.updated_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Resolves a lost race on the completed-payment index: another
    /// transaction completed an order for this payment first.
    async fn replay_after_unique_violation(&self, payment_id: &str) -> Result<Settlement> {
        let mut tx = self.pool.begin().await?;
        let order = Self::completed_order_for_payment(&mut tx, payment_id)
            .await?
            .ok_or_else(|| {
                StoreError::conflict("order", payment_id, "payment was settled concurrently")
            })?;
        tx.commit().await?;
        tracing::debug!(%payment_id, order_id = %order.id, "settlement lost race, replaying");
        Ok(Settlement::Replayed(order))
    }
}

fn is_violation(err: &sqlx::Error, constraint: &str) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.constraint() == Some(constraint))
}

#[async_trait]
impl MarketStore for PostgresMarketStore {
    async fn insert_waste_listing(&self, listing: &WasteListing) -> Result<()> {
        let point = listing.pickup.point;
        sqlx::query(
            r#"
            INSERT INTO waste_listings (
                id, owner_id, title, description, quantity_grams, waste_type,
                pickup_label, pickup_address, pickup_city, pickup_state, pickup_country,
                pickup_latitude, pickup_longitude, status, assigned_composter_id,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(listing.id.as_uuid())
        .bind(listing.owner_id.as_uuid())
        .bind(&listing.title)
        .bind(listing.description.as_deref())
        .bind(listing.quantity.grams())
        .bind(listing.waste_type.as_str())
        .bind(&listing.pickup.label)
        .bind(listing.pickup.address.as_deref())
        .bind(listing.pickup.city.as_deref())
        .bind(listing.pickup.state.as_deref())
        .bind(listing.pickup.country.as_deref())
        .bind(point.map(|p| p.latitude()))
        .bind(point.map(|p| p.longitude()))
        .bind(listing.status().as_str())
        .bind(listing.assigned_composter_id().map(|id| id.as_uuid()))
        .bind(listing.created_at)
        .bind(listing.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_waste_listing(&self, id: WasteListingId) -> Result<Option<WasteListing>> {
        let row = sqlx::query(&format!(
            "SELECT {WASTE_LISTING_COLUMNS} FROM waste_listings WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_waste_listing).transpose()
    }

    async fn list_waste_listings(&self, page: Page) -> Result<Vec<WasteListing>> {
        let rows = sqlx::query(&format!(
            "SELECT {WASTE_LISTING_COLUMNS} FROM waste_listings \
             ORDER BY created_at ASC, id ASC OFFSET $1 LIMIT $2"
        ))
        .bind(i64::try_from(page.offset).unwrap_or(i64::MAX))
        .bind(i64::try_from(page.limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_waste_listing).collect()
    }

    async fn compare_and_swap_waste_listing(
        &self,
        id: WasteListingId,
        expected: ListingState,
        next: ListingState,
        now: DateTime<Utc>,
    ) -> Result<Option<WasteListing>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE waste_listings
            SET status = $4, assigned_composter_id = $5, updated_at = $6
            WHERE id = $1
              AND status = $2
              AND assigned_composter_id IS NOT DISTINCT FROM $3
            RETURNING {WASTE_LISTING_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(expected.status().as_str())
        .bind(expected.assigned_composter_id().map(|c| c.as_uuid()))
        .bind(next.status().as_str())
        .bind(next.assigned_composter_id().map(|c| c.as_uuid()))
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::row_to_waste_listing(row).map(Some);
        }

        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM waste_listings WHERE id = $1)")
                .bind(id.as_uuid())
                .fetch_one(&self.pool)
                .await?;
        if exists {
            Ok(None)
        } else {
            Err(StoreError::not_found("waste listing", id))
        }
    }

    async fn insert_compost_listing(&self, listing: &CompostListing) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO compost_listings (
                id, owner_id, title, description, price_per_kg_minor,
                quantity_available_grams, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(listing.id.as_uuid())
        .bind(listing.owner_id.as_uuid())
        .bind(&listing.title)
        .bind(listing.description.as_deref())
        .bind(listing.price_per_kg.minor_units())
        .bind(listing.quantity_available.grams())
        .bind(listing.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_compost_listing(&self, id: CompostListingId) -> Result<Option<CompostListing>> {
        let row = sqlx::query(&format!(
            "SELECT {COMPOST_LISTING_COLUMNS} FROM compost_listings WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_compost_listing).transpose()
    }

    async fn list_compost_listings(&self, page: Page) -> Result<Vec<CompostListing>> {
        let rows = sqlx::query(&format!(
            "SELECT {COMPOST_LISTING_COLUMNS} FROM compost_listings \
             ORDER BY created_at ASC, id ASC OFFSET $1 LIMIT $2"
        ))
        .bind(i64::try_from(page.offset).unwrap_or(i64::MAX))
        .bind(i64::try_from(page.limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_compost_listing).collect()
    }

    async fn insert_order(&self, order: &Order) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, buyer_id, compost_listing_id, quantity_grams, total_price_minor, currency,
                status, intent_id, payment_id, signature, reconciliation, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(order.id.as_uuid())
        .bind(order.buyer_id.as_uuid())
        .bind(order.compost_listing_id.as_uuid())
        .bind(order.quantity.grams())
        .bind(order.total_price.minor_units())
        .bind(order.currency.code())
        .bind(order.status.as_str())
        .bind(order.intent_id())
        .bind(order.payment.payment_id.as_deref())
        .bind(order.payment.signature.as_deref())
        .bind(order.reconciliation.map(|r| r.as_str()))
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_violation(&e, INTENT_UNIQUE_CONSTRAINT) {
                return StoreError::conflict(
                    "order",
                    order.id,
                    format!("an order already exists for intent {}", order.intent_id()),
                );
            }
            StoreError::Database(e)
        })?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn find_order_by_intent(&self, intent_id: &str) -> Result<Option<Order>> {
        let row = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE intent_id = $1"
        ))
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn list_orders_for_buyer(&self, buyer_id: UserId) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE buyer_id = $1 \
             ORDER BY created_at ASC, id ASC"
        ))
        .bind(buyer_id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }

    async fn put_composter_profile(&self, profile: &ComposterProfile) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO composter_profiles (composter_id, latitude, longitude, service_radius_km, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (composter_id) DO UPDATE
            SET latitude = EXCLUDED.latitude,
                longitude = EXCLUDED.longitude,
                service_radius_km = EXCLUDED.service_radius_km,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(profile.composter_id.as_uuid())
        .bind(profile.location.latitude())
        .bind(profile.location.longitude())
        .bind(profile.service_radius_km)
        .bind(profile.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_composter_profiles(&self) -> Result<Vec<ComposterProfile>> {
        let rows = sqlx::query(
            r#"
            SELECT composter_id, latitude, longitude, service_radius_km, updated_at
            FROM composter_profiles
            ORDER BY composter_id ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_profile).collect()
    }

    async fn settle(
        &self,
        intent_id: &str,
        capture: &PaymentCapture,
        now: DateTime<Utc>,
    ) -> Result<Settlement> {
        let mut tx = self.pool.begin().await?;

        if let Some(done) = Self::completed_order_for_payment(&mut tx, &capture.payment_id).await? {
            tx.commit().await?;
            return Ok(Settlement::Replayed(done));
        }

        // Lock the order row first, then the listing row.
        let order = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE intent_id = $1 FOR UPDATE"
        ))
        .bind(intent_id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Self::row_to_order)
        .transpose()?
        .ok_or_else(|| StoreError::not_found("order for intent", intent_id))?;

        let available: i64 = sqlx::query_scalar(
            "SELECT quantity_available_grams FROM compost_listings WHERE id = $1 FOR UPDATE",
        )
        .bind(order.compost_listing_id.as_uuid())
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| StoreError::not_found("compost listing", order.compost_listing_id))?;
        let available = Quantity::from_grams(available)
            .map_err(|e| StoreError::corrupt("compost listing", order.compost_listing_id, e))?;

        let settlement = match plan_settlement(&order, capture, available, now) {
            SettlementPlan::Commit { order, .. } => {
                let decremented = sqlx::query(
                    r#"
                    UPDATE compost_listings
                    SET quantity_available_grams = quantity_available_grams - $2
                    WHERE id = $1 AND quantity_available_grams >= $2
                    "#,
                )
                .bind(order.compost_listing_id.as_uuid())
                .bind(order.quantity.grams())
                .execute(&mut *tx)
                .await?;
                if decremented.rows_affected() != 1 {
                    return Err(StoreError::conflict(
                        "compost listing",
                        order.compost_listing_id,
                        "inventory changed during settlement",
                    ));
                }
                Settlement::Committed(order)
            }
            SettlementPlan::Reject { order } => Settlement::Rejected(order),
            SettlementPlan::Replay { order } => {
                tx.commit().await?;
                return Ok(Settlement::Replayed(order));
            }
            SettlementPlan::Conflict { order } => {
                return Err(StoreError::conflict(
                    "order",
                    order.id,
                    "already settled by a different payment",
                ));
            }
        };

        match Self::write_settled_order(&mut tx, settlement.order()).await {
            Ok(()) => {}
            Err(e) if is_violation(&e, COMPLETED_PAYMENT_INDEX) => {
                drop(tx);
                return self
                    .replay_after_unique_violation(&capture.payment_id)
                    .await;
            }
            Err(e) => return Err(e.into()),
        }

        tx.commit().await?;
        Ok(settlement)
    }

    async fn cancel_stale_orders(
        &self,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Order>> {
        let rows = sqlx::query(&format!(
            r#"
            UPDATE orders
            SET status = 'cancelled', updated_at = $2
            WHERE status = 'pending' AND created_at < $1
            RETURNING {ORDER_COLUMNS}
            "#
        ))
        .bind(cutoff)
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        let mut expired = rows
            .into_iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        expired.sort_by_key(|o| (o.created_at, o.id.as_uuid()));
        Ok(expired)
    }
}
