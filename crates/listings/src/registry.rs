//! Listing registry: waste and compost listings plus composter profiles.

use std::sync::Arc;

use chrono::Utc;
use domain::{
    Capability, CompostListing, CompostListingId, ComposterProfile, GeoPoint, ListingState,
    NewCompostListing, NewWasteListing, Principal, TransitionError, WasteListing, WasteListingId,
    WasteListingStatus,
};
use store::{MarketStore, Page};

use crate::error::ListingError;

/// Owns waste listings, compost listings and composter profiles.
///
/// Every waste-listing mutation is a single compare-and-swap on the
/// `(status, assigned_composter_id)` pair that was read, so of N concurrent
/// callers racing from the same state exactly one wins.
pub struct ListingRegistry<S: MarketStore + ?Sized> {
    store: Arc<S>,
}

impl<S: MarketStore + ?Sized> Clone for ListingRegistry<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: MarketStore + ?Sized> ListingRegistry<S> {
    /// Creates a new registry over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Publishes a new waste listing in the `available` state.
    #[tracing::instrument(skip(self, draft), fields(producer = %principal.id))]
    pub async fn create_waste_listing(
        &self,
        principal: &Principal,
        draft: NewWasteListing,
    ) -> Result<WasteListing, ListingError> {
        principal.authorize(Capability::CreateWasteListing)?;

        let listing = WasteListing::create(principal.id, draft, Utc::now())?;
        self.store.insert_waste_listing(&listing).await?;

        metrics::counter!("waste_listings_created_total").increment(1);
        tracing::info!(listing_id = %listing.id, "waste listing created");
        Ok(listing)
    }

    /// A composter claims an available listing.
    ///
    /// Returns `StateConflict` if the listing was already taken, including
    /// when another composter won a concurrent race.
    #[tracing::instrument(skip(self), fields(composter = %principal.id))]
    pub async fn accept(
        &self,
        principal: &Principal,
        listing_id: WasteListingId,
    ) -> Result<WasteListing, ListingError> {
        principal.authorize(Capability::AcceptWasteListing)?;

        let result = self
            .transition(listing_id, |listing| listing.state.accept(principal.id))
            .await;

        let outcome = match &result {
            Ok(_) => "accepted",
            Err(e) if e.kind() == domain::ErrorKind::StateConflict => "conflict",
            Err(_) => "error",
        };
        metrics::counter!("waste_listing_accepts_total", "outcome" => outcome).increment(1);

        let listing = result?;
        tracing::info!(%listing_id, "waste listing assigned");
        Ok(listing)
    }

    /// The assigned composter moves a listing along its lifecycle.
    #[tracing::instrument(skip(self), fields(composter = %principal.id))]
    pub async fn update_status(
        &self,
        principal: &Principal,
        listing_id: WasteListingId,
        new_status: WasteListingStatus,
    ) -> Result<WasteListing, ListingError> {
        principal.authorize(Capability::UpdateWasteListingStatus)?;

        let listing = self
            .transition(listing_id, |listing| {
                listing.state.advance(new_status, principal.id)
            })
            .await?;
        tracing::info!(%listing_id, status = %new_status, "waste listing status updated");
        Ok(listing)
    }

    /// The producer withdraws its own listing while it is still available.
    #[tracing::instrument(skip(self), fields(producer = %principal.id))]
    pub async fn withdraw(
        &self,
        principal: &Principal,
        listing_id: WasteListingId,
    ) -> Result<WasteListing, ListingError> {
        principal.authorize(Capability::WithdrawWasteListing)?;

        let listing = self
            .transition(listing_id, |listing| {
                if listing.owner_id != principal.id {
                    return Err(TransitionError::NotOwner);
                }
                listing.state.withdraw()
            })
            .await?;
        tracing::info!(%listing_id, "waste listing withdrawn");
        Ok(listing)
    }

    /// Reads the listing, computes the next state and swaps it in only if the
    /// stored pair is still the one that was read.
    async fn transition<F>(
        &self,
        listing_id: WasteListingId,
        next_state: F,
    ) -> Result<WasteListing, ListingError>
    where
        F: Fn(&WasteListing) -> Result<ListingState, TransitionError>,
    {
        let listing = self.get_waste_listing(listing_id).await?;
        let next = next_state(&listing)?;

        match self
            .store
            .compare_and_swap_waste_listing(listing_id, listing.state, next, Utc::now())
            .await?
        {
            Some(updated) => Ok(updated),
            None => {
                // Lost the race. Report against the state that beat us.
                let current = self.get_waste_listing(listing_id).await?;
                next_state(&current)?;
                Err(ListingError::Conflict {
                    id: listing_id.to_string(),
                })
            }
        }
    }

    pub async fn get_waste_listing(
        &self,
        listing_id: WasteListingId,
    ) -> Result<WasteListing, ListingError> {
        self.store
            .get_waste_listing(listing_id)
            .await?
            .ok_or_else(|| ListingError::not_found("waste listing", listing_id))
    }

    pub async fn list_waste_listings(&self, page: Page) -> Result<Vec<WasteListing>, ListingError> {
        Ok(self.store.list_waste_listings(page).await?)
    }

    /// Publishes compost for sale.
    #[tracing::instrument(skip(self, draft), fields(composter = %principal.id))]
    pub async fn create_compost_listing(
        &self,
        principal: &Principal,
        draft: NewCompostListing,
    ) -> Result<CompostListing, ListingError> {
        principal.authorize(Capability::CreateCompostListing)?;

        let listing = CompostListing::create(principal.id, draft, Utc::now())?;
        self.store.insert_compost_listing(&listing).await?;

        tracing::info!(
            listing_id = %listing.id,
            quantity = %listing.quantity_available,
            "compost listing created"
        );
        Ok(listing)
    }

    pub async fn get_compost_listing(
        &self,
        listing_id: CompostListingId,
    ) -> Result<CompostListing, ListingError> {
        self.store
            .get_compost_listing(listing_id)
            .await?
            .ok_or_else(|| ListingError::not_found("compost listing", listing_id))
    }

    pub async fn list_compost_listings(
        &self,
        page: Page,
    ) -> Result<Vec<CompostListing>, ListingError> {
        Ok(self.store.list_compost_listings(page).await?)
    }

    /// Records where a composter operates from, replacing any earlier profile.
    #[tracing::instrument(skip(self), fields(composter = %principal.id))]
    pub async fn publish_composter_profile(
        &self,
        principal: &Principal,
        location: GeoPoint,
        service_radius_km: Option<f64>,
    ) -> Result<ComposterProfile, ListingError> {
        principal.authorize(Capability::PublishComposterProfile)?;

        let profile = ComposterProfile::new(principal.id, location, service_radius_km, Utc::now())?;
        self.store.put_composter_profile(&profile).await?;
        Ok(profile)
    }
}
