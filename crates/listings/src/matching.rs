//! Matching engine: recommends composters for a waste listing.

use std::sync::Arc;

use domain::{DEFAULT_RECOMMENDATION_LIMIT, RankedComposter, WasteListingId, rank_composters};
use store::MarketStore;

use crate::error::MatchingError;

/// Ranks published composters by distance from a listing's pickup point.
///
/// Read-only: recommending never mutates a listing or profile.
pub struct MatchingEngine<S: MarketStore + ?Sized> {
    store: Arc<S>,
}

impl<S: MarketStore + ?Sized> Clone for MatchingEngine<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: MarketStore + ?Sized> MatchingEngine<S> {
    /// Creates a new matching engine over the given store.
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Returns up to `limit` composters nearest to the listing's pickup point,
    /// nearest first.
    ///
    /// Returns `NoLocationData` rather than an empty list when the listing was
    /// never geocoded.
    #[tracing::instrument(skip(self))]
    pub async fn recommend_composters(
        &self,
        listing_id: WasteListingId,
        limit: Option<usize>,
    ) -> Result<Vec<RankedComposter>, MatchingError> {
        let result = self.rank(listing_id, limit).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(MatchingError::NoLocationData(_)) => "no_location",
            Err(MatchingError::NotFound(_)) => "not_found",
            Err(MatchingError::Store(_)) => "error",
        };
        metrics::counter!("matching_requests_total", "outcome" => outcome).increment(1);
        result
    }

    async fn rank(
        &self,
        listing_id: WasteListingId,
        limit: Option<usize>,
    ) -> Result<Vec<RankedComposter>, MatchingError> {
        let listing = self
            .store
            .get_waste_listing(listing_id)
            .await?
            .ok_or_else(|| MatchingError::NotFound(listing_id.to_string()))?;
        let origin = listing
            .coordinates()
            .ok_or_else(|| MatchingError::NoLocationData(listing_id.to_string()))?;

        let profiles = self.store.list_composter_profiles().await?;
        let ranked = rank_composters(
            origin,
            &profiles,
            limit.unwrap_or(DEFAULT_RECOMMENDATION_LIMIT),
        );
        tracing::debug!(
            candidates = profiles.len(),
            returned = ranked.len(),
            "composters ranked"
        );
        Ok(ranked)
    }
}
