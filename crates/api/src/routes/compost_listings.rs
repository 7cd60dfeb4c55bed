//! Compost listing endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use domain::{
    CompostListing, CompostListingId, Currency, Money, NewCompostListing, Quantity,
    ValidationError,
};
use serde::{Deserialize, Serialize};

use super::{PageQuery, parse_id};
use crate::AppState;
use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};

#[derive(Debug, Deserialize)]
pub struct CreateCompostListingRequest {
    pub title: String,
    pub description: Option<String>,
    /// Major units of the deployment currency.
    pub price_per_kg: f64,
    /// Kilograms.
    pub quantity_available: f64,
}

impl CreateCompostListingRequest {
    fn into_draft(self, currency: Currency) -> Result<NewCompostListing, ValidationError> {
        Ok(NewCompostListing {
            title: self.title,
            description: self.description,
            price_per_kg: Money::from_major(self.price_per_kg, currency)?,
            quantity_available: Quantity::from_kg(self.quantity_available)?,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct CompostListingResponse {
    pub id: String,
    pub seller_id: String,
    pub title: String,
    pub description: Option<String>,
    pub price_per_kg: f64,
    pub price_per_kg_minor: i64,
    pub currency: Currency,
    pub quantity_available: f64,
    pub created_at: DateTime<Utc>,
}

impl CompostListingResponse {
    pub fn new(listing: CompostListing, currency: Currency) -> Self {
        Self {
            id: listing.id.to_string(),
            seller_id: listing.owner_id.to_string(),
            title: listing.title,
            description: listing.description,
            price_per_kg: listing.price_per_kg.as_major(currency),
            price_per_kg_minor: listing.price_per_kg.minor_units(),
            currency,
            quantity_available: listing.quantity_available.as_kg(),
            created_at: listing.created_at,
        }
    }
}

/// POST /compost-listings/
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    ApiJson(req): ApiJson<CreateCompostListingRequest>,
) -> Result<(StatusCode, Json<CompostListingResponse>), ApiError> {
    let currency = state.currency();
    let draft = req.into_draft(currency)?;
    let listing = state
        .registry
        .create_compost_listing(&principal, draft)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(CompostListingResponse::new(listing, currency)),
    ))
}

/// GET /compost-listings/?skip=&limit=
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<Vec<CompostListingResponse>>, ApiError> {
    let currency = state.currency();
    let listings = state.registry.list_compost_listings(query.page()).await?;
    Ok(Json(
        listings
            .into_iter()
            .map(|l| CompostListingResponse::new(l, currency))
            .collect(),
    ))
}

/// GET /compost-listings/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<CompostListingResponse>, ApiError> {
    let id: CompostListingId = parse_id(&id, "compost listing")?;
    let listing = state.registry.get_compost_listing(id).await?;
    Ok(Json(CompostListingResponse::new(listing, state.currency())))
}
