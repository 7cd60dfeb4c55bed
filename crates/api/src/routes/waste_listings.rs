//! Waste listing endpoints and composter recommendations.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use domain::{
    GeoPoint, NewWasteListing, PickupLocation, Quantity, RankedComposter, ValidationError,
    WasteListing, WasteListingId, WasteListingStatus, WasteType,
};
use serde::{Deserialize, Serialize};

use super::{PageQuery, parse_id};
use crate::AppState;
use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::extract::{ApiJson, ApiQuery};

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct CreateWasteListingRequest {
    pub title: String,
    pub description: Option<String>,
    /// Kilograms.
    pub quantity: f64,
    #[serde(default)]
    pub waste_type: WasteType,
    pub pickup_location: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl CreateWasteListingRequest {
    fn into_draft(self) -> Result<NewWasteListing, ValidationError> {
        Ok(NewWasteListing {
            title: self.title,
            description: self.description,
            quantity: Quantity::positive_from_kg(self.quantity)?,
            waste_type: self.waste_type,
            pickup: PickupLocation {
                label: self.pickup_location,
                address: self.address,
                city: self.city,
                state: self.state,
                country: self.country,
                point: GeoPoint::from_optional(self.latitude, self.longitude)?,
            },
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusQuery {
    pub status: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RecommendQuery {
    pub limit: Option<usize>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct WasteListingResponse {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub description: Option<String>,
    pub quantity: f64,
    pub waste_type: WasteType,
    pub pickup_location: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub status: WasteListingStatus,
    pub assigned_composter_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<WasteListing> for WasteListingResponse {
    fn from(listing: WasteListing) -> Self {
        let point = listing.coordinates();
        Self {
            id: listing.id.to_string(),
            owner_id: listing.owner_id.to_string(),
            status: listing.status(),
            assigned_composter_id: listing.assigned_composter_id().map(|id| id.to_string()),
            title: listing.title,
            description: listing.description,
            quantity: listing.quantity.as_kg(),
            waste_type: listing.waste_type,
            pickup_location: listing.pickup.label,
            address: listing.pickup.address,
            city: listing.pickup.city,
            state: listing.pickup.state,
            country: listing.pickup.country,
            latitude: point.map(|p| p.latitude()),
            longitude: point.map(|p| p.longitude()),
            created_at: listing.created_at,
            updated_at: listing.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecommendedComposterResponse {
    pub composter_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub service_radius_km: Option<f64>,
    pub distance_km: f64,
}

impl From<RankedComposter> for RecommendedComposterResponse {
    fn from(ranked: RankedComposter) -> Self {
        Self {
            composter_id: ranked.profile.composter_id.to_string(),
            latitude: ranked.profile.location.latitude(),
            longitude: ranked.profile.location.longitude(),
            service_radius_km: ranked.profile.service_radius_km,
            distance_km: ranked.distance_km,
        }
    }
}

// -- Handlers --

/// POST /waste-listings/
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    ApiJson(req): ApiJson<CreateWasteListingRequest>,
) -> Result<(StatusCode, Json<WasteListingResponse>), ApiError> {
    let draft = req.into_draft()?;
    let listing = state.registry.create_waste_listing(&principal, draft).await?;
    Ok((StatusCode::CREATED, Json(listing.into())))
}

/// GET /waste-listings/?skip=&limit=
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<Vec<WasteListingResponse>>, ApiError> {
    let listings = state.registry.list_waste_listings(query.page()).await?;
    Ok(Json(listings.into_iter().map(Into::into).collect()))
}

/// GET /waste-listings/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WasteListingResponse>, ApiError> {
    let id: WasteListingId = parse_id(&id, "waste listing")?;
    let listing = state.registry.get_waste_listing(id).await?;
    Ok(Json(listing.into()))
}

/// PUT /waste-listings/{id}/assign-composter
#[tracing::instrument(skip(state))]
pub async fn assign_composter(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<WasteListingResponse>, ApiError> {
    let id: WasteListingId = parse_id(&id, "waste listing")?;
    let listing = state.registry.accept(&principal, id).await?;
    Ok(Json(listing.into()))
}

/// PUT /waste-listings/{id}/update-status?status=pending_pickup
#[tracing::instrument(skip(state))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<StatusQuery>,
) -> Result<Json<WasteListingResponse>, ApiError> {
    let id: WasteListingId = parse_id(&id, "waste listing")?;
    let status: WasteListingStatus = query.status.parse()?;
    let listing = state.registry.update_status(&principal, id, status).await?;
    Ok(Json(listing.into()))
}

/// PUT /waste-listings/{id}/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    Path(id): Path<String>,
) -> Result<Json<WasteListingResponse>, ApiError> {
    let id: WasteListingId = parse_id(&id, "waste listing")?;
    let listing = state.registry.withdraw(&principal, id).await?;
    Ok(Json(listing.into()))
}

/// GET /waste-listings/{id}/recommended-composters?limit=
#[tracing::instrument(skip(state))]
pub async fn recommended_composters(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ApiQuery(query): ApiQuery<RecommendQuery>,
) -> Result<Json<Vec<RecommendedComposterResponse>>, ApiError> {
    let id: WasteListingId = parse_id(&id, "waste listing")?;
    let ranked = state.matching.recommend_composters(id, query.limit).await?;
    Ok(Json(ranked.into_iter().map(Into::into).collect()))
}
