//! Composter profile endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use domain::{ComposterProfile, GeoPoint};
use serde::{Deserialize, Serialize};

use crate::AppState;
use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::extract::ApiJson;

#[derive(Debug, Deserialize)]
pub struct ProfileRequest {
    pub latitude: f64,
    pub longitude: f64,
    pub service_radius_km: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub composter_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub service_radius_km: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl From<ComposterProfile> for ProfileResponse {
    fn from(profile: ComposterProfile) -> Self {
        Self {
            composter_id: profile.composter_id.to_string(),
            latitude: profile.location.latitude(),
            longitude: profile.location.longitude(),
            service_radius_km: profile.service_radius_km,
            updated_at: profile.updated_at,
        }
    }
}

/// PUT /composters/me/profile
#[tracing::instrument(skip(state))]
pub async fn put_profile(
    State(state): State<Arc<AppState>>,
    Authenticated(principal): Authenticated,
    ApiJson(req): ApiJson<ProfileRequest>,
) -> Result<Json<ProfileResponse>, ApiError> {
    let location = GeoPoint::new(req.latitude, req.longitude)?;
    let profile = state
        .registry
        .publish_composter_profile(&principal, location, req.service_radius_km)
        .await?;
    Ok(Json(profile.into()))
}
