//! Proximity ranking of composters.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use common::UserId;
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::geo::{GeoPoint, great_circle_distance_km};

/// Number of recommendations returned when the caller does not ask for a
/// specific limit.
pub const DEFAULT_RECOMMENDATION_LIMIT: usize = 10;

/// Where a composter operates from and how far it will travel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposterProfile {
    pub composter_id: UserId,
    pub location: GeoPoint,
    /// Maximum pickup distance in km. `None` means no limit.
    pub service_radius_km: Option<f64>,
    pub updated_at: DateTime<Utc>,
}

impl ComposterProfile {
    pub fn new(
        composter_id: UserId,
        location: GeoPoint,
        service_radius_km: Option<f64>,
        now: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        if let Some(radius) = service_radius_km
            && (!radius.is_finite() || radius <= 0.0)
        {
            return Err(ValidationError::InvalidServiceRadius { value: radius });
        }
        Ok(Self {
            composter_id,
            location,
            service_radius_km,
            updated_at: now,
        })
    }

    /// Returns true if a pickup `distance_km` away is inside this
    /// composter's service area.
    pub fn serves(&self, distance_km: f64) -> bool {
        self.service_radius_km
            .is_none_or(|radius| distance_km <= radius)
    }
}

/// A composter together with its distance from the pickup point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedComposter {
    #[serde(flatten)]
    pub profile: ComposterProfile,
    pub distance_km: f64,
}

/// Ranks `profiles` by ascending distance from `origin`.
///
/// Composters whose service radius does not reach `origin` are dropped. Ties
/// are broken by composter id so the order is total and reproducible.
pub fn rank_composters<'a, I>(origin: GeoPoint, profiles: I, limit: usize) -> Vec<RankedComposter>
where
    I: IntoIterator<Item = &'a ComposterProfile>,
{
    let mut ranked: Vec<RankedComposter> = profiles
        .into_iter()
        .filter_map(|profile| {
            let distance_km = great_circle_distance_km(origin, profile.location);
            profile.serves(distance_km).then(|| RankedComposter {
                profile: profile.clone(),
                distance_km,
            })
        })
        .collect();

    ranked.sort_by(|a, b| match a.distance_km.total_cmp(&b.distance_km) {
        Ordering::Equal => a.profile.composter_id.cmp(&b.profile.composter_id),
        other => other,
    });
    ranked.truncate(limit);
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    fn profile(id: u128, lat: f64, lon: f64, radius: Option<f64>) -> ComposterProfile {
        ComposterProfile::new(
            UserId::from_uuid(Uuid::from_u128(id)),
            point(lat, lon),
            radius,
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn ranks_nearest_first() {
        let bengaluru = point(12.9716, 77.5946);
        let profiles = vec![
            profile(1, 13.0827, 80.2707, None), // Chennai
            profile(2, 12.9352, 77.6245, None), // Koramangala
            profile(3, 19.0760, 72.8777, None), // Mumbai
        ];
        let ranked = rank_composters(bengaluru, &profiles, 10);
        let ids: Vec<u128> = ranked
            .iter()
            .map(|r| r.profile.composter_id.as_uuid().as_u128())
            .collect();
        assert_eq!(ids, vec![2, 1, 3]);
        assert!(ranked.windows(2).all(|w| w[0].distance_km <= w[1].distance_km));
    }

    #[test]
    fn ties_break_by_composter_id() {
        let origin = point(0.0, 0.0);
        let profiles = vec![
            profile(9, 1.0, 0.0, None),
            profile(4, -1.0, 0.0, None),
            profile(7, 0.0, 1.0, None),
        ];
        let ranked = rank_composters(origin, &profiles, 10);
        let ids: Vec<u128> = ranked
            .iter()
            .map(|r| r.profile.composter_id.as_uuid().as_u128())
            .collect();
        assert_eq!(ids, vec![4, 7, 9]);
    }

    #[test]
    fn service_radius_excludes_far_composters() {
        let mumbai = point(19.0760, 72.8777);
        let profiles = vec![
            profile(1, 18.5204, 73.8567, Some(100.0)), // Pune, ~120 km away
            profile(2, 18.5204, 73.8567, Some(150.0)),
            profile(3, 18.5204, 73.8567, None),
        ];
        let ranked = rank_composters(mumbai, &profiles, 10);
        assert_eq!(ranked.len(), 2);
        assert!(ranked.iter().all(|r| r.profile.composter_id.as_uuid().as_u128() != 1));
    }

    #[test]
    fn limit_truncates() {
        let origin = point(0.0, 0.0);
        let profiles: Vec<_> = (0..20)
            .map(|i| profile(i, f64::from(i as u8) * 0.1, 0.0, None))
            .collect();
        let ranked = rank_composters(origin, &profiles, DEFAULT_RECOMMENDATION_LIMIT);
        assert_eq!(ranked.len(), DEFAULT_RECOMMENDATION_LIMIT);
        assert_eq!(ranked[0].distance_km, 0.0);
        assert!(rank_composters(origin, &profiles, 0).is_empty());
    }

    #[test]
    fn empty_input_gives_empty_ranking() {
        let none: Vec<ComposterProfile> = Vec::new();
        assert!(rank_composters(point(0.0, 0.0), &none, 10).is_empty());
    }

    #[test]
    fn invalid_radius_is_rejected() {
        for radius in [0.0, -5.0, f64::NAN, f64::INFINITY] {
            assert!(
                ComposterProfile::new(UserId::new(), point(0.0, 0.0), Some(radius), Utc::now())
                    .is_err()
            );
        }
    }
}
