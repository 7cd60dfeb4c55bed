//! Geographic points and great-circle distance.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Mean Earth radius in kilometres (IUGG).
pub const EARTH_RADIUS_KM: f64 = 6371.0088;

/// A validated WGS84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawGeoPoint")]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawGeoPoint {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawGeoPoint> for GeoPoint {
    type Error = ValidationError;

    fn try_from(raw: RawGeoPoint) -> Result<Self, Self::Error> {
        GeoPoint::new(raw.latitude, raw.longitude)
    }
}

impl GeoPoint {
    /// Creates a point, rejecting out-of-range or non-finite values.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);
        if !valid {
            return Err(ValidationError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// Builds a point from an optional latitude/longitude pair.
    ///
    /// Both absent yields `Ok(None)`; exactly one present is invalid.
    pub fn from_optional(
        latitude: Option<f64>,
        longitude: Option<f64>,
    ) -> Result<Option<Self>, ValidationError> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Self::new(lat, lon).map(Some),
            (None, None) => Ok(None),
            (lat, lon) => Err(ValidationError::InvalidCoordinates {
                latitude: lat.unwrap_or(f64::NAN),
                longitude: lon.unwrap_or(f64::NAN),
            }),
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

/// Haversine distance between two points in kilometres.
pub fn great_circle_distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.latitude.to_radians();
    let lat_b = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    // rounding can push h a hair above 1 for antipodal points
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(lat: f64, lon: f64) -> GeoPoint {
        GeoPoint::new(lat, lon).unwrap()
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        assert!(GeoPoint::new(90.1, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.5).is_err());
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }

    #[test]
    fn optional_pair_must_be_complete() {
        assert_eq!(GeoPoint::from_optional(None, None).unwrap(), None);
        assert!(GeoPoint::from_optional(Some(12.0), None).is_err());
        assert!(GeoPoint::from_optional(Some(12.0), Some(77.0)).unwrap().is_some());
    }

    #[test]
    fn distance_to_self_is_zero() {
        let p = point(12.9716, 77.5946);
        assert_eq!(great_circle_distance_km(p, p), 0.0);
    }

    #[test]
    fn known_city_distances() {
        let paris = point(48.8566, 2.3522);
        let london = point(51.5074, -0.1278);
        assert!((great_circle_distance_km(paris, london) - 343.557).abs() < 0.01);

        let mumbai = point(19.0760, 72.8777);
        let pune = point(18.5204, 73.8567);
        assert!((great_circle_distance_km(mumbai, pune) - 120.152).abs() < 0.01);
    }

    #[test]
    fn distance_is_symmetric() {
        let bengaluru = point(12.9716, 77.5946);
        let chennai = point(13.0827, 80.2707);
        let there = great_circle_distance_km(bengaluru, chennai);
        let back = great_circle_distance_km(chennai, bengaluru);
        assert!((there - back).abs() < 1e-9);
        assert!((there - 290.172).abs() < 0.01);
    }

    #[test]
    fn antipodal_points_are_half_circumference_apart() {
        let d = great_circle_distance_km(point(0.0, 0.0), point(0.0, 180.0));
        assert!((d - std::f64::consts::PI * EARTH_RADIUS_KM).abs() < 1e-6);
    }

    #[test]
    fn deserialization_validates() {
        let ok: GeoPoint = serde_json::from_str(r#"{"latitude":1.0,"longitude":2.0}"#).unwrap();
        assert_eq!(ok.latitude(), 1.0);
        assert!(serde_json::from_str::<GeoPoint>(r#"{"latitude":100.0,"longitude":2.0}"#).is_err());
    }
}
