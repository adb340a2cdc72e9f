//! Great-circle distance between pharmacy and patient coordinates.
//!
//! Coordinate system:
//! - Latitude: degrees north (-90 to 90)
//! - Longitude: degrees east (-180 to 180)
//! - Distance: kilometers

use std::f64::consts::PI;

use thiserror::Error;

/// Earth's mean radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Degrees to radians conversion factor.
const DEG_TO_RAD: f64 = PI / 180.0;

/// Coordinate validation errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    #[error("invalid coordinate: lat={lat}, lon={lon}")]
    InvalidCoordinate { lat: f64, lon: f64 },
}

pub type GeoResult<T> = Result<T, GeoError>;

/// Validate a coordinate pair.
///
/// Non-finite values and out-of-range degrees are rejected.
pub fn validate(lat: f64, lon: f64) -> GeoResult<()> {
    let lat_ok = lat.is_finite() && (-90.0..=90.0).contains(&lat);
    let lon_ok = lon.is_finite() && (-180.0..=180.0).contains(&lon);
    if lat_ok && lon_ok {
        Ok(())
    } else {
        Err(GeoError::InvalidCoordinate { lat, lon })
    }
}

/// Calculate the great-circle distance between two positions in kilometers.
///
/// Uses the haversine formula. Symmetric: `distance_km(a, b) == distance_km(b, a)`
/// within floating-point tolerance.
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> GeoResult<f64> {
    validate(lat1, lon1)?;
    validate(lat2, lon2)?;

    let lat1_rad = lat1 * DEG_TO_RAD;
    let lat2_rad = lat2 * DEG_TO_RAD;
    let delta_lat = (lat2 - lat1) * DEG_TO_RAD;
    let delta_lon = (lon2 - lon1) * DEG_TO_RAD;

    // Haversine formula
    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    Ok(EARTH_RADIUS_KM * c)
}

/// Format a distance for display: meters below 1 km, kilometers above.
///
/// Purely presentational.
pub fn format_distance(km: f64) -> String {
    if km < 1.0 {
        format!("{} m", (km * 1000.0).round() as i64)
    } else {
        format!("{:.1} km", km)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_distance_zero() {
        let dist = distance_km(27.7, 85.3, 27.7, 85.3).unwrap();
        assert!(dist.abs() < 1e-9, "Same point should have zero distance");
    }

    #[test]
    fn test_distance_kathmandu() {
        // Thamel to New Road, Kathmandu: approximately 1.45 km
        let dist = distance_km(27.7172, 85.3240, 27.7060, 85.3300).unwrap();
        assert!(
            (dist - 1.45).abs() < 0.05,
            "Expected ~1.45 km, got {}",
            dist
        );
    }

    #[test]
    fn test_distance_one_degree_latitude() {
        // 1 degree of latitude is approximately 111 km
        let dist = distance_km(0.0, 0.0, 1.0, 0.0).unwrap();
        assert!((dist - 111.2).abs() < 1.0, "Expected ~111 km, got {}", dist);
    }

    #[test]
    fn test_invalid_latitude() {
        let result = distance_km(91.0, 0.0, 0.0, 0.0);
        assert!(matches!(result, Err(GeoError::InvalidCoordinate { .. })));
    }

    #[test]
    fn test_invalid_longitude() {
        let result = distance_km(0.0, 0.0, 0.0, -180.5);
        assert!(matches!(result, Err(GeoError::InvalidCoordinate { .. })));
    }

    #[test]
    fn test_nan_rejected() {
        let result = distance_km(f64::NAN, 0.0, 0.0, 0.0);
        assert!(result.is_err());
    }

    #[test]
    fn test_format_distance_meters() {
        assert_eq!(format_distance(0.85), "850 m");
        assert_eq!(format_distance(0.0), "0 m");
    }

    #[test]
    fn test_format_distance_kilometers() {
        assert_eq!(format_distance(1.0), "1.0 km");
        assert_eq!(format_distance(12.34), "12.3 km");
    }

    proptest! {
        #[test]
        fn prop_distance_symmetric(
            lat1 in -90.0f64..90.0,
            lon1 in -180.0f64..180.0,
            lat2 in -90.0f64..90.0,
            lon2 in -180.0f64..180.0,
        ) {
            let ab = distance_km(lat1, lon1, lat2, lon2).unwrap();
            let ba = distance_km(lat2, lon2, lat1, lon1).unwrap();
            prop_assert!((ab - ba).abs() < 1e-9);
        }

        #[test]
        fn prop_distance_non_negative_and_bounded(
            lat1 in -90.0f64..90.0,
            lon1 in -180.0f64..180.0,
            lat2 in -90.0f64..90.0,
            lon2 in -180.0f64..180.0,
        ) {
            let dist = distance_km(lat1, lon1, lat2, lon2).unwrap();
            // Half the Earth's circumference is the maximum great-circle distance
            prop_assert!(dist >= 0.0);
            prop_assert!(dist <= EARTH_RADIUS_KM * PI + 1e-6);
        }
    }
}
