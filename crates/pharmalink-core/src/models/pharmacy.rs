//! Pharmacy projection used by candidate lookup.

use serde::{Deserialize, Serialize};

/// Onboarding verification state.
///
/// Only `Verified` pharmacies are dispatch candidates or may respond.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum VerificationStatus {
    Pending,
    Verified,
    Rejected,
}

/// Read-only pharmacy projection.
///
/// Onboarding and profile editing live in the wider marketplace; this core
/// only needs identity, location, and verification state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pharmacy {
    /// Pharmacy ID
    pub id: String,
    /// Owning user's ID (notification recipient)
    pub user_id: String,
    /// Display name
    pub name: String,
    /// Latitude; may be absent for pharmacies that never geocoded
    pub latitude: Option<f64>,
    /// Longitude
    pub longitude: Option<f64>,
    /// Verification state
    pub verification: VerificationStatus,
    /// Contact phone, returned to the patient on acceptance
    pub phone: Option<String>,
}

impl Pharmacy {
    /// Create a verified pharmacy at a location.
    pub fn new(user_id: String, name: String, latitude: f64, longitude: f64) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            name,
            latitude: Some(latitude),
            longitude: Some(longitude),
            verification: VerificationStatus::Verified,
            phone: None,
        }
    }

    /// Whether this pharmacy may be notified about or respond to SOS requests.
    pub fn is_verified(&self) -> bool {
        self.verification == VerificationStatus::Verified
    }

    /// Coordinate pair, if both components are present.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }
}
