//! SOS request and pharmacy response models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How urgent the patient's medicine need is.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Urgency {
    Low,
    Medium,
    High,
}

/// Lifecycle status of an SOS request.
///
/// `Pending` is the only non-terminal state; a request transitions to
/// `Accepted` at most once and is never deleted (audit trail).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SosStatus {
    /// Open; any verified pharmacy may still accept.
    Pending,
    /// Claimed by exactly one pharmacy.
    Accepted,
}

/// A patient-initiated urgent medicine request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SosRequest {
    /// Unique request ID
    pub id: String,
    /// Requesting patient's user ID
    pub patient_id: String,
    /// Patient display name (carried into pharmacy notifications)
    pub patient_name: String,
    /// Medicine being requested
    pub medicine_name: String,
    /// Generic/alternative name, if known
    pub generic_name: Option<String>,
    /// Requested quantity
    pub quantity: u32,
    /// Urgency level
    pub urgency: Urgency,
    /// Patient latitude; absent coordinates degrade to a radius-less broadcast
    pub latitude: Option<f64>,
    /// Patient longitude
    pub longitude: Option<f64>,
    /// Free-text address
    pub address: String,
    /// Extra context from the patient
    pub additional_notes: Option<String>,
    /// Request status
    pub status: SosStatus,
    /// Winning pharmacy; immutable once set
    pub accepted_by_pharmacy_id: Option<String>,
    /// When the request was claimed
    pub accepted_at: Option<String>,
    /// Creation timestamp
    pub created_at: String,
}

impl SosRequest {
    /// Create a new pending SOS request.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        patient_id: String,
        patient_name: String,
        medicine_name: String,
        quantity: u32,
        urgency: Urgency,
        latitude: Option<f64>,
        longitude: Option<f64>,
        address: String,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            patient_name,
            medicine_name,
            generic_name: None,
            quantity,
            urgency,
            latitude,
            longitude,
            address,
            additional_notes: None,
            status: SosStatus::Pending,
            accepted_by_pharmacy_id: None,
            accepted_at: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Coordinate pair, if the request carries one.
    pub fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.latitude, self.longitude) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        }
    }

    /// Whether the request is still open for acceptance.
    pub fn is_open(&self) -> bool {
        self.status == SosStatus::Pending
    }
}

/// A pharmacy's decision on an SOS request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ResponseDecision {
    Accepted,
    Rejected,
}

impl ResponseDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseDecision::Accepted => "accepted",
            ResponseDecision::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ResponseDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseDecision {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(ResponseDecision::Accepted),
            "rejected" => Ok(ResponseDecision::Rejected),
            other => Err(other.to_string()),
        }
    }
}

/// A pharmacy's recorded response to an SOS request.
///
/// Append-only; at most one row per (sos_id, pharmacy_id).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PharmacyResponse {
    /// Unique response ID
    pub id: String,
    /// The SOS request responded to
    pub sos_id: String,
    /// Responding pharmacy
    pub pharmacy_id: String,
    /// Accept or reject
    pub decision: ResponseDecision,
    /// Optional note from the pharmacy
    pub note: Option<String>,
    /// Response timestamp
    pub responded_at: String,
}

impl PharmacyResponse {
    /// Record a new response.
    pub fn new(
        sos_id: String,
        pharmacy_id: String,
        decision: ResponseDecision,
        note: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            sos_id,
            pharmacy_id,
            decision,
            note,
            responded_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
