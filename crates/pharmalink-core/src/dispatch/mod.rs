//! SOS dispatch and response resolution.
//!
//! Pipeline: Candidate Lookup → Notification Fan-out → Pharmacy Response → Race Resolution

mod coordinator;
mod locator;
mod notifier;
mod responder;

pub use coordinator::*;
pub use locator::*;
pub use notifier::*;
pub use responder::*;

use thiserror::Error;

use crate::db::DbError;
use crate::geo::GeoError;

/// Default candidate radius in kilometers.
///
/// Deliberately broad: medicine emergencies should not be under-served by a
/// tight radius.
pub const DEFAULT_RADIUS_KM: f64 = 50.0;

/// Dispatch and response errors.
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error(transparent)]
    InvalidCoordinate(#[from] GeoError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("SOS request {0} was already fulfilled by another pharmacy")]
    AlreadyClaimed(String),

    #[error("pharmacy {0} is not verified")]
    Forbidden(String),

    #[error("invalid decision: {0} (expected 'accepted' or 'rejected')")]
    InvalidDecision(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

/// Tunables for candidate lookup.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Candidate radius in kilometers.
    pub radius_km: f64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            radius_km: DEFAULT_RADIUS_KM,
        }
    }
}
