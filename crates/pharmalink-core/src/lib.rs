//! Pharmalink Core Library
//!
//! Emergency SOS dispatch and notification fan-out for a pharmacy
//! marketplace.
//!
//! # Architecture
//!
//! ```text
//! Patient SOS request
//!         │
//!         ▼
//!   [sos_requests]
//!         │
//!         ▼
//!  CandidateLocator ── verified pharmacies within radius,
//!         │            ranked by haversine distance
//!         ▼
//!     Dispatcher ──────► one high-priority notification
//!         │              per candidate pharmacy
//!         ▼
//!     Responder
//!    ┌────┴────┐
//!  accept    reject
//!    │          │
//!    ▼          ▼
//!  CAS on    stays open,
//! 'pending'  rejecter excluded
//!    │       from re-dispatch
//!    ▼
//!  winner: patient notified, losers get
//!  "claimed", stale dispatches marked read
//! ```
//!
//! # Core Principle
//!
//! **At most one pharmacy wins a request.** The accept transition is a
//! storage-level conditional update; no in-memory lock is load-bearing.
//!
//! # Modules
//!
//! - [`db`]: SQLite storage layer (pharmacies, SOS requests, responses, notifications)
//! - [`models`]: Domain types (SosRequest, Pharmacy, Notification, ...)
//! - [`geo`]: Haversine distance and coordinate validation
//! - [`dispatch`]: Candidate lookup, fan-out, and response resolution
//! - [`alerts`]: Deduplicated inventory warnings

pub mod alerts;
pub mod db;
pub mod dispatch;
pub mod geo;
pub mod models;

// Re-export commonly used types
pub use db::{Database, DbError};
pub use dispatch::{
    Candidate, CandidateLocator, DispatchConfig, DispatchError, Dispatcher, Notifier,
    PharmacyContact, RespondOutcome, Responder, StoreNotifier, DEFAULT_RADIUS_KM,
};
pub use models::{
    NewNotification, Notification, NotificationKind, Pharmacy, PharmacyResponse, Priority,
    ResponseDecision, Role, SosRequest, SosStatus, Urgency, VerificationStatus,
};

use std::sync::{Arc, Mutex};

/// Errors surfaced by the [`SosService`] facade.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Invalid coordinate: {0}")]
    InvalidCoordinate(#[from] geo::GeoError),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

impl<T> From<std::sync::PoisonError<T>> for ServiceError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ServiceError::LockPoisoned(e.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Thread-safe entry point over a single database handle.
///
/// Cheap to clone; every clone shares the underlying connection. Suitable
/// for handing to request handlers that each perform one operation.
#[derive(Clone)]
pub struct SosService {
    db: Arc<Mutex<Database>>,
    config: DispatchConfig,
}

impl SosService {
    /// Open or create a database at the given path.
    pub fn open(path: &str) -> ServiceResult<Self> {
        Ok(Self::from_database(Database::open(path)?))
    }

    /// Create an in-memory service (for testing).
    pub fn open_in_memory() -> ServiceResult<Self> {
        Ok(Self::from_database(Database::open_in_memory()?))
    }

    fn from_database(db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            config: DispatchConfig::default(),
        }
    }

    /// Override the dispatch radius.
    pub fn with_config(mut self, config: DispatchConfig) -> Self {
        self.config = config;
        self
    }

    // =========================================================================
    // Pharmacy Operations
    // =========================================================================

    /// Register a verified pharmacy.
    pub fn register_pharmacy(
        &self,
        user_id: String,
        name: String,
        latitude: f64,
        longitude: f64,
    ) -> ServiceResult<Pharmacy> {
        geo::validate(latitude, longitude)?;
        let db = self.db.lock()?;
        let pharmacy = Pharmacy::new(user_id, name, latitude, longitude);
        db.insert_pharmacy(&pharmacy)?;
        Ok(pharmacy)
    }

    /// Get a pharmacy by ID.
    pub fn get_pharmacy(&self, pharmacy_id: &str) -> ServiceResult<Option<Pharmacy>> {
        let db = self.db.lock()?;
        Ok(db.get_pharmacy(pharmacy_id)?)
    }

    // =========================================================================
    // SOS Operations
    // =========================================================================

    /// Create an SOS request. Coordinates are optional but validated when
    /// present; a coordinate-less request falls back to broadcast dispatch.
    #[allow(clippy::too_many_arguments)]
    pub fn create_sos_request(
        &self,
        patient_id: String,
        patient_name: String,
        medicine_name: String,
        quantity: u32,
        urgency: Urgency,
        latitude: Option<f64>,
        longitude: Option<f64>,
        address: String,
    ) -> ServiceResult<SosRequest> {
        if let (Some(lat), Some(lon)) = (latitude, longitude) {
            geo::validate(lat, lon)?;
        }
        let db = self.db.lock()?;
        let sos = SosRequest::new(
            patient_id,
            patient_name,
            medicine_name,
            quantity,
            urgency,
            latitude,
            longitude,
            address,
        );
        db.insert_sos_request(&sos)?;
        Ok(sos)
    }

    /// Get an SOS request by ID.
    pub fn get_sos_request(&self, sos_id: &str) -> ServiceResult<Option<SosRequest>> {
        let db = self.db.lock()?;
        Ok(db.get_sos_request(sos_id)?)
    }

    /// Fan out an SOS request to candidate pharmacies. Returns the number
    /// notified. Safe to retry: pharmacies that already declined or were
    /// already prompted are skipped, so each recipient hears about a request
    /// at most once.
    pub fn dispatch(&self, sos_id: &str) -> ServiceResult<usize> {
        let db = self.db.lock()?;
        let sos = db
            .get_sos_request(sos_id)?
            .ok_or_else(|| DispatchError::NotFound(format!("SOS request {}", sos_id)))?;
        let dispatcher = Dispatcher::with_notifier(&db, &StoreNotifier, self.config.clone());
        Ok(dispatcher.dispatch(&sos)?)
    }

    /// Record a pharmacy's decision on an SOS request.
    ///
    /// `decision` is the wire form, `"accepted"` or `"rejected"`.
    pub fn respond(
        &self,
        sos_id: &str,
        pharmacy_id: &str,
        decision: &str,
        note: Option<String>,
    ) -> ServiceResult<RespondOutcome> {
        let decision: ResponseDecision = decision
            .parse()
            .map_err(DispatchError::InvalidDecision)?;
        let db = self.db.lock()?;
        let responder = Responder::new(&db);
        Ok(responder.respond(sos_id, pharmacy_id, decision, note)?)
    }

    // =========================================================================
    // Inbox Operations
    // =========================================================================

    /// Page through a user's notifications, newest first.
    pub fn notifications_for_user(
        &self,
        user_id: &str,
        limit: usize,
        skip: usize,
        role: Option<Role>,
    ) -> ServiceResult<Vec<Notification>> {
        let db = self.db.lock()?;
        Ok(db.notifications_for_user(user_id, limit, skip, role)?)
    }

    /// Count a user's unread notifications.
    pub fn unread_count(&self, user_id: &str, role: Option<Role>) -> ServiceResult<usize> {
        let db = self.db.lock()?;
        Ok(db.unread_count(user_id, role)?)
    }

    /// Whether the user has any unread high-priority notification.
    pub fn has_unread_high_priority(
        &self,
        user_id: &str,
        role: Option<Role>,
    ) -> ServiceResult<bool> {
        let db = self.db.lock()?;
        Ok(db.has_unread_high_priority(user_id, role)?)
    }

    /// Mark one notification as read. Returns false when the ID is unknown.
    pub fn mark_read(&self, notification_id: &str) -> ServiceResult<bool> {
        let db = self.db.lock()?;
        Ok(db.mark_notification_read(notification_id)?)
    }

    /// Mark all of a user's notifications as read. Returns the count flipped.
    pub fn mark_all_read(&self, user_id: &str) -> ServiceResult<usize> {
        let db = self.db.lock()?;
        Ok(db.mark_all_read(user_id)?)
    }
}
