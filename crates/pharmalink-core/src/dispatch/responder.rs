//! Pharmacy response state machine with at-most-one-winner semantics.
//!
//! Two pharmacies may accept the same request concurrently, possibly from
//! different worker processes, so in-memory locks cannot serialize the race.
//! The accept transition is a storage-level conditional update guarded by the
//! current `pending` status; exactly one writer commits and every other
//! caller observes the post-commit state and fails with `AlreadyClaimed`.

use serde_json::json;
use tracing::{debug, info, warn};

use crate::db::{Database, DbError};
use crate::models::{
    NewNotification, NotificationKind, Pharmacy, PharmacyResponse, Priority, ResponseDecision,
    Role, SosRequest, EVENT_SOS_ACCEPTED, EVENT_SOS_CLAIMED, EVENT_SOS_REJECTED,
};

use super::{DispatchError, DispatchResult, Notifier, StoreNotifier};

/// Contact details of the accepting pharmacy, returned to the patient side.
#[derive(Debug, Clone, PartialEq)]
pub struct PharmacyContact {
    pub pharmacy_id: String,
    pub name: String,
    pub phone: Option<String>,
}

impl From<&Pharmacy> for PharmacyContact {
    fn from(pharmacy: &Pharmacy) -> Self {
        Self {
            pharmacy_id: pharmacy.id.clone(),
            name: pharmacy.name.clone(),
            phone: pharmacy.phone.clone(),
        }
    }
}

/// Result of a pharmacy's response.
#[derive(Debug, Clone, PartialEq)]
pub enum RespondOutcome {
    /// This pharmacy won the request.
    Accepted {
        request: SosRequest,
        pharmacy: PharmacyContact,
    },
    /// Declined; the request stays open for other pharmacies.
    Rejected { sos_id: String },
}

/// Resolves pharmacy responses to SOS requests.
pub struct Responder<'a> {
    db: &'a Database,
    notifier: &'a dyn Notifier,
}

impl<'a> Responder<'a> {
    /// Create a responder with the default store-backed notifier.
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            notifier: &StoreNotifier,
        }
    }

    /// Create a responder with an injected notifier.
    pub fn with_notifier(db: &'a Database, notifier: &'a dyn Notifier) -> Self {
        Self { db, notifier }
    }

    /// Record a pharmacy's decision on an SOS request.
    ///
    /// Validation happens before any write. Notification side effects are
    /// fire-and-forget: the responder's own outcome never fails because a
    /// downstream notification could not be created.
    pub fn respond(
        &self,
        sos_id: &str,
        pharmacy_id: &str,
        decision: ResponseDecision,
        note: Option<String>,
    ) -> DispatchResult<RespondOutcome> {
        let sos = self
            .db
            .get_sos_request(sos_id)?
            .ok_or_else(|| DispatchError::NotFound(format!("SOS request {}", sos_id)))?;
        let pharmacy = self
            .db
            .get_pharmacy(pharmacy_id)?
            .ok_or_else(|| DispatchError::NotFound(format!("pharmacy {}", pharmacy_id)))?;
        if !pharmacy.is_verified() {
            return Err(DispatchError::Forbidden(pharmacy.id));
        }

        if let Some(existing) = self.db.get_response(sos_id, pharmacy_id)? {
            return self.replay(sos, &pharmacy, &existing, decision);
        }

        match decision {
            ResponseDecision::Accepted => self.accept(sos, &pharmacy, note),
            ResponseDecision::Rejected => self.reject(sos, &pharmacy, note),
        }
    }

    /// Answer a repeat response from the stored row.
    ///
    /// No second write, no second patient notification; a prior decision is
    /// final and cannot be flipped.
    fn replay(
        &self,
        sos: SosRequest,
        pharmacy: &Pharmacy,
        existing: &PharmacyResponse,
        decision: ResponseDecision,
    ) -> DispatchResult<RespondOutcome> {
        if existing.decision != decision {
            return Err(DbError::Constraint(format!(
                "Pharmacy {} already responded '{}' to SOS {}",
                pharmacy.id, existing.decision, sos.id
            ))
            .into());
        }

        match existing.decision {
            ResponseDecision::Accepted
                if sos.accepted_by_pharmacy_id.as_deref() == Some(pharmacy.id.as_str()) =>
            {
                Ok(RespondOutcome::Accepted {
                    request: sos,
                    pharmacy: pharmacy.into(),
                })
            }
            // An accepted row without a matching winner cannot happen through
            // this path; treat it like losing the race
            ResponseDecision::Accepted => Err(DispatchError::AlreadyClaimed(sos.id)),
            ResponseDecision::Rejected => Ok(RespondOutcome::Rejected { sos_id: sos.id }),
        }
    }

    fn accept(
        &self,
        sos: SosRequest,
        pharmacy: &Pharmacy,
        note: Option<String>,
    ) -> DispatchResult<RespondOutcome> {
        if !sos.is_open() {
            return Err(DispatchError::AlreadyClaimed(sos.id));
        }

        let accepted_at = chrono::Utc::now().to_rfc3339();
        if !self.db.try_accept_sos(&sos.id, &pharmacy.id, &accepted_at)? {
            // Another writer committed between our read and this update
            info!(sos_id = %sos.id, pharmacy_id = %pharmacy.id, "lost accept race");
            return Err(DispatchError::AlreadyClaimed(sos.id));
        }

        let response = PharmacyResponse::new(
            sos.id.clone(),
            pharmacy.id.clone(),
            ResponseDecision::Accepted,
            note,
        );
        self.db.insert_response(&response)?;

        let updated = self
            .db
            .get_sos_request(&sos.id)?
            .ok_or_else(|| DispatchError::NotFound(format!("SOS request {}", sos.id)))?;
        info!(sos_id = %updated.id, pharmacy_id = %pharmacy.id, "SOS request accepted");

        if let Err(e) = self.notify_patient_accepted(&updated, pharmacy) {
            warn!(sos_id = %updated.id, error = %e, "failed to notify patient of acceptance");
        }
        if let Err(e) = self.notify_non_winners(&updated, pharmacy) {
            warn!(sos_id = %updated.id, error = %e, "failed to notify non-winning pharmacies");
        }

        Ok(RespondOutcome::Accepted {
            request: updated,
            pharmacy: pharmacy.into(),
        })
    }

    fn reject(
        &self,
        sos: SosRequest,
        pharmacy: &Pharmacy,
        note: Option<String>,
    ) -> DispatchResult<RespondOutcome> {
        let response = PharmacyResponse::new(
            sos.id.clone(),
            pharmacy.id.clone(),
            ResponseDecision::Rejected,
            note,
        );
        self.db.insert_response(&response)?;
        info!(sos_id = %sos.id, pharmacy_id = %pharmacy.id, "SOS request declined");

        if let Err(e) = self.notify_patient_rejected(&sos, pharmacy) {
            warn!(sos_id = %sos.id, error = %e, "failed to notify patient of decline");
        }

        Ok(RespondOutcome::Rejected { sos_id: sos.id })
    }

    fn notify_patient_accepted(&self, sos: &SosRequest, winner: &Pharmacy) -> DispatchResult<()> {
        let note = NewNotification::new(
            sos.patient_id.clone(),
            "Your SOS request was accepted".into(),
            format!(
                "{} accepted your request for {} and will contact you shortly.",
                winner.name, sos.medicine_name
            ),
            NotificationKind::SosUpdate,
        )
        .with_role(Role::Patient)
        .with_priority(Priority::High)
        .with_metadata(json!({
            "event": EVENT_SOS_ACCEPTED,
            "sos_id": sos.id,
            "medicine_name": sos.medicine_name,
            "pharmacy_name": winner.name,
        }));
        self.notifier.deliver(self.db, &note)?;
        Ok(())
    }

    fn notify_patient_rejected(&self, sos: &SosRequest, pharmacy: &Pharmacy) -> DispatchResult<()> {
        let note = NewNotification::new(
            sos.patient_id.clone(),
            "A pharmacy declined your SOS request".into(),
            format!(
                "{} cannot fulfill your request for {}. Other pharmacies can still respond.",
                pharmacy.name, sos.medicine_name
            ),
            NotificationKind::SosUpdate,
        )
        .with_role(Role::Patient)
        .with_metadata(json!({
            "event": EVENT_SOS_REJECTED,
            "sos_id": sos.id,
            "medicine_name": sos.medicine_name,
            "pharmacy_name": pharmacy.name,
        }));
        self.notifier.deliver(self.db, &note)?;
        Ok(())
    }

    /// Tell every other previously-notified pharmacy the request is closed
    /// and retire their stale dispatch prompts.
    fn notify_non_winners(&self, sos: &SosRequest, winner: &Pharmacy) -> DispatchResult<()> {
        let recipients: Vec<String> = self
            .db
            .dispatch_recipients(&sos.id)?
            .into_iter()
            .filter(|user_id| user_id != &winner.user_id)
            .collect();

        let cleared = self.db.mark_dispatch_read(&sos.id, &winner.user_id)?;
        debug!(sos_id = %sos.id, cleared, "retired stale dispatch notifications");

        if recipients.is_empty() {
            return Ok(());
        }

        let notes: Vec<NewNotification> = recipients
            .into_iter()
            .map(|user_id| {
                NewNotification::new(
                    user_id,
                    format!("SOS request claimed: {}", sos.medicine_name),
                    format!(
                        "{} is fulfilling the request for {}. No action needed.",
                        winner.name, sos.medicine_name
                    ),
                    NotificationKind::SosUpdate,
                )
                .with_role(Role::Pharmacy)
                .with_metadata(json!({
                    "event": EVENT_SOS_CLAIMED,
                    "sos_id": sos.id,
                    "medicine_name": sos.medicine_name,
                    "pharmacy_name": winner.name,
                }))
            })
            .collect();

        let delivered = self.notifier.deliver_many(self.db, &notes)?;
        if delivered < notes.len() {
            warn!(
                sos_id = %sos.id,
                attempted = notes.len(),
                delivered,
                "partial claimed-by-other fan-out"
            );
        }
        Ok(())
    }
}
