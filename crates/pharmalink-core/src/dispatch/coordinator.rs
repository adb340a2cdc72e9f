//! SOS fan-out: one high-priority notification per candidate pharmacy.

use std::collections::HashSet;

use serde_json::json;
use tracing::{info, warn};

use crate::db::Database;
use crate::geo;
use crate::models::{
    NewNotification, NotificationKind, Priority, Role, SosRequest, EVENT_SOS_DISPATCH,
};

use super::{Candidate, CandidateLocator, DispatchConfig, DispatchResult, Notifier, StoreNotifier};

/// Orchestrates candidate lookup and notification fan-out for an SOS request.
pub struct Dispatcher<'a> {
    db: &'a Database,
    notifier: &'a dyn Notifier,
    config: DispatchConfig,
}

impl<'a> Dispatcher<'a> {
    /// Create a dispatcher with the default store-backed notifier and radius.
    pub fn new(db: &'a Database) -> Self {
        Self {
            db,
            notifier: &StoreNotifier,
            config: DispatchConfig::default(),
        }
    }

    /// Create a dispatcher with an injected notifier and config.
    pub fn with_notifier(db: &'a Database, notifier: &'a dyn Notifier, config: DispatchConfig) -> Self {
        Self {
            db,
            notifier,
            config,
        }
    }

    /// Notify every candidate pharmacy about an SOS request.
    ///
    /// Returns the number of pharmacies notified. Zero candidates is not a
    /// failure; the request stays visible through direct polling. Dispatch
    /// is decoupled from request persistence and may be retried: a failure
    /// here never rolls back the request itself, and a retry is idempotent
    /// per recipient — each pharmacy gets the "new SOS" prompt at most once
    /// over the request's lifetime.
    pub fn dispatch(&self, sos: &SosRequest) -> DispatchResult<usize> {
        // A pharmacy that already declined is never re-notified
        let rejected = self.db.rejected_pharmacy_ids(&sos.id)?;

        let locator = CandidateLocator::new(self.db);
        let candidates = locator.find_candidates(sos.coordinates(), self.config.radius_km, &rejected)?;

        // A retry only reaches recipients the previous fan-out missed
        let already_notified: HashSet<String> =
            self.db.dispatch_recipients(&sos.id)?.into_iter().collect();
        let candidates: Vec<Candidate> = candidates
            .into_iter()
            .filter(|candidate| !already_notified.contains(&candidate.user_id))
            .collect();

        if candidates.is_empty() {
            info!(sos_id = %sos.id, "no candidate pharmacies for SOS request");
            return Ok(0);
        }

        let notes: Vec<NewNotification> = candidates
            .iter()
            .map(|candidate| build_dispatch_notification(sos, candidate))
            .collect();

        let delivered = self.notifier.deliver_many(self.db, &notes)?;
        if delivered < notes.len() {
            warn!(
                sos_id = %sos.id,
                attempted = notes.len(),
                delivered,
                "partial SOS fan-out"
            );
        }
        info!(sos_id = %sos.id, notified = delivered, "dispatched SOS request");
        Ok(delivered)
    }
}

fn build_dispatch_notification(sos: &SosRequest, candidate: &Candidate) -> NewNotification {
    let distance_part = match candidate.distance_km {
        Some(km) => format!(" ({} away)", geo::format_distance(km)),
        None => String::new(),
    };
    let message = format!(
        "{} urgently needs {} x {} near {}{}. Respond if you can fulfill this request.",
        sos.patient_name, sos.quantity, sos.medicine_name, sos.address, distance_part
    );

    NewNotification::new(
        candidate.user_id.clone(),
        format!("Emergency SOS: {}", sos.medicine_name),
        message,
        NotificationKind::SosUpdate,
    )
    .with_role(Role::Pharmacy)
    .with_priority(Priority::High)
    .with_metadata(json!({
        "event": EVENT_SOS_DISPATCH,
        "sos_id": sos.id,
        "medicine_name": sos.medicine_name,
        "patient_name": sos.patient_name,
        "address": sos.address,
        "link": format!("/pharmacy/sos/{}", sos.id),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Pharmacy, Urgency};

    const ORIGIN: (f64, f64) = (27.70, 85.30);

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn pharmacy_at_km(db: &Database, name: &str, km: f64) -> Pharmacy {
        let lat = ORIGIN.0 + km / 111.2;
        let pharmacy = Pharmacy::new(format!("user-{}", name), name.into(), lat, ORIGIN.1);
        db.insert_pharmacy(&pharmacy).unwrap();
        pharmacy
    }

    fn make_sos(db: &Database) -> SosRequest {
        let sos = SosRequest::new(
            "patient-1".into(),
            "Asha".into(),
            "Paracetamol".into(),
            2,
            Urgency::High,
            Some(ORIGIN.0),
            Some(ORIGIN.1),
            "Thamel, Kathmandu".into(),
        );
        db.insert_sos_request(&sos).unwrap();
        sos
    }

    #[test]
    fn test_fanout_completeness() {
        let db = setup_db();
        pharmacy_at_km(&db, "a", 1.0);
        pharmacy_at_km(&db, "b", 20.0);
        pharmacy_at_km(&db, "c", 80.0); // outside default radius
        let sos = make_sos(&db);

        let notified = Dispatcher::new(&db).dispatch(&sos).unwrap();
        assert_eq!(notified, 2);

        for user in ["user-a", "user-b"] {
            let inbox = db.notifications_for_user(user, 10, 0, None).unwrap();
            assert_eq!(inbox.len(), 1);
            let note = &inbox[0];
            assert_eq!(note.kind, NotificationKind::SosUpdate);
            assert_eq!(note.target_role, Some(Role::Pharmacy));
            assert_eq!(note.priority, Priority::High);
            assert_eq!(note.metadata["sos_id"], sos.id.as_str());
            assert_eq!(note.metadata["medicine_name"], "Paracetamol");
        }
        assert!(db
            .notifications_for_user("user-c", 10, 0, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_zero_candidates_returns_zero() {
        let db = setup_db();
        let sos = make_sos(&db);

        let notified = Dispatcher::new(&db).dispatch(&sos).unwrap();
        assert_eq!(notified, 0);
    }

    #[test]
    fn test_rejecters_not_renotified() {
        let db = setup_db();
        let rejecter = pharmacy_at_km(&db, "rejecter", 1.0);
        pharmacy_at_km(&db, "fresh", 2.0);
        let sos = make_sos(&db);

        db.insert_response(&crate::models::PharmacyResponse::new(
            sos.id.clone(),
            rejecter.id.clone(),
            crate::models::ResponseDecision::Rejected,
            None,
        ))
        .unwrap();

        let notified = Dispatcher::new(&db).dispatch(&sos).unwrap();
        assert_eq!(notified, 1);
        assert!(db
            .notifications_for_user(&rejecter.user_id, 10, 0, None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_retry_does_not_renotify() {
        let db = setup_db();
        pharmacy_at_km(&db, "a", 1.0);
        let sos = make_sos(&db);

        let dispatcher = Dispatcher::new(&db);
        assert_eq!(dispatcher.dispatch(&sos).unwrap(), 1);
        assert_eq!(dispatcher.dispatch(&sos).unwrap(), 0);

        // Still exactly one "new SOS" prompt in the inbox
        let inbox = db.notifications_for_user("user-a", 10, 0, None).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].metadata["event"], EVENT_SOS_DISPATCH);
    }

    #[test]
    fn test_retry_reaches_only_missed_recipients() {
        let db = setup_db();
        pharmacy_at_km(&db, "early", 1.0);
        let sos = make_sos(&db);

        let dispatcher = Dispatcher::new(&db);
        assert_eq!(dispatcher.dispatch(&sos).unwrap(), 1);

        // A pharmacy the first fan-out could not see gets picked up on retry
        pharmacy_at_km(&db, "late", 2.0);
        assert_eq!(dispatcher.dispatch(&sos).unwrap(), 1);

        assert_eq!(
            db.notifications_for_user("user-early", 10, 0, None)
                .unwrap()
                .len(),
            1
        );
        assert_eq!(
            db.notifications_for_user("user-late", 10, 0, None)
                .unwrap()
                .len(),
            1
        );
    }

    #[test]
    fn test_message_includes_distance() {
        let db = setup_db();
        pharmacy_at_km(&db, "a", 20.0);
        let sos = make_sos(&db);

        Dispatcher::new(&db).dispatch(&sos).unwrap();
        let inbox = db.notifications_for_user("user-a", 10, 0, None).unwrap();
        assert!(inbox[0].message.contains("km away"), "{}", inbox[0].message);
    }
}
