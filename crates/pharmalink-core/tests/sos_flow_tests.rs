//! End-to-end SOS flow tests over the public service facade.

use std::thread;

use pharmalink_core::{
    DispatchError, NotificationKind, Pharmacy, Priority, RespondOutcome, Role, ServiceError,
    SosService, SosStatus, Urgency,
};

// Request origin used throughout: central Kathmandu
const ORIGIN: (f64, f64) = (27.70, 85.30);

/// Register a verified pharmacy roughly `km` kilometers north of ORIGIN.
fn pharmacy_at_km(service: &SosService, name: &str, km: f64) -> Pharmacy {
    // 1 degree of latitude is ~111.2 km
    let lat = ORIGIN.0 + km / 111.2;
    service
        .register_pharmacy(format!("user-{}", name), name.into(), lat, ORIGIN.1)
        .unwrap()
}

fn create_paracetamol_sos(service: &SosService) -> pharmalink_core::SosRequest {
    service
        .create_sos_request(
            "patient-1".into(),
            "Asha".into(),
            "Paracetamol".into(),
            2,
            Urgency::High,
            Some(ORIGIN.0),
            Some(ORIGIN.1),
            "Thamel, Kathmandu".into(),
        )
        .unwrap()
}

#[test]
fn test_paracetamol_flow() {
    let service = SosService::open_in_memory().unwrap();
    let near = pharmacy_at_km(&service, "near", 1.0);
    let mid = pharmacy_at_km(&service, "mid", 20.0);
    let far = pharmacy_at_km(&service, "far", 80.0);
    let sos = create_paracetamol_sos(&service);

    // Fan-out reaches the two pharmacies inside the 50 km default radius
    assert_eq!(service.dispatch(&sos.id).unwrap(), 2);
    for user in [&near.user_id, &mid.user_id] {
        let inbox = service.notifications_for_user(user, 10, 0, None).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].kind, NotificationKind::SosUpdate);
        assert_eq!(inbox[0].priority, Priority::High);
        assert_eq!(inbox[0].target_role, Some(Role::Pharmacy));
        assert_eq!(inbox[0].metadata["sos_id"], sos.id.as_str());
    }
    assert!(service
        .notifications_for_user(&far.user_id, 10, 0, None)
        .unwrap()
        .is_empty());

    // The nearest pharmacy accepts and wins
    let outcome = service
        .respond(&sos.id, &near.id, "accepted", Some("In stock".into()))
        .unwrap();
    match outcome {
        RespondOutcome::Accepted { request, pharmacy } => {
            assert_eq!(request.status, SosStatus::Accepted);
            assert_eq!(request.accepted_by_pharmacy_id.as_deref(), Some(near.id.as_str()));
            assert_eq!(pharmacy.name, "near");
        }
        other => panic!("expected acceptance, got {:?}", other),
    }

    // Patient gets exactly one acceptance notification
    let patient_inbox = service
        .notifications_for_user("patient-1", 10, 0, None)
        .unwrap();
    assert_eq!(patient_inbox.len(), 1);
    assert_eq!(patient_inbox[0].priority, Priority::High);
    assert!(patient_inbox[0].message.contains("near"));

    // The losing pharmacy's dispatch is marked read and replaced by exactly
    // one claimed-by-other note
    let mid_inbox = service
        .notifications_for_user(&mid.user_id, 10, 0, None)
        .unwrap();
    assert_eq!(mid_inbox.len(), 2);
    let claimed: Vec<_> = mid_inbox
        .iter()
        .filter(|n| n.metadata["event"] == "sos_claimed")
        .collect();
    assert_eq!(claimed.len(), 1);
    assert!(!claimed[0].is_read);
    let dispatches: Vec<_> = mid_inbox
        .iter()
        .filter(|n| n.metadata["event"] == "sos_dispatch")
        .collect();
    assert_eq!(dispatches.len(), 1);
    assert!(dispatches[0].is_read);

    // The pharmacy outside the radius hears nothing at all
    assert!(service
        .notifications_for_user(&far.user_id, 10, 0, None)
        .unwrap()
        .is_empty());

    // A latecomer cannot accept
    let late = service.respond(&sos.id, &mid.id, "accepted", None);
    assert!(matches!(
        late,
        Err(ServiceError::Dispatch(DispatchError::AlreadyClaimed(_)))
    ));
}

#[test]
fn test_reject_keeps_request_open_and_excludes_rejecter() {
    let service = SosService::open_in_memory().unwrap();
    let rejecter = pharmacy_at_km(&service, "rejecter", 1.0);
    let other = pharmacy_at_km(&service, "other", 2.0);
    let sos = create_paracetamol_sos(&service);

    assert_eq!(service.dispatch(&sos.id).unwrap(), 2);

    let outcome = service
        .respond(&sos.id, &rejecter.id, "rejected", Some("Out of stock".into()))
        .unwrap();
    assert!(matches!(outcome, RespondOutcome::Rejected { .. }));

    let reloaded = service.get_sos_request(&sos.id).unwrap().unwrap();
    assert_eq!(reloaded.status, SosStatus::Pending);

    // A re-dispatch skips the rejecter and everyone already prompted; only a
    // pharmacy the first fan-out missed is reached
    let late = pharmacy_at_km(&service, "late", 3.0);
    assert_eq!(service.dispatch(&sos.id).unwrap(), 1);
    let rejecter_inbox = service
        .notifications_for_user(&rejecter.user_id, 10, 0, None)
        .unwrap();
    assert_eq!(rejecter_inbox.len(), 1);
    let other_inbox = service
        .notifications_for_user(&other.user_id, 10, 0, None)
        .unwrap();
    assert_eq!(other_inbox.len(), 1);
    let late_inbox = service
        .notifications_for_user(&late.user_id, 10, 0, None)
        .unwrap();
    assert_eq!(late_inbox.len(), 1);

    // The other pharmacy can still win
    let outcome = service.respond(&sos.id, &other.id, "accepted", None).unwrap();
    assert!(matches!(outcome, RespondOutcome::Accepted { .. }));
}

#[test]
fn test_concurrent_accepts_single_winner() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap().to_string();

    let service = SosService::open(&path).unwrap();
    let pharmacies: Vec<Pharmacy> = (0..8)
        .map(|i| pharmacy_at_km(&service, &format!("p{}", i), 1.0 + i as f64))
        .collect();
    let sos = create_paracetamol_sos(&service);
    assert_eq!(service.dispatch(&sos.id).unwrap(), 8);
    drop(service);

    // Every pharmacy races on its own connection
    let handles: Vec<_> = pharmacies
        .iter()
        .map(|pharmacy| {
            let path = path.clone();
            let sos_id = sos.id.clone();
            let pharmacy_id = pharmacy.id.clone();
            thread::spawn(move || {
                let service = SosService::open(&path).unwrap();
                service.respond(&sos_id, &pharmacy_id, "accepted", None)
            })
        })
        .collect();

    let mut winners = 0;
    let mut claimed = 0;
    for handle in handles {
        match handle.join().unwrap() {
            Ok(RespondOutcome::Accepted { .. }) => winners += 1,
            Err(ServiceError::Dispatch(DispatchError::AlreadyClaimed(_))) => claimed += 1,
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
    assert_eq!(winners, 1);
    assert_eq!(claimed, 7);

    // The stored request names exactly one winner
    let service = SosService::open(&path).unwrap();
    let reloaded = service.get_sos_request(&sos.id).unwrap().unwrap();
    assert_eq!(reloaded.status, SosStatus::Accepted);
    assert!(reloaded.accepted_by_pharmacy_id.is_some());
    assert!(reloaded.accepted_at.is_some());
}
