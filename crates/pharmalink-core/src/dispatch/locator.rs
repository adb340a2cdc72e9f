//! Candidate pharmacy lookup, ranked by distance.

use std::collections::HashSet;

use crate::db::Database;
use crate::geo;
use crate::models::Pharmacy;

use super::DispatchResult;

/// An eligible pharmacy for an SOS request.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub pharmacy_id: String,
    /// Owning user, the notification recipient.
    pub user_id: String,
    /// Distance from the request origin; `None` for a radius-less broadcast.
    pub distance_km: Option<f64>,
}

/// Locator for eligible pharmacies around a request.
pub struct CandidateLocator<'a> {
    db: &'a Database,
}

impl<'a> CandidateLocator<'a> {
    /// Create a new locator.
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Find eligible pharmacies for a request.
    ///
    /// Only verified pharmacies qualify, and `excluded` ids (pharmacies that
    /// already declined this request) are filtered out. With coordinates the
    /// result is limited to `radius_km` and sorted ascending by distance;
    /// without coordinates every eligible pharmacy is returned unranked
    /// rather than failing the call.
    pub fn find_candidates(
        &self,
        coords: Option<(f64, f64)>,
        radius_km: f64,
        excluded: &[String],
    ) -> DispatchResult<Vec<Candidate>> {
        let excluded: HashSet<&str> = excluded.iter().map(String::as_str).collect();
        let eligible: Vec<Pharmacy> = self
            .db
            .list_verified_pharmacies()?
            .into_iter()
            .filter(|p| !excluded.contains(p.id.as_str()))
            .collect();

        let (lat, lon) = match coords {
            Some(origin) => origin,
            None => {
                // Degraded but safe fallback: broadcast to everyone eligible
                return Ok(eligible
                    .into_iter()
                    .map(|p| Candidate {
                        pharmacy_id: p.id,
                        user_id: p.user_id,
                        distance_km: None,
                    })
                    .collect());
            }
        };

        // Malformed request coordinates fail the whole call up front
        geo::validate(lat, lon)?;

        let mut candidates: Vec<Candidate> = eligible
            .into_iter()
            .filter_map(|p| {
                // Pharmacies without usable coordinates are skipped, never
                // allowed to error the whole lookup
                let (p_lat, p_lon) = p.coordinates()?;
                let distance = geo::distance_km(lat, lon, p_lat, p_lon).ok()?;
                (distance <= radius_km).then_some(Candidate {
                    pharmacy_id: p.id,
                    user_id: p.user_id,
                    distance_km: Some(distance),
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.distance_km
                .partial_cmp(&b.distance_km)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(candidates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::DEFAULT_RADIUS_KM;
    use crate::models::VerificationStatus;

    // Request origin used throughout: central Kathmandu
    const ORIGIN: (f64, f64) = (27.70, 85.30);

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    /// Insert a verified pharmacy roughly `km` kilometers north of ORIGIN.
    fn pharmacy_at_km(db: &Database, name: &str, km: f64) -> Pharmacy {
        // 1 degree of latitude is ~111.2 km
        let lat = ORIGIN.0 + km / 111.2;
        let pharmacy = Pharmacy::new(format!("user-{}", name), name.into(), lat, ORIGIN.1);
        db.insert_pharmacy(&pharmacy).unwrap();
        pharmacy
    }

    #[test]
    fn test_radius_filter_exactness() {
        let db = setup_db();
        let near = pharmacy_at_km(&db, "near", 2.0);
        let mid = pharmacy_at_km(&db, "mid", 10.0);
        let edge = pharmacy_at_km(&db, "edge", 49.9);
        let far = pharmacy_at_km(&db, "far", 50.1);

        let locator = CandidateLocator::new(&db);
        let candidates = locator
            .find_candidates(Some(ORIGIN), DEFAULT_RADIUS_KM, &[])
            .unwrap();

        let ids: Vec<&str> = candidates.iter().map(|c| c.pharmacy_id.as_str()).collect();
        assert_eq!(ids, vec![&near.id, &mid.id, &edge.id]);
        assert!(!ids.contains(&far.id.as_str()));

        // Ascending by distance
        for pair in candidates.windows(2) {
            assert!(pair[0].distance_km.unwrap() <= pair[1].distance_km.unwrap());
        }
    }

    #[test]
    fn test_unverified_excluded() {
        let db = setup_db();
        let mut pending =
            Pharmacy::new("user-p".into(), "Pending Pharma".into(), ORIGIN.0, ORIGIN.1);
        pending.verification = VerificationStatus::Pending;
        db.insert_pharmacy(&pending).unwrap();
        pharmacy_at_km(&db, "verified", 1.0);

        let locator = CandidateLocator::new(&db);
        let candidates = locator
            .find_candidates(Some(ORIGIN), DEFAULT_RADIUS_KM, &[])
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].user_id, "user-verified");
    }

    #[test]
    fn test_excluded_ids_filtered() {
        let db = setup_db();
        let rejecter = pharmacy_at_km(&db, "rejecter", 1.0);
        let other = pharmacy_at_km(&db, "other", 2.0);

        let locator = CandidateLocator::new(&db);
        let candidates = locator
            .find_candidates(Some(ORIGIN), DEFAULT_RADIUS_KM, &[rejecter.id.clone()])
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].pharmacy_id, other.id);
    }

    #[test]
    fn test_no_coordinates_broadcasts_unranked() {
        let db = setup_db();
        pharmacy_at_km(&db, "a", 1.0);
        pharmacy_at_km(&db, "b", 500.0);

        let locator = CandidateLocator::new(&db);
        let candidates = locator
            .find_candidates(None, DEFAULT_RADIUS_KM, &[])
            .unwrap();

        assert_eq!(candidates.len(), 2);
        assert!(candidates.iter().all(|c| c.distance_km.is_none()));
    }

    #[test]
    fn test_pharmacy_without_coordinates_skipped() {
        let db = setup_db();
        let mut ungeolocated =
            Pharmacy::new("user-u".into(), "No Map Pin".into(), ORIGIN.0, ORIGIN.1);
        ungeolocated.latitude = None;
        ungeolocated.longitude = None;
        db.insert_pharmacy(&ungeolocated).unwrap();
        pharmacy_at_km(&db, "located", 1.0);

        let locator = CandidateLocator::new(&db);
        let candidates = locator
            .find_candidates(Some(ORIGIN), DEFAULT_RADIUS_KM, &[])
            .unwrap();

        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].user_id, "user-located");

        // But a radius-less broadcast still reaches it
        let broadcast = locator.find_candidates(None, DEFAULT_RADIUS_KM, &[]).unwrap();
        assert_eq!(broadcast.len(), 2);
    }

    #[test]
    fn test_invalid_request_coordinates_error() {
        let db = setup_db();
        pharmacy_at_km(&db, "a", 1.0);

        let locator = CandidateLocator::new(&db);
        let result = locator.find_candidates(Some((95.0, 85.30)), DEFAULT_RADIUS_KM, &[]);
        assert!(matches!(
            result,
            Err(crate::dispatch::DispatchError::InvalidCoordinate(_))
        ));
    }
}
