//! Notification delivery strategy.
//!
//! Dispatch and response resolution create notifications through this seam
//! so callers can swap in a no-op or retrying implementation without
//! touching core logic. Failures on this path are fire-and-forget with a
//! logged anomaly; they never fail the triggering action.

use crate::db::{Database, DbResult};
use crate::models::{NewNotification, Notification};

/// Creates notification records on behalf of the dispatch pipeline.
pub trait Notifier {
    /// Create a single notification.
    fn deliver(&self, db: &Database, note: &NewNotification) -> DbResult<Notification>;

    /// Create many notifications; returns the number actually created.
    ///
    /// A failure for one recipient must not abort the rest.
    fn deliver_many(&self, db: &Database, notes: &[NewNotification]) -> DbResult<usize>;
}

/// Default notifier: writes straight to the notification inbox.
pub struct StoreNotifier;

impl Notifier for StoreNotifier {
    fn deliver(&self, db: &Database, note: &NewNotification) -> DbResult<Notification> {
        db.insert_notification(note)
    }

    fn deliver_many(&self, db: &Database, notes: &[NewNotification]) -> DbResult<usize> {
        db.insert_notifications(notes)
    }
}
