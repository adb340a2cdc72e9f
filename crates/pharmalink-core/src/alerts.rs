//! Inventory alert helpers.
//!
//! Low-stock and expiry warnings are created at most once per medicine while
//! an unread twin exists, so a nightly inventory sweep cannot flood a
//! pharmacy's inbox. Delivery beyond the in-app store is out of scope here.

use serde_json::json;
use tracing::debug;

use crate::db::{Database, DbResult};
use crate::models::{NewNotification, Notification, NotificationKind, Priority, Role};

/// Warn a pharmacy that a medicine is running low.
///
/// Returns `None` when an unread low-stock warning for the same medicine
/// already exists.
pub fn create_low_stock_warning(
    db: &Database,
    user_id: &str,
    medicine_id: &str,
    medicine_name: &str,
    quantity: u32,
) -> DbResult<Option<Notification>> {
    if let Some(existing) = db.find_unread_by_metadata_key(
        user_id,
        NotificationKind::LowStockWarning,
        "medicine_id",
        medicine_id,
    )? {
        debug!(user_id, medicine_id, existing_id = %existing.id, "low-stock warning already pending");
        return Ok(None);
    }

    let note = NewNotification::new(
        user_id.to_string(),
        format!("Low stock: {}", medicine_name),
        format!(
            "Only {} units of {} left in your inventory. Restock soon.",
            quantity, medicine_name
        ),
        NotificationKind::LowStockWarning,
    )
    .with_role(Role::Pharmacy)
    .with_priority(Priority::High)
    .with_metadata(json!({
        "medicine_id": medicine_id,
        "medicine_name": medicine_name,
        "quantity": quantity,
    }));

    db.insert_notification(&note).map(Some)
}

/// Warn a pharmacy that a medicine batch is approaching its expiry date.
///
/// Returns `None` when an unread expiry warning for the same medicine
/// already exists.
pub fn create_expiry_warning(
    db: &Database,
    user_id: &str,
    medicine_id: &str,
    medicine_name: &str,
    expiry_date: &str,
) -> DbResult<Option<Notification>> {
    if let Some(existing) = db.find_unread_by_metadata_key(
        user_id,
        NotificationKind::ExpiryWarning,
        "medicine_id",
        medicine_id,
    )? {
        debug!(user_id, medicine_id, existing_id = %existing.id, "expiry warning already pending");
        return Ok(None);
    }

    let note = NewNotification::new(
        user_id.to_string(),
        format!("Expiring soon: {}", medicine_name),
        format!("{} expires on {}. Review the affected batch.", medicine_name, expiry_date),
        NotificationKind::ExpiryWarning,
    )
    .with_role(Role::Pharmacy)
    .with_metadata(json!({
        "medicine_id": medicine_id,
        "medicine_name": medicine_name,
        "expiry_date": expiry_date,
    }));

    db.insert_notification(&note).map(Some)
}
