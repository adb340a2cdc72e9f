//! In-app notification models.

use serde::{Deserialize, Serialize};

// SOS lifecycle event names carried under the metadata "event" key.

/// Original fan-out to candidate pharmacies.
pub const EVENT_SOS_DISPATCH: &str = "sos_dispatch";
/// Another pharmacy already fulfilled the request.
pub const EVENT_SOS_CLAIMED: &str = "sos_claimed";
/// Patient outcome: a pharmacy accepted.
pub const EVENT_SOS_ACCEPTED: &str = "sos_accepted";
/// Patient outcome: a pharmacy declined.
pub const EVENT_SOS_REJECTED: &str = "sos_rejected";

/// What a notification is about.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NotificationKind {
    /// SOS lifecycle events (dispatch, acceptance, rejection, claimed-by-other)
    SosUpdate,
    /// Admin CMS announcements
    CmsAlert,
    /// Medicine availability alerts
    MedicineAlert,
    /// Inventory low-stock warning
    LowStockWarning,
    /// Inventory expiry warning
    ExpiryWarning,
}

/// Audience scope of a notification. `None` means visible to every role.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Role {
    Pharmacy,
    Patient,
    Admin,
}

/// Delivery priority.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Priority {
    Normal,
    High,
}

/// A stored per-user notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    /// Unique notification ID
    pub id: String,
    /// Recipient user ID
    pub user_id: String,
    /// Short headline
    pub title: String,
    /// Body text
    pub message: String,
    /// Notification kind
    pub kind: NotificationKind,
    /// Role scope; `None` = role-agnostic broadcast
    pub target_role: Option<Role>,
    /// Priority
    pub priority: Priority,
    /// Structured payload (sos_id, medicine_name, link, ...)
    pub metadata: serde_json::Value,
    /// Read state
    pub is_read: bool,
    /// Creation timestamp
    pub created_at: String,
}

/// Insert payload for a notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NewNotification {
    pub user_id: String,
    pub title: String,
    pub message: String,
    pub kind: NotificationKind,
    pub target_role: Option<Role>,
    pub priority: Priority,
    pub metadata: serde_json::Value,
}

impl NewNotification {
    /// Create a normal-priority notification with empty metadata.
    pub fn new(user_id: String, title: String, message: String, kind: NotificationKind) -> Self {
        Self {
            user_id,
            title,
            message,
            kind,
            target_role: None,
            priority: Priority::Normal,
            metadata: serde_json::json!({}),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.target_role = Some(role);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}
