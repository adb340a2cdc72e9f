//! Notification inbox database operations.
//!
//! Writes are persisted immediately; emergency notifications are
//! time-sensitive, so no batching or delayed flush is permitted here.

use rusqlite::{params, OptionalExtension};
use tracing::warn;

use super::{Database, DbError, DbResult};
use crate::models::{
    NewNotification, Notification, NotificationKind, Priority, Role, EVENT_SOS_DISPATCH,
};

impl Database {
    /// Insert a single notification and return the stored record.
    pub fn insert_notification(&self, new: &NewNotification) -> DbResult<Notification> {
        let notification = Notification {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: new.user_id.clone(),
            title: new.title.clone(),
            message: new.message.clone(),
            kind: new.kind,
            target_role: new.target_role,
            priority: new.priority,
            metadata: new.metadata.clone(),
            is_read: false,
            created_at: chrono::Utc::now().to_rfc3339(),
        };

        let metadata_json = serde_json::to_string(&notification.metadata)?;
        self.conn.execute(
            r#"
            INSERT INTO notifications (
                id, user_id, title, message, kind, target_role,
                priority, metadata, is_read, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                notification.id,
                notification.user_id,
                notification.title,
                notification.message,
                kind_to_string(&notification.kind),
                notification.target_role.as_ref().map(role_to_string),
                priority_to_string(&notification.priority),
                metadata_json,
                notification.is_read,
                notification.created_at,
            ],
        )?;
        Ok(notification)
    }

    /// Bulk insert. Returns the number of rows actually created.
    ///
    /// An empty slice returns 0 without error. A failure for one recipient
    /// never aborts creation for the others; skipped rows are logged and
    /// show up as a count shortfall for the caller to act on.
    pub fn insert_notifications(&self, notes: &[NewNotification]) -> DbResult<usize> {
        let mut created = 0;
        for note in notes {
            match self.insert_notification(note) {
                Ok(_) => created += 1,
                Err(e) => {
                    warn!(user_id = %note.user_id, error = %e, "skipping undeliverable notification");
                }
            }
        }
        Ok(created)
    }

    /// List a user's notifications, newest first.
    ///
    /// With a role filter, rows matching the role are returned alongside
    /// rows with no role scope (role-agnostic broadcasts).
    pub fn notifications_for_user(
        &self,
        user_id: &str,
        limit: usize,
        skip: usize,
        role: Option<Role>,
    ) -> DbResult<Vec<Notification>> {
        let mut stmt = match role {
            Some(_) => self.conn.prepare(
                r#"
                SELECT id, user_id, title, message, kind, target_role,
                       priority, metadata, is_read, created_at
                FROM notifications
                WHERE user_id = ?1 AND (target_role IS NULL OR target_role = ?2)
                ORDER BY created_at DESC, rowid DESC
                LIMIT ?3 OFFSET ?4
                "#,
            )?,
            None => self.conn.prepare(
                r#"
                SELECT id, user_id, title, message, kind, target_role,
                       priority, metadata, is_read, created_at
                FROM notifications
                WHERE user_id = ?1
                ORDER BY created_at DESC, rowid DESC
                LIMIT ?2 OFFSET ?3
                "#,
            )?,
        };

        let mut notifications = Vec::new();
        match role {
            Some(role) => {
                let rows = stmt.query_map(
                    params![user_id, role_to_string(&role), limit as i64, skip as i64],
                    map_notification_row,
                )?;
                for row in rows {
                    notifications.push(row?.try_into()?);
                }
            }
            None => {
                let rows = stmt.query_map(
                    params![user_id, limit as i64, skip as i64],
                    map_notification_row,
                )?;
                for row in rows {
                    notifications.push(row?.try_into()?);
                }
            }
        }
        Ok(notifications)
    }

    /// Count a user's unread notifications.
    pub fn unread_count(&self, user_id: &str, role: Option<Role>) -> DbResult<usize> {
        let count: i64 = match role {
            Some(role) => self.conn.query_row(
                r#"
                SELECT COUNT(*) FROM notifications
                WHERE user_id = ?1 AND is_read = 0
                  AND (target_role IS NULL OR target_role = ?2)
                "#,
                params![user_id, role_to_string(&role)],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                "SELECT COUNT(*) FROM notifications WHERE user_id = ?1 AND is_read = 0",
                [user_id],
                |row| row.get(0),
            )?,
        };
        Ok(count as usize)
    }

    /// Whether the user has any unread high-priority notification.
    pub fn has_unread_high_priority(&self, user_id: &str, role: Option<Role>) -> DbResult<bool> {
        let count: i64 = match role {
            Some(role) => self.conn.query_row(
                r#"
                SELECT COUNT(*) FROM notifications
                WHERE user_id = ?1 AND is_read = 0 AND priority = 'high'
                  AND (target_role IS NULL OR target_role = ?2)
                "#,
                params![user_id, role_to_string(&role)],
                |row| row.get(0),
            )?,
            None => self.conn.query_row(
                r#"
                SELECT COUNT(*) FROM notifications
                WHERE user_id = ?1 AND is_read = 0 AND priority = 'high'
                "#,
                [user_id],
                |row| row.get(0),
            )?,
        };
        Ok(count > 0)
    }

    /// Mark a single notification as read.
    pub fn mark_notification_read(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("UPDATE notifications SET is_read = 1 WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Mark all of a user's notifications as read. Returns the count flipped.
    pub fn mark_all_read(&self, user_id: &str) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            "UPDATE notifications SET is_read = 1 WHERE user_id = ? AND is_read = 0",
            [user_id],
        )?;
        Ok(rows_affected)
    }

    /// Delete a notification (explicit user action).
    pub fn delete_notification(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM notifications WHERE id = ?", [id])?;
        Ok(rows_affected > 0)
    }

    /// Find an unread notification whose metadata key matches a value.
    ///
    /// Dedup primitive: callers check this before creating stock/expiry
    /// warnings so a user is not flooded with identical unread alerts.
    pub fn find_unread_by_metadata_key(
        &self,
        user_id: &str,
        kind: NotificationKind,
        key: &str,
        value: &str,
    ) -> DbResult<Option<Notification>> {
        self.conn
            .query_row(
                r#"
                SELECT id, user_id, title, message, kind, target_role,
                       priority, metadata, is_read, created_at
                FROM notifications
                WHERE user_id = ?1 AND kind = ?2 AND is_read = 0
                  AND json_extract(metadata, '$.' || ?3) = ?4
                ORDER BY created_at DESC, rowid DESC
                LIMIT 1
                "#,
                params![user_id, kind_to_string(&kind), key, value],
                map_notification_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Distinct users that received the original dispatch fan-out for an SOS.
    pub fn dispatch_recipients(&self, sos_id: &str) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT DISTINCT user_id
            FROM notifications
            WHERE kind = 'sos_update'
              AND json_extract(metadata, '$.event') = ?1
              AND json_extract(metadata, '$.sos_id') = ?2
            "#,
        )?;

        let rows = stmt.query_map(params![EVENT_SOS_DISPATCH, sos_id], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Flip still-unread dispatch notifications for an SOS to read.
    ///
    /// Called once the request is claimed so stale "respond now" prompts
    /// disappear from the non-winning pharmacies' inboxes.
    pub fn mark_dispatch_read(&self, sos_id: &str, except_user_id: &str) -> DbResult<usize> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE notifications SET is_read = 1
            WHERE is_read = 0
              AND kind = 'sos_update'
              AND json_extract(metadata, '$.event') = ?1
              AND json_extract(metadata, '$.sos_id') = ?2
              AND user_id != ?3
            "#,
            params![EVENT_SOS_DISPATCH, sos_id, except_user_id],
        )?;
        Ok(rows_affected)
    }
}

/// Intermediate row struct for database mapping.
struct NotificationRow {
    id: String,
    user_id: String,
    title: String,
    message: String,
    kind: String,
    target_role: Option<String>,
    priority: String,
    metadata: String,
    is_read: bool,
    created_at: String,
}

fn map_notification_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NotificationRow> {
    Ok(NotificationRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        title: row.get(2)?,
        message: row.get(3)?,
        kind: row.get(4)?,
        target_role: row.get(5)?,
        priority: row.get(6)?,
        metadata: row.get(7)?,
        is_read: row.get(8)?,
        created_at: row.get(9)?,
    })
}

impl TryFrom<NotificationRow> for Notification {
    type Error = DbError;

    fn try_from(row: NotificationRow) -> Result<Self, Self::Error> {
        let metadata: serde_json::Value = serde_json::from_str(&row.metadata)?;
        Ok(Notification {
            id: row.id,
            user_id: row.user_id,
            title: row.title,
            message: row.message,
            kind: string_to_kind(&row.kind)?,
            target_role: row.target_role.as_deref().map(string_to_role).transpose()?,
            priority: string_to_priority(&row.priority)?,
            metadata,
            is_read: row.is_read,
            created_at: row.created_at,
        })
    }
}

fn kind_to_string(kind: &NotificationKind) -> &'static str {
    match kind {
        NotificationKind::SosUpdate => "sos_update",
        NotificationKind::CmsAlert => "cms_alert",
        NotificationKind::MedicineAlert => "medicine_alert",
        NotificationKind::LowStockWarning => "low_stock_warning",
        NotificationKind::ExpiryWarning => "expiry_warning",
    }
}

fn string_to_kind(s: &str) -> Result<NotificationKind, DbError> {
    match s {
        "sos_update" => Ok(NotificationKind::SosUpdate),
        "cms_alert" => Ok(NotificationKind::CmsAlert),
        "medicine_alert" => Ok(NotificationKind::MedicineAlert),
        "low_stock_warning" => Ok(NotificationKind::LowStockWarning),
        "expiry_warning" => Ok(NotificationKind::ExpiryWarning),
        _ => Err(DbError::Constraint(format!(
            "Unknown notification kind: {}",
            s
        ))),
    }
}

fn role_to_string(role: &Role) -> &'static str {
    match role {
        Role::Pharmacy => "pharmacy",
        Role::Patient => "patient",
        Role::Admin => "admin",
    }
}

fn string_to_role(s: &str) -> Result<Role, DbError> {
    match s {
        "pharmacy" => Ok(Role::Pharmacy),
        "patient" => Ok(Role::Patient),
        "admin" => Ok(Role::Admin),
        _ => Err(DbError::Constraint(format!("Unknown target role: {}", s))),
    }
}

fn priority_to_string(priority: &Priority) -> &'static str {
    match priority {
        Priority::Normal => "normal",
        Priority::High => "high",
    }
}

fn string_to_priority(s: &str) -> Result<Priority, DbError> {
    match s {
        "normal" => Ok(Priority::Normal),
        "high" => Ok(Priority::High),
        _ => Err(DbError::Constraint(format!("Unknown priority: {}", s))),
    }
}
