//! SQLite schema definition.

/// Complete database schema for pharmalink.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- Pharmacies (read-only projection of the marketplace onboarding data)
-- ============================================================================

CREATE TABLE IF NOT EXISTS pharmacies (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    latitude REAL,
    longitude REAL,
    verification TEXT NOT NULL DEFAULT 'pending', -- pending, verified, rejected
    phone TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_pharmacies_user ON pharmacies(user_id);
CREATE INDEX IF NOT EXISTS idx_pharmacies_verification ON pharmacies(verification);

-- ============================================================================
-- SOS Requests (claimed at most once, never deleted)
-- ============================================================================

CREATE TABLE IF NOT EXISTS sos_requests (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL,
    patient_name TEXT NOT NULL,
    medicine_name TEXT NOT NULL,
    generic_name TEXT,
    quantity INTEGER NOT NULL DEFAULT 1,
    urgency TEXT NOT NULL DEFAULT 'medium',       -- low, medium, high
    latitude REAL,
    longitude REAL,
    address TEXT NOT NULL DEFAULT '',
    additional_notes TEXT,
    status TEXT NOT NULL DEFAULT 'pending',       -- pending, accepted
    accepted_by_pharmacy_id TEXT REFERENCES pharmacies(id),
    accepted_at TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_sos_patient ON sos_requests(patient_id);
CREATE INDEX IF NOT EXISTS idx_sos_status ON sos_requests(status);

-- Accepted rows must carry the winner and the timestamp
CREATE TRIGGER IF NOT EXISTS sos_requests_check_accepted BEFORE UPDATE ON sos_requests
WHEN new.status = 'accepted'
BEGIN
    SELECT CASE
        WHEN new.accepted_by_pharmacy_id IS NULL THEN
            RAISE(ABORT, 'Accepted requests must name the accepting pharmacy')
        WHEN new.accepted_at IS NULL THEN
            RAISE(ABORT, 'Accepted requests must carry an acceptance timestamp')
    END;
END;

-- The winner is immutable once set
CREATE TRIGGER IF NOT EXISTS sos_requests_check_no_reclaim BEFORE UPDATE ON sos_requests
WHEN old.status = 'accepted'
  AND new.accepted_by_pharmacy_id IS NOT old.accepted_by_pharmacy_id
BEGIN
    SELECT RAISE(ABORT, 'Accepted requests cannot change hands');
END;

-- ============================================================================
-- Pharmacy Responses (append-only, one per pharmacy per request)
-- ============================================================================

CREATE TABLE IF NOT EXISTS pharmacy_responses (
    id TEXT PRIMARY KEY,
    sos_id TEXT NOT NULL REFERENCES sos_requests(id),
    pharmacy_id TEXT NOT NULL REFERENCES pharmacies(id),
    decision TEXT NOT NULL CHECK (decision IN ('accepted', 'rejected')),
    note TEXT,
    responded_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (sos_id, pharmacy_id)
);

CREATE INDEX IF NOT EXISTS idx_responses_sos ON pharmacy_responses(sos_id);

-- ============================================================================
-- Notifications (per-user inbox)
-- ============================================================================

CREATE TABLE IF NOT EXISTS notifications (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    title TEXT NOT NULL,
    message TEXT NOT NULL,
    kind TEXT NOT NULL,                           -- sos_update, cms_alert, medicine_alert, low_stock_warning, expiry_warning
    target_role TEXT,                             -- pharmacy, patient, admin, NULL = all roles
    priority TEXT NOT NULL DEFAULT 'normal',      -- normal, high
    metadata TEXT NOT NULL DEFAULT '{}',          -- JSON object (sos_id, medicine_name, link, ...)
    is_read INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_notifications_user ON notifications(user_id, is_read);
CREATE INDEX IF NOT EXISTS idx_notifications_kind ON notifications(kind);
"#;
