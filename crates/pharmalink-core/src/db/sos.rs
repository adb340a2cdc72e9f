//! SOS request and pharmacy response database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{PharmacyResponse, ResponseDecision, SosRequest, SosStatus, Urgency};

impl Database {
    /// Insert a new SOS request.
    pub fn insert_sos_request(&self, sos: &SosRequest) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO sos_requests (
                id, patient_id, patient_name, medicine_name, generic_name,
                quantity, urgency, latitude, longitude, address,
                additional_notes, status, accepted_by_pharmacy_id, accepted_at, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                sos.id,
                sos.patient_id,
                sos.patient_name,
                sos.medicine_name,
                sos.generic_name,
                sos.quantity,
                urgency_to_string(&sos.urgency),
                sos.latitude,
                sos.longitude,
                sos.address,
                sos.additional_notes,
                status_to_string(&sos.status),
                sos.accepted_by_pharmacy_id,
                sos.accepted_at,
                sos.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get an SOS request by ID.
    pub fn get_sos_request(&self, id: &str) -> DbResult<Option<SosRequest>> {
        self.conn
            .query_row(
                r#"
                SELECT id, patient_id, patient_name, medicine_name, generic_name,
                       quantity, urgency, latitude, longitude, address,
                       additional_notes, status, accepted_by_pharmacy_id, accepted_at, created_at
                FROM sos_requests
                WHERE id = ?
                "#,
                [id],
                map_sos_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// Claim a pending SOS request for a pharmacy.
    ///
    /// This is the single serialization point for the accept race: one
    /// conditional update guarded by the current `pending` status. Zero
    /// affected rows means another writer already won.
    pub fn try_accept_sos(
        &self,
        sos_id: &str,
        pharmacy_id: &str,
        accepted_at: &str,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE sos_requests SET
                status = 'accepted',
                accepted_by_pharmacy_id = ?2,
                accepted_at = ?3
            WHERE id = ?1 AND status = 'pending'
            "#,
            params![sos_id, pharmacy_id, accepted_at],
        )?;
        Ok(rows_affected > 0)
    }

    /// Record a pharmacy's response. At most one row per (sos, pharmacy).
    pub fn insert_response(&self, response: &PharmacyResponse) -> DbResult<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO pharmacy_responses (
                    id, sos_id, pharmacy_id, decision, note, responded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    response.id,
                    response.sos_id,
                    response.pharmacy_id,
                    response.decision.as_str(),
                    response.note,
                    response.responded_at,
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    DbError::Constraint(format!(
                        "Pharmacy {} already responded to SOS {}",
                        response.pharmacy_id, response.sos_id
                    ))
                }
                other => DbError::Sqlite(other),
            })?;
        Ok(())
    }

    /// Get a pharmacy's response to an SOS request, if any.
    pub fn get_response(
        &self,
        sos_id: &str,
        pharmacy_id: &str,
    ) -> DbResult<Option<PharmacyResponse>> {
        self.conn
            .query_row(
                r#"
                SELECT id, sos_id, pharmacy_id, decision, note, responded_at
                FROM pharmacy_responses
                WHERE sos_id = ? AND pharmacy_id = ?
                "#,
                [sos_id, pharmacy_id],
                map_response_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List all responses recorded for an SOS request.
    pub fn list_responses(&self, sos_id: &str) -> DbResult<Vec<PharmacyResponse>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, sos_id, pharmacy_id, decision, note, responded_at
            FROM pharmacy_responses
            WHERE sos_id = ?
            ORDER BY responded_at
            "#,
        )?;

        let rows = stmt.query_map([sos_id], map_response_row)?;

        let mut responses = Vec::new();
        for row in rows {
            responses.push(row?.try_into()?);
        }
        Ok(responses)
    }

    /// IDs of pharmacies that rejected this SOS request.
    ///
    /// Used to keep a pharmacy that declined out of future candidate lists
    /// for the same request.
    pub fn rejected_pharmacy_ids(&self, sos_id: &str) -> DbResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT pharmacy_id
            FROM pharmacy_responses
            WHERE sos_id = ? AND decision = 'rejected'
            "#,
        )?;

        let rows = stmt.query_map([sos_id], |row| row.get(0))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

/// Intermediate row struct for database mapping.
struct SosRow {
    id: String,
    patient_id: String,
    patient_name: String,
    medicine_name: String,
    generic_name: Option<String>,
    quantity: u32,
    urgency: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    address: String,
    additional_notes: Option<String>,
    status: String,
    accepted_by_pharmacy_id: Option<String>,
    accepted_at: Option<String>,
    created_at: String,
}

fn map_sos_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SosRow> {
    Ok(SosRow {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        patient_name: row.get(2)?,
        medicine_name: row.get(3)?,
        generic_name: row.get(4)?,
        quantity: row.get(5)?,
        urgency: row.get(6)?,
        latitude: row.get(7)?,
        longitude: row.get(8)?,
        address: row.get(9)?,
        additional_notes: row.get(10)?,
        status: row.get(11)?,
        accepted_by_pharmacy_id: row.get(12)?,
        accepted_at: row.get(13)?,
        created_at: row.get(14)?,
    })
}

impl TryFrom<SosRow> for SosRequest {
    type Error = DbError;

    fn try_from(row: SosRow) -> Result<Self, Self::Error> {
        Ok(SosRequest {
            id: row.id,
            patient_id: row.patient_id,
            patient_name: row.patient_name,
            medicine_name: row.medicine_name,
            generic_name: row.generic_name,
            quantity: row.quantity,
            urgency: string_to_urgency(&row.urgency)?,
            latitude: row.latitude,
            longitude: row.longitude,
            address: row.address,
            additional_notes: row.additional_notes,
            status: string_to_status(&row.status)?,
            accepted_by_pharmacy_id: row.accepted_by_pharmacy_id,
            accepted_at: row.accepted_at,
            created_at: row.created_at,
        })
    }
}

/// Intermediate row struct for response mapping.
struct ResponseRow {
    id: String,
    sos_id: String,
    pharmacy_id: String,
    decision: String,
    note: Option<String>,
    responded_at: String,
}

fn map_response_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ResponseRow> {
    Ok(ResponseRow {
        id: row.get(0)?,
        sos_id: row.get(1)?,
        pharmacy_id: row.get(2)?,
        decision: row.get(3)?,
        note: row.get(4)?,
        responded_at: row.get(5)?,
    })
}

impl TryFrom<ResponseRow> for PharmacyResponse {
    type Error = DbError;

    fn try_from(row: ResponseRow) -> Result<Self, Self::Error> {
        let decision = row
            .decision
            .parse::<ResponseDecision>()
            .map_err(|s| DbError::Constraint(format!("Unknown response decision: {}", s)))?;

        Ok(PharmacyResponse {
            id: row.id,
            sos_id: row.sos_id,
            pharmacy_id: row.pharmacy_id,
            decision,
            note: row.note,
            responded_at: row.responded_at,
        })
    }
}

fn status_to_string(status: &SosStatus) -> &'static str {
    match status {
        SosStatus::Pending => "pending",
        SosStatus::Accepted => "accepted",
    }
}

fn string_to_status(s: &str) -> Result<SosStatus, DbError> {
    match s {
        "pending" => Ok(SosStatus::Pending),
        "accepted" => Ok(SosStatus::Accepted),
        _ => Err(DbError::Constraint(format!("Unknown SOS status: {}", s))),
    }
}

fn urgency_to_string(urgency: &Urgency) -> &'static str {
    match urgency {
        Urgency::Low => "low",
        Urgency::Medium => "medium",
        Urgency::High => "high",
    }
}

fn string_to_urgency(s: &str) -> Result<Urgency, DbError> {
    match s {
        "low" => Ok(Urgency::Low),
        "medium" => Ok(Urgency::Medium),
        "high" => Ok(Urgency::High),
        _ => Err(DbError::Constraint(format!("Unknown urgency: {}", s))),
    }
}
