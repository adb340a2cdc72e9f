//! Pharmacy projection database operations.

use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};
use crate::models::{Pharmacy, VerificationStatus};

impl Database {
    /// Insert a pharmacy projection row.
    pub fn insert_pharmacy(&self, pharmacy: &Pharmacy) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO pharmacies (
                id, user_id, name, latitude, longitude, verification, phone
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                pharmacy.id,
                pharmacy.user_id,
                pharmacy.name,
                pharmacy.latitude,
                pharmacy.longitude,
                verification_to_string(&pharmacy.verification),
                pharmacy.phone,
            ],
        )?;
        Ok(())
    }

    /// Get a pharmacy by ID.
    pub fn get_pharmacy(&self, id: &str) -> DbResult<Option<Pharmacy>> {
        self.conn
            .query_row(
                r#"
                SELECT id, user_id, name, latitude, longitude, verification, phone
                FROM pharmacies
                WHERE id = ?
                "#,
                [id],
                map_pharmacy_row,
            )
            .optional()?
            .map(|row| row.try_into())
            .transpose()
    }

    /// List all verified pharmacies.
    pub fn list_verified_pharmacies(&self) -> DbResult<Vec<Pharmacy>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, user_id, name, latitude, longitude, verification, phone
            FROM pharmacies
            WHERE verification = 'verified'
            ORDER BY name
            "#,
        )?;

        let rows = stmt.query_map([], map_pharmacy_row)?;

        let mut pharmacies = Vec::new();
        for row in rows {
            pharmacies.push(row?.try_into()?);
        }
        Ok(pharmacies)
    }

    /// Update a pharmacy's verification state.
    pub fn set_pharmacy_verification(
        &self,
        id: &str,
        verification: VerificationStatus,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE pharmacies SET verification = ? WHERE id = ?",
            params![verification_to_string(&verification), id],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct PharmacyRow {
    id: String,
    user_id: String,
    name: String,
    latitude: Option<f64>,
    longitude: Option<f64>,
    verification: String,
    phone: Option<String>,
}

fn map_pharmacy_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PharmacyRow> {
    Ok(PharmacyRow {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        latitude: row.get(3)?,
        longitude: row.get(4)?,
        verification: row.get(5)?,
        phone: row.get(6)?,
    })
}

impl TryFrom<PharmacyRow> for Pharmacy {
    type Error = DbError;

    fn try_from(row: PharmacyRow) -> Result<Self, Self::Error> {
        Ok(Pharmacy {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            latitude: row.latitude,
            longitude: row.longitude,
            verification: string_to_verification(&row.verification)?,
            phone: row.phone,
        })
    }
}

fn verification_to_string(status: &VerificationStatus) -> &'static str {
    match status {
        VerificationStatus::Pending => "pending",
        VerificationStatus::Verified => "verified",
        VerificationStatus::Rejected => "rejected",
    }
}

fn string_to_verification(s: &str) -> Result<VerificationStatus, DbError> {
    match s {
        "pending" => Ok(VerificationStatus::Pending),
        "verified" => Ok(VerificationStatus::Verified),
        "rejected" => Ok(VerificationStatus::Rejected),
        _ => Err(DbError::Constraint(format!(
            "Unknown verification status: {}",
            s
        ))),
    }
}
