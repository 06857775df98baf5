//! Certificate CRUD operations
//!
//! At most one certificate per (user, course), enforced by a unique
//! constraint so concurrent issuers converge on a single row. The
//! certificate number and verification code carry their own global
//! unique indexes; a violation there is reported separately so the
//! caller can regenerate tokens instead of failing the issuance.

use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use crate::error::GatingError;

/// Certificate row from database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Certificate {
    pub id: String,
    pub user_id: String,
    pub course_id: String,
    pub certificate_number: String,
    pub verification_code: String,
    pub issued_at: String,
}

impl Certificate {
    fn from_row(row: &Row) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            user_id: row.get("user_id")?,
            course_id: row.get("course_id")?,
            certificate_number: row.get("certificate_number")?,
            verification_code: row.get("verification_code")?,
            issued_at: row.get("issued_at")?,
        })
    }
}

/// Outcome of an insert-if-absent attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateInsert {
    /// The candidate row was written
    Inserted,
    /// A certificate already exists for this (user, course)
    AlreadyIssued,
    /// The number or code collided with another certificate
    TokenCollision,
}

/// Insert a certificate unless one already exists for the enrollment
///
/// The (user, course) conflict is absorbed by `ON CONFLICT DO NOTHING`;
/// any remaining constraint violation can only be a token collision.
pub fn insert_if_absent(
    conn: &Connection,
    certificate: &Certificate,
) -> Result<CertificateInsert, GatingError> {
    let result = conn.execute(
        r#"
        INSERT INTO certificates
            (id, user_id, course_id, certificate_number, verification_code, issued_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id, course_id) DO NOTHING
        "#,
        params![
            certificate.id,
            certificate.user_id,
            certificate.course_id,
            certificate.certificate_number,
            certificate.verification_code,
            certificate.issued_at,
        ],
    );

    match result {
        Ok(0) => Ok(CertificateInsert::AlreadyIssued),
        Ok(_) => Ok(CertificateInsert::Inserted),
        Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
            Ok(CertificateInsert::TokenCollision)
        }
        Err(e) => Err(GatingError::Internal(format!(
            "Certificate insert failed: {}",
            e
        ))),
    }
}

/// Get the certificate for an enrollment
pub fn get_for_enrollment(
    conn: &Connection,
    user_id: &str,
    course_id: &str,
) -> Result<Option<Certificate>, GatingError> {
    conn.query_row(
        "SELECT * FROM certificates WHERE user_id = ? AND course_id = ?",
        params![user_id, course_id],
        |row| Certificate::from_row(row),
    )
    .optional()
    .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))
}

/// Look up a certificate by its verification code
pub fn get_by_verification_code(
    conn: &Connection,
    code: &str,
) -> Result<Option<Certificate>, GatingError> {
    conn.query_row(
        "SELECT * FROM certificates WHERE verification_code = ?",
        params![code],
        |row| Certificate::from_row(row),
    )
    .optional()
    .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))
}

/// List certificates for a user
pub fn list_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Certificate>, GatingError> {
    let mut stmt = conn
        .prepare("SELECT * FROM certificates WHERE user_id = ? ORDER BY issued_at, course_id")
        .map_err(|e| GatingError::Internal(format!("Prepare failed: {}", e)))?;

    let certificates: Vec<Certificate> = stmt
        .query_map(params![user_id], |row| Certificate::from_row(row))
        .map_err(|e| GatingError::Internal(format!("Query failed: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GatingError::Internal(format!("Row parse failed: {}", e)))?;

    Ok(certificates)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::GatingDb;

    fn certificate(user: &str, course: &str, number: &str, code: &str) -> Certificate {
        Certificate {
            id: format!("cert-{}-{}", user, course),
            user_id: user.to_string(),
            course_id: course.to_string(),
            certificate_number: number.to_string(),
            verification_code: code.to_string(),
            issued_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_insert_then_duplicate_enrollment_is_absorbed() {
        let db = GatingDb::open_in_memory().unwrap();

        let first = db
            .with_conn(|conn| insert_if_absent(conn, &certificate("u1", "c1", "N1", "V1")))
            .unwrap();
        assert_eq!(first, CertificateInsert::Inserted);

        // Same enrollment, different tokens: absorbed, row unchanged
        let second = db
            .with_conn(|conn| insert_if_absent(conn, &certificate("u1", "c1", "N2", "V2")))
            .unwrap();
        assert_eq!(second, CertificateInsert::AlreadyIssued);

        let stored = db
            .with_conn(|conn| get_for_enrollment(conn, "u1", "c1"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.certificate_number, "N1");
    }

    #[test]
    fn test_token_collision_is_reported_not_fatal() {
        let db = GatingDb::open_in_memory().unwrap();
        db.with_conn(|conn| insert_if_absent(conn, &certificate("u1", "c1", "N1", "V1")))
            .unwrap();

        // Different enrollment but same certificate number
        let outcome = db
            .with_conn(|conn| insert_if_absent(conn, &certificate("u2", "c1", "N1", "V2")))
            .unwrap();
        assert_eq!(outcome, CertificateInsert::TokenCollision);

        // No partial row for the losing enrollment
        assert!(db
            .with_conn(|conn| get_for_enrollment(conn, "u2", "c1"))
            .unwrap()
            .is_none());

        // Same for a verification code collision
        let outcome = db
            .with_conn(|conn| insert_if_absent(conn, &certificate("u2", "c1", "N3", "V1")))
            .unwrap();
        assert_eq!(outcome, CertificateInsert::TokenCollision);
    }

    #[test]
    fn test_verification_code_lookup() {
        let db = GatingDb::open_in_memory().unwrap();
        db.with_conn(|conn| insert_if_absent(conn, &certificate("u1", "c1", "N1", "V1")))
            .unwrap();

        let found = db
            .with_conn(|conn| get_by_verification_code(conn, "V1"))
            .unwrap();
        assert_eq!(found.unwrap().user_id, "u1");

        let missing = db
            .with_conn(|conn| get_by_verification_code(conn, "nope"))
            .unwrap();
        assert!(missing.is_none());
    }
}
