//! Certificate service - exactly-once issuance
//!
//! Owns the certificate record and its uniqueness guarantees;
//! rendering (PDF/HTML) belongs to whatever consumes the
//! `CertificateIssued` event. Issuance is an insert-if-absent against
//! the (user, course) unique constraint, so repeated and concurrent
//! calls converge on one row with no duplicate notification.

use std::sync::Arc;

use chrono::{Datelike, Utc};
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::db::certificates::{self, Certificate, CertificateInsert};
use crate::db::GatingDb;
use crate::error::GatingError;

use super::events::{EventBus, GatingEvent};

/// Unambiguous alphabet for certificate numbers (no I, L, O, 0, 1)
const NUMBER_ALPHABET: &[u8] = b"ABCDEFGHJKMNPQRSTUVWXYZ23456789";

/// Length of the random suffix in a certificate number
const NUMBER_SUFFIX_LEN: usize = 10;

/// Length of a verification code
const VERIFICATION_CODE_LEN: usize = 24;

/// Certificate service
pub struct CertificateService {
    db: Arc<GatingDb>,
    events: Arc<EventBus>,
    number_prefix: String,
    max_attempts: u32,
}

impl CertificateService {
    /// Create a new certificate service
    pub fn new(db: Arc<GatingDb>, events: Arc<EventBus>, config: &Config) -> Self {
        Self {
            db,
            events,
            number_prefix: config.certificate_prefix.clone(),
            max_attempts: config.issuance_max_attempts,
        }
    }

    /// Issue a certificate for a completed enrollment
    ///
    /// Idempotent: an existing certificate for the (user, course) pair
    /// is returned unchanged and no event is emitted. Token collisions
    /// regenerate and retry up to the configured budget; exhausting it
    /// fails with `Issuance` and leaves no partial row.
    pub fn issue(&self, user_id: &str, course_id: &str) -> Result<Certificate, GatingError> {
        if let Some(existing) = self.get(user_id, course_id)? {
            return Ok(existing);
        }

        for attempt in 1..=self.max_attempts {
            let candidate = Certificate {
                id: Uuid::new_v4().to_string(),
                user_id: user_id.to_string(),
                course_id: course_id.to_string(),
                certificate_number: self.generate_number(),
                verification_code: generate_verification_code(),
                issued_at: Utc::now().to_rfc3339(),
            };

            let outcome = self
                .db
                .with_conn_mut(|conn| certificates::insert_if_absent(conn, &candidate))?;

            match outcome {
                CertificateInsert::Inserted => {
                    info!(
                        user = %user_id,
                        course = %course_id,
                        number = %candidate.certificate_number,
                        "Issued certificate"
                    );
                    self.events.emit(GatingEvent::CertificateIssued {
                        user_id: user_id.to_string(),
                        course_id: course_id.to_string(),
                        certificate_number: candidate.certificate_number.clone(),
                    });
                    return Ok(candidate);
                }
                CertificateInsert::AlreadyIssued => {
                    // Lost a race against a concurrent issuer
                    return self.get(user_id, course_id)?.ok_or_else(|| {
                        GatingError::Internal("Certificate row missing after conflict".to_string())
                    });
                }
                CertificateInsert::TokenCollision => {
                    warn!(
                        user = %user_id,
                        course = %course_id,
                        attempt = attempt,
                        "Certificate token collision, regenerating"
                    );
                }
            }
        }

        Err(GatingError::Issuance(format!(
            "Could not generate unique certificate tokens after {} attempts",
            self.max_attempts
        )))
    }

    /// Get the certificate for an enrollment, if issued
    pub fn get(&self, user_id: &str, course_id: &str) -> Result<Option<Certificate>, GatingError> {
        self.db
            .with_conn(|conn| certificates::get_for_enrollment(conn, user_id, course_id))
    }

    /// List certificates held by a user
    pub fn list_for_user(&self, user_id: &str) -> Result<Vec<Certificate>, GatingError> {
        self.db
            .with_conn(|conn| certificates::list_for_user(conn, user_id))
    }

    /// Resolve a verification code to its certificate
    pub fn verify(&self, code: &str) -> Result<Certificate, GatingError> {
        self.db
            .with_conn(|conn| certificates::get_by_verification_code(conn, code))?
            .ok_or_else(|| GatingError::NotFound(format!("No certificate for code: {}", code)))
    }

    /// Generate a certificate number, e.g. `LMD-2026-K7KHQ2WPXM`
    fn generate_number(&self) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..NUMBER_SUFFIX_LEN)
            .map(|_| NUMBER_ALPHABET[rng.gen_range(0..NUMBER_ALPHABET.len())] as char)
            .collect();

        format!("{}-{}-{}", self.number_prefix, Utc::now().year(), suffix)
    }
}

/// Generate a verification code
fn generate_verification_code() -> String {
    use rand::distributions::Alphanumeric;

    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(VERIFICATION_CODE_LEN)
        .map(char::from)
        .collect()
}
