// MFA credential record and the request/response types around it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::envelope::EncryptedEnvelope;

/// A single one-time recovery code, sealed at rest.
///
/// Consumption is permanent: a consumed entry is excluded from every later
/// scan, so resubmitting the same code can never match again.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupCodeEntry {
    /// Sealed plaintext of the code
    pub envelope: EncryptedEnvelope,
    /// Whether this code has been used
    pub consumed: bool,
    /// When the code was used (if applicable)
    pub consumed_at: Option<DateTime<Utc>>,
}

impl BackupCodeEntry {
    pub fn new(envelope: EncryptedEnvelope) -> Self {
        Self {
            envelope,
            consumed: false,
            consumed_at: None,
        }
    }
}

/// Per-user MFA credential record, one per user, owned exclusively by that
/// user's identity. Mutated on every verification; replaced wholesale on
/// secret rotation or backup-code regeneration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MfaCredential {
    /// Sealed TOTP secret; the raw secret is never persisted in clear
    pub secret_envelope: EncryptedEnvelope,
    /// One-time recovery codes, fixed cardinality at issuance
    pub backup_codes: Vec<BackupCodeEntry>,
    /// True only after the enrollment code has been verified once
    pub enabled: bool,
    /// Consecutive failed verification attempts since the last success
    pub failed_attempts: u32,
    /// End of the current lockout window, if any
    pub locked_until: Option<DateTime<Utc>>,
    /// Last successful verification
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MfaCredential {
    /// Create a fresh, disabled credential around a sealed secret.
    pub fn new(secret_envelope: EncryptedEnvelope, now: DateTime<Utc>) -> Self {
        Self {
            secret_envelope,
            backup_codes: Vec::new(),
            enabled: false,
            failed_attempts: 0,
            locked_until: None,
            last_used_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn mark_updated(&mut self, now: DateTime<Utc>) {
        self.updated_at = now;
    }

    /// Unconsumed backup codes left in the current set.
    pub fn remaining_backup_codes(&self) -> usize {
        self.backup_codes.iter().filter(|c| !c.consumed).count()
    }
}

/// A submitted second-factor code, tagged by kind so both verification
/// paths are handled exhaustively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum CodeSubmission {
    /// Six-digit time-based code
    Totp { code: String },
    /// Eight-character one-time recovery code
    Backup { code: String },
}

impl CodeSubmission {
    pub fn code(&self) -> &str {
        match self {
            CodeSubmission::Totp { code } | CodeSubmission::Backup { code } => code,
        }
    }
}

/// Which method satisfied a verification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerifiedMethod {
    Totp,
    Backup,
}

/// Successful verification outcome
#[derive(Debug, Clone, Serialize)]
pub struct VerificationSuccess {
    pub method: VerifiedMethod,
    /// Populated on the backup path so callers can warn the user when the
    /// set runs low
    pub remaining_backup_codes: Option<usize>,
}

/// Material handed to the user at enrollment start. The manual key and URI
/// are shown once; only the envelope is persisted.
#[derive(Debug, Clone, Serialize)]
pub struct EnrollmentStart {
    /// Base32 secret for manual entry into an authenticator app
    pub manual_key: String,
    /// otpauth:// provisioning URI
    pub display_uri: String,
    /// Unicode rendering of the provisioning QR code
    pub qr_code: String,
    /// Sealed secret as persisted on the new credential
    pub secret_envelope: EncryptedEnvelope,
}

/// Caller-visible credential state, without any secret material.
#[derive(Debug, Clone, Serialize)]
pub struct MfaStatus {
    pub enabled: bool,
    pub remaining_backup_codes: usize,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::envelope::{EnvelopeKey, seal};

    #[test]
    fn test_new_credential_is_disabled() {
        let key = EnvelopeKey::from_bytes([1u8; 32]);
        let envelope = seal(b"secret", &key).unwrap();
        let now = Utc::now();

        let credential = MfaCredential::new(envelope, now);
        assert!(!credential.enabled);
        assert_eq!(credential.failed_attempts, 0);
        assert!(credential.locked_until.is_none());
        assert!(credential.backup_codes.is_empty());
        assert_eq!(credential.remaining_backup_codes(), 0);
    }

    #[test]
    fn test_remaining_backup_codes_skips_consumed() {
        let key = EnvelopeKey::from_bytes([1u8; 32]);
        let envelope = seal(b"secret", &key).unwrap();
        let mut credential = MfaCredential::new(envelope.clone(), Utc::now());

        credential.backup_codes = vec![
            BackupCodeEntry::new(envelope.clone()),
            BackupCodeEntry::new(envelope.clone()),
            BackupCodeEntry::new(envelope),
        ];
        credential.backup_codes[1].consumed = true;

        assert_eq!(credential.remaining_backup_codes(), 2);
    }

    #[test]
    fn test_code_submission_tagged_serialization() {
        let submission: CodeSubmission =
            serde_json::from_str(r#"{"kind":"totp","code":"123456"}"#).unwrap();
        assert!(matches!(submission, CodeSubmission::Totp { ref code } if code == "123456"));

        let submission: CodeSubmission =
            serde_json::from_str(r#"{"kind":"backup","code":"A1B2C3D4"}"#).unwrap();
        assert!(matches!(submission, CodeSubmission::Backup { ref code } if code == "A1B2C3D4"));
    }
}
