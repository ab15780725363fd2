// Verification orchestrator
// Combines the TOTP manager, backup-code ledger, and lockout policy over a
// credential store; one load and one save per invocation

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::audit::{AttemptContext, AttemptRecord, AttemptRecorder, AuditSink};
use crate::config::MfaConfig;
use crate::crypto::envelope::{self, EnvelopeError, EnvelopeKey};
use crate::mfa::backup_codes::{self, BackupCodeLedger};
use crate::mfa::lockout::{LockoutPolicy, LockoutStatus};
use crate::mfa::totp::{TotpManager, TotpSecret};
use crate::models::{
    CodeSubmission, EnrollmentStart, MfaCredential, MfaStatus, VerificationSuccess, VerifiedMethod,
};
use crate::storage::{CredentialStore, StoreError, VersionedCredential};

/// Verification errors. Only this coarse taxonomy crosses the caller
/// boundary; cryptographic and storage detail stays inside.
#[derive(Debug, Clone)]
pub enum MfaError {
    /// MFA was never enabled for this user; recoverable by enrollment
    NotConfigured,
    /// Enrollment was requested while MFA is already active
    AlreadyEnabled,
    /// Temporarily locked after repeated failures; clears itself at
    /// `unlock_at`
    Locked { unlock_at: DateTime<Utc> },
    /// The submitted code did not match. Carries the lockout deadline when
    /// this failure crossed the threshold.
    InvalidCode { locked_until: Option<DateTime<Utc>> },
    /// The submitted code failed boundary validation; rejected before any
    /// store access and without touching the failure counter
    MalformedCode(String),
    /// Credential material could not be decrypted: corrupted storage or a
    /// key mismatch, never a user-correctable condition
    Corrupt,
    /// The credential changed concurrently and the retry lost as well
    Conflict,
    /// The store failed
    Store(StoreError),
}

impl std::fmt::Display for MfaError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MfaError::NotConfigured => {
                write!(f, "multi-factor authentication is not configured")
            }
            MfaError::AlreadyEnabled => {
                write!(f, "multi-factor authentication is already enabled")
            }
            MfaError::Locked { unlock_at } => {
                write!(f, "verification is locked until {}", unlock_at)
            }
            MfaError::InvalidCode { .. } => write!(f, "invalid authentication code"),
            MfaError::MalformedCode(msg) => write!(f, "{}", msg),
            MfaError::Corrupt => write!(f, "credential record could not be read"),
            MfaError::Conflict => {
                write!(f, "verification could not be completed, please retry")
            }
            MfaError::Store(_) => write!(f, "storage backend unavailable"),
        }
    }
}

impl std::error::Error for MfaError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MfaError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for MfaError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => MfaError::Conflict,
            other => MfaError::Store(other),
        }
    }
}

/// Façade over the verification core.
///
/// Each call treats the user's credential record as a single-writer
/// resource: load, evaluate, mutate, save once with the loaded version.
/// A concurrent writer makes the save conflict, the call retries the whole
/// critical section once, and a second conflict surfaces as transient.
pub struct MfaService {
    store: Arc<dyn CredentialStore>,
    audit: AttemptRecorder,
    key: EnvelopeKey,
    totp: TotpManager,
    ledger: BackupCodeLedger,
    lockout: LockoutPolicy,
}

impl MfaService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        sink: Arc<dyn AuditSink>,
        key: EnvelopeKey,
        config: &MfaConfig,
    ) -> Self {
        Self {
            store,
            audit: AttemptRecorder::new(sink),
            key,
            totp: TotpManager::new(config.totp.clone()),
            ledger: BackupCodeLedger::new(config.backup_codes.clone()),
            lockout: LockoutPolicy::new(config.lockout.clone()),
        }
    }

    /// Start enrollment: generate and seal a fresh secret, persist a
    /// disabled credential, and hand back the one-time provisioning
    /// material. Re-running before completion replaces the pending secret;
    /// an active credential must be disabled first.
    pub async fn begin_enrollment(
        &self,
        user_id: &str,
        account_name: &str,
        now: DateTime<Utc>,
    ) -> Result<EnrollmentStart, MfaError> {
        let existing = self.store.load(user_id).await?;
        if let Some(ref versioned) = existing {
            if versioned.credential.enabled {
                return Err(MfaError::AlreadyEnabled);
            }
        }

        let secret = self.totp.generate_secret();
        let secret_envelope =
            envelope::seal(secret.as_bytes(), &self.key).map_err(|_| MfaError::Corrupt)?;

        let manual_key = self.totp.manual_key(&secret);
        let display_uri = self.totp.provisioning_uri(&secret, account_name);
        let qr_code = self.totp.qr_code(&display_uri).unwrap_or_else(|e| {
            warn!("QR code rendering failed: {}", e);
            String::new()
        });

        let credential = MfaCredential::new(secret_envelope.clone(), now);
        self.store
            .save(user_id, credential, existing.map(|v| v.version))
            .await?;

        info!(user_id, "MFA enrollment started");

        Ok(EnrollmentStart {
            manual_key,
            display_uri,
            qr_code,
            secret_envelope,
        })
    }

    /// Complete enrollment with the first code from the authenticator app.
    /// On success the credential is enabled and the one-time backup codes
    /// are issued and returned; their plaintext exists only in this reply.
    pub async fn complete_enrollment(
        &self,
        user_id: &str,
        code: &str,
        context: &AttemptContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, MfaError> {
        let code = self.validate_totp_code(code)?;

        let Some(versioned) = self.store.load(user_id).await? else {
            return Err(MfaError::NotConfigured);
        };
        let VersionedCredential {
            mut credential,
            version,
        } = versioned;

        if credential.enabled {
            return Err(MfaError::AlreadyEnabled);
        }

        if let LockoutStatus::Locked { unlock_at } = self.lockout.status(&credential, now) {
            return Err(MfaError::Locked { unlock_at });
        }

        let secret = self.open_secret(&credential)?;
        if self.totp.verify_code(secret.as_bytes(), &code, now) {
            let (plain_codes, entries) = self
                .ledger
                .issue(&self.key)
                .map_err(|_| MfaError::Corrupt)?;

            credential.enabled = true;
            credential.backup_codes = entries;
            credential.last_used_at = Some(now);
            self.lockout.record_success(&mut credential);
            credential.mark_updated(now);

            self.store
                .save(user_id, credential, Some(version))
                .await?;
            self.audit
                .record(AttemptRecord::new(user_id, true, false, context, now))
                .await;

            info!(user_id, "MFA enrollment completed");
            Ok(plain_codes)
        } else {
            let locked_until = self.lockout.record_failure(&mut credential, now);
            credential.mark_updated(now);

            self.store
                .save(user_id, credential, Some(version))
                .await?;
            self.audit
                .record(AttemptRecord::new(user_id, false, false, context, now))
                .await;

            Err(MfaError::InvalidCode { locked_until })
        }
    }

    /// Verify a submitted second-factor code.
    ///
    /// Malformed input is rejected before any store access. The critical
    /// section is retried once on a concurrent-write conflict.
    pub async fn verify(
        &self,
        user_id: &str,
        submission: &CodeSubmission,
        context: &AttemptContext,
        now: DateTime<Utc>,
    ) -> Result<VerificationSuccess, MfaError> {
        let submission = self.validate_submission(submission)?;

        match self.verify_once(user_id, &submission, context, now).await {
            Err(MfaError::Conflict) => {
                debug!(user_id, "concurrent credential write, retrying once");
                self.verify_once(user_id, &submission, context, now).await
            }
            other => other,
        }
    }

    async fn verify_once(
        &self,
        user_id: &str,
        submission: &CodeSubmission,
        context: &AttemptContext,
        now: DateTime<Utc>,
    ) -> Result<VerificationSuccess, MfaError> {
        let Some(versioned) = self.store.load(user_id).await? else {
            return Err(MfaError::NotConfigured);
        };
        let VersionedCredential {
            mut credential,
            version,
        } = versioned;

        if !credential.enabled {
            return Err(MfaError::NotConfigured);
        }

        if let LockoutStatus::Locked { unlock_at } = self.lockout.status(&credential, now) {
            return Err(MfaError::Locked { unlock_at });
        }

        let (matched, method, remaining) = match submission {
            CodeSubmission::Totp { code } => {
                let secret = self.open_secret(&credential)?;
                let matched = self.totp.verify_code(secret.as_bytes(), code, now);
                (matched, VerifiedMethod::Totp, None)
            }
            CodeSubmission::Backup { code } => {
                let result = self
                    .ledger
                    .consume(&credential.backup_codes, code, &self.key, now)
                    .map_err(|e| self.integrity_failure(user_id, e))?;

                credential.backup_codes = result.entries;
                (result.matched, VerifiedMethod::Backup, Some(result.remaining))
            }
        };

        let used_backup = method == VerifiedMethod::Backup;

        if matched {
            self.lockout.record_success(&mut credential);
            credential.last_used_at = Some(now);
            credential.mark_updated(now);

            self.store
                .save(user_id, credential, Some(version))
                .await?;
            self.audit
                .record(AttemptRecord::new(user_id, true, used_backup, context, now))
                .await;

            Ok(VerificationSuccess {
                method,
                remaining_backup_codes: remaining,
            })
        } else {
            let locked_until = self.lockout.record_failure(&mut credential, now);
            credential.mark_updated(now);

            self.store
                .save(user_id, credential, Some(version))
                .await?;
            self.audit
                .record(AttemptRecord::new(user_id, false, used_backup, context, now))
                .await;

            Err(MfaError::InvalidCode { locked_until })
        }
    }

    /// Replace the whole backup-code set. Requires a fresh TOTP code; the
    /// new plaintexts are returned once.
    pub async fn regenerate_backup_codes(
        &self,
        user_id: &str,
        code: &str,
        context: &AttemptContext,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>, MfaError> {
        let code = self.validate_totp_code(code)?;

        let Some(versioned) = self.store.load(user_id).await? else {
            return Err(MfaError::NotConfigured);
        };
        let VersionedCredential {
            mut credential,
            version,
        } = versioned;

        if !credential.enabled {
            return Err(MfaError::NotConfigured);
        }

        if let LockoutStatus::Locked { unlock_at } = self.lockout.status(&credential, now) {
            return Err(MfaError::Locked { unlock_at });
        }

        let secret = self.open_secret(&credential)?;
        if self.totp.verify_code(secret.as_bytes(), &code, now) {
            let (plain_codes, entries) = self
                .ledger
                .issue(&self.key)
                .map_err(|_| MfaError::Corrupt)?;

            credential.backup_codes = entries;
            credential.last_used_at = Some(now);
            self.lockout.record_success(&mut credential);
            credential.mark_updated(now);

            self.store
                .save(user_id, credential, Some(version))
                .await?;
            self.audit
                .record(AttemptRecord::new(user_id, true, false, context, now))
                .await;

            info!(user_id, "backup codes regenerated");
            Ok(plain_codes)
        } else {
            let locked_until = self.lockout.record_failure(&mut credential, now);
            credential.mark_updated(now);

            self.store
                .save(user_id, credential, Some(version))
                .await?;
            self.audit
                .record(AttemptRecord::new(user_id, false, false, context, now))
                .await;

            Err(MfaError::InvalidCode { locked_until })
        }
    }

    /// Disable MFA and remove the credential. Requires a valid code (TOTP
    /// or backup). Password re-authentication is the session layer's duty
    /// before calling in.
    pub async fn disable(
        &self,
        user_id: &str,
        submission: &CodeSubmission,
        context: &AttemptContext,
        now: DateTime<Utc>,
    ) -> Result<(), MfaError> {
        let submission = self.validate_submission(submission)?;

        let Some(versioned) = self.store.load(user_id).await? else {
            return Err(MfaError::NotConfigured);
        };
        let VersionedCredential {
            mut credential,
            version,
        } = versioned;

        if !credential.enabled {
            return Err(MfaError::NotConfigured);
        }

        if let LockoutStatus::Locked { unlock_at } = self.lockout.status(&credential, now) {
            return Err(MfaError::Locked { unlock_at });
        }

        let (matched, used_backup) = match &submission {
            CodeSubmission::Totp { code } => {
                let secret = self.open_secret(&credential)?;
                (self.totp.verify_code(secret.as_bytes(), code, now), false)
            }
            CodeSubmission::Backup { code } => {
                let result = self
                    .ledger
                    .consume(&credential.backup_codes, code, &self.key, now)
                    .map_err(|e| self.integrity_failure(user_id, e))?;

                credential.backup_codes = result.entries;
                (result.matched, true)
            }
        };

        if matched {
            self.store.delete(user_id).await?;
            self.audit
                .record(AttemptRecord::new(user_id, true, used_backup, context, now))
                .await;

            info!(user_id, "MFA disabled");
            Ok(())
        } else {
            let locked_until = self.lockout.record_failure(&mut credential, now);
            credential.mark_updated(now);

            self.store
                .save(user_id, credential, Some(version))
                .await?;
            self.audit
                .record(AttemptRecord::new(user_id, false, used_backup, context, now))
                .await;

            Err(MfaError::InvalidCode { locked_until })
        }
    }

    /// Caller-visible credential state, without secret material. A user
    /// with no record reads as not enabled.
    pub async fn status(&self, user_id: &str) -> Result<MfaStatus, MfaError> {
        let loaded = self.store.load(user_id).await?;

        Ok(match loaded {
            Some(versioned) => MfaStatus {
                enabled: versioned.credential.enabled,
                remaining_backup_codes: versioned.credential.remaining_backup_codes(),
                locked_until: versioned.credential.locked_until,
                last_used_at: versioned.credential.last_used_at,
            },
            None => MfaStatus {
                enabled: false,
                remaining_backup_codes: 0,
                locked_until: None,
                last_used_at: None,
            },
        })
    }

    fn open_secret(&self, credential: &MfaCredential) -> Result<TotpSecret, MfaError> {
        envelope::open(&credential.secret_envelope, &self.key)
            .map(TotpSecret::from_bytes)
            .map_err(|e| {
                error!("TOTP secret envelope could not be opened: {}", e);
                MfaError::Corrupt
            })
    }

    fn integrity_failure(&self, user_id: &str, e: EnvelopeError) -> MfaError {
        error!(user_id, "backup code envelope could not be opened: {}", e);
        MfaError::Corrupt
    }

    fn validate_totp_code(&self, code: &str) -> Result<String, MfaError> {
        let trimmed = code.trim();
        let digits = self.totp.config().digits as usize;

        if trimmed.len() != digits || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(MfaError::MalformedCode(format!(
                "code must be exactly {digits} digits"
            )));
        }

        Ok(trimmed.to_string())
    }

    fn validate_backup_code(&self, code: &str) -> Result<String, MfaError> {
        let normalized = backup_codes::normalize_code(code);
        let length = self.ledger_code_length();

        if normalized.len() != length || !normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(MfaError::MalformedCode(format!(
                "backup code must be exactly {length} hexadecimal characters"
            )));
        }

        Ok(normalized)
    }

    fn validate_submission(&self, submission: &CodeSubmission) -> Result<CodeSubmission, MfaError> {
        Ok(match submission {
            CodeSubmission::Totp { code } => CodeSubmission::Totp {
                code: self.validate_totp_code(code)?,
            },
            CodeSubmission::Backup { code } => CodeSubmission::Backup {
                code: self.validate_backup_code(code)?,
            },
        })
    }

    fn ledger_code_length(&self) -> usize {
        self.ledger.config().code_length
    }
}
