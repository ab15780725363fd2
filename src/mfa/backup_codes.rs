// One-time backup codes for MFA recovery
// Fixed-size batch sealed at issuance; each code matches at most once

use chrono::{DateTime, Utc};
use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::Zeroize;

use crate::crypto::envelope::{self, EnvelopeError, EnvelopeKey};
use crate::models::BackupCodeEntry;

const HEX_DIGITS: &[u8; 16] = b"0123456789ABCDEF";

/// Backup code policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupCodeConfig {
    /// Codes issued per batch
    pub count: usize,
    /// Code length in hex characters
    pub code_length: usize,
}

impl Default for BackupCodeConfig {
    fn default() -> Self {
        Self {
            count: 10,
            code_length: 8,
        }
    }
}

/// Result of a consumption scan. Callers must persist `entries` atomically
/// with acting on `matched`; the updated set is the only record of the
/// consumption.
#[derive(Debug)]
pub struct ConsumeResult {
    /// Whether the submitted code matched an unconsumed entry
    pub matched: bool,
    /// The entry set after the scan, with at most one entry newly consumed
    pub entries: Vec<BackupCodeEntry>,
    /// Unconsumed entries left after the scan
    pub remaining: usize,
}

/// Ledger over a user's fixed-size set of one-time recovery codes
#[derive(Debug, Clone)]
pub struct BackupCodeLedger {
    config: BackupCodeConfig,
}

impl BackupCodeLedger {
    pub fn new(config: BackupCodeConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BackupCodeConfig {
        &self.config
    }

    /// Issue a fresh batch of codes.
    ///
    /// Returns the plaintext codes exactly once for user display, together
    /// with the sealed entries to persist. The plaintext is never stored.
    pub fn issue(
        &self,
        key: &EnvelopeKey,
    ) -> Result<(Vec<String>, Vec<BackupCodeEntry>), EnvelopeError> {
        let mut plain_codes = Vec::with_capacity(self.config.count);
        let mut entries = Vec::with_capacity(self.config.count);

        for _ in 0..self.config.count {
            let code = self.generate_code();
            let sealed = envelope::seal(code.as_bytes(), key)?;

            plain_codes.push(code);
            entries.push(BackupCodeEntry::new(sealed));
        }

        Ok((plain_codes, entries))
    }

    /// Scan unconsumed entries for the submitted code.
    ///
    /// Consumed entries are excluded from the scan entirely, so an
    /// already-used code can never match again even when its plaintext
    /// would be equal. Comparison is constant-time with respect to the
    /// submitted value. A decrypt failure aborts the scan; it signals
    /// corrupted storage or a key mismatch, not a wrong code.
    pub fn consume(
        &self,
        entries: &[BackupCodeEntry],
        submitted: &str,
        key: &EnvelopeKey,
        now: DateTime<Utc>,
    ) -> Result<ConsumeResult, EnvelopeError> {
        let normalized = normalize_code(submitted);
        let mut updated = entries.to_vec();
        let mut matched = false;

        for entry in updated.iter_mut() {
            if entry.consumed {
                continue;
            }

            let mut plaintext = envelope::open(&entry.envelope, key)?;
            let equal = plaintext.len() == normalized.len()
                && bool::from(plaintext.as_slice().ct_eq(normalized.as_bytes()));
            plaintext.zeroize();

            if equal {
                entry.consumed = true;
                entry.consumed_at = Some(now);
                matched = true;
                break;
            }
        }

        let remaining = updated.iter().filter(|e| !e.consumed).count();
        debug!(matched, remaining, "backup code scan finished");

        Ok(ConsumeResult {
            matched,
            entries: updated,
            remaining,
        })
    }

    /// Unconsumed entries in a set.
    pub fn remaining_count(&self, entries: &[BackupCodeEntry]) -> usize {
        entries.iter().filter(|e| !e.consumed).count()
    }

    fn generate_code(&self) -> String {
        let mut bytes = vec![0u8; self.config.code_length];
        OsRng.fill_bytes(&mut bytes);
        bytes
            .iter()
            .map(|b| HEX_DIGITS[(b & 0x0F) as usize] as char)
            .collect()
    }
}

/// Normalize a submitted backup code for comparison: codes are
/// case-insensitive and stored uppercase.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}
