// Failed-attempt lockout state machine
// Tracks {failed_attempts, locked_until} on the credential record;
// the Locked -> Unlocked transition is lazy, evaluated on the next request

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::models::MfaCredential;

/// Lockout policy constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LockoutConfig {
    /// Consecutive failures that trigger a lockout
    pub max_failed_attempts: u32,
    /// Lockout duration in minutes
    pub lockout_minutes: i64,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_minutes: 15,
        }
    }
}

/// Lockout state of a credential at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockoutStatus {
    Unlocked,
    Locked { unlock_at: DateTime<Utc> },
}

/// Policy over the credential's failure counter and lockout timestamp
#[derive(Debug, Clone)]
pub struct LockoutPolicy {
    config: LockoutConfig,
}

impl LockoutPolicy {
    pub fn new(config: LockoutConfig) -> Self {
        Self { config }
    }

    /// Evaluate the credential's state at `now`. A `locked_until` in the
    /// past counts as Unlocked; no explicit unlock action exists.
    pub fn status(&self, credential: &MfaCredential, now: DateTime<Utc>) -> LockoutStatus {
        match credential.locked_until {
            Some(until) if now < until => LockoutStatus::Locked { unlock_at: until },
            _ => LockoutStatus::Unlocked,
        }
    }

    /// Apply the failure transition: increment the counter and, when the
    /// threshold is reached, start a lockout window. Returns the new
    /// `unlock_at` when this failure crossed the threshold.
    ///
    /// The counter is not cleared when a lockout lapses; only a successful
    /// verification resets it. One more failure after a lapsed lockout
    /// therefore re-locks immediately.
    pub fn record_failure(
        &self,
        credential: &mut MfaCredential,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        credential.failed_attempts += 1;

        if credential.failed_attempts >= self.config.max_failed_attempts {
            let unlock_at = now + Duration::minutes(self.config.lockout_minutes);
            credential.locked_until = Some(unlock_at);
            warn!(
                failed_attempts = credential.failed_attempts,
                %unlock_at,
                "failed-attempt threshold reached, credential locked"
            );
            return Some(unlock_at);
        }

        None
    }

    /// Apply the success transition: clear the counter and any lockout.
    pub fn record_success(&self, credential: &mut MfaCredential) {
        credential.failed_attempts = 0;
        credential.locked_until = None;
    }
}
