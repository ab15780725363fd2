// Verification attempt records for the audit trail

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Request-scoped context attached to a verification attempt
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttemptContext {
    /// IP address of the requester, when the caller knows it
    pub ip_address: Option<String>,
    /// User agent string from the request
    pub user_agent: Option<String>,
}

/// A single verification attempt, appended to the audit trail.
///
/// Append-only: records feed the anomaly monitor and external audit, and
/// are never read back to decide a verification outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// Unique identifier for the record
    pub id: String,
    pub user_id: String,
    pub timestamp: DateTime<Utc>,
    /// Whether the attempt verified successfully
    pub success: bool,
    /// Whether the attempt used a backup code rather than a TOTP code
    pub used_backup_code: bool,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl AttemptRecord {
    pub fn new(
        user_id: &str,
        success: bool,
        used_backup_code: bool,
        context: &AttemptContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            timestamp: now,
            success,
            used_backup_code,
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
        }
    }
}
