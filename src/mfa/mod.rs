// Multi-factor authentication verification core
// TOTP and backup-code verification, lockout, and attempt anomaly analysis

pub mod anomaly;
pub mod backup_codes;
pub mod lockout;
pub mod service;
pub mod totp;

pub use anomaly::{AnomalyAssessment, AnomalyConfig, AnomalyReason, RiskLevel, assess};
pub use backup_codes::{BackupCodeConfig, BackupCodeLedger, ConsumeResult};
pub use lockout::{LockoutConfig, LockoutPolicy, LockoutStatus};
pub use service::{MfaError, MfaService};
pub use totp::{TotpConfig, TotpManager, TotpSecret};
