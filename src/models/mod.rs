// Data model for the MFA verification core

pub mod credential;

pub use credential::{
    BackupCodeEntry, CodeSubmission, EnrollmentStart, MfaCredential, MfaStatus,
    VerificationSuccess, VerifiedMethod,
};
