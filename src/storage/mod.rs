// Credential store abstraction
// The verification core owns no persistence; collaborators implement this
// load/save contract with optimistic concurrency

pub mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::models::MfaCredential;

/// A credential together with the store's version counter for
/// compare-and-swap writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionedCredential {
    pub credential: MfaCredential,
    pub version: u64,
}

/// Storage errors
#[derive(Debug, Clone)]
pub enum StoreError {
    /// The record does not exist
    NotFound,
    /// The record changed since it was loaded (or already exists when a
    /// first write was expected)
    Conflict,
    ConnectionError(String),
    SerializationError(String),
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StoreError::NotFound => write!(f, "credential not found"),
            StoreError::Conflict => write!(f, "credential changed concurrently"),
            StoreError::ConnectionError(msg) => write!(f, "connection error: {}", msg),
            StoreError::SerializationError(msg) => write!(f, "serialization error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

/// Store trait for per-user MFA credential records.
///
/// `save` with `expected_version: Some(v)` writes only when the record is
/// still at version `v`; `None` writes only when no record exists yet.
/// Either mismatch yields `StoreError::Conflict`, which is what lets the
/// orchestrator treat load-evaluate-mutate-save as a critical section
/// without holding locks across the round-trip.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Load the credential record for a user
    async fn load(&self, user_id: &str) -> Result<Option<VersionedCredential>, StoreError>;

    /// Write the credential record, returning the new version
    async fn save(
        &self,
        user_id: &str,
        credential: MfaCredential,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError>;

    /// Remove the credential record
    async fn delete(&self, user_id: &str) -> Result<(), StoreError>;
}
