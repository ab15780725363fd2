// In-memory credential store
// HashMap with Mutex for thread-safe access; versions start at 1

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{CredentialStore, StoreError, VersionedCredential};
use crate::models::MfaCredential;

/// In-memory credential store
/// Suitable for development and testing
pub struct MemoryCredentialStore {
    records: Arc<Mutex<HashMap<String, VersionedCredential>>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn load(&self, user_id: &str) -> Result<Option<VersionedCredential>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|e| StoreError::ConnectionError(format!("Lock poisoned: {}", e)))?;
        Ok(records.get(user_id).cloned())
    }

    async fn save(
        &self,
        user_id: &str,
        credential: MfaCredential,
        expected_version: Option<u64>,
    ) -> Result<u64, StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| StoreError::ConnectionError(format!("Lock poisoned: {}", e)))?;
        let current = records.get(user_id).map(|r| r.version);

        let new_version = match (expected_version, current) {
            (None, None) => 1,
            (Some(expected), Some(actual)) if expected == actual => actual + 1,
            _ => return Err(StoreError::Conflict),
        };

        records.insert(
            user_id.to_string(),
            VersionedCredential {
                credential,
                version: new_version,
            },
        );

        Ok(new_version)
    }

    async fn delete(&self, user_id: &str) -> Result<(), StoreError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| StoreError::ConnectionError(format!("Lock poisoned: {}", e)))?;
        match records.remove(user_id) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound),
        }
    }
}
