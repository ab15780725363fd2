// Audit sink backends

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::types::AttemptRecord;

/// Audit sink errors
#[derive(Debug, Clone)]
pub struct AuditError(pub String);

impl std::fmt::Display for AuditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "audit sink error: {}", self.0)
    }
}

impl std::error::Error for AuditError {}

/// Trait for attempt-record sinks. Implementations own durability and
/// retention; the verification core only appends.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append an attempt record
    async fn append(&self, record: AttemptRecord) -> Result<(), AuditError>;
}

/// In-memory audit sink
/// Suitable for development and testing
pub struct MemoryAuditSink {
    records: Arc<RwLock<Vec<AttemptRecord>>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self {
            records: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Records for a user since a timestamp, oldest first. This is the
    /// window the anomaly monitor assesses.
    pub async fn recent(&self, user_id: &str, since: DateTime<Utc>) -> Vec<AttemptRecord> {
        let records = self.records.read().await;
        records
            .iter()
            .filter(|r| r.user_id == user_id && r.timestamp >= since)
            .cloned()
            .collect()
    }

    pub async fn all(&self) -> Vec<AttemptRecord> {
        self.records.read().await.clone()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: AttemptRecord) -> Result<(), AuditError> {
        let mut records = self.records.write().await;
        debug!(user_id = %record.user_id, success = record.success, "storing attempt record");
        records.push(record);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::types::AttemptContext;
    use chrono::Duration;

    #[tokio::test]
    async fn test_append_and_recent() {
        let sink = MemoryAuditSink::new();
        let now = Utc::now();
        let context = AttemptContext::default();

        sink.append(AttemptRecord::new("user-1", false, false, &context, now))
            .await
            .unwrap();
        sink.append(AttemptRecord::new(
            "user-1",
            true,
            false,
            &context,
            now - Duration::hours(2),
        ))
        .await
        .unwrap();
        sink.append(AttemptRecord::new("user-2", true, false, &context, now))
            .await
            .unwrap();

        let recent = sink.recent("user-1", now - Duration::hours(1)).await;
        assert_eq!(recent.len(), 1);
        assert!(!recent[0].success);

        assert_eq!(sink.all().await.len(), 3);
    }
}
