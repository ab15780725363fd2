// Attempt recorder wrapping an audit sink

use std::sync::Arc;
use tracing::{error, info};

use super::sink::AuditSink;
use super::types::AttemptRecord;

/// Records verification attempts against the configured sink.
///
/// Appends are fire-and-forget: a sink failure is logged and swallowed,
/// never propagated, so losing an audit write cannot block or change a
/// verification outcome.
#[derive(Clone)]
pub struct AttemptRecorder {
    sink: Arc<dyn AuditSink>,
}

impl AttemptRecorder {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    /// Append an attempt record
    pub async fn record(&self, record: AttemptRecord) {
        info!(
            user_id = %record.user_id,
            success = record.success,
            used_backup_code = record.used_backup_code,
            "verification attempt"
        );

        if let Err(e) = self.sink.append(record).await {
            error!("failed to store attempt record: {}", e);
        }
    }
}
