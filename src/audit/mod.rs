// Audit trail for verification attempts
// Append-only; consumed by the anomaly monitor and external audit

pub mod recorder;
pub mod sink;
pub mod types;

pub use recorder::AttemptRecorder;
pub use sink::{AuditError, AuditSink, MemoryAuditSink};
pub use types::{AttemptContext, AttemptRecord};
