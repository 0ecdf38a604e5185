//! Messaging outcome and handler types.

use std::sync::Arc;

/// Callback applied by the running instance to each incoming message; its
/// return value is sent back as the reply.
pub type MessageHandler = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Result of a message round trip as seen by the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// The reply produced by the running instance's handler.
    Answer(String),

    /// The exchange did not complete: no running instance, stale port,
    /// or a transport failure mid-flight.
    Failure(String),
}
