use thiserror::Error;

/// Errors raised by the event bus and blocking queue (§4.10, §4.11, §7).
#[derive(Debug, Error)]
pub enum EventError {
    #[error("listener failed: {0}")]
    ListenerFailed(String),

    #[error("queue is full (max length reached)")]
    QueueFull,

    #[error("operation timed out")]
    Timeout,

    #[error("connection closed: {0}")]
    ConnectionClosed(String),
}
