//! Audit Sink
//!
//! This module defines the `AuditSink` trait, the single contract between the emulators and
//! whatever persists their evidence, and `AuditEmitter`, the boundary every emulator goes
//! through to reach a sink.
//!
//! Implementors of the trait are responsible for:
//! - Persisting events append-only, in the order they are handed over
//! - Accepting concurrent calls from many sessions
//!
//! The emitter is responsible for never letting a slow or failing sink stall a session: each
//! emission is bounded by a timeout, and an event that could not be stored is written to the
//! local log instead.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::warn;

use crate::error_handling::types::SinkError;
use crate::storage::types::AuditEvent;

/// Log target of the fallback lines written when a sink fails or times out.
pub const FALLBACK_TARGET: &str = "leurre::audit_fallback";

/// Durable, append-only store of audit events.
///
/// Implementations must be safe to call from many sessions at once. Sinks that cannot accept
/// concurrent writes should be wrapped in a [`QueuedSink`](crate::storage::queued_storage::QueuedSink).
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persists one event. Ownership of the event moves to the sink.
    async fn emit(&self, event: AuditEvent) -> Result<(), SinkError>;
}

/// Cloneable handle used by the emulators to emit events.
#[derive(Clone)]
pub struct AuditEmitter {
    sink: Arc<dyn AuditSink>,
    timeout: Duration,
}

impl AuditEmitter {
    pub fn new(sink: Arc<dyn AuditSink>, timeout: Duration) -> Self {
        Self { sink, timeout }
    }

    /// Hands `event` to the sink, waiting at most the configured timeout.
    ///
    /// Never fails: a sink error or timeout turns the event into a fallback log line under
    /// [`FALLBACK_TARGET`] and the caller carries on serving.
    pub async fn emit(&self, event: AuditEvent) {
        let fallback = event.clone();
        let outcome = match tokio::time::timeout(self.timeout, self.sink.emit(event)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(self.timeout)),
        };

        if let Err(e) = outcome {
            warn!(
                target: FALLBACK_TARGET,
                "{} (audit sink unavailable: {})",
                fallback.to_json_line(),
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::types::Protocol;
    use crate::storage::memory_storage::MemorySink;
    use crate::storage::types::{EventDetail, EventKind};
    use std::net::SocketAddr;

    struct StalledSink;

    #[async_trait]
    impl AuditSink for StalledSink {
        async fn emit(&self, _event: AuditEvent) -> Result<(), SinkError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(())
        }
    }

    struct BrokenSink;

    #[async_trait]
    impl AuditSink for BrokenSink {
        async fn emit(&self, _event: AuditEvent) -> Result<(), SinkError> {
            Err(SinkError::WriteFailed("disk full".to_string()))
        }
    }

    fn event() -> AuditEvent {
        let addr: SocketAddr = "198.51.100.7:40000".parse().unwrap();
        AuditEvent::new(Protocol::Ftp, addr, None, EventDetail::Connect)
    }

    #[tokio::test]
    async fn test_emit_reaches_sink() {
        let sink = Arc::new(MemorySink::new());
        let emitter = AuditEmitter::new(sink.clone(), Duration::from_millis(500));

        emitter.emit(event()).await;

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.events()[0].kind(), EventKind::Connect);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_sink_is_bounded_by_timeout() {
        let emitter = AuditEmitter::new(Arc::new(StalledSink), Duration::from_millis(500));

        let started = tokio::time::Instant::now();
        emitter.emit(event()).await;

        assert!(started.elapsed() >= Duration::from_millis(500));
        assert!(started.elapsed() < Duration::from_secs(3600));
    }

    #[tokio::test]
    async fn test_failing_sink_does_not_propagate() {
        let emitter = AuditEmitter::new(Arc::new(BrokenSink), Duration::from_millis(500));
        // Returns normally; the event is only logged.
        emitter.emit(event()).await;
    }
}
