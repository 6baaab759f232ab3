use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error_handling::types::SinkError;
use crate::storage::audit_sink::{AuditSink, FALLBACK_TARGET};
use crate::storage::types::AuditEvent;

/// Serializes writes to an inner sink through a bounded queue drained by one writer task.
///
/// `emit` only waits for queue space. The writer task ends once every `QueuedSink` clone has been
/// dropped and the queue is empty, so awaiting its handle flushes pending events.
#[derive(Clone)]
pub struct QueuedSink {
    tx: mpsc::Sender<AuditEvent>,
}

impl QueuedSink {
    pub fn spawn(inner: Arc<dyn AuditSink>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<AuditEvent>(capacity.max(1));

        let writer = tokio::spawn(async move {
            let mut written = 0usize;
            while let Some(event) = rx.recv().await {
                let line = event.to_json_line();
                match inner.emit(event).await {
                    Ok(()) => written += 1,
                    Err(e) => warn!(target: FALLBACK_TARGET, "{} (audit sink failed: {})", line, e),
                }
            }
            debug!("Audit queue drained after {} event(s)", written);
        });

        (Self { tx }, writer)
    }
}

#[async_trait]
impl AuditSink for QueuedSink {
    async fn emit(&self, event: AuditEvent) -> Result<(), SinkError> {
        self.tx.send(event).await.map_err(|_| SinkError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::types::Protocol;
    use crate::storage::memory_storage::MemorySink;
    use crate::storage::types::EventDetail;
    use std::net::SocketAddr;

    fn event(i: u16) -> AuditEvent {
        let addr = SocketAddr::from(([10, 0, 0, 1], i));
        AuditEvent::new(Protocol::Ftp, addr, None, EventDetail::command(format!("NOOP {}", i)))
    }

    #[tokio::test]
    async fn test_queue_preserves_order_and_drains() {
        let memory = Arc::new(MemorySink::new());
        let (queue, writer) = QueuedSink::spawn(memory.clone(), 4);

        for i in 0..20 {
            queue.emit(event(i)).await.unwrap();
        }
        drop(queue);
        writer.await.unwrap();

        let stored = memory.events();
        assert_eq!(stored.len(), 20);
        for (i, e) in stored.iter().enumerate() {
            assert_eq!(e.detail, EventDetail::command(format!("NOOP {}", i)));
        }
    }

    #[tokio::test]
    async fn test_emit_after_writer_gone_is_closed() {
        let memory = Arc::new(MemorySink::new());
        let (queue, writer) = QueuedSink::spawn(memory, 1);
        writer.abort();
        let _ = writer.await;

        assert!(matches!(queue.emit(event(1)).await, Err(SinkError::Closed)));
    }
}
