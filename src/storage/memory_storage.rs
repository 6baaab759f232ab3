use std::sync::Mutex;

use async_trait::async_trait;
use log::info;

use crate::error_handling::types::SinkError;
use crate::storage::audit_sink::AuditSink;
use crate::storage::types::{AuditEvent, EventKind};

/// Keeps every event in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<AuditEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events stored so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<AuditEvent> {
        self.events()
            .into_iter()
            .filter(|e| e.kind() == kind)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemorySink {
    async fn emit(&self, event: AuditEvent) -> Result<(), SinkError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| SinkError::WriteFailed("memory sink lock poisoned".to_string()))?;
        events.push(event);
        Ok(())
    }
}

/// Writes events to the application log, one JSON object per line.
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl AuditSink for LogSink {
    async fn emit(&self, event: AuditEvent) -> Result<(), SinkError> {
        info!(target: "leurre::audit", "{}", event.to_json_line());
        Ok(())
    }
}
