use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, error, info};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error_handling::types::SinkError;
use crate::storage::audit_sink::AuditSink;
use crate::storage::types::AuditEvent;

/// Appends events to a JSON-lines file. Appends are serialized by an internal lock so lines from
/// concurrent sessions never interleave.
pub struct FileSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileSink {
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await.map_err(|e| {
                error!("Failed to create audit dir {}: {}", parent.display(), e);
                SinkError::ConnectionFailed(e.to_string())
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| {
                error!("Failed to open audit file {}: {}", path.display(), e);
                SinkError::ConnectionFailed(e.to_string())
            })?;
        info!("FileSink initialized at {}", path.display());

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Opens the file named by `LEURRE_AUDIT_FILE` if set, otherwise `default_path`.
    pub async fn open_default<P: AsRef<Path>>(default_path: P) -> Result<Self, SinkError> {
        if let Ok(path) = std::env::var("LEURRE_AUDIT_FILE") {
            info!("Using FileSink from LEURRE_AUDIT_FILE: {}", path);
            return Self::open(PathBuf::from(path)).await;
        }
        Self::open(default_path).await
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parses every event currently stored in `path`. Lines that do not parse are skipped.
    pub async fn read_all<P: AsRef<Path>>(path: P) -> Result<Vec<AuditEvent>, SinkError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).await.map_err(|e| {
            error!("Read failed {}: {}", path.display(), e);
            SinkError::ReadFailed(e.to_string())
        })?;

        let events: Vec<AuditEvent> = content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect();
        debug!("Loaded {} event(s) from {}", events.len(), path.display());
        Ok(events)
    }
}

#[async_trait]
impl AuditSink for FileSink {
    async fn emit(&self, event: AuditEvent) -> Result<(), SinkError> {
        let mut line = event.to_json_line();
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await.map_err(|e| {
            error!("Write failed {}: {}", self.path.display(), e);
            SinkError::WriteFailed(e.to_string())
        })?;
        file.flush()
            .await
            .map_err(|e| SinkError::WriteFailed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::types::Protocol;
    use crate::storage::types::{EventDetail, EventKind};
    use std::net::SocketAddr;
    use std::sync::Arc;
    use uuid::Uuid;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([192, 0, 2, 10], port))
    }

    #[tokio::test]
    async fn test_appends_one_line_per_event() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("audit.jsonl");
        let sink = FileSink::open(&path).await.unwrap();

        sink.emit(AuditEvent::new(Protocol::Ssh, addr(1), None, EventDetail::Connect))
            .await
            .unwrap();
        sink.emit(AuditEvent::new(
            Protocol::Ssh,
            addr(1),
            None,
            EventDetail::command("whoami"),
        ))
        .await
        .unwrap();

        let events = FileSink::read_all(&path).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), EventKind::Connect);
        assert_eq!(events[1].detail, EventDetail::command("whoami"));
    }

    #[tokio::test]
    async fn test_reopen_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        for _ in 0..2 {
            let sink = FileSink::open(&path).await.unwrap();
            sink.emit(AuditEvent::new(Protocol::Ftp, addr(2), None, EventDetail::Connect))
                .await
                .unwrap();
        }

        assert_eq!(FileSink::read_all(&path).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let sink = Arc::new(FileSink::open(&path).await.unwrap());

        let mut tasks = Vec::new();
        for i in 0..50u16 {
            let sink = sink.clone();
            tasks.push(tokio::spawn(async move {
                sink.emit(AuditEvent::new(
                    Protocol::Ssh,
                    addr(10_000 + i),
                    Some(Uuid::new_v4()),
                    EventDetail::command(format!("echo {}", i)),
                ))
                .await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let events = FileSink::read_all(&path).await.unwrap();
        assert_eq!(events.len(), 50);
    }
}
