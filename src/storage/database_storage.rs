use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{error, info};
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, Database, DatabaseConnection, EntityTrait, QueryOrder,
    QuerySelect,
};

use crate::error_handling::types::SinkError;
use crate::storage::audit_sink::AuditSink;
use crate::storage::db_entities as audit_events;
use crate::storage::types::{AuditEvent, EventDetail};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS audit_events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    timestamp TEXT NOT NULL,
    session_id TEXT,
    protocol TEXT NOT NULL,
    remote_addr TEXT NOT NULL,
    kind TEXT NOT NULL,
    detail TEXT NOT NULL
);";

/// Stores events in an SQLite database, one row per event.
pub struct DatabaseSink {
    path: PathBuf,
    db: DatabaseConnection,
}

impl DatabaseSink {
    /// Create or open the database at `path` and make sure the schema exists.
    pub async fn open<P: AsRef<Path>>(path: P) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| SinkError::ConnectionFailed(e.to_string()))?;
        }

        let url = format!("sqlite://{}?mode=rwc", path.display());
        let db = Database::connect(url).await.map_err(|e| {
            error!("Failed to open audit database {}: {}", path.display(), e);
            SinkError::ConnectionFailed(e.to_string())
        })?;
        db.execute_unprepared(SCHEMA)
            .await
            .map_err(|e| SinkError::WriteFailed(e.to_string()))?;
        info!("DatabaseSink initialized at {}", path.display());

        Ok(Self { path, db })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The last `limit` events, oldest first.
    pub async fn recent(&self, limit: u64) -> Result<Vec<AuditEvent>, SinkError> {
        let rows = audit_events::Entity::find()
            .order_by_desc(audit_events::Column::Id)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(|e| SinkError::ReadFailed(e.to_string()))?;

        rows.into_iter().rev().map(row_to_event).collect()
    }
}

fn row_to_event(row: audit_events::Model) -> Result<AuditEvent, SinkError> {
    let bad = |what: &str| SinkError::ReadFailed(format!("row {}: bad {}", row.id, what));

    let detail: EventDetail = serde_json::from_str(&row.detail).map_err(|_| bad("detail"))?;
    Ok(AuditEvent {
        timestamp: DateTime::parse_from_rfc3339(&row.timestamp)
            .map_err(|_| bad("timestamp"))?
            .with_timezone(&Utc),
        session_id: match &row.session_id {
            Some(id) => Some(id.parse().map_err(|_| bad("session_id"))?),
            None => None,
        },
        protocol: serde_json::from_value(serde_json::Value::String(row.protocol.clone()))
            .map_err(|_| bad("protocol"))?,
        remote_addr: row.remote_addr.parse().map_err(|_| bad("remote_addr"))?,
        detail,
    })
}

#[async_trait]
impl AuditSink for DatabaseSink {
    async fn emit(&self, event: AuditEvent) -> Result<(), SinkError> {
        use sea_orm::ActiveValue::Set;

        let detail = serde_json::to_string(&event.detail)
            .map_err(|e| SinkError::WriteFailed(e.to_string()))?;
        let row = audit_events::ActiveModel {
            timestamp: Set(event.timestamp.to_rfc3339()),
            session_id: Set(event.session_id.map(|id| id.to_string())),
            protocol: Set(event.protocol.as_str().to_string()),
            remote_addr: Set(event.remote_addr.to_string()),
            kind: Set(event.kind().as_str().to_string()),
            detail: Set(detail),
            ..Default::default()
        };

        row.insert(&self.db).await.map_err(|e| {
            error!("Failed to store audit event: {}", e);
            SinkError::WriteFailed(e.to_string())
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::types::Protocol;
    use crate::storage::types::{Credential, EventKind};
    use std::net::SocketAddr;
    use tempfile::TempDir;
    use uuid::Uuid;

    async fn temp_db() -> (TempDir, DatabaseSink) {
        let dir = TempDir::new().unwrap();
        let sink = DatabaseSink::open(dir.path().join("audit.sqlite3"))
            .await
            .unwrap();
        (dir, sink)
    }

    fn addr() -> SocketAddr {
        "203.0.113.9:6000".parse().unwrap()
    }

    #[tokio::test]
    async fn test_db_insert_and_read_back() {
        let (_dir, sink) = temp_db().await;
        let session = Uuid::new_v4();

        sink.emit(AuditEvent::new(
            Protocol::Ssh,
            addr(),
            Some(session),
            EventDetail::Connect,
        ))
        .await
        .unwrap();
        sink.emit(AuditEvent::new(
            Protocol::Ssh,
            addr(),
            Some(session),
            EventDetail::AuthAttempt {
                username: "admin".into(),
                credential: Credential::Password("123456".into()),
            },
        ))
        .await
        .unwrap();

        let events = sink.recent(10).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind(), EventKind::Connect);
        assert_eq!(events[1].session_id, Some(session));
        assert_eq!(events[1].protocol, Protocol::Ssh);
        assert_eq!(events[1].remote_addr, addr());
        assert_eq!(
            events[1].detail,
            EventDetail::AuthAttempt {
                username: "admin".into(),
                credential: Credential::Password("123456".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_db_recent_limit_keeps_latest() {
        let (_dir, sink) = temp_db().await;
        for i in 0..5 {
            sink.emit(AuditEvent::new(
                Protocol::Http,
                addr(),
                None,
                EventDetail::command(format!("GET /{}", i)),
            ))
            .await
            .unwrap();
        }

        let events = sink.recent(2).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].detail, EventDetail::command("GET /3"));
        assert_eq!(events[1].detail, EventDetail::command("GET /4"));
        assert!(events[0].session_id.is_none());
    }
}
