//! SeaORM entity model used by the database sink.
//!
//! Maps to the `audit_events` SQLite table created by `database_storage`. Rows are only ever
//! inserted, never updated.

use sea_orm::entity::prelude::*;

/// One audit event per row.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "audit_events")]
pub struct Model {
    /// Auto-increment row id, preserves insertion order
    #[sea_orm(primary_key)]
    pub id: i64,
    /// RFC3339 timestamp
    pub timestamp: String,
    /// Session UUID as string, absent for HTTP
    pub session_id: Option<String>,
    /// "ftp", "ssh" or "http"
    pub protocol: String,
    /// Client socket address string (IP:port)
    pub remote_addr: String,
    /// Event kind, e.g. "auth_attempt"
    pub kind: String,
    /// JSON payload of the event detail
    pub detail: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
