//! Storage subsystem
//!
//! This module provides the audit pipeline: the event model every emulator produces and the
//! sinks that persist it.
//!
//! Components:
//! - `types`: audit event model shared by emulators and sinks.
//! - `audit_sink`: the AuditSink trait and the timeout-bounded AuditEmitter.
//! - `file_storage`: JSON-lines file sink.
//! - `database_storage`: SQLite sink using SeaORM.
//! - `db_entities`: SeaORM entity model for the database sink.
//! - `queued_storage`: bounded queue with a single writer in front of another sink.
//! - `memory_storage`: in-memory and log-only sinks.

pub mod audit_sink;
pub mod database_storage;
pub mod db_entities;
pub mod file_storage;
pub mod memory_storage;
pub mod queued_storage;
pub mod types;

pub use audit_sink::{AuditEmitter, AuditSink};
pub use types::{AuditEvent, Credential, EventDetail, EventKind, RequestRecord};
