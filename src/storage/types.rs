use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::configuration::types::Protocol;

/// The six kinds of observable attacker actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Connect,
    AuthAttempt,
    Command,
    Disconnect,
    RateLimited,
    ProtocolError,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connect => "connect",
            EventKind::AuthAttempt => "auth_attempt",
            EventKind::Command => "command",
            EventKind::Disconnect => "disconnect",
            EventKind::RateLimited => "rate_limited",
            EventKind::ProtocolError => "protocol_error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Secret presented during an authentication attempt, recorded verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Credential {
    Password(String),
    /// SHA-256 fingerprint of the offered key.
    PublicKey(String),
}

/// Everything captured about one admitted HTTP request. Also the body of the echo handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRecord {
    pub time: String,
    pub method: String,
    pub path: String,
    pub ip: String,
    pub user_agent: String,
    pub referrer: String,
    pub query: String,
}

/// Payload of an [`AuditEvent`]. The event kind is derived from the variant, so the two can
/// never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum EventDetail {
    Connect,
    AuthAttempt {
        username: String,
        credential: Credential,
    },
    Command {
        input: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request: Option<RequestRecord>,
    },
    Disconnect {
        duration_ms: u64,
        commands: Vec<String>,
    },
    RateLimited {
        method: String,
        path: String,
    },
    ProtocolError {
        message: String,
    },
}

impl EventDetail {
    pub fn kind(&self) -> EventKind {
        match self {
            EventDetail::Connect => EventKind::Connect,
            EventDetail::AuthAttempt { .. } => EventKind::AuthAttempt,
            EventDetail::Command { .. } => EventKind::Command,
            EventDetail::Disconnect { .. } => EventKind::Disconnect,
            EventDetail::RateLimited { .. } => EventKind::RateLimited,
            EventDetail::ProtocolError { .. } => EventKind::ProtocolError,
        }
    }

    pub fn command(input: impl Into<String>) -> Self {
        EventDetail::Command {
            input: input.into(),
            request: None,
        }
    }

    pub fn protocol_error(message: impl Into<String>) -> Self {
        EventDetail::ProtocolError {
            message: message.into(),
        }
    }
}

/// Immutable record of one attacker action. Ownership moves to the sink on emission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub timestamp: DateTime<Utc>,
    /// Emulator session the event belongs to; HTTP requests are sessionless.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<Uuid>,
    pub protocol: Protocol,
    pub remote_addr: SocketAddr,
    #[serde(flatten)]
    pub detail: EventDetail,
}

impl AuditEvent {
    pub fn new(
        protocol: Protocol,
        remote_addr: SocketAddr,
        session_id: Option<Uuid>,
        detail: EventDetail,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id,
            protocol,
            remote_addr,
            detail,
        }
    }

    pub fn kind(&self) -> EventKind {
        self.detail.kind()
    }

    /// Single-line JSON form used by the file sink and by fallback log lines.
    pub fn to_json_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(
                "{{\"kind\":\"{}\",\"remote_addr\":\"{}\",\"serialization_error\":\"{}\"}}",
                self.kind(),
                self.remote_addr,
                e
            )
        })
    }
}
