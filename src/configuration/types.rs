use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Protocols emulated by the honeypot. Used as the protocol tag of a connection and of every
/// audit event.
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Ftp,
    Ssh,
    Http,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Ftp => "ftp",
            Protocol::Ssh => "ssh",
            Protocol::Http => "http",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct FtpConfig {
    pub enabled: bool,
    pub port: u16,
    /// Greeting line sent on connect, without the trailing CRLF.
    pub banner: String,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 21,
            banner: String::from("220 Welcome to the FTP server"),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct SshConfig {
    pub enabled: bool,
    pub port: u16,
    pub host_key_path: PathBuf,
    /// Identification string announced during version exchange.
    pub server_id: String,
    /// Disconnect after this many rejected attempts. Unset keeps the connection open for as long
    /// as the client retries.
    pub max_auth_attempts: Option<usize>,
    pub auth_rejection_delay_ms: u64,
    /// Hostname reported by the fake shell.
    pub hostname: String,
    /// Extra canned replies, merged over the built-in shell table.
    pub commands: BTreeMap<String, String>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 20022,
            host_key_path: PathBuf::from("id_rsa"),
            server_id: String::from("SSH-2.0-OpenSSH_8.9p1 Ubuntu-3ubuntu0.6"),
            max_auth_attempts: None,
            auth_rejection_delay_ms: 1000,
            hostname: String::from("ubuntu"),
            commands: BTreeMap::new(),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub enabled: bool,
    pub port: u16,
    pub server_header: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: 8080,
            server_header: String::from("Apache/2.4.41 (Ubuntu)"),
        }
    }
}

/// Token bucket parameters shared by every HTTP route.
#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Time between two token additions.
    pub refill_interval_ms: u64,
    /// Maximum number of tokens held.
    pub burst_capacity: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            refill_interval_ms: 1000,
            burst_capacity: 10,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditBackend {
    File,
    Database,
    Log,
}

#[derive(Debug, PartialEq, Clone, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub backend: AuditBackend,
    /// JSON-lines file or SQLite database, depending on `backend`. Defaults per backend.
    pub path: Option<PathBuf>,
    pub emit_timeout_ms: u64,
    pub queue_capacity: usize,
}

impl AuditConfig {
    pub fn resolved_path(&self) -> PathBuf {
        match (&self.path, self.backend) {
            (Some(path), _) => path.clone(),
            (None, AuditBackend::Database) => PathBuf::from("leurre.sqlite3"),
            (None, _) => PathBuf::from("audit.jsonl"),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            backend: AuditBackend::File,
            path: None,
            emit_timeout_ms: 500,
            queue_capacity: 1024,
        }
    }
}
