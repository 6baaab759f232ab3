use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::configuration::types::Protocol;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlError(String),
    #[error("Services configuration error: {0}")]
    ServicesEmpty(String),
    #[error("IP formatting error: {0}")]
    BadIPFormatting(String),
    #[error("Port range error: {0}")]
    BadPortsRange(String),
    #[error("Value out of range: {0}")]
    NotInRange(String),
}

/// Listener-level failures. `Bind` is fatal for the listener it concerns.
#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("{protocol} listener could not bind {addr}: {source}")]
    Bind {
        protocol: Protocol,
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
#[error("unable to load SSH host key from {}: {message}", path.display())]
pub struct HostKeyError {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("Storage connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Storage write failed: {0}")]
    WriteFailed(String),
    #[error("Storage read failed: {0}")]
    ReadFailed(String),
    #[error("audit sink did not answer within {0:?}")]
    Timeout(Duration),
    #[error("audit queue is closed")]
    Closed,
}

/// Error type of the SSH connection handler. Any error returned from a handler callback tears
/// down that connection only.
#[derive(Debug, Error)]
pub enum SshError {
    #[error("SSH transport error: {0}")]
    Transport(#[from] russh::Error),
    #[error("authentication attempt limit of {0} reached")]
    TooManyAttempts(usize),
}

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("Configuration error: {0}")]
    ConfigurationError(#[from] ConfigError),
    #[error("Network error: {0}")]
    NetworkError(#[from] NetworkError),
    #[error("Storage error: {0}")]
    StorageError(#[from] SinkError),
    #[error("Host key error: {0}")]
    HostKeyError(#[from] HostKeyError),
}
