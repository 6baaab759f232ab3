//! SSH emulator.
//!
//! Key exchange and transport are delegated to russh. [`SshHandler`] reacts to the callbacks:
//! it logs and rejects every credential, acknowledges `pty-req` and `shell`, and answers shell or
//! `exec` input from the command table.

pub mod handler;
pub mod shell;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use russh::keys::PrivateKey;
use russh::SshId;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::oneshot;

use crate::configuration::types::Protocol;
use crate::configuration::Config;
use crate::emulation::command_table::CommandTable;
use crate::error_handling::types::{HostKeyError, SshError};
use crate::network::types::{Emulator, SessionRequest};
use crate::storage::audit_sink::AuditEmitter;
use crate::storage::types::{AuditEvent, EventDetail};

pub use handler::{SshHandler, SshState};
pub use shell::{Shell, PROMPT};

/// Loads the host private key. Fatal for the SSH listener only.
pub fn load_host_key(path: &Path) -> Result<PrivateKey, HostKeyError> {
    russh::keys::load_secret_key(path, None).map_err(|e| HostKeyError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

pub struct SshEmulator {
    emitter: AuditEmitter,
    server_config: Arc<russh::server::Config>,
    shell: Shell,
    history_limit: usize,
    max_auth_attempts: Option<usize>,
}

impl SshEmulator {
    /// Builds the emulator, loading the host key from `ssh.host_key_path`.
    pub fn new(config: &Config, emitter: AuditEmitter) -> Result<Self, HostKeyError> {
        let key = load_host_key(&config.ssh.host_key_path)?;
        info!(
            "Loaded SSH host key {} from {}",
            key.algorithm(),
            config.ssh.host_key_path.display()
        );
        Ok(Self::with_host_key(config, emitter, key))
    }

    pub fn with_host_key(config: &Config, emitter: AuditEmitter, key: PrivateKey) -> Self {
        let server_config = russh::server::Config {
            server_id: SshId::Standard(config.ssh.server_id.clone().into()),
            keys: vec![key],
            inactivity_timeout: config.session_timeout(),
            auth_rejection_time: Duration::from_millis(config.ssh.auth_rejection_delay_ms),
            auth_rejection_time_initial: Some(Duration::ZERO),
            // Attempts are bounded by the handler, if at all.
            max_auth_attempts: usize::MAX,
            ..Default::default()
        };

        let table = CommandTable::ssh_default(
            &config.ssh.hostname,
            config
                .ssh
                .commands
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        );

        Self {
            emitter,
            server_config: Arc::new(server_config),
            shell: Shell::new(Arc::new(table)),
            history_limit: config.history_limit,
            max_auth_attempts: config.ssh.max_auth_attempts,
        }
    }

    /// Runs one SSH connection to completion and emits its `disconnect` event.
    pub async fn serve<S>(&self, request: SessionRequest<S>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin + 'static,
    {
        let client_addr = request.client_addr;
        let (summary_tx, summary_rx) = oneshot::channel();
        let handler = SshHandler::new(
            client_addr,
            self.emitter.clone(),
            self.shell.clone(),
            self.history_limit,
            self.max_auth_attempts,
            summary_tx,
        );
        let session_id = handler.session_id();
        let event = |detail| AuditEvent::new(Protocol::Ssh, client_addr, Some(session_id), detail);

        info!("SSH session {} opened from {}", session_id, client_addr);
        self.emitter.emit(event(EventDetail::Connect)).await;

        let outcome =
            match russh::server::run_stream(self.server_config.clone(), request.stream, handler)
                .await
            {
                Ok(running) => running.await,
                Err(e) => Err(e),
            };

        match outcome {
            Ok(()) | Err(SshError::Transport(russh::Error::Disconnect | russh::Error::HUP)) => {
                debug!("SSH session {} ended", session_id)
            }
            Err(SshError::TooManyAttempts(max)) => {
                info!("SSH session {} dropped after {} attempts", session_id, max)
            }
            Err(SshError::Transport(e)) => {
                warn!("SSH session {} protocol failure: {}", session_id, e);
                self.emitter
                    .emit(event(EventDetail::protocol_error(e.to_string())))
                    .await;
            }
        }

        let summary = summary_rx.await.unwrap_or(EventDetail::Disconnect {
            duration_ms: 0,
            commands: Vec::new(),
        });
        info!("SSH session {} closed", session_id);
        self.emitter.emit(event(summary)).await;
    }
}

#[async_trait]
impl Emulator for SshEmulator {
    fn protocol(&self) -> Protocol {
        Protocol::Ssh
    }

    async fn handle(&self, request: SessionRequest) {
        self.serve(request).await;
    }
}
