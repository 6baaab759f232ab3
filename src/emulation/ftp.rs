//! FTP emulator.
//!
//! Drives the control channel of one connection through [`FtpMachine`]. Input is framed into
//! lines before dispatch, so a read carrying several pipelined commands, or a command split over
//! several reads, is handled one whole line at a time. No data connection is ever opened.

pub mod machine;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, info};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, FramedRead};
use uuid::Uuid;

use crate::configuration::types::Protocol;
use crate::configuration::Config;
use crate::emulation::command_table::CommandTable;
use crate::network::types::{Emulator, SessionRequest};
use crate::storage::audit_sink::AuditEmitter;
use crate::storage::types::{AuditEvent, EventDetail};

pub use machine::{FtpCommand, FtpMachine, FtpState, FtpStep};
use machine::{REPLY_LINE_TOO_LONG, REPLY_TIMEOUT};

/// Longest control line accepted, terminator excluded.
pub const MAX_LINE_LENGTH: usize = 4096;

pub struct FtpEmulator {
    emitter: AuditEmitter,
    banner: String,
    table: Arc<CommandTable>,
    idle_timeout: Option<Duration>,
    history_limit: usize,
}

impl FtpEmulator {
    pub fn new(config: &Config, emitter: AuditEmitter) -> Self {
        Self {
            emitter,
            banner: config.ftp.banner.clone(),
            table: Arc::new(CommandTable::ftp_default()),
            idle_timeout: config.session_timeout(),
            history_limit: config.history_limit,
        }
    }

    /// Serves one connection until `QUIT`, end of stream, read error, idle timeout or an
    /// oversized line.
    pub async fn serve<S>(&self, request: SessionRequest<S>)
    where
        S: AsyncRead + AsyncWrite + Send + Unpin,
    {
        let client_addr = request.client_addr;
        let mut machine = FtpMachine::new(
            client_addr,
            self.banner.as_str(),
            self.table.clone(),
            self.history_limit,
        );
        let session_id = machine.session_id();
        info!("FTP session {} opened from {}", session_id, client_addr);
        self.emit(client_addr, session_id, EventDetail::Connect).await;

        let (reader, mut writer) = tokio::io::split(request.stream);
        let mut lines = FramedRead::new(
            reader,
            // One extra byte for the `\r` of a CRLF terminator.
            AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                b"\n".to_vec(),
                MAX_LINE_LENGTH + 1,
            ),
        );

        let greeting = machine.greet();
        if writer.write_all(greeting.as_bytes()).await.is_ok() {
            loop {
                let next = match self.idle_timeout {
                    Some(idle) => match tokio::time::timeout(idle, lines.next()).await {
                        Ok(next) => next,
                        Err(_) => {
                            debug!("FTP session {} idle, closing", session_id);
                            let _ = writer.write_all(REPLY_TIMEOUT.as_bytes()).await;
                            break;
                        }
                    },
                    None => lines.next().await,
                };

                let line = match next {
                    Some(Ok(chunk)) => {
                        let bytes = chunk.strip_suffix(b"\r".as_slice()).unwrap_or(&chunk);
                        (bytes.len() <= MAX_LINE_LENGTH)
                            .then(|| String::from_utf8_lossy(bytes).into_owned())
                    }
                    Some(Err(AnyDelimiterCodecError::MaxChunkLengthExceeded)) => None,
                    Some(Err(AnyDelimiterCodecError::Io(e))) => {
                        debug!("FTP session {} read error: {}", session_id, e);
                        break;
                    }
                    None => break,
                };

                let Some(line) = line else {
                    let _ = writer.write_all(REPLY_LINE_TOO_LONG.as_bytes()).await;
                    self.emit(
                        client_addr,
                        session_id,
                        EventDetail::protocol_error(format!(
                            "control line longer than {} bytes",
                            MAX_LINE_LENGTH
                        )),
                    )
                    .await;
                    break;
                };

                let step = machine.on_line(&line);
                self.emit(client_addr, session_id, step.event).await;

                if writer.write_all(step.reply.as_bytes()).await.is_err() {
                    break;
                }
                if machine.is_closed() {
                    break;
                }
            }
        }

        let _ = writer.shutdown().await;
        let summary = machine.finish();
        info!("FTP session {} closed", session_id);
        self.emit(client_addr, session_id, summary).await;
    }

    async fn emit(&self, client_addr: SocketAddr, session_id: Uuid, detail: EventDetail) {
        self.emitter
            .emit(AuditEvent::new(
                Protocol::Ftp,
                client_addr,
                Some(session_id),
                detail,
            ))
            .await;
    }
}

#[async_trait]
impl Emulator for FtpEmulator {
    fn protocol(&self) -> Protocol {
        Protocol::Ftp
    }

    async fn handle(&self, request: SessionRequest) {
        self.serve(request).await;
    }
}
