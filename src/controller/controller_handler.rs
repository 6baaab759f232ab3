use std::future::Future;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};

use crate::configuration::config::Config;
use crate::configuration::types::{AuditBackend, AuditConfig, Protocol};
use crate::emulation::ftp::FtpEmulator;
use crate::emulation::http::HttpEmulator;
use crate::emulation::ssh::SshEmulator;
use crate::error_handling::types::*;
use crate::network::network_listener::ConnectionDispatcher;
use crate::storage::audit_sink::{AuditEmitter, AuditSink};
use crate::storage::database_storage::DatabaseSink;
use crate::storage::file_storage::FileSink;
use crate::storage::memory_storage::LogSink;
use crate::storage::queued_storage::QueuedSink;

/// Process exit code after a clean run.
pub const EXIT_OK: i32 = 0;
/// Process exit code when a listener could not start.
pub const EXIT_STARTUP_FAILURE: i32 = 1;

/// Owns the honeypot's lifetime: audit pipeline, listeners, shutdown.
pub struct Controller {
    config: Config,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Controller {
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        debug!("called `new()` function in Controller");
        config.validate().map_err(|err| {
            error!("[!] Invalid configuration: {}", err);
            ControllerError::ConfigurationError(err)
        })?;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Ok(Self {
            config,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Runs until SIGINT or SIGTERM and returns the process exit code.
    pub async fn run(&mut self) -> Result<i32, ControllerError> {
        self.run_until(termination_signal()).await
    }

    /// Runs until `stop` resolves and returns the process exit code.
    ///
    /// Each enabled listener starts independently. When none of them can start the call returns
    /// at once without waiting for `stop`.
    pub async fn run_until<F>(&mut self, stop: F) -> Result<i32, ControllerError>
    where
        F: Future<Output = ()>,
    {
        info!("Opening {:?} audit sink", self.config.audit.backend);
        let sink = open_sink(&self.config.audit).await?;
        let (queue, writer) = QueuedSink::spawn(sink, self.config.audit.queue_capacity);
        let emitter = AuditEmitter::new(Arc::new(queue), self.config.emit_timeout());

        let mut listeners = JoinSet::new();
        let mut failures = 0;
        for (protocol, _) in self.config.enabled_services() {
            if let Err(err) = self.start_listener(protocol, &emitter, &mut listeners) {
                error!("[!] {} listener not started: {}", protocol, err);
                failures += 1;
            }
        }
        drop(emitter);

        if listeners.is_empty() {
            error!("[!] No listener could be started, exiting");
            drain_audit(writer).await;
            return Ok(EXIT_STARTUP_FAILURE);
        }
        info!("{} listener(s) running", listeners.len());

        stop.await;
        self.shutdown();

        while let Some(joined) = listeners.join_next().await {
            if let Err(e) = joined {
                error!("[!] Listener task failed: {}", e);
            }
        }
        drain_audit(writer).await;

        info!("Shutdown complete");
        Ok(if failures == 0 {
            EXIT_OK
        } else {
            EXIT_STARTUP_FAILURE
        })
    }

    /// Tells every listener to stop accepting.
    pub fn shutdown(&self) {
        info!("Shutting down, grace period {:?}", self.config.shutdown_grace());
        let _ = self.shutdown_tx.send(true);
    }

    fn start_listener(
        &self,
        protocol: Protocol,
        emitter: &AuditEmitter,
        listeners: &mut JoinSet<()>,
    ) -> Result<(), ControllerError> {
        let addr = self.config.listen_addr(protocol)?;
        let grace = self.config.shutdown_grace();
        let dispatcher = ConnectionDispatcher::new(
            self.shutdown_rx.clone(),
            self.config.max_sessions,
            grace,
        );

        match protocol {
            Protocol::Ftp => {
                let emulator = Arc::new(FtpEmulator::new(&self.config, emitter.clone()));
                let handle = ConnectionDispatcher::listen(protocol, addr)?;
                listeners.spawn(async move { dispatcher.serve(handle, emulator).await });
            }
            Protocol::Ssh => {
                let emulator = Arc::new(SshEmulator::new(&self.config, emitter.clone())?);
                let handle = ConnectionDispatcher::listen(protocol, addr)?;
                listeners.spawn(async move { dispatcher.serve(handle, emulator).await });
            }
            Protocol::Http => {
                let emulator = HttpEmulator::new(&self.config, emitter.clone())?;
                let handle = ConnectionDispatcher::listen(protocol, addr)?;
                let shutdown = self.shutdown_rx.clone();
                listeners.spawn(async move { emulator.serve(handle, shutdown, grace).await });
            }
        }
        Ok(())
    }
}

async fn open_sink(audit: &AuditConfig) -> Result<Arc<dyn AuditSink>, ControllerError> {
    let sink: Arc<dyn AuditSink> = match audit.backend {
        AuditBackend::File => match &audit.path {
            Some(path) => Arc::new(FileSink::open(path).await?),
            None => Arc::new(FileSink::open_default(audit.resolved_path()).await?),
        },
        AuditBackend::Database => Arc::new(DatabaseSink::open(audit.resolved_path()).await?),
        AuditBackend::Log => Arc::new(LogSink),
    };
    Ok(sink)
}

/// Waits for the audit writer once every producer is gone.
async fn drain_audit(writer: JoinHandle<()>) {
    if let Err(e) = writer.await {
        error!("[!] Audit writer failed: {}", e);
    }
}

async fn termination_signal() {
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Unable to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!("Unable to listen for SIGINT: {}", e);
                std::future::pending::<()>().await;
            }
            info!("SIGINT received");
        }
        _ = terminate => info!("SIGTERM received"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::types::EventKind;
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpStream;
    use tokio::sync::oneshot;

    fn free_port() -> u16 {
        std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    fn ftp_only(dir: &tempfile::TempDir, port: u16) -> Config {
        let mut config = Config::default();
        config.bind_address = "127.0.0.1".to_string();
        config.shutdown_grace_secs = 1;
        config.ftp.port = port;
        config.ssh.enabled = false;
        config.http.enabled = false;
        config.audit.backend = AuditBackend::File;
        config.audit.path = Some(dir.path().join("audit.jsonl"));
        config
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.rate_limit.burst_capacity = 0;

        assert!(matches!(
            Controller::new(config),
            Err(ControllerError::ConfigurationError(_))
        ));
    }

    #[tokio::test]
    async fn test_ftp_session_recorded_and_drained() {
        let dir = tempfile::tempdir().unwrap();
        let port = free_port();
        let config = ftp_only(&dir, port);
        let audit_path = config.audit.resolved_path();
        let mut controller = Controller::new(config).unwrap();

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let run = tokio::spawn(async move {
            controller
                .run_until(async {
                    let _ = stop_rx.await;
                })
                .await
        });

        let mut stream = None;
        for _ in 0..50 {
            match TcpStream::connect(("127.0.0.1", port)).await {
                Ok(s) => {
                    stream = Some(s);
                    break;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(20)).await,
            }
        }
        let (reader, mut writer) = stream.unwrap().into_split();
        let mut reader = BufReader::new(reader);
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert!(line.starts_with("220"));

        writer.write_all(b"USER root\r\nQUIT\r\n").await.unwrap();
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        assert!(line.starts_with("331"));
        line.clear();
        reader.read_line(&mut line).await.unwrap();
        assert!(line.starts_with("221"));

        stop_tx.send(()).unwrap();
        let code = tokio::time::timeout(Duration::from_secs(10), run)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(code, EXIT_OK);

        let kinds: Vec<EventKind> = FileSink::read_all(&audit_path)
            .await
            .unwrap()
            .iter()
            .map(|e| e.kind())
            .collect();
        assert_eq!(kinds.first(), Some(&EventKind::Connect));
        assert_eq!(kinds.last(), Some(&EventKind::Disconnect));
        assert!(kinds.contains(&EventKind::Command));
    }

    #[tokio::test]
    async fn test_no_listener_started_exits_at_once() {
        let dir = tempfile::tempdir().unwrap();
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let config = ftp_only(&dir, taken.local_addr().unwrap().port());
        let mut controller = Controller::new(config).unwrap();

        let code = tokio::time::timeout(
            Duration::from_secs(5),
            controller.run_until(std::future::pending()),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(code, EXIT_STARTUP_FAILURE);
    }

    #[tokio::test]
    async fn test_missing_host_key_only_stops_ssh() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ftp_only(&dir, free_port());
        config.ssh.enabled = true;
        config.ssh.port = free_port();
        config.ssh.host_key_path = dir.path().join("no_such_key");
        let mut controller = Controller::new(config).unwrap();

        let code = controller
            .run_until(tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(code, EXIT_STARTUP_FAILURE);
    }
}
