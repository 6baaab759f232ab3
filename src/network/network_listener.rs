//! # Network Listener Module
//!
//! This module owns the listening sockets and the accept loop. Every accepted connection is
//! wrapped in a [`SessionRequest`] and handed to its protocol's [`Emulator`] in a task of its
//! own, managed by a [`SessionManager`].
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌──────────────────────┐    ┌─────────────────┐
//! │ Incoming        │───▶│ ConnectionDispatcher │───▶│ Emulator task   │
//! │ Connections     │    │                      │    │ (one per conn)  │
//! └─────────────────┘    │ - accept loop        │    └─────────────────┘
//!                        │ - session limit      │
//!                        │ - graceful shutdown  │
//!                        └──────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio::sync::watch;
//! use leurre::configuration::types::Protocol;
//! use leurre::network::network_listener::ConnectionDispatcher;
//! use leurre::network::types::Emulator;
//! use leurre::error_handling::types::NetworkError;
//!
//! async fn run(emulator: Arc<dyn Emulator>) -> Result<(), NetworkError> {
//!     let (_stop, shutdown) = watch::channel(false);
//!     let dispatcher = ConnectionDispatcher::new(shutdown, 1024, Duration::from_secs(10));
//!
//!     let handle = ConnectionDispatcher::listen(Protocol::Ftp, "0.0.0.0:2121".parse().unwrap())?;
//!     dispatcher.serve(handle, emulator).await;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::net::{TcpListener, TcpSocket};
use tokio::sync::watch;

use super::types::{Emulator, SessionRequest};
use crate::configuration::types::Protocol;
use crate::error_handling::types::NetworkError;
use crate::session_management::SessionManager;

const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);
const LISTEN_BACKLOG: u32 = 1024;

/// A bound listening socket for one protocol.
pub struct ListenerHandle {
    protocol: Protocol,
    local_addr: SocketAddr,
    listener: TcpListener,
}

impl ListenerHandle {
    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    /// Address actually bound, useful when binding port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn into_listener(self) -> TcpListener {
        self.listener
    }
}

/// Accepts connections and spawns one isolated session per connection.
///
/// The dispatcher stops accepting as soon as the shutdown channel turns `true` (or its sender is
/// dropped), then gives the running sessions `grace` before aborting them.
#[derive(Clone)]
pub struct ConnectionDispatcher {
    shutdown: watch::Receiver<bool>,
    max_sessions: usize,
    grace: Duration,
}

impl ConnectionDispatcher {
    pub fn new(shutdown: watch::Receiver<bool>, max_sessions: usize, grace: Duration) -> Self {
        Self {
            shutdown,
            max_sessions,
            grace,
        }
    }

    /// Binds `addr` for `protocol`. Must be called from within a tokio runtime.
    ///
    /// # Errors
    ///
    /// `NetworkError::Bind` if the socket cannot be created or bound: the address is in use,
    /// the port is privileged, the address is not local. Bind errors are not retried.
    pub fn listen(protocol: Protocol, addr: SocketAddr) -> Result<ListenerHandle, NetworkError> {
        let bind_err = |source| NetworkError::Bind {
            protocol,
            addr,
            source,
        };

        let socket = if addr.is_ipv4() {
            TcpSocket::new_v4()
        } else {
            TcpSocket::new_v6()
        }
        .map_err(bind_err)?;
        socket.set_reuseaddr(true).map_err(bind_err)?;
        socket.bind(addr).map_err(bind_err)?;
        let listener = socket.listen(LISTEN_BACKLOG).map_err(bind_err)?;
        let local_addr = listener.local_addr().map_err(bind_err)?;

        info!("{} listener bound on {}", protocol, local_addr);
        Ok(ListenerHandle {
            protocol,
            local_addr,
            listener,
        })
    }

    /// Runs the accept loop of `handle` until shutdown, then drains the sessions.
    ///
    /// Accept errors are logged and retried after a short back-off. Connections arriving while
    /// `max_sessions` sessions are running are closed immediately.
    pub async fn serve(&self, handle: ListenerHandle, emulator: Arc<dyn Emulator>) {
        let protocol = handle.protocol;
        let listener = handle.listener;
        let mut shutdown = self.shutdown.clone();
        let mut sessions = SessionManager::new(protocol, self.max_sessions);

        info!("{} dispatcher accepting on {}", protocol, handle.local_addr);
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = sessions.reap_one(), if !sessions.is_empty() => {}
                accepted = listener.accept() => match accepted {
                    Ok((stream, client_addr)) => {
                        sessions.reap();
                        if !sessions.has_capacity() {
                            warn!(
                                "{} session limit reached, refusing {}",
                                protocol, client_addr
                            );
                            drop(stream);
                            continue;
                        }

                        debug!("{} connection from {}", protocol, client_addr);
                        let request = SessionRequest::new(stream, protocol, client_addr);
                        let emulator = emulator.clone();
                        sessions.spawn(async move {
                            emulator.handle(request).await;
                        });
                    }
                    Err(e) => {
                        error!("[!] {} accept error: {}", protocol, e);
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                }
            }
        }

        drop(listener);
        info!(
            "{} listener closed, {} session(s) still running",
            protocol,
            sessions.active_count()
        );
        sessions.shutdown(self.grace).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    /// Writes a greeting, then holds the connection until the client closes it.
    struct GreetEmulator;

    #[async_trait]
    impl Emulator for GreetEmulator {
        fn protocol(&self) -> Protocol {
            Protocol::Ftp
        }

        async fn handle(&self, mut request: SessionRequest) {
            let _ = request.stream.write_all(b"hi\n").await;
            let mut buf = [0u8; 16];
            while let Ok(n) = request.stream.read(&mut buf).await {
                if n == 0 {
                    break;
                }
            }
        }
    }

    fn local() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    #[tokio::test]
    async fn test_listen_reports_bind_error() {
        let taken = ConnectionDispatcher::listen(Protocol::Http, local()).unwrap();
        let result = ConnectionDispatcher::listen(Protocol::Http, taken.local_addr());

        assert!(matches!(
            result,
            Err(NetworkError::Bind {
                protocol: Protocol::Http,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_serve_until_shutdown() {
        let (stop, shutdown) = watch::channel(false);
        let dispatcher = ConnectionDispatcher::new(shutdown, 16, Duration::from_millis(200));
        let handle = ConnectionDispatcher::listen(Protocol::Ftp, local()).unwrap();
        let addr = handle.local_addr();

        let server = tokio::spawn(async move {
            dispatcher.serve(handle, Arc::new(GreetEmulator)).await;
        });

        for _ in 0..3 {
            let mut client = TcpStream::connect(addr).await.unwrap();
            let mut buf = [0u8; 3];
            client.read_exact(&mut buf).await.unwrap();
            assert_eq!(&buf, b"hi\n");
        }

        stop.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(5), server)
            .await
            .unwrap()
            .unwrap();
        assert!(TcpStream::connect(addr).await.is_err());
    }

    #[tokio::test]
    async fn test_refuses_beyond_max_sessions() {
        let (_stop, shutdown) = watch::channel(false);
        let dispatcher = ConnectionDispatcher::new(shutdown, 1, Duration::from_millis(200));
        let handle = ConnectionDispatcher::listen(Protocol::Ftp, local()).unwrap();
        let addr = handle.local_addr();
        tokio::spawn(async move {
            dispatcher.serve(handle, Arc::new(GreetEmulator)).await;
        });

        let mut first = TcpStream::connect(addr).await.unwrap();
        let mut buf = [0u8; 3];
        first.read_exact(&mut buf).await.unwrap();

        let mut second = TcpStream::connect(addr).await.unwrap();
        let mut rest = Vec::new();
        let n = tokio::time::timeout(Duration::from_secs(5), second.read_to_end(&mut rest))
            .await
            .unwrap()
            .unwrap_or(0);
        assert_eq!(n, 0);
    }
}
