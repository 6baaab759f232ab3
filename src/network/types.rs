use std::net::SocketAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::net::TcpStream;

use crate::configuration::types::Protocol;

/// An accepted connection, handed to exactly one emulator task which owns it until close.
pub struct SessionRequest<S = TcpStream> {
    pub stream: S,
    pub protocol: Protocol,
    pub client_addr: SocketAddr,
    pub timestamp: DateTime<Utc>,
}

impl<S> SessionRequest<S> {
    pub fn new(stream: S, protocol: Protocol, client_addr: SocketAddr) -> Self {
        Self {
            stream,
            protocol,
            client_addr,
            timestamp: Utc::now(),
        }
    }
}

/// A protocol emulator the dispatcher can route accepted connections to.
///
/// `handle` drives one connection from accept to close. It reports its own failures through
/// the audit pipeline and never returns an error to the dispatcher.
#[async_trait]
pub trait Emulator: Send + Sync {
    fn protocol(&self) -> Protocol;

    async fn handle(&self, request: SessionRequest);
}
