//! HTTP emulator.
//!
//! Stateless per request. Every request first passes the shared [`RateLimiter`]; admitted ones
//! are logged in full and answered with canned content, the rest get `429`.

pub mod routes;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use governor::clock::{Clock, DefaultClock};
use log::{info, warn};
use tokio::sync::watch;
use warp::http::header::SERVER;
use warp::http::{HeaderValue, StatusCode};
use warp::{reply, Reply};

use crate::configuration::types::Protocol;
use crate::configuration::Config;
use crate::emulation::rate_limiter::RateLimiter;
use crate::error_handling::types::ConfigError;
use crate::network::network_listener::ListenerHandle;
use crate::storage::audit_sink::AuditEmitter;
use crate::storage::types::{AuditEvent, EventDetail, RequestRecord};

use routes::{canned_reply, honeypot_routes, RequestInfo, TOO_MANY_REQUESTS_BODY};

/// Shared by every request handler.
pub struct HttpState<C: Clock = DefaultClock> {
    emitter: AuditEmitter,
    limiter: Arc<RateLimiter<C>>,
    server_header: HeaderValue,
}

impl<C: Clock> HttpState<C> {
    pub async fn handle(&self, info: RequestInfo) -> reply::Response {
        let remote = info
            .remote
            .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0)));
        let method = info.method.as_str().to_string();

        let mut response = if self.limiter.try_admit() {
            let record = RequestRecord {
                time: Utc::now().to_rfc3339(),
                method: method.clone(),
                path: info.path.clone(),
                ip: remote.ip().to_string(),
                user_agent: info.user_agent.unwrap_or_default(),
                referrer: info.referrer.unwrap_or_default(),
                query: info.query.clone(),
            };
            let input = if info.query.is_empty() {
                format!("{} {}", method, info.path)
            } else {
                format!("{} {}?{}", method, info.path, info.query)
            };
            let echo = reply::json(&record);

            self.emit(
                remote,
                EventDetail::Command {
                    input,
                    request: Some(record),
                },
            )
            .await;
            canned_reply(&info.path, echo)
        } else {
            self.emit(
                remote,
                EventDetail::RateLimited {
                    method,
                    path: info.path,
                },
            )
            .await;
            reply::with_status(TOO_MANY_REQUESTS_BODY, StatusCode::TOO_MANY_REQUESTS)
                .into_response()
        };

        response
            .headers_mut()
            .insert(SERVER, self.server_header.clone());
        response
    }

    async fn emit(&self, remote: SocketAddr, detail: EventDetail) {
        self.emitter
            .emit(AuditEvent::new(Protocol::Http, remote, None, detail))
            .await;
    }
}

pub struct HttpEmulator<C: Clock = DefaultClock> {
    state: Arc<HttpState<C>>,
}

impl HttpEmulator<DefaultClock> {
    pub fn new(config: &Config, emitter: AuditEmitter) -> Result<Self, ConfigError> {
        let limiter = Arc::new(RateLimiter::new(&config.rate_limit)?);
        Self::with_limiter(config, emitter, limiter)
    }
}

impl<C> HttpEmulator<C>
where
    C: Clock + Send + Sync + 'static,
    C::Instant: Send + Sync,
{
    pub fn with_limiter(
        config: &Config,
        emitter: AuditEmitter,
        limiter: Arc<RateLimiter<C>>,
    ) -> Result<Self, ConfigError> {
        let server_header = HeaderValue::from_str(&config.http.server_header).map_err(|_| {
            ConfigError::NotInRange(format!(
                "http.server_header is not a valid header value: {:?}",
                config.http.server_header
            ))
        })?;

        Ok(Self {
            state: Arc::new(HttpState {
                emitter,
                limiter,
                server_header,
            }),
        })
    }

    pub fn routes(
        &self,
    ) -> impl warp::Filter<Extract = (reply::Response,), Error = warp::Rejection> + Clone {
        honeypot_routes(self.state.clone())
    }

    /// Serves `handle` until `shutdown` turns `true`, then lets in-flight requests finish for at
    /// most `grace`.
    pub async fn serve(
        &self,
        handle: ListenerHandle,
        shutdown: watch::Receiver<bool>,
        grace: Duration,
    ) {
        let local_addr = handle.local_addr();
        info!("HTTP emulator serving on {}", local_addr);

        let server = warp::serve(self.routes())
            .incoming(handle.into_listener())
            .graceful(shutdown_signal(shutdown.clone()))
            .run();
        tokio::pin!(server);

        tokio::select! {
            _ = &mut server => {}
            _ = async {
                shutdown_signal(shutdown).await;
                tokio::time::sleep(grace).await;
            } => {
                warn!("HTTP grace period of {:?} elapsed, dropping open connections", grace);
            }
        }
        info!("HTTP emulator on {} stopped", local_addr);
    }
}

/// Resolves once the flag turns `true` or its sender is gone.
async fn shutdown_signal(mut shutdown: watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}
