use std::future::Future;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::task::{JoinError, JoinSet};

use crate::configuration::types::Protocol;

/// The structure related to session management
///
/// Owns the per-connection tasks of one listener. Each task is isolated: a panic inside a session
/// is caught by the join set and logged, the listener and the other sessions keep running.
///
/// # Fields Overview
///
/// - `tasks`: running session tasks
/// - `protocol`: protocol of the listener the sessions belong to, for logs
/// - `max_sessions`: upper bound of concurrently running sessions
pub struct SessionManager {
    tasks: JoinSet<()>,
    protocol: Protocol,
    max_sessions: usize,
}

impl SessionManager {
    pub fn new(protocol: Protocol, max_sessions: usize) -> Self {
        Self {
            tasks: JoinSet::new(),
            protocol,
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.tasks.len() < self.max_sessions
    }

    /// Starts a session task. Returns `false`, without spawning, when the manager is full.
    pub fn spawn<F>(&mut self, session: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if !self.has_capacity() {
            return false;
        }
        self.tasks.spawn(session);
        true
    }

    pub fn active_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits for the next session to finish. Resolves to `false` when none is running.
    pub async fn reap_one(&mut self) -> bool {
        match self.tasks.join_next().await {
            Some(outcome) => {
                self.log_outcome(outcome);
                true
            }
            None => false,
        }
    }

    /// Collects every session that already finished, without waiting.
    pub fn reap(&mut self) -> usize {
        let mut reaped = 0;
        while let Some(outcome) = self.tasks.try_join_next() {
            self.log_outcome(outcome);
            reaped += 1;
        }
        reaped
    }

    /// Gives running sessions `grace` to finish, then aborts the rest. Returns how many were
    /// aborted.
    pub async fn shutdown(&mut self, grace: Duration) -> usize {
        if self.tasks.is_empty() {
            return 0;
        }
        info!(
            "Waiting up to {:?} for {} {} session(s)",
            grace,
            self.tasks.len(),
            self.protocol
        );

        let drained = tokio::time::timeout(grace, async {
            while let Some(outcome) = self.tasks.join_next().await {
                self.log_outcome(outcome);
            }
        })
        .await;
        if drained.is_ok() {
            return 0;
        }

        let remaining = self.tasks.len();
        warn!(
            "Grace period elapsed, aborting {} {} session(s)",
            remaining, self.protocol
        );
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
        remaining
    }

    fn log_outcome(&self, outcome: Result<(), JoinError>) {
        match outcome {
            Ok(()) => debug!("{} session finished", self.protocol),
            Err(e) if e.is_panic() => error!("{} session panicked: {}", self.protocol, e),
            Err(e) => debug!("{} session cancelled: {}", self.protocol, e),
        }
    }
}
