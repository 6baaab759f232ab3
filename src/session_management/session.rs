use std::collections::VecDeque;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use log::trace;
use uuid::Uuid;

use crate::configuration::types::Protocol;

/// Protocol-specific state enum driven by a [`Session`].
pub trait SessionState: Clone + std::fmt::Debug + Send {
    /// Short human-readable name used in logs.
    fn label(&self) -> &'static str;

    /// Terminal state. A closed session ignores every further transition.
    fn is_closed(&self) -> bool;
}

/// Ordered command history, bounded to `limit` entries. The oldest entry is evicted first.
#[derive(Debug, Clone)]
pub struct CommandHistory {
    entries: VecDeque<String>,
    limit: usize,
}

impl CommandHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            limit: limit.max(1),
        }
    }

    pub fn push(&mut self, command: impl Into<String>) {
        if self.entries.len() == self.limit {
            self.entries.pop_front();
        }
        self.entries.push_back(command.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.entries.iter().cloned().collect()
    }
}

/// Per-connection interaction state. Owned by the single task serving that connection.
#[derive(Debug, Clone)]
pub struct Session<S: SessionState> {
    pub id: Uuid,
    pub protocol: Protocol,
    pub client_addr: SocketAddr,
    pub start_time: DateTime<Utc>,
    state: S,
    history: CommandHistory,
}

impl<S: SessionState> Session<S> {
    pub fn new(
        protocol: Protocol,
        client_addr: SocketAddr,
        initial: S,
        history_limit: usize,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            protocol,
            client_addr,
            start_time: Utc::now(),
            state: initial,
            history: CommandHistory::new(history_limit),
        }
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn is_closed(&self) -> bool {
        self.state.is_closed()
    }

    /// Moves to `next` unless the session is already closed. Only the owning emulator calls this.
    pub(crate) fn transition(&mut self, next: S) {
        if self.state.is_closed() {
            return;
        }
        trace!(
            "session {} {} -> {}",
            self.id,
            self.state.label(),
            next.label()
        );
        self.state = next;
    }

    pub fn record(&mut self, command: impl Into<String>) {
        self.history.push(command);
    }

    pub fn history(&self) -> &CommandHistory {
        &self.history
    }

    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.start_time)
            .num_milliseconds()
            .try_into()
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Door {
        Open,
        Ajar,
        Shut,
    }

    impl SessionState for Door {
        fn label(&self) -> &'static str {
            match self {
                Door::Open => "open",
                Door::Ajar => "ajar",
                Door::Shut => "shut",
            }
        }

        fn is_closed(&self) -> bool {
            matches!(self, Door::Shut)
        }
    }

    fn session() -> Session<Door> {
        Session::new(
            Protocol::Ftp,
            "127.0.0.1:2121".parse().unwrap(),
            Door::Open,
            3,
        )
    }

    #[test]
    fn test_closed_is_terminal() {
        let mut s = session();
        s.transition(Door::Ajar);
        assert_eq!(s.state(), &Door::Ajar);
        s.transition(Door::Shut);
        s.transition(Door::Open);
        assert_eq!(s.state(), &Door::Shut);
        assert!(s.is_closed());
    }

    #[test]
    fn test_history_evicts_oldest() {
        let mut s = session();
        for c in ["a", "b", "c", "d"] {
            s.record(c);
        }
        assert_eq!(s.history().len(), 3);
        assert_eq!(s.history().to_vec(), vec!["b", "c", "d"]);
    }

    #[test]
    fn test_sessions_get_distinct_ids() {
        assert_ne!(session().id, session().id);
    }
}
