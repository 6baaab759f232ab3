//! Session management core module.
//!
//! This module provides the generic per-connection session state machine and the manager that
//! owns the session tasks of a listener.

/// Submodule for session data structures and utilities.
pub mod session;
/// Submodule for session manager implementation.
pub mod session_manager;

pub use session::{CommandHistory, Session, SessionState};
pub use session_manager::SessionManager;
