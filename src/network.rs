//! Network layer: listening sockets, the accept loop and the emulator seam.

pub mod network_listener;
pub mod types;

pub use network_listener::{ConnectionDispatcher, ListenerHandle};
pub use types::{Emulator, SessionRequest};
