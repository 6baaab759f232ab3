pub mod configuration;
pub mod controller;
pub mod emulation;
pub mod error_handling;
pub mod network;
pub mod session_management;
pub mod storage;

pub use configuration::Config;
pub use controller::Controller;
