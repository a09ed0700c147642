//! Process wiring for the mailrail worker and operator tools

pub mod config;
pub mod ops;
pub mod worker;

pub use config::{Config, ConfigError};
pub use worker::{SHUTDOWN_BROADCAST, Worker};
