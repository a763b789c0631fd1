//! Telemetry Module
//!
//! Structured logging setup for hosts embedding the engine.

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat, LogLevel};
