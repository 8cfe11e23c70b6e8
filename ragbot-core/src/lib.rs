//! Ragbot Core - configuration, error types, logging and async helpers
//!
//! Shared infrastructure for the retrieval pipeline and the web server.

pub mod async_utils;
pub mod config;
pub mod error;
pub mod logging;

pub use async_utils::*;
pub use config::*;
pub use error::*;
pub use logging::*;

pub use tracing;
