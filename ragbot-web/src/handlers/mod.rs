//! HTTP request handlers
//!
//! One module per area of the API; request and response bodies live in [`types`].

pub mod chat;
pub mod health;
pub mod ingest;
pub mod types;

pub use chat::*;
pub use health::*;
pub use ingest::*;

pub use types::*;
