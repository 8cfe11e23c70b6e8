//! Type definitions for handlers
//!
//! Request and response bodies of the HTTP API, with their OpenAPI schemas.

pub mod chat;
pub mod common;
pub mod ingest;

pub use chat::*;
pub use common::*;
pub use ingest::*;
