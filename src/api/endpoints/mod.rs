//! Endpoint handlers, one module per route group.

pub mod analyze;
pub mod health;
pub mod ingest;
