//! HTTP surface of the intake service.
//!
//! `build_router()` returns a `Router` with every route mounted; `serve()`
//! binds it to the configured address and runs until Ctrl-C.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::build_router;
pub use server::serve;
pub use types::ApiContext;
