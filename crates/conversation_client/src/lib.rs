//! conversation_client - Remote service boundary for the conversation store
//!
//! The store talks to the durable backend and the AI responder through one
//! trait:
//! - `service` - the `RemoteService` trait
//! - `error` - `RemoteError` and the crate `Result` alias
//! - `http` - `HttpRemoteService`, a reqwest client against the REST surface
//! - `memory` - `InMemoryRemoteService`, an in-process backend with the
//!   server-side semantics (structure seeding, fork ancestry, cascade delete)

pub mod error;
pub mod http;
pub mod memory;
pub mod service;

// Re-exports
pub use error::{RemoteError, Result};
pub use http::HttpRemoteService;
pub use memory::InMemoryRemoteService;
pub use service::RemoteService;
