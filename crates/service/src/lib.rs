//! Router and backend store services for extstore.
//!
//! This crate provides the server side of the protocol:
//! - Accept loop with per-request deadlines and shutdown (`server`)
//! - Backend store service, one extension class per process (`backend`)
//! - Router service with extension based forwarding and aggregation (`router`)
//! - In-process cluster harness for integration tests (`testkit`)

pub mod backend;
pub mod config;
pub mod error;
mod local;
pub mod router;
pub mod server;
pub mod testkit;

// Re-export key types for convenience
pub use backend::BackendService;
pub use config::{BackendEndpoint, BackendServiceConfig, Limits, RouterServiceConfig};
pub use error::ServiceError;
pub use router::{BackendClient, ForwardError, RouterService};
pub use server::{bind, serve, ConnectionHandler};
