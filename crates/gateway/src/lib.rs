//! Git gateway collaborator.
//!
//! The orchestration core only needs a small, closed set of repository
//! operations from the gateway. They are expressed by [`GatewayClient`] with
//! two implementations:
//! - [`HttpGatewayClient`] talks HTTP/JSON to a running gateway
//! - [`InMemoryGatewayClient`] keeps repositories in memory and supports
//!   fault injection for tests and local runs

pub mod client;
pub mod error;
pub mod http;
pub mod memory;
pub mod model;

pub use client::GatewayClient;
pub use error::{GatewayError, Result};
pub use http::{GatewayConfig, HttpGatewayClient};
pub use memory::InMemoryGatewayClient;
pub use model::{CreateRepositoryRequest, Repository, UpdateRepositoryRequest, Visibility};
