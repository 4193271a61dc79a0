//! Webhook callback dispatcher.
//!
//! Delivers [`CallbackEvent`]s to configured endpoints:
//! - an [`EventMask`] per endpoint selects which `type.action` pairs it receives
//! - bodies are signed with HMAC-SHA256 when the endpoint has a secret
//! - failed deliveries are retried with capped exponential backoff
//!
//! Producers do not talk to the dispatcher directly; they hand events to an
//! [`EventPublisher`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod event;
pub mod mask;
pub mod publisher;
pub mod signature;

pub use config::{CallbackConfig, RetryPolicy};
pub use dispatcher::{CallbackDispatcher, CallbackResult};
pub use error::{CallbackError, Result};
pub use event::{CallbackEvent, EventSource};
pub use mask::EventMask;
pub use publisher::{CallbackPublisher, EventPublisher, InMemoryEventPublisher};
pub use signature::{sign, verify_signature};
