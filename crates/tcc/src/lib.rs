//! Try-confirm-cancel transactions over the Git gateway.
//!
//! Each operation runs through strictly sequential phases:
//!
//! ```text
//! validation ──► execution ──► (enrol compensation) ──► confirm
//!                                                          │
//!                                                          └──► cancel (on failure)
//! ```
//!
//! Validation and execution failures leave no side effect behind and end the
//! transaction as `failed`. Once the gateway has accepted the side effect a
//! compensation is enrolled before confirmation starts, so a failed or
//! interrupted confirmation always has something to roll back with.

pub mod error;
pub mod manager;
pub mod transaction;
pub mod validation;

pub use error::{ErrorKind, Phase, Result, TransactionError};
pub use manager::{TransactionManager, TransactionManagerConfig};
pub use transaction::{Transaction, TransactionFailure, TransactionKind, TransactionStatus};
pub use validation::ValidationError;
