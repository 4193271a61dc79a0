//! Compensation manager.
//!
//! A compensation is a promise to undo a side effect that a distributed
//! operation could not confirm. Entries are registered with
//! [`CompensationManager::add_compensation`] and executed until they succeed or
//! exhaust their retry budget:
//!
//! ```text
//! Pending ──┬──► Executed   (terminal, never re-run)
//!           └──► Failed     (terminal, retries exhausted)
//! ```
//!
//! Entries a transaction enrols through
//! [`CompensationManager::enrol_compensation`] are held until the transaction
//! settles them: [`CompensationManager::arm`] on cancel, or
//! [`CompensationManager::retire`] on confirm. Drains only ever run armed
//! entries.
//!
//! The set of actions is closed; see [`CompensationAction`].

pub mod action;
pub mod entry;
pub mod error;
pub mod executor;
pub mod manager;

pub use action::CompensationAction;
pub use entry::{CompensationEntry, CompensationStats, CompensationStatus, Disposition};
pub use error::{ActionError, CompensationError, Result};
pub use executor::ActionExecutor;
pub use manager::{CompensationConfig, CompensationManager};
