//! Project repository collaborator.
//!
//! The orchestration core validates transactions against the project service:
//! the project must exist within the tenant and the actor must have access.

pub mod error;
pub mod memory;
pub mod repository;

pub use error::{ProjectError, Result};
pub use memory::InMemoryProjectRepository;
pub use repository::{Project, ProjectRepository};
