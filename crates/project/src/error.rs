//! Project repository errors.

use thiserror::Error;

/// Errors raised by a [`ProjectRepository`](crate::ProjectRepository) backend.
#[derive(Debug, Error)]
pub enum ProjectError {
    /// The backing store could not be reached or failed the query.
    #[error("Project store unavailable: {0}")]
    Unavailable(String),
}

/// Convenience type alias for project repository results.
pub type Result<T> = std::result::Result<T, ProjectError>;
