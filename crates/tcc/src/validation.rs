//! Request validation rules.

use common::ProjectId;
use gateway::CreateRepositoryRequest;
use thiserror::Error;

/// Longest accepted repository name.
pub const MAX_NAME_LEN: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("repository name is empty")]
    EmptyName,

    #[error("repository name is {len} characters, at most {max} allowed", max = MAX_NAME_LEN)]
    NameTooLong { len: usize },

    #[error("repository name contains '{0}'; only letters, digits, '.', '_' and '-' are allowed")]
    InvalidCharacter(char),

    #[error("repository name '{0}' is reserved")]
    ReservedName(String),

    #[error("repository name must not end in '.git'")]
    GitSuffix,

    #[error("default branch is empty")]
    EmptyBranch,

    #[error("default branch '{0}' is not a valid branch name")]
    InvalidBranch(String),

    #[error("request targets project {actual}, transaction is for {expected}")]
    ProjectMismatch {
        expected: ProjectId,
        actual: ProjectId,
    },
}

pub fn validate_repository_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    let len = name.chars().count();
    if len > MAX_NAME_LEN {
        return Err(ValidationError::NameTooLong { len });
    }
    if let Some(c) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')))
    {
        return Err(ValidationError::InvalidCharacter(c));
    }
    if name == "." || name == ".." {
        return Err(ValidationError::ReservedName(name.to_string()));
    }
    if name.to_ascii_lowercase().ends_with(".git") {
        return Err(ValidationError::GitSuffix);
    }
    Ok(())
}

pub fn validate_branch_name(branch: &str) -> Result<(), ValidationError> {
    if branch.is_empty() {
        return Err(ValidationError::EmptyBranch);
    }
    if branch.starts_with('-') || branch.contains("..") || branch.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidBranch(branch.to_string()));
    }
    Ok(())
}

/// Checks a create request against the project the transaction runs in.
///
/// Visibility needs no check here; the type admits only valid values.
pub fn validate_create_request(
    project_id: ProjectId,
    req: &CreateRepositoryRequest,
) -> Result<(), ValidationError> {
    if req.project_id != project_id {
        return Err(ValidationError::ProjectMismatch {
            expected: project_id,
            actual: req.project_id,
        });
    }
    validate_repository_name(&req.name)?;
    validate_branch_name(&req.default_branch)
}
