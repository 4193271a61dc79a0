//! The gateway client trait.

use async_trait::async_trait;
use common::{ProjectId, RepositoryId};

use crate::error::Result;
use crate::model::{CreateRepositoryRequest, Repository, UpdateRepositoryRequest};

/// Repository operations the orchestration core consumes from the Git gateway.
///
/// Implementations must be safe to share between concurrent callers.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Creates a repository. Names are unique per project.
    async fn create_repository(&self, req: &CreateRepositoryRequest) -> Result<Repository>;

    /// Fetches a repository, or `NotFound`.
    async fn get_repository(&self, id: RepositoryId) -> Result<Repository>;

    /// Applies a partial update to a repository.
    async fn update_repository(
        &self,
        id: RepositoryId,
        req: &UpdateRepositoryRequest,
    ) -> Result<Repository>;

    /// Deletes a repository. Deleting an absent repository succeeds.
    async fn delete_repository(&self, id: RepositoryId) -> Result<()>;

    /// Lists the repositories of a project.
    async fn list_repositories(&self, project_id: ProjectId) -> Result<Vec<Repository>>;
}
