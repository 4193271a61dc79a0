//! In-memory project repository.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{ActorId, ProjectId, TenantId};
use tokio::sync::RwLock;

use crate::error::{ProjectError, Result};
use crate::repository::{Project, ProjectRepository};

#[derive(Debug, Default)]
struct InMemoryProjectState {
    projects: HashMap<ProjectId, Project>,
    unavailable: bool,
}

/// In-memory project repository for tests and local runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProjectRepository {
    state: Arc<RwLock<InMemoryProjectState>>,
}

impl InMemoryProjectRepository {
    /// Creates an empty repository.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores (or replaces) a project.
    pub async fn insert_project(&self, project: Project) {
        self.state.write().await.projects.insert(project.id, project);
    }

    /// Adds a member to a project. Returns false if the project is unknown.
    pub async fn grant_access(&self, project_id: ProjectId, actor_id: ActorId) -> bool {
        match self.state.write().await.projects.get_mut(&project_id) {
            Some(project) => {
                project.members.insert(actor_id);
                true
            }
            None => false,
        }
    }

    /// Makes every lookup fail as if the store were down.
    pub async fn set_unavailable(&self, unavailable: bool) {
        self.state.write().await.unavailable = unavailable;
    }

    /// Returns the number of stored projects.
    pub async fn project_count(&self) -> usize {
        self.state.read().await.projects.len()
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn find_project(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
    ) -> Result<Option<Project>> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(ProjectError::Unavailable("project store is down".to_string()));
        }

        Ok(state
            .projects
            .get(&project_id)
            .filter(|p| p.tenant_id == tenant_id)
            .cloned())
    }

    async fn has_access(&self, project: &Project, actor_id: ActorId) -> Result<bool> {
        let state = self.state.read().await;
        if state.unavailable {
            return Err(ProjectError::Unavailable("project store is down".to_string()));
        }

        // Membership may have changed since the caller loaded the project
        Ok(state
            .projects
            .get(&project.id)
            .is_some_and(|p| p.is_accessible_by(actor_id)))
    }
}
