//! Project model and repository trait.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{ActorId, ProjectId, TenantId};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A project as seen by the orchestration core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub tenant_id: TenantId,
    pub name: String,
    pub owner_id: ActorId,
    pub members: HashSet<ActorId>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    /// Creates a project owned by `owner_id` with no additional members.
    pub fn new(tenant_id: TenantId, owner_id: ActorId, name: impl Into<String>) -> Self {
        Self {
            id: ProjectId::new(),
            tenant_id,
            name: name.into(),
            owner_id,
            members: HashSet::new(),
            created_at: Utc::now(),
        }
    }

    /// Returns true if the actor owns or is a member of the project.
    pub fn is_accessible_by(&self, actor_id: ActorId) -> bool {
        self.owner_id == actor_id || self.members.contains(&actor_id)
    }
}

/// Read access to projects and their membership.
#[async_trait]
pub trait ProjectRepository: Send + Sync {
    /// Looks a project up within a tenant. Projects of other tenants are invisible.
    async fn find_project(
        &self,
        tenant_id: TenantId,
        project_id: ProjectId,
    ) -> Result<Option<Project>>;

    /// Returns true if the actor may act on the project.
    async fn has_access(&self, project: &Project, actor_id: ActorId) -> Result<bool>;
}
